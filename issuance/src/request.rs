//! Certificate request context and its status.
//!
//! State machine:
//!   BEGIN -> PENDING -> APPROVED -> SVC_PENDING -> COMPLETE
//!              |           |
//!              +-----------+--> REJECTED | CANCELED
//!
//! The enclosing workflow enforces transitions; the enumeration only names
//! the states.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::certificate::{CertInfo, IssuedCertificate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Set by the originator before the request is populated by policy.
    Begin,
    /// Waiting for an agent to act.
    Pending,
    /// Accepted but not yet serviced. Retried at startup if the process
    /// dies in this state.
    Approved,
    /// Handed to the signing service, awaiting completion.
    SvcPending,
    /// Terminal. The outcome is recorded elsewhere.
    Complete,
    Rejected,
    Canceled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 7] = [
        Self::Begin,
        Self::Pending,
        Self::Approved,
        Self::SvcPending,
        Self::Complete,
        Self::Rejected,
        Self::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Begin => "BEGIN",
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::SvcPending => "SVC_PENDING",
            Self::Complete => "COMPLETE",
            Self::Rejected => "REJECTED",
            Self::Canceled => "CANCELED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Rejected | Self::Canceled)
    }

    /// States the workflow may move to from `self`.
    pub fn successors(self) -> &'static [RequestStatus] {
        match self {
            Self::Begin => &[Self::Pending],
            Self::Pending => &[Self::Approved, Self::Rejected, Self::Canceled],
            Self::Approved => &[Self::SvcPending, Self::Rejected, Self::Canceled],
            Self::SvcPending => &[Self::Complete],
            Self::Complete | Self::Rejected | Self::Canceled => &[],
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown request status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for RequestStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("request {0} is complete and can no longer be modified")]
    Immutable(String),
    #[error("request id {0} is not numeric")]
    NonNumericId(String),
}

/// One extData value: a string, or a nested map for prefixed attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtDataValue {
    String(String),
    Map(BTreeMap<String, String>),
}

/// The mutable context threaded through policy, rendering and publishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    id: String,
    status: RequestStatus,
    ext_data: BTreeMap<String, ExtDataValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rejection_reason: Option<String>,
    #[serde(skip)]
    cert_infos: Vec<CertInfo>,
    #[serde(skip)]
    issued: Option<IssuedCertificate>,
}

fn normalize(key: &str) -> String {
    key.to_ascii_lowercase()
}

impl Request {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: RequestStatus::Begin,
            ext_data: BTreeMap::new(),
            rejection_reason: None,
            cert_infos: Vec::new(),
            issued: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The id as an integer, for encodings that key responses by number.
    pub fn numeric_id(&self) -> Result<u64, RequestError> {
        self.id
            .trim()
            .parse()
            .map_err(|_| RequestError::NonNumericId(self.id.clone()))
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn set_status(&mut self, status: RequestStatus) {
        self.status = status;
    }

    fn ensure_mutable(&self) -> Result<(), RequestError> {
        if self.status == RequestStatus::Complete {
            return Err(RequestError::Immutable(self.id.clone()));
        }
        Ok(())
    }

    /// Case-insensitive string lookup.
    pub fn ext_data(&self, key: &str) -> Option<&str> {
        match self.ext_data.get(&normalize(key))? {
            ExtDataValue::String(s) => Some(s),
            ExtDataValue::Map(_) => None,
        }
    }

    /// Case-insensitive lookup of `key` inside the map stored under `prefix`.
    pub fn ext_data_prefixed(&self, prefix: &str, key: &str) -> Option<&str> {
        match self.ext_data.get(&normalize(prefix))? {
            ExtDataValue::Map(map) => map.get(&normalize(key)).map(String::as_str),
            ExtDataValue::String(_) => None,
        }
    }

    pub fn set_ext_data(
        &mut self,
        key: &str,
        value: impl Into<String>,
    ) -> Result<(), RequestError> {
        self.ensure_mutable()?;
        self.ext_data
            .insert(normalize(key), ExtDataValue::String(value.into()));
        Ok(())
    }

    /// Store `key=value` in the map under `prefix`, replacing a plain
    /// string stored under the same prefix.
    pub fn set_ext_data_prefixed(
        &mut self,
        prefix: &str,
        key: &str,
        value: impl Into<String>,
    ) -> Result<(), RequestError> {
        self.ensure_mutable()?;
        let entry = self
            .ext_data
            .entry(normalize(prefix))
            .or_insert_with(|| ExtDataValue::Map(BTreeMap::new()));
        if matches!(*entry, ExtDataValue::String(_)) {
            *entry = ExtDataValue::Map(BTreeMap::new());
        }
        if let ExtDataValue::Map(map) = entry {
            map.insert(normalize(key), value.into());
        }
        Ok(())
    }

    pub fn cert_infos(&self) -> &[CertInfo] {
        &self.cert_infos
    }

    pub fn cert_infos_mut(&mut self) -> Result<&mut [CertInfo], RequestError> {
        self.ensure_mutable()?;
        Ok(&mut self.cert_infos)
    }

    pub fn add_cert_info(&mut self, info: CertInfo) -> Result<(), RequestError> {
        self.ensure_mutable()?;
        self.cert_infos.push(info);
        Ok(())
    }

    pub fn issued_certificate(&self) -> Option<&IssuedCertificate> {
        self.issued.as_ref()
    }

    pub fn set_issued_certificate(&mut self, cert: IssuedCertificate) -> Result<(), RequestError> {
        self.ensure_mutable()?;
        self.issued = Some(cert);
        Ok(())
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn set_rejection_reason(&mut self, reason: impl Into<String>) {
        self.rejection_reason = Some(reason.into());
    }
}
