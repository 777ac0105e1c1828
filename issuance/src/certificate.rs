//! In-progress certificate structure and the issued certificate.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::extensions::CertificateExtensions;

/// X.509 certificate version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CertVersion {
    V1,
    V2,
    V3,
}

impl CertVersion {
    /// Value of the DER `version` field (v1 = 0).
    pub fn der_value(self) -> u8 {
        match self {
            Self::V1 => 0,
            Self::V2 => 1,
            Self::V3 => 2,
        }
    }

    /// Human-facing number (v1 = 1).
    pub fn number(self) -> u8 {
        self.der_value() + 1
    }
}

/// The unsigned certificate being assembled for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    pub version: CertVersion,
    pub serial_number: u64,
    pub subject_dn: String,
    pub issuer_dn: String,
    extensions: Option<CertificateExtensions>,
}

impl CertInfo {
    pub fn new(subject_dn: impl Into<String>, issuer_dn: impl Into<String>) -> Self {
        Self {
            version: CertVersion::V1,
            serial_number: 0,
            subject_dn: subject_dn.into(),
            issuer_dn: issuer_dn.into(),
            extensions: None,
        }
    }

    pub fn extensions(&self) -> Option<&CertificateExtensions> {
        self.extensions.as_ref()
    }

    pub fn extensions_mut(&mut self) -> Option<&mut CertificateExtensions> {
        self.extensions.as_mut()
    }

    /// Fetch the extension set, creating an empty one if absent. Extensions
    /// only exist in v3 certificates, so creation bumps the version.
    pub fn extensions_or_create(&mut self) -> &mut CertificateExtensions {
        if self.extensions.is_none() {
            self.version = CertVersion::V3;
        }
        self.extensions.get_or_insert_with(CertificateExtensions::new)
    }

    /// Replace the whole extension set.
    pub fn set_extensions(&mut self, extensions: CertificateExtensions) {
        self.version = CertVersion::V3;
        self.extensions = Some(extensions);
    }
}

/// A signed certificate: its DER plus the decoded summary renderers need.
///
/// Decoding X.509 happens in the signing collaborator; the summary is
/// supplied alongside the DER.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub der: Vec<u8>,
    pub version: CertVersion,
    pub serial_number: u64,
    pub subject_dn: String,
    pub issuer_dn: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub extensions: CertificateExtensions,
}

impl IssuedCertificate {
    /// SHA-256 over the DER encoding.
    pub fn fingerprint_sha256(&self) -> [u8; 32] {
        Sha256::digest(&self.der).into()
    }

    /// Fingerprint as colon-separated upper-case hex.
    pub fn fingerprint_hex(&self) -> String {
        let digits = hex::encode_upper(self.fingerprint_sha256());
        digits
            .as_bytes()
            .chunks(2)
            .filter_map(|pair| std::str::from_utf8(pair).ok())
            .collect::<Vec<_>>()
            .join(":")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::Extension;

    #[test]
    fn creating_extensions_bumps_version() {
        let mut info = CertInfo::new("CN=leaf", "CN=ca");
        assert_eq!(info.version, CertVersion::V1);
        assert!(info.extensions().is_none());

        info.extensions_or_create()
            .set(Extension::ocsp_no_check(false))
            .unwrap();
        assert_eq!(info.version, CertVersion::V3);
        assert_eq!(info.extensions().map(CertificateExtensions::len), Some(1));
    }

    #[test]
    fn existing_extensions_keep_version() {
        let mut info = CertInfo::new("CN=leaf", "CN=ca");
        info.set_extensions(CertificateExtensions::new());
        info.version = CertVersion::V2;
        info.extensions_or_create();
        assert_eq!(info.version, CertVersion::V2);
    }

    #[test]
    fn fingerprint_is_colon_hex() {
        let cert = IssuedCertificate {
            der: vec![0x30, 0x00],
            version: CertVersion::V3,
            serial_number: 1,
            subject_dn: "CN=leaf".into(),
            issuer_dn: "CN=ca".into(),
            not_before: DateTime::from_timestamp(0, 0).unwrap(),
            not_after: DateTime::from_timestamp(0, 0).unwrap(),
            extensions: CertificateExtensions::new(),
        };
        let shown = cert.fingerprint_hex();
        assert_eq!(shown.len(), 32 * 3 - 1);
        assert_eq!(shown.split(':').count(), 32);
        assert_eq!(shown.replace(':', ""), hex::encode_upper(cert.fingerprint_sha256()));
        assert!(!shown.chars().any(|c| c.is_ascii_lowercase()));
    }
}
