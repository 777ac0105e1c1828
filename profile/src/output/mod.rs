//! Output renderers: named values computed from an issued request.
//!
//! Values are produced on demand and never stored. Every renderer yields
//! `None` while the request has no issued certificate.

use std::fmt;

use base64::{engine::general_purpose, Engine as _};
use ca_issuance::certificate::IssuedCertificate;
use ca_issuance::der::DerError;
use ca_issuance::request::{Request, RequestError};
use thiserror::Error;

use crate::chain::ChainError;

pub mod cmmf;
pub mod encoding;
pub mod pkcs7;
pub mod pretty;

pub use cmmf::CmmfOutput;
pub use encoding::{CertOutput, Framing};
pub use pkcs7::Pkcs7Output;
pub use pretty::PrettyPrintOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Locale {
    #[default]
    En,
    De,
    Fr,
}

impl Locale {
    /// Resolve a language tag such as `de-DE`; unknown languages fall back
    /// to English.
    pub fn from_tag(tag: &str) -> Self {
        let language = tag
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match language.as_str() {
            "de" => Self::De,
            "fr" => Self::Fr,
            _ => Self::En,
        }
    }
}

/// Why an encoded output could not be produced.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("certificate {index} is not a single DER SEQUENCE: {source}")]
    MalformedCertificate {
        index: usize,
        #[source]
        source: DerError,
    },
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Request(#[from] RequestError),
}

pub trait OutputRenderer: Send + Sync + fmt::Debug {
    /// Short descriptive name shown to operators.
    fn display_name(&self, locale: Locale) -> &'static str;

    /// The value names this renderer answers; fixed at construction.
    fn value_names(&self) -> &'static [&'static str];

    /// Compute one value. `None` for an unknown name or a request that has
    /// not been issued yet.
    fn value(&self, name: &str, locale: Locale, request: &Request) -> Option<String>;
}

pub(crate) fn encode_base64(der: &[u8]) -> String {
    general_purpose::STANDARD.encode(der)
}

/// The issued certificate, provided `name` is the renderer's value name.
pub(crate) fn issued_for<'r>(
    name: &str,
    expected: &str,
    request: &'r Request,
) -> Option<&'r IssuedCertificate> {
    if name != expected {
        return None;
    }
    request.issued_certificate()
}

/// Check each certificate is one well-formed DER SEQUENCE.
pub(crate) fn check_certificates<'a>(
    certs: impl IntoIterator<Item = &'a [u8]>,
) -> Result<(), RenderError> {
    for (index, der) in certs.into_iter().enumerate() {
        ca_issuance::der::ensure_single_sequence(der)
            .map_err(|source| RenderError::MalformedCertificate { index, source })?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ca_issuance::certificate::CertVersion;
    use ca_issuance::extensions::{CertificateExtensions, Extension};
    use chrono::{DateTime, Utc};

    /// A minimal "certificate": one SEQUENCE wrapping an INTEGER.
    pub(crate) const LEAF_DER: &[u8] = &[0x30, 0x03, 0x02, 0x01, 0x2A];
    pub(crate) const CA_DER: &[u8] = &[0x30, 0x03, 0x02, 0x01, 0x01];

    pub(crate) fn issued_request(id: &str) -> Request {
        let mut extensions = CertificateExtensions::new();
        extensions
            .set(Extension::basic_constraints(true, false, None))
            .unwrap();
        let mut req = Request::new(id);
        req.set_issued_certificate(IssuedCertificate {
            der: LEAF_DER.to_vec(),
            version: CertVersion::V3,
            serial_number: 42,
            subject_dn: "CN=leaf.example.com,O=Example".into(),
            issuer_dn: "CN=Example CA,O=Example".into(),
            not_before: DateTime::<Utc>::from_timestamp(1_704_067_200, 0).unwrap(),
            not_after: DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap(),
            extensions,
        })
        .unwrap();
        req
    }

    #[test]
    fn locale_tags_fall_back_to_english() {
        assert_eq!(Locale::from_tag("de-DE"), Locale::De);
        assert_eq!(Locale::from_tag("FR"), Locale::Fr);
        assert_eq!(Locale::from_tag("fr_CA"), Locale::Fr);
        assert_eq!(Locale::from_tag("ja"), Locale::En);
        assert_eq!(Locale::from_tag(""), Locale::En);
    }

    #[test]
    fn certificate_check_reports_index() {
        let bad: &[u8] = &[0x30, 0x05, 0x02];
        assert!(check_certificates([LEAF_DER, CA_DER]).is_ok());
        assert!(matches!(
            check_certificates([LEAF_DER, bad]),
            Err(RenderError::MalformedCertificate { index: 1, .. })
        ));
    }
}
