//! The issued certificate alone, as bare base64 or a PEM block.

use ca_issuance::request::Request;
use pem::{EncodeConfig, LineEnding, Pem};

use super::{encode_base64, issued_for, Locale, OutputRenderer};

pub const VALUE_B64_CERT: &str = "b64_cert";

pub const PEM_TAG: &str = "CERTIFICATE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Base64 wrapped at 64 columns between BEGIN/END lines.
    Pem,
    /// Bare base64 on one line, as token-key enrollment clients expect.
    SingleLine,
}

/// The issued certificate alone, base64 encoded.
#[derive(Debug, Clone)]
pub struct CertOutput {
    framing: Framing,
}

impl CertOutput {
    pub fn new(framing: Framing) -> Self {
        Self { framing }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }
}

/// Frame DER as a PEM certificate block, LF line endings.
pub fn to_pem(der: &[u8]) -> String {
    let config = EncodeConfig::new().set_line_ending(LineEnding::LF);
    pem::encode_config(&Pem::new(PEM_TAG, der), config)
}

impl OutputRenderer for CertOutput {
    fn display_name(&self, locale: Locale) -> &'static str {
        match (self.framing, locale) {
            (Framing::Pem, Locale::En) => "Certificate (PEM)",
            (Framing::Pem, Locale::De) => "Zertifikat (PEM)",
            (Framing::Pem, Locale::Fr) => "Certificat (PEM)",
            (Framing::SingleLine, Locale::En) => "Certificate (Base64)",
            (Framing::SingleLine, Locale::De) => "Zertifikat (Base64)",
            (Framing::SingleLine, Locale::Fr) => "Certificat (Base64)",
        }
    }

    fn value_names(&self) -> &'static [&'static str] {
        &[VALUE_B64_CERT]
    }

    fn value(&self, name: &str, _locale: Locale, request: &Request) -> Option<String> {
        let cert = issued_for(name, VALUE_B64_CERT, request)?;
        Some(match self.framing {
            Framing::Pem => to_pem(&cert.der),
            Framing::SingleLine => encode_base64(&cert.der),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::{issued_request, LEAF_DER};

    #[test]
    fn single_line_is_bare_base64() {
        let req = issued_request("1");
        let out = CertOutput::new(Framing::SingleLine)
            .value(VALUE_B64_CERT, Locale::En, &req)
            .unwrap();
        assert_eq!(out, "MAMCASo=");
        assert_eq!(out, encode_base64(LEAF_DER));
    }

    #[test]
    fn pem_is_framed() {
        let req = issued_request("1");
        let out = CertOutput::new(Framing::Pem)
            .value(VALUE_B64_CERT, Locale::De, &req)
            .unwrap();
        assert_eq!(
            out,
            "-----BEGIN CERTIFICATE-----\nMAMCASo=\n-----END CERTIFICATE-----\n"
        );
    }

    #[test]
    fn pem_wraps_at_64_columns() {
        let pem = to_pem(&[0xAB; 100]);
        let body: Vec<&str> = pem
            .lines()
            .filter(|l| !l.starts_with("-----"))
            .collect();
        assert_eq!(body.len(), 3);
        assert!(body[..2].iter().all(|l| l.len() == 64));
        assert_eq!(body.concat(), encode_base64(&[0xAB; 100]));

        let parsed = pem::parse(&pem).unwrap();
        assert_eq!(parsed.tag(), PEM_TAG);
        assert_eq!(parsed.contents(), &[0xAB; 100][..]);
    }

    #[test]
    fn pending_request_is_none() {
        let out = CertOutput::new(Framing::Pem).value(VALUE_B64_CERT, Locale::En, &Request::new("1"));
        assert_eq!(out, None);
    }
}
