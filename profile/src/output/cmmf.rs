//! CMMF certificate response.
//!
//! Assembles a CertRepMessage (RFC 4211 / RFC 4210) carrying the issued
//! certificate and, as caPubs, the CA chain.

use std::sync::Arc;

use ca_issuance::der::{self, TAG_SEQUENCE};
use ca_issuance::request::Request;
use tracing::warn;

use super::{check_certificates, encode_base64, issued_for, Locale, OutputRenderer, RenderError};
use crate::chain::CaChainProvider;

pub const VALUE_CMMF: &str = "cmmf";

// PKIStatusInfo: SEQUENCE { status INTEGER 0 (granted) }
const STATUS_GRANTED: &[u8] = &[0x30, 0x03, 0x02, 0x01, 0x00];

/// Build a CertRepMessage for one granted request.
///
/// CertRepMessage ::= SEQUENCE {
///     caPubs    [1] SEQUENCE SIZE (1..MAX) OF CMPCertificate OPTIONAL,
///     response  SEQUENCE OF CertResponse
/// }
///
/// CertResponse ::= SEQUENCE {
///     certReqId         INTEGER,
///     status            PKIStatusInfo,
///     certifiedKeyPair  CertifiedKeyPair OPTIONAL
/// }
///
/// CertifiedKeyPair ::= SEQUENCE {
///     certOrEncCert  CertOrEncCert  -- certificate [0] CMPCertificate
/// }
pub fn build_cert_rep(
    cert_req_id: u64,
    cert: &[u8],
    ca_pubs: &[Vec<u8>],
) -> Result<Vec<u8>, RenderError> {
    check_certificates(std::iter::once(cert).chain(ca_pubs.iter().map(Vec::as_slice)))?;

    let mut message = Vec::with_capacity(cert.len() + 64);

    // caPubs is SIZE (1..MAX), so an empty chain omits the field.
    if !ca_pubs.is_empty() {
        let certs = der::tlv(TAG_SEQUENCE, &ca_pubs.concat());
        der::write_tlv(&mut message, der::context_constructed(1), &certs);
    }

    let cert_or_enc_cert = der::tlv(der::context_constructed(0), cert);
    let key_pair = der::tlv(TAG_SEQUENCE, &cert_or_enc_cert);

    let mut response = Vec::new();
    der::encode_integer_u64(&mut response, cert_req_id);
    response.extend_from_slice(STATUS_GRANTED);
    response.extend_from_slice(&key_pair);
    let response = der::tlv(TAG_SEQUENCE, &response);

    der::write_tlv(&mut message, TAG_SEQUENCE, &response);
    Ok(der::tlv(TAG_SEQUENCE, &message))
}

#[derive(Debug, Clone)]
pub struct CmmfOutput {
    chain: Arc<dyn CaChainProvider>,
}

impl CmmfOutput {
    pub fn new(chain: Arc<dyn CaChainProvider>) -> Self {
        Self { chain }
    }

    fn encode(&self, request: &Request, cert: &[u8]) -> Result<String, RenderError> {
        let cert_req_id = request.numeric_id()?;
        let chain = self.chain.ca_cert_chain()?;
        Ok(encode_base64(&build_cert_rep(cert_req_id, cert, &chain)?))
    }
}

impl OutputRenderer for CmmfOutput {
    fn display_name(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::En => "CMMF Response",
            Locale::De => "CMMF-Antwort",
            Locale::Fr => "Réponse CMMF",
        }
    }

    fn value_names(&self) -> &'static [&'static str] {
        &[VALUE_CMMF]
    }

    /// Any failure yields `None`.
    fn value(&self, name: &str, _locale: Locale, request: &Request) -> Option<String> {
        let cert = issued_for(name, VALUE_CMMF, request)?;
        self.encode(request, &cert.der)
            .map_err(|e| warn!(request_id = %request.id(), error = %e, "cannot encode CMMF response"))
            .ok()
    }
}
