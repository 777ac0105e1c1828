//! PKCS#7 certificate chain output.
//!
//! Wraps the issued certificate and the CA chain in a degenerate CMS
//! SignedData: no digest algorithms, no content, no signers. Clients import
//! it as a certificate bundle.

use std::sync::Arc;

use ca_issuance::der::{self, TAG_OID, TAG_SEQUENCE, TAG_SET};
use ca_issuance::request::Request;
use tracing::error;

use super::{check_certificates, encode_base64, issued_for, Locale, OutputRenderer, RenderError};
use crate::chain::CaChainProvider;

pub const VALUE_PKCS7: &str = "pkcs7";

// CMS OIDs
const OID_SIGNED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02]; // 1.2.840.113549.1.7.2
const OID_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x01]; // 1.2.840.113549.1.7.1

/// Build a certs-only ContentInfo.
///
/// Structure:
/// ContentInfo {
///   contentType: id-signedData,
///   content: SignedData {
///     version: 1,
///     digestAlgorithms: {},
///     contentInfo: { id-data },
///     certificates: [0] { certs... },
///     signerInfos: {}
///   }
/// }
pub fn build_cert_chain(certs: &[&[u8]]) -> Result<Vec<u8>, RenderError> {
    check_certificates(certs.iter().copied())?;

    let mut signed_data_content = Vec::with_capacity(256);

    // version: INTEGER 1
    signed_data_content.extend_from_slice(&[0x02, 0x01, 0x01]);

    // digestAlgorithms: empty SET
    der::write_tlv(&mut signed_data_content, TAG_SET, &[]);

    // contentInfo: SEQUENCE { id-data } with content absent
    let mut content_info = Vec::new();
    der::write_tlv(&mut content_info, TAG_OID, OID_DATA);
    der::write_tlv(&mut signed_data_content, TAG_SEQUENCE, &content_info);

    // certificates [0] IMPLICIT SET OF Certificate
    let all_certs = certs.concat();
    der::write_tlv(&mut signed_data_content, der::context_constructed(0), &all_certs);

    // signerInfos: empty SET
    der::write_tlv(&mut signed_data_content, TAG_SET, &[]);

    let signed_data = der::tlv(TAG_SEQUENCE, &signed_data_content);

    let mut outer = Vec::new();
    der::write_tlv(&mut outer, TAG_OID, OID_SIGNED_DATA);
    // content [0] EXPLICIT SignedData
    der::write_tlv(&mut outer, der::context_constructed(0), &signed_data);

    Ok(der::tlv(TAG_SEQUENCE, &outer))
}

#[derive(Debug, Clone)]
pub struct Pkcs7Output {
    chain: Arc<dyn CaChainProvider>,
}

impl Pkcs7Output {
    pub fn new(chain: Arc<dyn CaChainProvider>) -> Self {
        Self { chain }
    }

    fn encode(&self, leaf: &[u8]) -> Result<String, RenderError> {
        let chain = self.chain.ca_cert_chain()?;
        let mut certs: Vec<&[u8]> = Vec::with_capacity(chain.len() + 1);
        certs.push(leaf);
        certs.extend(chain.iter().map(Vec::as_slice));
        Ok(encode_base64(&build_cert_chain(&certs)?))
    }
}

impl OutputRenderer for Pkcs7Output {
    fn display_name(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::En => "PKCS #7 Certificate Chain",
            Locale::De => "PKCS #7-Zertifikatskette",
            Locale::Fr => "Chaîne de certificats PKCS #7",
        }
    }

    fn value_names(&self) -> &'static [&'static str] {
        &[VALUE_PKCS7]
    }

    /// An encoding failure yields an empty string, not `None`.
    fn value(&self, name: &str, _locale: Locale, request: &Request) -> Option<String> {
        let cert = issued_for(name, VALUE_PKCS7, request)?;
        match self.encode(&cert.der) {
            Ok(b64) => Some(b64),
            Err(e) => {
                error!(request_id = %request.id(), error = %e, "cannot encode PKCS #7 chain");
                Some(String::new())
            }
        }
    }
}
