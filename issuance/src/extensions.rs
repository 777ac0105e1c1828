//! X.509 extensions, keyed by well-known short name.
//!
//! An [`Extension`] is `(oid, critical, DER value)`. [`CertificateExtensions`]
//! keeps insertion order and refuses a second extension with the same name,
//! so every mutation has to follow delete-if-present then set.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use thiserror::Error;

use crate::der::{self, DerError, Reader};
use crate::name;

pub const OID_SUBJECT_KEY_IDENTIFIER: &str = "2.5.29.14";
pub const OID_KEY_USAGE: &str = "2.5.29.15";
pub const OID_SUBJECT_ALT_NAME: &str = "2.5.29.17";
pub const OID_ISSUER_ALT_NAME: &str = "2.5.29.18";
pub const OID_BASIC_CONSTRAINTS: &str = "2.5.29.19";
pub const OID_CRL_DISTRIBUTION_POINTS: &str = "2.5.29.31";
pub const OID_CERTIFICATE_POLICIES: &str = "2.5.29.32";
pub const OID_AUTHORITY_KEY_IDENTIFIER: &str = "2.5.29.35";
pub const OID_EXTENDED_KEY_USAGE: &str = "2.5.29.37";
pub const OID_AUTHORITY_INFO_ACCESS: &str = "1.3.6.1.5.5.7.1.1";
pub const OID_OCSP_NO_CHECK: &str = "1.3.6.1.5.5.7.48.1.5";

pub const SUBJECT_ALT_NAME: &str = "SubjectAlternativeName";
pub const ISSUER_ALT_NAME: &str = "IssuerAlternativeName";
pub const BASIC_CONSTRAINTS: &str = "BasicConstraints";
pub const OCSP_NO_CHECK: &str = "OCSPNoCheck";

const WELL_KNOWN: &[(&str, &str)] = &[
    (OID_SUBJECT_KEY_IDENTIFIER, "SubjectKeyIdentifier"),
    (OID_KEY_USAGE, "KeyUsage"),
    (OID_SUBJECT_ALT_NAME, SUBJECT_ALT_NAME),
    (OID_ISSUER_ALT_NAME, ISSUER_ALT_NAME),
    (OID_BASIC_CONSTRAINTS, BASIC_CONSTRAINTS),
    (OID_CRL_DISTRIBUTION_POINTS, "CRLDistributionPoints"),
    (OID_CERTIFICATE_POLICIES, "CertificatePolicies"),
    (OID_AUTHORITY_KEY_IDENTIFIER, "AuthorityKeyIdentifier"),
    (OID_EXTENDED_KEY_USAGE, "ExtendedKeyUsage"),
    (OID_AUTHORITY_INFO_ACCESS, "AuthorityInfoAccess"),
    (OID_OCSP_NO_CHECK, OCSP_NO_CHECK),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtensionError {
    #[error("extension {0} not found")]
    NotFound(String),
    #[error("extension {0} is already present")]
    Duplicate(String),
    #[error("encoding error: {0}")]
    Encoding(#[from] DerError),
    #[error("unknown general name type: {0}")]
    UnknownGeneralNameType(String),
    #[error("invalid {kind} general name: {value}")]
    InvalidGeneralName { kind: GeneralNameType, value: String },
    #[error("extension {0} does not carry general names")]
    NotGeneralNames(String),
}

/// The fixed set of general-name type filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneralNameType {
    Any,
    Rfc822Name,
    DnsName,
    X400Name,
    DirectoryName,
    EdiName,
    UriName,
    IpAddress,
    OidName,
}

impl GeneralNameType {
    pub const ALL: [GeneralNameType; 9] = [
        Self::Any,
        Self::Rfc822Name,
        Self::DnsName,
        Self::X400Name,
        Self::DirectoryName,
        Self::EdiName,
        Self::UriName,
        Self::IpAddress,
        Self::OidName,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::Rfc822Name => "RFC822Name",
            Self::DnsName => "DNSName",
            Self::X400Name => "X400Name",
            Self::DirectoryName => "DIRECTORYName",
            Self::EdiName => "EDIName",
            Self::UriName => "URIName",
            Self::IpAddress => "IPAddress",
            Self::OidName => "OIDName",
        }
    }

    /// True when a name of type `kind` passes this filter.
    pub fn accepts(self, kind: GeneralNameType) -> bool {
        self == Self::Any || self == kind
    }
}

impl fmt::Display for GeneralNameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for GeneralNameType {
    type Err = ExtensionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| ExtensionError::UnknownGeneralNameType(s.to_string()))
    }
}

/// One GeneralName entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneralName {
    Rfc822(String),
    Dns(String),
    /// Raw ORAddress content octets.
    X400(Vec<u8>),
    Directory(String),
    EdiParty(String),
    Uri(String),
    IpAddress(IpAddr),
    Oid(String),
}

impl GeneralName {
    /// Build a general name from a configured type and textual value.
    pub fn parse(kind: GeneralNameType, value: &str) -> Result<Self, ExtensionError> {
        let invalid = || ExtensionError::InvalidGeneralName {
            kind,
            value: value.to_string(),
        };
        let value = value.trim();
        if value.is_empty() {
            return Err(invalid());
        }
        let ia5 = |v: &str| {
            if v.is_ascii() {
                Ok(v.to_string())
            } else {
                Err(invalid())
            }
        };
        let name = match kind {
            GeneralNameType::Any => return Err(invalid()),
            GeneralNameType::Rfc822Name => Self::Rfc822(ia5(value)?),
            GeneralNameType::DnsName => Self::Dns(ia5(value)?),
            GeneralNameType::UriName => Self::Uri(ia5(value)?),
            GeneralNameType::X400Name => Self::X400(hex::decode(value).map_err(|_| invalid())?),
            GeneralNameType::DirectoryName => {
                name::encode_name(value).map_err(|_| invalid())?;
                Self::Directory(value.to_string())
            }
            GeneralNameType::EdiName => Self::EdiParty(value.to_string()),
            GeneralNameType::IpAddress => Self::IpAddress(value.parse().map_err(|_| invalid())?),
            GeneralNameType::OidName => {
                der::encode_oid(value).map_err(|_| invalid())?;
                Self::Oid(value.to_string())
            }
        };
        Ok(name)
    }

    pub fn kind(&self) -> GeneralNameType {
        match self {
            Self::Rfc822(_) => GeneralNameType::Rfc822Name,
            Self::Dns(_) => GeneralNameType::DnsName,
            Self::X400(_) => GeneralNameType::X400Name,
            Self::Directory(_) => GeneralNameType::DirectoryName,
            Self::EdiParty(_) => GeneralNameType::EdiName,
            Self::Uri(_) => GeneralNameType::UriName,
            Self::IpAddress(_) => GeneralNameType::IpAddress,
            Self::Oid(_) => GeneralNameType::OidName,
        }
    }

    /// Plain textual value, without any type prefix.
    pub fn value(&self) -> String {
        match self {
            Self::Rfc822(v) | Self::Dns(v) | Self::Directory(v) | Self::EdiParty(v) => v.clone(),
            Self::Uri(v) | Self::Oid(v) => v.clone(),
            Self::X400(raw) => hex::encode(raw),
            Self::IpAddress(ip) => ip.to_string(),
        }
    }

    /// Append the DER GeneralName (IMPLICIT context tags) to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), DerError> {
        match self {
            Self::Rfc822(v) => der::write_tlv(buf, der::context_primitive(1), v.as_bytes()),
            Self::Dns(v) => der::write_tlv(buf, der::context_primitive(2), v.as_bytes()),
            Self::X400(raw) => der::write_tlv(buf, der::context_constructed(3), raw),
            Self::Directory(dn) => {
                der::write_tlv(buf, der::context_constructed(4), &name::encode_name(dn)?)
            }
            Self::EdiParty(party) => {
                // partyName [1] EXPLICIT DirectoryString
                let party_name = der::tlv(
                    der::context_constructed(1),
                    &der::tlv(der::TAG_UTF8_STRING, party.as_bytes()),
                );
                der::write_tlv(buf, der::context_constructed(5), &party_name);
            }
            Self::Uri(v) => der::write_tlv(buf, der::context_primitive(6), v.as_bytes()),
            Self::IpAddress(IpAddr::V4(ip)) => {
                der::write_tlv(buf, der::context_primitive(7), &ip.octets())
            }
            Self::IpAddress(IpAddr::V6(ip)) => {
                der::write_tlv(buf, der::context_primitive(7), &ip.octets())
            }
            Self::Oid(oid) => der::write_tlv(buf, der::context_primitive(8), &der::encode_oid(oid)?),
        }
        Ok(())
    }

    /// Decode one GeneralName TLV. `otherName` entries yield `None`.
    pub fn decode(tag: u8, value: &[u8]) -> Result<Option<Self>, DerError> {
        let text = |v: &[u8]| {
            std::str::from_utf8(v)
                .map(str::to_string)
                .map_err(|e| DerError::InvalidString(e.to_string()))
        };
        let name = match tag {
            t if t == der::context_constructed(0) => return Ok(None),
            t if t == der::context_primitive(1) => Self::Rfc822(text(value)?),
            t if t == der::context_primitive(2) => Self::Dns(text(value)?),
            t if t == der::context_constructed(3) => Self::X400(value.to_vec()),
            t if t == der::context_constructed(4) => {
                let mut reader = Reader::new(value);
                let content = reader.read_expected(der::TAG_SEQUENCE)?;
                reader.finish()?;
                Self::Directory(name::decode_name(content)?)
            }
            t if t == der::context_constructed(5) => {
                let mut reader = Reader::new(value);
                let mut tlv = reader.read_any()?;
                if tlv.tag == der::context_constructed(0) {
                    tlv = reader.read_any()?;
                }
                let mut party = Reader::new(tlv.value);
                let inner = party.read_any()?;
                Self::EdiParty(text(inner.value)?)
            }
            t if t == der::context_primitive(6) => Self::Uri(text(value)?),
            t if t == der::context_primitive(7) => match value.len() {
                4 => {
                    let octets: [u8; 4] = [value[0], value[1], value[2], value[3]];
                    Self::IpAddress(IpAddr::from(octets))
                }
                16 => {
                    let mut octets = [0u8; 16];
                    octets.copy_from_slice(value);
                    Self::IpAddress(IpAddr::from(octets))
                }
                n => return Err(DerError::InvalidString(format!("ip address of {n} bytes"))),
            },
            t if t == der::context_primitive(8) => Self::Oid(der::decode_oid(value)?),
            other => {
                return Err(DerError::UnexpectedTag {
                    expected: der::context_primitive(1),
                    found: other,
                })
            }
        };
        Ok(Some(name))
    }
}

/// Encode `GeneralNames ::= SEQUENCE OF GeneralName`.
pub fn encode_general_names(names: &[GeneralName]) -> Result<Vec<u8>, DerError> {
    let mut inner = Vec::new();
    for name in names {
        name.encode(&mut inner)?;
    }
    Ok(der::tlv(der::TAG_SEQUENCE, &inner))
}

/// Decode `GeneralNames`, skipping `otherName` entries.
pub fn decode_general_names(der_value: &[u8]) -> Result<Vec<GeneralName>, DerError> {
    let mut outer = Reader::new(der_value);
    let content = outer.read_expected(der::TAG_SEQUENCE)?;
    outer.finish()?;

    let mut names = Vec::new();
    let mut reader = Reader::new(content);
    while !reader.is_empty() {
        let tlv = reader.read_any()?;
        if let Some(name) = GeneralName::decode(tlv.tag, tlv.value)? {
            names.push(name);
        }
    }
    Ok(names)
}

/// Short name for a known extension OID, or the dotted OID itself.
pub fn name_for_oid(oid: &str) -> &str {
    WELL_KNOWN
        .iter()
        .find(|(o, _)| *o == oid)
        .map(|(_, n)| *n)
        .unwrap_or(oid)
}

/// One certificate extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    oid: String,
    critical: bool,
    value: Vec<u8>,
}

impl Extension {
    pub fn new(oid: impl Into<String>, critical: bool, value: Vec<u8>) -> Self {
        Self {
            oid: oid.into(),
            critical,
            value,
        }
    }

    pub fn issuer_alt_name(critical: bool, names: &[GeneralName]) -> Result<Self, ExtensionError> {
        Ok(Self::new(
            OID_ISSUER_ALT_NAME,
            critical,
            encode_general_names(names)?,
        ))
    }

    pub fn subject_alt_name(critical: bool, names: &[GeneralName]) -> Result<Self, ExtensionError> {
        Ok(Self::new(
            OID_SUBJECT_ALT_NAME,
            critical,
            encode_general_names(names)?,
        ))
    }

    /// The OCSP no-check marker; its value is an ASN.1 NULL.
    pub fn ocsp_no_check(critical: bool) -> Self {
        Self::new(OID_OCSP_NO_CHECK, critical, vec![der::TAG_NULL, 0x00])
    }

    pub fn basic_constraints(critical: bool, ca: bool, path_len: Option<u64>) -> Self {
        let mut inner = Vec::new();
        if ca {
            der::encode_boolean(&mut inner, true);
        }
        if let Some(len) = path_len {
            der::encode_integer_u64(&mut inner, len);
        }
        Self::new(
            OID_BASIC_CONSTRAINTS,
            critical,
            der::tlv(der::TAG_SEQUENCE, &inner),
        )
    }

    pub fn oid(&self) -> &str {
        &self.oid
    }

    /// Well-known short name, or the dotted OID.
    pub fn name(&self) -> &str {
        name_for_oid(&self.oid)
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    /// DER value carried in `extnValue`.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Decode the general names of a SubjectAlternativeName or
    /// IssuerAlternativeName extension.
    pub fn general_names(&self) -> Result<Vec<GeneralName>, ExtensionError> {
        if self.oid != OID_SUBJECT_ALT_NAME && self.oid != OID_ISSUER_ALT_NAME {
            return Err(ExtensionError::NotGeneralNames(self.name().to_string()));
        }
        Ok(decode_general_names(&self.value)?)
    }

    /// `Extension ::= SEQUENCE { extnID, critical DEFAULT FALSE, extnValue }`
    pub fn to_der(&self) -> Result<Vec<u8>, DerError> {
        let mut inner = Vec::new();
        der::write_tlv(&mut inner, der::TAG_OID, &der::encode_oid(&self.oid)?);
        if self.critical {
            der::encode_boolean(&mut inner, true);
        }
        der::write_tlv(&mut inner, der::TAG_OCTET_STRING, &self.value);
        Ok(der::tlv(der::TAG_SEQUENCE, &inner))
    }
}

/// Ordered extension set keyed by extension name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateExtensions {
    entries: Vec<Extension>,
}

impl CertificateExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extension> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(Extension::name).collect()
    }

    /// Look up by short name (case-insensitive) or dotted OID.
    pub fn get(&self, name: &str) -> Option<&Extension> {
        self.entries
            .iter()
            .find(|e| e.name().eq_ignore_ascii_case(name) || e.oid == name)
    }

    /// Insert `ext`. Fails if the value is not well-formed DER or an
    /// extension with the same name is already present.
    pub fn set(&mut self, ext: Extension) -> Result<(), ExtensionError> {
        let mut reader = Reader::new(&ext.value);
        reader.read_any()?;
        reader.finish()?;
        der::encode_oid(&ext.oid)?;

        if self.get(ext.name()).is_some() {
            return Err(ExtensionError::Duplicate(ext.name().to_string()));
        }
        self.entries.push(ext);
        Ok(())
    }

    /// Remove and return the extension with `name`.
    pub fn delete(&mut self, name: &str) -> Result<Extension, ExtensionError> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.name().eq_ignore_ascii_case(name) || e.oid == name)
            .ok_or_else(|| ExtensionError::NotFound(name.to_string()))?;
        Ok(self.entries.remove(pos))
    }

    /// `Extensions ::= SEQUENCE OF Extension`
    pub fn to_der(&self) -> Result<Vec<u8>, DerError> {
        let mut inner = Vec::new();
        for ext in &self.entries {
            inner.extend_from_slice(&ext.to_der()?);
        }
        Ok(der::tlv(der::TAG_SEQUENCE, &inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_name_type_labels_parse_case_insensitively() {
        for kind in GeneralNameType::ALL {
            assert_eq!(kind.label().to_lowercase().parse::<GeneralNameType>(), Ok(kind));
        }
        assert!("otherName".parse::<GeneralNameType>().is_err());
    }

    #[test]
    fn alt_names_decode_back_to_their_values() {
        let names = vec![
            GeneralName::parse(GeneralNameType::Rfc822Name, "ca@example.com").unwrap(),
            GeneralName::parse(GeneralNameType::DnsName, "ca.example.com").unwrap(),
            GeneralName::parse(GeneralNameType::DirectoryName, "CN=CA,O=Example").unwrap(),
            GeneralName::parse(GeneralNameType::EdiName, "party").unwrap(),
            GeneralName::parse(GeneralNameType::UriName, "https://ca.example.com/").unwrap(),
            GeneralName::parse(GeneralNameType::IpAddress, "10.0.0.1").unwrap(),
            GeneralName::parse(GeneralNameType::IpAddress, "::1").unwrap(),
            GeneralName::parse(GeneralNameType::OidName, "1.2.3.4").unwrap(),
            GeneralName::parse(GeneralNameType::X400Name, "3000").unwrap(),
        ];
        let ext = Extension::subject_alt_name(false, &names).unwrap();
        assert_eq!(ext.name(), SUBJECT_ALT_NAME);
        assert_eq!(ext.general_names().unwrap(), names);
    }

    #[test]
    fn invalid_general_names_rejected() {
        assert!(GeneralName::parse(GeneralNameType::IpAddress, "10.0.0.256").is_err());
        assert!(GeneralName::parse(GeneralNameType::OidName, "abc").is_err());
        assert!(GeneralName::parse(GeneralNameType::DnsName, "").is_err());
        assert!(GeneralName::parse(GeneralNameType::Any, "x").is_err());
        assert!(GeneralName::parse(GeneralNameType::X400Name, "zz").is_err());
        assert!(GeneralName::parse(GeneralNameType::X400Name, "300").is_err());
    }

    #[test]
    fn x400_value_is_lower_hex_of_content() {
        let name = GeneralName::parse(GeneralNameType::X400Name, "30A1").unwrap();
        assert_eq!(name, GeneralName::X400(vec![0x30, 0xA1]));
        assert_eq!(name.value(), "30a1");
    }

    #[test]
    fn non_alt_name_extension_has_no_general_names() {
        let ext = Extension::ocsp_no_check(false);
        assert!(matches!(
            ext.general_names(),
            Err(ExtensionError::NotGeneralNames(_))
        ));
    }

    #[test]
    fn set_refuses_duplicates_and_delete_reports_missing() {
        let mut exts = CertificateExtensions::new();
        exts.set(Extension::ocsp_no_check(false)).unwrap();
        assert_eq!(
            exts.set(Extension::ocsp_no_check(true)),
            Err(ExtensionError::Duplicate(OCSP_NO_CHECK.into()))
        );
        assert!(exts.get("ocspnocheck").is_some());
        assert!(exts.get(OID_OCSP_NO_CHECK).is_some());

        exts.delete(OCSP_NO_CHECK).unwrap();
        assert!(exts.is_empty());
        assert_eq!(
            exts.delete(OCSP_NO_CHECK),
            Err(ExtensionError::NotFound(OCSP_NO_CHECK.into()))
        );
    }

    #[test]
    fn set_rejects_malformed_values() {
        let mut exts = CertificateExtensions::new();
        let err = exts
            .set(Extension::new(OID_KEY_USAGE, true, vec![0x03, 0x05, 0x00]))
            .unwrap_err();
        assert!(matches!(err, ExtensionError::Encoding(DerError::Truncated)));
        assert!(exts.is_empty());
    }

    #[test]
    fn extension_der_omits_default_criticality() {
        let ext = Extension::ocsp_no_check(false).to_der().unwrap();
        assert!(!ext.windows(3).any(|w| w == [der::TAG_BOOLEAN, 0x01, 0xFF]));
        let ext = Extension::ocsp_no_check(true).to_der().unwrap();
        assert!(ext.windows(3).any(|w| w == [der::TAG_BOOLEAN, 0x01, 0xFF]));
    }

    #[test]
    fn unknown_oid_named_by_oid() {
        let ext = Extension::new("1.2.3.4", false, vec![0x05, 0x00]);
        assert_eq!(ext.name(), "1.2.3.4");
        assert_eq!(
            Extension::basic_constraints(true, true, Some(0)).name(),
            BASIC_CONSTRAINTS
        );
    }
}
