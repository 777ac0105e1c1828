//! Distinguished-name strings to and from DER `Name` structures.
//!
//! Used for `directoryName` general names. String form is the LDAP order
//! (most specific RDN first); DER order is the reverse.

use crate::der::{self, DerError, Reader};

/// Attribute type short names and their OIDs.
const ATTRIBUTE_TYPES: &[(&str, &str)] = &[
    ("CN", "2.5.4.3"),
    ("SERIALNUMBER", "2.5.4.5"),
    ("C", "2.5.4.6"),
    ("L", "2.5.4.7"),
    ("ST", "2.5.4.8"),
    ("STREET", "2.5.4.9"),
    ("O", "2.5.4.10"),
    ("OU", "2.5.4.11"),
    ("TITLE", "2.5.4.12"),
    ("UID", "0.9.2342.19200300.100.1.1"),
    ("DC", "0.9.2342.19200300.100.1.25"),
    ("E", "1.2.840.113549.1.9.1"),
];

fn oid_for(attr: &str) -> Result<String, DerError> {
    let upper = attr.to_ascii_uppercase();
    let upper = if upper == "EMAIL" { "E".to_string() } else { upper };
    if let Some((_, oid)) = ATTRIBUTE_TYPES.iter().find(|(n, _)| *n == upper) {
        return Ok((*oid).to_string());
    }
    // Dotted OIDs are accepted as attribute types.
    der::encode_oid(attr)?;
    Ok(attr.to_string())
}

fn short_name_for(oid: &str) -> String {
    ATTRIBUTE_TYPES
        .iter()
        .find(|(_, o)| *o == oid)
        .map(|(n, _)| (*n).to_string())
        .unwrap_or_else(|| oid.to_string())
}

fn value_tag_for(oid: &str) -> u8 {
    match oid {
        "2.5.4.6" => der::TAG_PRINTABLE_STRING,
        "1.2.840.113549.1.9.1" | "0.9.2342.19200300.100.1.25" => der::TAG_IA5_STRING,
        _ => der::TAG_UTF8_STRING,
    }
}

/// Split on `sep` where it is not preceded by a backslash escape.
fn split_unescaped(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Backslash-escape `,` `+` `=` and `\` in an attribute value.
pub(crate) fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, ',' | '+' | '=' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Encode a DN string such as `CN=server,O=Example` as a DER `Name`.
pub fn encode_name(dn: &str) -> Result<Vec<u8>, DerError> {
    let mut rdns = Vec::new();
    if !dn.trim().is_empty() {
        for rdn in split_unescaped(dn, ',') {
            let mut set = Vec::new();
            for ava in split_unescaped(&rdn, '+') {
                let (attr, value) = ava
                    .split_once('=')
                    .ok_or_else(|| DerError::InvalidString(format!("missing '=' in {ava:?}")))?;
                let attr = attr.trim();
                if attr.is_empty() {
                    return Err(DerError::InvalidString(format!("empty attribute in {ava:?}")));
                }
                let oid = oid_for(attr)?;
                let value = unescape(value.trim());
                let tag = value_tag_for(&oid);
                if tag != der::TAG_UTF8_STRING && !value.is_ascii() {
                    return Err(DerError::InvalidString(value));
                }

                let mut inner = Vec::new();
                der::write_tlv(&mut inner, der::TAG_OID, &der::encode_oid(&oid)?);
                der::write_tlv(&mut inner, tag, value.as_bytes());
                der::write_tlv(&mut set, der::TAG_SEQUENCE, &inner);
            }
            rdns.push(der::tlv(der::TAG_SET, &set));
        }
    }
    rdns.reverse();
    Ok(der::tlv(der::TAG_SEQUENCE, &rdns.concat()))
}

/// Decode the content octets of a DER `Name` SEQUENCE into a DN string.
pub fn decode_name(content: &[u8]) -> Result<String, DerError> {
    let mut rdns = Vec::new();
    let mut reader = Reader::new(content);
    while !reader.is_empty() {
        let set = reader.read_expected(der::TAG_SET)?;
        let mut avas = Vec::new();
        let mut set_reader = Reader::new(set);
        while !set_reader.is_empty() {
            let seq = set_reader.read_expected(der::TAG_SEQUENCE)?;
            let mut fields = Reader::new(seq);
            let oid = der::decode_oid(fields.read_expected(der::TAG_OID)?)?;
            let value = fields.read_any()?;
            fields.finish()?;
            let text = std::str::from_utf8(value.value)
                .map_err(|e| DerError::InvalidString(e.to_string()))?;
            avas.push(format!("{}={}", short_name_for(&oid), escape(text)));
        }
        rdns.push(avas.join("+"));
    }
    rdns.reverse();
    Ok(rdns.join(","))
}
