//! Attribute-value patterns for directory publishing.
//!
//! ```text
//! pattern := "$subj." attr ("." index)?
//!          | "$req."  (prefix ".")? attr ("." index)?
//!          | "$ext."  extName ("." gnType)? ("." index)?
//!          | constant-text
//! ```
//!
//! The index is a one-based ordinal over all matches (`.2` is the second
//! match); `.0` is rejected. A pattern value ends at the first unescaped `,` or `+`, which is
//! left in the stream for the caller reassembling the RDN.

use std::fmt;
use std::iter::Peekable;

use thiserror::Error;
use tracing::{debug, warn};

use crate::extensions::{CertificateExtensions, GeneralNameType, SUBJECT_ALT_NAME};
use crate::request::Request;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("syntax error in attribute pattern {pattern:?}: {reason}")]
    Syntax { pattern: String, reason: String },
    #[error("request attribute {0} is required but missing")]
    MissingRequiredAttribute(String),
}

fn syntax(pattern: &str, reason: impl Into<String>) -> PatternError {
    PatternError::Syntax {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Constant,
    Subject,
    Request,
    Extension,
}

/// One parsed AVA value pattern. Immutable after parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvaPattern {
    kind: PatternKind,
    /// Literal text for constants, otherwise the attribute or extension name.
    value: String,
    index: Option<u32>,
    gn_type: Option<GeneralNameType>,
    prefix: Option<String>,
}

fn is_delimiter(c: char) -> bool {
    c == ',' || c == '+'
}

fn parse_index(segment: &str) -> Option<u32> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

impl AvaPattern {
    /// Parse a complete pattern string. A trailing unescaped delimiter is a
    /// syntax error here; use [`AvaPattern::parse_from`] inside a DN.
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        let mut chars = text.chars().peekable();
        let pattern = Self::parse_from(&mut chars)?;
        if let Some(c) = chars.peek() {
            return Err(syntax(text, format!("unexpected {c:?} after value")));
        }
        Ok(pattern)
    }

    /// Parse one AVA value from `chars`, stopping before the first unescaped
    /// `,` or `+`.
    pub fn parse_from<I>(chars: &mut Peekable<I>) -> Result<Self, PatternError>
    where
        I: Iterator<Item = char>,
    {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        if chars.peek() != Some(&'$') {
            return Ok(Self::constant(read_constant(chars)));
        }
        chars.next();

        let mut raw = String::from("$");
        let mut segments: Vec<String> = vec![String::new()];
        while let Some(&c) = chars.peek() {
            if is_delimiter(c) {
                break;
            }
            chars.next();
            raw.push(c);
            if c == '.' {
                segments.push(String::new());
            } else if let Some(last) = segments.last_mut() {
                last.push(c);
            }
        }
        for segment in &mut segments {
            *segment = segment.trim().to_string();
        }

        let keyword = segments.remove(0);
        match keyword.as_str() {
            "subj" => Self::subject(&raw, segments),
            "req" => Self::request(&raw, segments),
            "ext" => Self::extension(&raw, segments),
            other => Err(syntax(&raw, format!("unknown keyword {other:?}"))),
        }
    }

    fn constant(text: String) -> Self {
        Self {
            kind: PatternKind::Constant,
            value: text,
            index: None,
            gn_type: None,
            prefix: None,
        }
    }

    fn subject(raw: &str, segments: Vec<String>) -> Result<Self, PatternError> {
        let (attr, index) = match segments.as_slice() {
            [attr] => (attr, None),
            [attr, index] => (attr, Some(required_index(raw, index)?)),
            [] => return Err(syntax(raw, "missing attribute name")),
            _ => return Err(syntax(raw, "too many segments")),
        };
        Ok(Self {
            kind: PatternKind::Subject,
            value: non_empty(raw, attr, "attribute name")?,
            index,
            gn_type: None,
            prefix: None,
        })
    }

    fn request(raw: &str, segments: Vec<String>) -> Result<Self, PatternError> {
        let (prefix, attr, index) = match segments.as_slice() {
            [attr] => (None, attr, None),
            [first, second] => {
                if second.is_empty() {
                    return Err(syntax(raw, "empty index"));
                }
                match parse_index(second) {
                    Some(0) => return Err(zero_index(raw)),
                    Some(index) => (None, first, Some(index)),
                    None => (Some(first), second, None),
                }
            }
            [prefix, attr, index] => (Some(prefix), attr, Some(required_index(raw, index)?)),
            [] => return Err(syntax(raw, "missing attribute name")),
            _ => return Err(syntax(raw, "too many segments")),
        };
        let prefix = prefix
            .map(|p| non_empty(raw, p, "attribute prefix"))
            .transpose()?;
        Ok(Self {
            kind: PatternKind::Request,
            value: non_empty(raw, attr, "attribute name")?,
            index,
            gn_type: None,
            prefix,
        })
    }

    fn extension(raw: &str, segments: Vec<String>) -> Result<Self, PatternError> {
        let (name, gn_type, index) = match segments.as_slice() {
            [name] => (name, None, None),
            [name, second] => {
                if second.is_empty() {
                    return Err(syntax(raw, "empty index"));
                }
                match parse_index(second) {
                    Some(0) => return Err(zero_index(raw)),
                    Some(index) => (name, None, Some(index)),
                    None => (name, Some(general_name_type(raw, second)?), None),
                }
            }
            [name, gn_type, index] => (
                name,
                Some(general_name_type(raw, gn_type)?),
                Some(required_index(raw, index)?),
            ),
            [] => return Err(syntax(raw, "missing extension name")),
            _ => return Err(syntax(raw, "too many segments")),
        };
        Ok(Self {
            kind: PatternKind::Extension,
            value: non_empty(raw, name, "extension name")?,
            index,
            gn_type,
            prefix: None,
        })
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Constant text, or the attribute/extension name.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The one-based index as written in the pattern; never zero.
    pub fn index(&self) -> Option<u32> {
        self.index
    }

    pub fn general_name_type(&self) -> Option<GeneralNameType> {
        self.gn_type
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Zero-based position among matches selected by the index.
    fn occurrence(&self) -> usize {
        self.index.map_or(0, |i| i.saturating_sub(1) as usize)
    }

    /// Evaluate against one request.
    ///
    /// `Ok(None)` means the subject or extension had no matching value and
    /// the caller should skip the AVA. A missing request attribute is an
    /// error.
    pub fn evaluate(
        &self,
        request: &Request,
        subject_dn: &str,
        extensions: Option<&CertificateExtensions>,
    ) -> Result<Option<String>, PatternError> {
        match self.kind {
            PatternKind::Constant => Ok(Some(self.value.clone())),
            PatternKind::Subject => Ok(self.subject_value(subject_dn)),
            PatternKind::Extension => Ok(self.extension_value(extensions)),
            PatternKind::Request => {
                let found = match &self.prefix {
                    Some(prefix) => request.ext_data_prefixed(prefix, &self.value),
                    None => request.ext_data(&self.value),
                };
                found
                    .map(|v| Some(v.to_string()))
                    .ok_or_else(|| PatternError::MissingRequiredAttribute(self.request_key()))
            }
        }
    }

    fn request_key(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}.{}", self.value),
            None => self.value.clone(),
        }
    }

    // RDN and AVA splitting is naive: escaped '+', ',' and '=' in values are
    // not honored.
    fn subject_value(&self, subject_dn: &str) -> Option<String> {
        subject_dn
            .split(',')
            .flat_map(|rdn| rdn.split('+'))
            .filter_map(|ava| ava.split_once('='))
            .filter(|(name, _)| name.trim().eq_ignore_ascii_case(&self.value))
            .nth(self.occurrence())
            .map(|(_, value)| value.trim().to_string())
    }

    fn extension_value(&self, extensions: Option<&CertificateExtensions>) -> Option<String> {
        let ext = extensions?.get(&self.value)?;
        if ext.name() != SUBJECT_ALT_NAME {
            debug!(extension = %ext.name(), "attribute pattern: extension not supported");
            return None;
        }
        let names = match ext.general_names() {
            Ok(names) => names,
            Err(e) => {
                warn!(extension = %ext.name(), error = %e, "attribute pattern: cannot decode extension");
                return None;
            }
        };
        let filter = self.gn_type.unwrap_or(GeneralNameType::Any);
        names
            .iter()
            .filter(|name| filter.accepts(name.kind()))
            .nth(self.occurrence())
            .map(|name| name.value())
    }
}

impl fmt::Display for AvaPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PatternKind::Constant => return f.write_str(&self.value),
            PatternKind::Subject => write!(f, "$subj.{}", self.value)?,
            PatternKind::Request => {
                f.write_str("$req.")?;
                if let Some(prefix) = &self.prefix {
                    write!(f, "{prefix}.")?;
                }
                f.write_str(&self.value)?;
            }
            PatternKind::Extension => {
                write!(f, "$ext.{}", self.value)?;
                if let Some(gn_type) = self.gn_type {
                    write!(f, ".{gn_type}")?;
                }
            }
        }
        if let Some(index) = self.index {
            write!(f, ".{index}")?;
        }
        Ok(())
    }
}

fn read_constant<I>(chars: &mut Peekable<I>) -> String
where
    I: Iterator<Item = char>,
{
    let mut text = String::new();
    while let Some(&c) = chars.peek() {
        if is_delimiter(c) {
            break;
        }
        chars.next();
        text.push(c);
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                text.push(escaped);
            }
        }
    }
    let trimmed = text.trim_end();
    // keep an escaped trailing space
    if trimmed.ends_with('\\') && trimmed.len() < text.len() {
        text.truncate(trimmed.len() + 1);
    } else {
        text.truncate(trimmed.len());
    }
    text
}

fn non_empty(raw: &str, segment: &str, what: &str) -> Result<String, PatternError> {
    if segment.is_empty() {
        return Err(syntax(raw, format!("empty {what}")));
    }
    Ok(segment.to_string())
}

fn required_index(raw: &str, segment: &str) -> Result<u32, PatternError> {
    if segment.is_empty() {
        return Err(syntax(raw, "empty index"));
    }
    match parse_index(segment) {
        Some(0) => Err(zero_index(raw)),
        Some(index) => Ok(index),
        None => Err(syntax(raw, format!("invalid index {segment:?}"))),
    }
}

fn zero_index(raw: &str) -> PatternError {
    syntax(raw, "index is one-based")
}

fn general_name_type(raw: &str, segment: &str) -> Result<GeneralNameType, PatternError> {
    segment
        .parse()
        .map_err(|_| syntax(raw, format!("unknown general name type {segment:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::{Extension, GeneralName};

    fn san(names: &[(GeneralNameType, &str)]) -> CertificateExtensions {
        let names: Vec<_> = names
            .iter()
            .map(|(kind, value)| GeneralName::parse(*kind, value).unwrap())
            .collect();
        let mut exts = CertificateExtensions::new();
        exts.set(Extension::subject_alt_name(false, &names).unwrap())
            .unwrap();
        exts
    }

    #[test]
    fn parse_and_describe_reproduces_each_kind() {
        let cases = [
            ("Example Corp", PatternKind::Constant, "Example Corp", None, None, None),
            ("$subj.cn", PatternKind::Subject, "cn", None, None, None),
            ("$subj.CN.2", PatternKind::Subject, "CN", Some(2), None, None),
            ("$req.screenName", PatternKind::Request, "screenName", None, None, None),
            ("$req.uid.3", PatternKind::Request, "uid", Some(3), None, None),
            (
                "$req.auth_token.uid",
                PatternKind::Request,
                "uid",
                None,
                None,
                Some("auth_token"),
            ),
            (
                "$req.auth_token.uid.1",
                PatternKind::Request,
                "uid",
                Some(1),
                None,
                Some("auth_token"),
            ),
            ("$ext.SubjectAlternativeName", PatternKind::Extension, "SubjectAlternativeName", None, None, None),
            ("$ext.SubjectAlternativeName.2", PatternKind::Extension, "SubjectAlternativeName", Some(2), None, None),
            (
                "$ext.SubjectAlternativeName.RFC822Name",
                PatternKind::Extension,
                "SubjectAlternativeName",
                None,
                Some(GeneralNameType::Rfc822Name),
                None,
            ),
            (
                "$ext.SubjectAlternativeName.DNSName.2",
                PatternKind::Extension,
                "SubjectAlternativeName",
                Some(2),
                Some(GeneralNameType::DnsName),
                None,
            ),
        ];
        for (text, kind, value, index, gn_type, prefix) in cases {
            let pattern = AvaPattern::parse(text).unwrap();
            assert_eq!(pattern.kind(), kind, "{text}");
            assert_eq!(pattern.value(), value, "{text}");
            assert_eq!(pattern.index(), index, "{text}");
            assert_eq!(pattern.general_name_type(), gn_type, "{text}");
            assert_eq!(pattern.prefix(), prefix, "{text}");
            assert_eq!(pattern.to_string(), text);
        }
    }

    #[test]
    fn general_name_type_is_canonicalized_when_described() {
        let pattern = AvaPattern::parse("$ext.SubjectAlternativeName.dnsname").unwrap();
        assert_eq!(pattern.to_string(), "$ext.SubjectAlternativeName.DNSName");
    }

    #[test]
    fn syntax_errors() {
        for text in [
            "$subject.cn",
            "$foo",
            "$subj",
            "$subj.",
            "$subj.cn.",
            "$subj.cn.x",
            "$req.",
            "$req.a.",
            "$req.a.b.",
            "$req.a.b.c",
            "$ext.",
            "$ext.SubjectAlternativeName.",
            "$ext.SubjectAlternativeName.bogusName",
            "$ext.SubjectAlternativeName.DNSName.",
            "$subj.cn.1.2",
            "$subj.cn.0",
            "$req.uid.0",
            "$req.auth_token.uid.0",
            "$ext.SubjectAlternativeName.0",
            "$ext.SubjectAlternativeName.DNSName.0",
        ] {
            assert!(
                matches!(AvaPattern::parse(text), Err(PatternError::Syntax { .. })),
                "{text} should not parse"
            );
        }
    }

    #[test]
    fn parse_from_stops_at_unescaped_delimiters() {
        let mut chars = "$subj.cn + $req.uid, O=x".chars().peekable();
        let first = AvaPattern::parse_from(&mut chars).unwrap();
        assert_eq!(first.to_string(), "$subj.cn");
        assert_eq!(chars.next(), Some('+'));

        let second = AvaPattern::parse_from(&mut chars).unwrap();
        assert_eq!(second.to_string(), "$req.uid");
        assert_eq!(chars.next(), Some(','));

        let mut chars = "Acme\\, Inc ,rest".chars().peekable();
        let constant = AvaPattern::parse_from(&mut chars).unwrap();
        assert_eq!(constant.value(), "Acme\\, Inc");
        assert_eq!(chars.next(), Some(','));
    }

    #[test]
    fn full_parse_rejects_trailing_delimiter() {
        assert!(AvaPattern::parse("$subj.cn,").is_err());
    }

    #[test]
    fn subject_occurrence_is_one_based() {
        let req = Request::new("1");
        let dn = "CN=a,CN=b,CN=c";
        let value = |text: &str| AvaPattern::parse(text).unwrap().evaluate(&req, dn, None);

        assert_eq!(value("$subj.CN.2"), Ok(Some("b".into())));
        assert_eq!(value("$subj.cn"), Ok(Some("a".into())));
        assert_eq!(value("$subj.cn.1"), Ok(Some("a".into())));
        assert_eq!(value("$subj.cn.3"), Ok(Some("c".into())));
        assert_eq!(value("$subj.cn.4"), Ok(None));
        assert_eq!(value("$subj.ou"), Ok(None));
    }

    #[test]
    fn subject_matches_across_multi_valued_rdns() {
        let req = Request::new("1");
        let pattern = AvaPattern::parse("$subj.uid.2").unwrap();
        let dn = "UID=first+CN=x, UID = second, O=org";
        assert_eq!(pattern.evaluate(&req, dn, None), Ok(Some("second".into())));
    }

    #[test]
    fn request_attribute_lookup() {
        let mut req = Request::new("1");
        req.set_ext_data("screenName", "alice").unwrap();
        req.set_ext_data_prefixed("auth_token", "uid", "a1").unwrap();

        let screen = AvaPattern::parse("$req.screenName").unwrap();
        assert_eq!(screen.evaluate(&req, "", None), Ok(Some("alice".into())));

        let token = AvaPattern::parse("$req.AUTH_TOKEN.UID").unwrap();
        assert_eq!(token.evaluate(&req, "", None), Ok(Some("a1".into())));

        let missing = AvaPattern::parse("$req.auth_token.mail").unwrap();
        assert_eq!(
            missing.evaluate(&req, "", None),
            Err(PatternError::MissingRequiredAttribute("auth_token.mail".into()))
        );

        let empty = Request::new("2");
        assert!(matches!(
            screen.evaluate(&empty, "", None),
            Err(PatternError::MissingRequiredAttribute(_))
        ));
    }

    #[test]
    fn extension_values_filtered_by_type() {
        let req = Request::new("1");
        let exts = san(&[
            (GeneralNameType::DnsName, "a.example.com"),
            (GeneralNameType::Rfc822Name, "ops@example.com"),
            (GeneralNameType::DnsName, "b.example.com"),
        ]);
        let value = |text: &str| {
            AvaPattern::parse(text)
                .unwrap()
                .evaluate(&req, "", Some(&exts))
        };

        assert_eq!(value("$ext.SubjectAlternativeName"), Ok(Some("a.example.com".into())));
        assert_eq!(value("$ext.subjectalternativename.2"), Ok(Some("ops@example.com".into())));
        assert_eq!(value("$ext.SubjectAlternativeName.DNSName.2"), Ok(Some("b.example.com".into())));
        assert_eq!(value("$ext.SubjectAlternativeName.RFC822Name"), Ok(Some("ops@example.com".into())));
        assert_eq!(value("$ext.SubjectAlternativeName.URIName"), Ok(None));
        assert_eq!(value("$ext.IssuerAlternativeName"), Ok(None));
    }

    #[test]
    fn unsupported_or_undecodable_extensions_are_absent() {
        let req = Request::new("1");
        let mut exts = CertificateExtensions::new();
        exts.set(Extension::ocsp_no_check(false)).unwrap();
        let pattern = AvaPattern::parse("$ext.OCSPNoCheck").unwrap();
        assert_eq!(pattern.evaluate(&req, "", Some(&exts)), Ok(None));

        // a SAN whose content is not GeneralNames
        let mut broken = CertificateExtensions::new();
        broken
            .set(Extension::new(
                crate::extensions::OID_SUBJECT_ALT_NAME,
                false,
                vec![0x04, 0x01, 0x00],
            ))
            .unwrap();
        let pattern = AvaPattern::parse("$ext.SubjectAlternativeName").unwrap();
        assert_eq!(pattern.evaluate(&req, "", Some(&broken)), Ok(None));
        assert_eq!(pattern.evaluate(&req, "", None), Ok(None));
    }

    #[test]
    fn constants_evaluate_to_themselves() {
        let pattern = AvaPattern::parse("  people ").unwrap();
        assert_eq!(pattern.value(), "people");
        assert_eq!(
            pattern.evaluate(&Request::new("1"), "", None),
            Ok(Some("people".into()))
        );
    }
}
