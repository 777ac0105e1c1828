//! DN templates built from attribute-value patterns, e.g.
//! `UID=$req.auth_token.uid + CN=$subj.cn, OU=people, O=$subj.o`.

use std::fmt;

use crate::extensions::CertificateExtensions;
use crate::name::escape;
use crate::pattern::{AvaPattern, PatternError, PatternKind};
use crate::request::Request;

/// One AVA of a template: attribute type and value pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvaTemplate {
    pub attr_type: String,
    pub pattern: AvaPattern,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnPattern {
    rdns: Vec<Vec<AvaTemplate>>,
}

impl DnPattern {
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        let syntax = |reason: &str| PatternError::Syntax {
            pattern: text.to_string(),
            reason: reason.to_string(),
        };
        if text.trim().is_empty() {
            return Err(syntax("empty DN pattern"));
        }

        let mut chars = text.chars().peekable();
        let mut rdns = Vec::new();
        let mut current = Vec::new();
        loop {
            let mut attr_type = String::new();
            loop {
                match chars.next() {
                    Some('=') => break,
                    Some(',') | Some('+') | None => return Err(syntax("missing '='")),
                    Some(c) => attr_type.push(c),
                }
            }
            let attr_type = attr_type.trim();
            if attr_type.is_empty() {
                return Err(syntax("empty attribute type"));
            }

            let pattern = AvaPattern::parse_from(&mut chars)?;
            current.push(AvaTemplate {
                attr_type: attr_type.to_string(),
                pattern,
            });

            match chars.next() {
                Some('+') => {}
                Some(',') => rdns.push(std::mem::take(&mut current)),
                _ => {
                    rdns.push(current);
                    break;
                }
            }
        }
        Ok(Self { rdns })
    }

    pub fn rdns(&self) -> &[Vec<AvaTemplate>] {
        &self.rdns
    }

    /// Build the DN for one request.
    ///
    /// AVAs whose subject or extension value is absent are left out and
    /// RDNs left empty are dropped. `None` when nothing produced a value.
    /// Evaluated values are escaped; constant text is taken as written.
    pub fn format(
        &self,
        request: &Request,
        subject_dn: &str,
        extensions: Option<&CertificateExtensions>,
    ) -> Result<Option<String>, PatternError> {
        let mut rdns = Vec::with_capacity(self.rdns.len());
        for rdn in &self.rdns {
            let mut avas = Vec::with_capacity(rdn.len());
            for ava in rdn {
                let Some(value) = ava.pattern.evaluate(request, subject_dn, extensions)? else {
                    continue;
                };
                let value = match ava.pattern.kind() {
                    PatternKind::Constant => value,
                    _ => escape(&value),
                };
                avas.push(format!("{}={}", ava.attr_type, value));
            }
            if !avas.is_empty() {
                rdns.push(avas.join("+"));
            }
        }
        if rdns.is_empty() {
            return Ok(None);
        }
        Ok(Some(rdns.join(",")))
    }
}

impl fmt::Display for DnPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            for (j, ava) in rdn.iter().enumerate() {
                if j > 0 {
                    f.write_str("+")?;
                }
                write!(f, "{}={}", ava.attr_type, ava.pattern)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::{Extension, GeneralName, GeneralNameType};
    use crate::name::encode_name;

    #[test]
    fn parses_multi_valued_rdns() {
        let dn = DnPattern::parse("UID=$req.auth_token.uid + CN=$subj.cn, OU=people, O=$subj.o")
            .unwrap();
        assert_eq!(dn.rdns().len(), 3);
        assert_eq!(dn.rdns()[0].len(), 2);
        assert_eq!(dn.rdns()[0][1].attr_type, "CN");
        assert_eq!(dn.rdns()[1][0].pattern.kind(), PatternKind::Constant);
        assert_eq!(
            dn.to_string(),
            "UID=$req.auth_token.uid+CN=$subj.cn,OU=people,O=$subj.o"
        );
    }

    #[test]
    fn format_skips_absent_values() {
        let mut req = Request::new("1");
        req.set_ext_data_prefixed("auth_token", "uid", "jdoe").unwrap();
        let dn = DnPattern::parse("UID=$req.auth_token.uid+CN=$subj.cn,OU=$subj.ou,O=Example")
            .unwrap();

        let out = dn.format(&req, "CN=John Doe,O=Whatever", None).unwrap();
        assert_eq!(out.as_deref(), Some("UID=jdoe+CN=John Doe,O=Example"));
    }

    #[test]
    fn evaluated_values_are_escaped() {
        let mut req = Request::new("1");
        req.set_ext_data("cn", "Doe, John+admin").unwrap();
        let dn = DnPattern::parse("CN=$req.cn,O=Example").unwrap();
        let out = dn.format(&req, "", None).unwrap().unwrap();
        assert_eq!(out, "CN=Doe\\, John\\+admin,O=Example");
        assert!(encode_name(&out).is_ok());

        let names = [GeneralName::parse(GeneralNameType::Rfc822Name, "a=b@example.com").unwrap()];
        let mut exts = CertificateExtensions::new();
        exts.set(Extension::subject_alt_name(false, &names).unwrap()).unwrap();
        let dn = DnPattern::parse("MAIL=$ext.SubjectAlternativeName,O=Acme\\, Inc").unwrap();
        assert_eq!(
            dn.format(&req, "", Some(&exts)).unwrap().as_deref(),
            Some("MAIL=a\\=b@example.com,O=Acme\\, Inc")
        );
    }

    #[test]
    fn format_aborts_on_missing_request_attribute() {
        let req = Request::new("1");
        let dn = DnPattern::parse("UID=$req.uid,O=Example").unwrap();
        assert_eq!(
            dn.format(&req, "", None),
            Err(PatternError::MissingRequiredAttribute("uid".into()))
        );
    }

    #[test]
    fn format_with_no_values_is_none() {
        let req = Request::new("1");
        let dn = DnPattern::parse("CN=$subj.cn").unwrap();
        assert_eq!(dn.format(&req, "O=x", None), Ok(None));
    }

    #[test]
    fn malformed_templates_rejected() {
        for text in ["", "CN", "=x", "CN=a,OU", "CN=$subj", "CN=a+"] {
            assert!(DnPattern::parse(text).is_err(), "{text:?}");
        }
    }
}
