//! Policy rules that edit the extension set of a pending certificate.
//!
//! Every rule follows delete-if-present then set, so running a chain again
//! on retry leaves the same extension set.

use std::fmt;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::{ConfigError, ConfigStore};
use crate::extensions::{
    Extension, ExtensionError, GeneralName, GeneralNameType, BASIC_CONSTRAINTS,
};
use crate::request::{Request, RequestError};

pub const PARAM_ENABLE: &str = "enable";
pub const PARAM_CRITICAL: &str = "critical";
pub const PARAM_NUM_GENERAL_NAMES: &str = "numGeneralNames";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyResult {
    Accepted,
    /// Ends the chain; the reason is reported with the request.
    Rejected(String),
}

impl PolicyResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Faults that are not a policy decision and must reach the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("extension update failed: {0}")]
    Extension(#[from] ExtensionError),
}

pub trait PolicyRule: Send + Sync + fmt::Debug {
    /// Instance name from the profile configuration.
    fn name(&self) -> &str;

    /// Configure from the rule's parameter store. Never fails: missing or
    /// invalid input leaves the rule a no-op.
    fn init(&mut self, params: &ConfigStore);

    fn apply(&self, request: &mut Request) -> Result<PolicyResult, PolicyError>;
}

/// Run `rules` in order, stopping at the first rejection.
pub fn apply_rules(
    rules: &[Box<dyn PolicyRule>],
    request: &mut Request,
) -> Result<PolicyResult, PolicyError> {
    for rule in rules {
        let result = rule.apply(request)?;
        debug!(rule = %rule.name(), request_id = %request.id(), ?result, "policy rule applied");
        if !result.is_accepted() {
            return Ok(result);
        }
    }
    Ok(PolicyResult::Accepted)
}

/// What an [`ExtensionRule`] does to each certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionStrategy {
    AddIssuerAltName,
    AddOcspNoCheck,
    RemoveBasicConstraints,
}

#[derive(Debug, Clone)]
enum Mutation {
    Set(Extension),
    Remove(&'static str),
}

/// One rule, parameterized by strategy.
#[derive(Debug, Clone)]
pub struct ExtensionRule {
    name: String,
    strategy: ExtensionStrategy,
    enabled: bool,
    mutation: Option<Mutation>,
}

impl ExtensionRule {
    /// An unconfigured rule; it does nothing until [`PolicyRule::init`].
    pub fn new(name: impl Into<String>, strategy: ExtensionStrategy) -> Self {
        Self {
            name: name.into(),
            strategy,
            enabled: true,
            mutation: None,
        }
    }

    pub fn strategy(&self) -> ExtensionStrategy {
        self.strategy
    }

    /// True when `apply` would change anything.
    pub fn is_active(&self) -> bool {
        self.enabled && self.mutation.is_some()
    }

    fn build(&self, params: &ConfigStore) -> Result<Option<Mutation>, ConfigError> {
        let mutation = match self.strategy {
            ExtensionStrategy::RemoveBasicConstraints => Some(Mutation::Remove(BASIC_CONSTRAINTS)),
            ExtensionStrategy::AddOcspNoCheck => {
                let critical = params.get_boolean_or(PARAM_CRITICAL, false)?;
                Some(Mutation::Set(Extension::ocsp_no_check(critical)))
            }
            ExtensionStrategy::AddIssuerAltName => {
                let critical = params.get_boolean_or(PARAM_CRITICAL, false)?;
                let names = self.configured_names(params)?;
                if names.is_empty() {
                    warn!(rule = %self.name, "no issuer alternative names configured");
                    None
                } else {
                    match Extension::issuer_alt_name(critical, &names) {
                        Ok(ext) => Some(Mutation::Set(ext)),
                        Err(e) => {
                            warn!(rule = %self.name, error = %e, "cannot build issuer alternative name");
                            None
                        }
                    }
                }
            }
        };
        Ok(mutation)
    }

    fn configured_names(&self, params: &ConfigStore) -> Result<Vec<GeneralName>, ConfigError> {
        let count = params.get_integer_or(PARAM_NUM_GENERAL_NAMES, 0)?;
        let mut names = Vec::new();
        for i in 0..count {
            let entry = params.get_sub_store(&format!("generalName{i}"));
            let (Ok(choice), Ok(value)) = (
                entry.get_string("generalNameChoice"),
                entry.get_string("generalNameValue"),
            ) else {
                warn!(rule = %self.name, index = i, "incomplete general name entry skipped");
                continue;
            };
            let parsed = choice
                .parse::<GeneralNameType>()
                .and_then(|kind| GeneralName::parse(kind, value));
            match parsed {
                Ok(name) => names.push(name),
                Err(e) => warn!(rule = %self.name, index = i, error = %e, "general name skipped"),
            }
        }
        Ok(names)
    }

    fn reject(&self, request: &mut Request, reason: String) -> PolicyResult {
        request.set_rejection_reason(reason.clone());
        PolicyResult::Rejected(reason)
    }
}

impl PolicyRule for ExtensionRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, params: &ConfigStore) {
        let built = params
            .get_boolean_or(PARAM_ENABLE, true)
            .and_then(|enabled| {
                self.enabled = enabled;
                self.build(params)
            });
        self.mutation = match built {
            Ok(mutation) => mutation,
            Err(e) => {
                warn!(rule = %self.name, error = %e, "invalid rule configuration, rule disabled");
                None
            }
        };
    }

    fn apply(&self, request: &mut Request) -> Result<PolicyResult, PolicyError> {
        let Some(mutation) = self.mutation.as_ref().filter(|_| self.enabled) else {
            return Ok(PolicyResult::Accepted);
        };

        let infos = request.cert_infos_mut()?;
        if infos.is_empty() {
            let reason = format!("{}: request has no certificate info", self.name);
            error!(rule = %self.name, "request has no certificate info");
            return Ok(self.reject(request, reason));
        }

        let mut encoding_failure = None;
        for info in infos.iter_mut() {
            match mutation {
                Mutation::Remove(name) => {
                    if let Some(exts) = info.extensions_mut() {
                        match exts.delete(name) {
                            Ok(_) | Err(ExtensionError::NotFound(_)) => {}
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
                Mutation::Set(ext) => {
                    let exts = info.extensions_or_create();
                    match exts.delete(ext.name()) {
                        Ok(_) | Err(ExtensionError::NotFound(_)) => {}
                        Err(e) => return Err(e.into()),
                    }
                    match exts.set(ext.clone()) {
                        Ok(()) => {}
                        Err(ExtensionError::Encoding(e)) => {
                            error!(rule = %self.name, extension = %ext.name(), error = %e, "cannot encode extension");
                            encoding_failure = Some(format!("{}: cannot encode {}: {e}", self.name, ext.name()));
                            break;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        match encoding_failure {
            Some(reason) => Ok(self.reject(request, reason)),
            None => Ok(PolicyResult::Accepted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::{CertInfo, CertVersion};
    use crate::extensions::{CertificateExtensions, ISSUER_ALT_NAME, OCSP_NO_CHECK};
    use crate::request::RequestStatus;

    fn rule(strategy: ExtensionStrategy, params: &[(&str, &str)]) -> Box<dyn PolicyRule> {
        let mut rule = ExtensionRule::new(format!("{strategy:?}"), strategy);
        rule.init(&ConfigStore::from_properties(params.iter().copied()));
        Box::new(rule)
    }

    fn ian_params() -> Vec<(&'static str, &'static str)> {
        vec![
            ("critical", "false"),
            ("numGeneralNames", "2"),
            ("generalName0.generalNameChoice", "DNSName"),
            ("generalName0.generalNameValue", "ca.example.com"),
            ("generalName1.generalNameChoice", "rfc822name"),
            ("generalName1.generalNameValue", "pki@example.com"),
        ]
    }

    fn request_with_basic_constraints() -> Request {
        let mut info = CertInfo::new("CN=leaf", "CN=ca");
        let mut exts = CertificateExtensions::new();
        exts.set(Extension::basic_constraints(true, true, None)).unwrap();
        info.set_extensions(exts);
        let mut req = Request::new("10");
        req.add_cert_info(info).unwrap();
        req
    }

    fn extensions(req: &Request) -> CertificateExtensions {
        req.cert_infos()[0].extensions().cloned().unwrap_or_default()
    }

    #[test]
    fn rule_chain_is_idempotent_under_retry() {
        let rules = vec![
            rule(ExtensionStrategy::AddIssuerAltName, &ian_params()),
            rule(ExtensionStrategy::RemoveBasicConstraints, &[]),
        ];

        let mut once = request_with_basic_constraints();
        assert_eq!(apply_rules(&rules, &mut once), Ok(PolicyResult::Accepted));

        let mut twice = request_with_basic_constraints();
        apply_rules(&rules, &mut twice).unwrap();
        apply_rules(&rules, &mut twice).unwrap();

        assert_eq!(extensions(&once), extensions(&twice));
        assert_eq!(extensions(&once).names(), vec![ISSUER_ALT_NAME]);
        let ian = extensions(&once).get(ISSUER_ALT_NAME).cloned().unwrap();
        assert!(!ian.is_critical());
        assert_eq!(ian.general_names().unwrap().len(), 2);
    }

    #[test]
    fn ocsp_no_check_on_bare_cert_info_bumps_version() {
        let mut req = Request::new("11");
        req.add_cert_info(CertInfo::new("CN=ocsp", "CN=ca")).unwrap();
        let rule = rule(ExtensionStrategy::AddOcspNoCheck, &[("critical", "true")]);

        assert_eq!(rule.apply(&mut req), Ok(PolicyResult::Accepted));
        assert_eq!(rule.apply(&mut req), Ok(PolicyResult::Accepted));

        let info = &req.cert_infos()[0];
        assert_eq!(info.version, CertVersion::V3);
        let exts = info.extensions().unwrap();
        assert_eq!(exts.len(), 1);
        let ext = exts.get(OCSP_NO_CHECK).unwrap();
        assert!(ext.is_critical());
    }

    #[test]
    fn remove_is_pure_deletion() {
        let mut req = Request::new("12");
        req.add_cert_info(CertInfo::new("CN=leaf", "CN=ca")).unwrap();
        let rule = rule(ExtensionStrategy::RemoveBasicConstraints, &[]);

        assert_eq!(rule.apply(&mut req), Ok(PolicyResult::Accepted));
        assert_eq!(req.cert_infos()[0].version, CertVersion::V1);
        assert!(req.cert_infos()[0].extensions().is_none());
    }

    #[test]
    fn unconfigured_or_disabled_rules_are_noops() {
        let mut req = Request::new("13");
        req.add_cert_info(CertInfo::new("CN=leaf", "CN=ca")).unwrap();

        let uninitialized = ExtensionRule::new("raw", ExtensionStrategy::AddOcspNoCheck);
        assert!(!uninitialized.is_active());

        let no_names = rule(ExtensionStrategy::AddIssuerAltName, &[("critical", "true")]);
        let disabled = rule(ExtensionStrategy::AddOcspNoCheck, &[("enable", "false")]);
        let invalid = rule(ExtensionStrategy::AddOcspNoCheck, &[("critical", "maybe")]);
        let bad_names = rule(
            ExtensionStrategy::AddIssuerAltName,
            &[
                ("numGeneralNames", "2"),
                ("generalName0.generalNameChoice", "IPAddress"),
                ("generalName0.generalNameValue", "not-an-ip"),
                ("generalName1.generalNameChoice", "otherName"),
                ("generalName1.generalNameValue", "x"),
            ],
        );

        for r in [&no_names, &disabled, &invalid, &bad_names] {
            assert_eq!(r.apply(&mut req), Ok(PolicyResult::Accepted));
        }
        assert!(uninitialized.apply(&mut req).unwrap().is_accepted());
        assert!(req.cert_infos()[0].extensions().is_none());
    }

    #[test]
    fn missing_cert_info_rejects_with_reason() {
        let mut req = Request::new("14");
        let rules = vec![
            rule(ExtensionStrategy::AddOcspNoCheck, &[]),
            rule(ExtensionStrategy::RemoveBasicConstraints, &[]),
        ];
        let result = apply_rules(&rules, &mut req).unwrap();
        assert!(matches!(result, PolicyResult::Rejected(ref r) if r.contains("no certificate info")));
        assert!(req.rejection_reason().is_some());
    }

    #[test]
    fn complete_request_is_a_fault_not_a_rejection() {
        let mut req = request_with_basic_constraints();
        req.set_status(RequestStatus::Complete);
        let rule = rule(ExtensionStrategy::RemoveBasicConstraints, &[]);
        assert!(matches!(
            rule.apply(&mut req),
            Err(PolicyError::Request(RequestError::Immutable(_)))
        ));
    }
}
