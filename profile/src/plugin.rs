//! Class-id registry and the context handed to constructors.
//!
//! Profiles, policy rules and outputs are selected in configuration by a
//! short class id. The registry maps each id to a constructor at compile
//! time; nothing is loaded at runtime.

use std::collections::BTreeMap;
use std::sync::Arc;

use ca_issuance::config::ConfigStore;
use ca_issuance::policy::{ExtensionRule, ExtensionStrategy, PolicyRule};

use crate::chain::CaChainProvider;
use crate::error::{PluginKind, ProfileError};
use crate::output::{CertOutput, CmmfOutput, Framing, OutputRenderer, Pkcs7Output, PrettyPrintOutput};
use crate::profile::Profile;

pub const PROFILE_CA_ENROLL: &str = "caEnrollImpl";
pub const RULE_ISSUER_ALT_NAME: &str = "IssuerAltNameExt";
pub const RULE_OCSP_NO_CHECK: &str = "OCSPNoCheckExt";
pub const RULE_REMOVE_BASIC_CONSTRAINTS: &str = "RemoveBasicConstraintsExt";
pub const OUTPUT_PRETTY_PRINT: &str = "prettyPrintCertOutputImpl";
pub const OUTPUT_CERT_PEM: &str = "certOutputImpl";
pub const OUTPUT_CERT_SINGLE_LINE: &str = "nsNKeyCertOutputImpl";
pub const OUTPUT_PKCS7: &str = "pkcs7OutputImpl";
pub const OUTPUT_CMMF: &str = "cmmfOutputImpl";

/// Builds a profile from its id, class id and configuration.
pub type ProfileConstructor =
    fn(&str, &str, ConfigStore, &PluginContext) -> Result<Profile, ProfileError>;
/// Builds an unconfigured rule with the given instance name.
pub type RuleConstructor = fn(&str) -> Box<dyn PolicyRule>;
pub type OutputConstructor = fn(Arc<dyn CaChainProvider>) -> Box<dyn OutputRenderer>;

fn issuer_alt_name(name: &str) -> Box<dyn PolicyRule> {
    Box::new(ExtensionRule::new(name, ExtensionStrategy::AddIssuerAltName))
}

fn ocsp_no_check(name: &str) -> Box<dyn PolicyRule> {
    Box::new(ExtensionRule::new(name, ExtensionStrategy::AddOcspNoCheck))
}

fn remove_basic_constraints(name: &str) -> Box<dyn PolicyRule> {
    Box::new(ExtensionRule::new(name, ExtensionStrategy::RemoveBasicConstraints))
}

fn pretty_print(_: Arc<dyn CaChainProvider>) -> Box<dyn OutputRenderer> {
    Box::new(PrettyPrintOutput::new())
}

fn cert_pem(_: Arc<dyn CaChainProvider>) -> Box<dyn OutputRenderer> {
    Box::new(CertOutput::new(Framing::Pem))
}

fn cert_single_line(_: Arc<dyn CaChainProvider>) -> Box<dyn OutputRenderer> {
    Box::new(CertOutput::new(Framing::SingleLine))
}

fn pkcs7(chain: Arc<dyn CaChainProvider>) -> Box<dyn OutputRenderer> {
    Box::new(Pkcs7Output::new(chain))
}

fn cmmf(chain: Arc<dyn CaChainProvider>) -> Box<dyn OutputRenderer> {
    Box::new(CmmfOutput::new(chain))
}

#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    profiles: BTreeMap<String, ProfileConstructor>,
    rules: BTreeMap<String, RuleConstructor>,
    outputs: BTreeMap<String, OutputConstructor>,
}

impl PluginRegistry {
    /// A registry with no entries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in profile, rule and output implementations.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register_profile(PROFILE_CA_ENROLL, Profile::enrollment);

        registry.register_rule(RULE_ISSUER_ALT_NAME, issuer_alt_name);
        registry.register_rule(RULE_OCSP_NO_CHECK, ocsp_no_check);
        registry.register_rule(RULE_REMOVE_BASIC_CONSTRAINTS, remove_basic_constraints);

        registry.register_output(OUTPUT_PRETTY_PRINT, pretty_print);
        registry.register_output(OUTPUT_CERT_PEM, cert_pem);
        registry.register_output(OUTPUT_CERT_SINGLE_LINE, cert_single_line);
        registry.register_output(OUTPUT_PKCS7, pkcs7);
        registry.register_output(OUTPUT_CMMF, cmmf);
        registry
    }

    pub fn register_profile(&mut self, class_id: &str, constructor: ProfileConstructor) {
        self.profiles.insert(class_id.to_string(), constructor);
    }

    pub fn register_rule(&mut self, class_id: &str, constructor: RuleConstructor) {
        self.rules.insert(class_id.to_string(), constructor);
    }

    pub fn register_output(&mut self, class_id: &str, constructor: OutputConstructor) {
        self.outputs.insert(class_id.to_string(), constructor);
    }

    pub fn has_profile_class(&self, class_id: &str) -> bool {
        self.profiles.contains_key(class_id)
    }

    fn unknown(kind: PluginKind, class_id: &str) -> ProfileError {
        ProfileError::UnknownClass {
            kind,
            class_id: class_id.to_string(),
        }
    }

    pub fn profile_constructor(&self, class_id: &str) -> Result<ProfileConstructor, ProfileError> {
        self.profiles
            .get(class_id)
            .copied()
            .ok_or_else(|| Self::unknown(PluginKind::Profile, class_id))
    }

    /// A new, uninitialized rule named `name`.
    pub fn new_rule(&self, class_id: &str, name: &str) -> Result<Box<dyn PolicyRule>, ProfileError> {
        let constructor = self
            .rules
            .get(class_id)
            .ok_or_else(|| Self::unknown(PluginKind::Rule, class_id))?;
        Ok(constructor(name))
    }

    pub fn new_output(
        &self,
        class_id: &str,
        chain: Arc<dyn CaChainProvider>,
    ) -> Result<Box<dyn OutputRenderer>, ProfileError> {
        let constructor = self
            .outputs
            .get(class_id)
            .ok_or_else(|| Self::unknown(PluginKind::Output, class_id))?;
        Ok(constructor(chain))
    }
}

/// Shared collaborators for building profiles.
#[derive(Debug, Clone)]
pub struct PluginContext {
    registry: PluginRegistry,
    chain: Arc<dyn CaChainProvider>,
}

impl PluginContext {
    pub fn new(registry: PluginRegistry, chain: Arc<dyn CaChainProvider>) -> Self {
        Self { registry, chain }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn chain(&self) -> Arc<dyn CaChainProvider> {
        Arc::clone(&self.chain)
    }

    pub fn new_profile(
        &self,
        id: &str,
        class_id: &str,
        config: ConfigStore,
    ) -> Result<Profile, ProfileError> {
        let constructor = self.registry.profile_constructor(class_id)?;
        constructor(id, class_id, config, self)
    }
}
