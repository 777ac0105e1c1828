//! Enrollment profiles: a policy rule chain plus output renderers, built
//! from one configuration store.

use ca_issuance::config::{ConfigError, ConfigStore};
use ca_issuance::policy::{apply_rules, PolicyError, PolicyResult, PolicyRule};
use ca_issuance::request::Request;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::ProfileError;
use crate::output::{Locale, OutputRenderer};
use crate::plugin::PluginContext;

pub const PROP_ENABLE: &str = "enable";
pub const PROP_ENABLE_BY: &str = "enableBy";
pub const PROP_NAME: &str = "name";
pub const PROP_DESC: &str = "desc";
pub const PROP_POLICY_LIST: &str = "policyset.list";
pub const PROP_OUTPUT_LIST: &str = "output.list";
pub const PROP_CLASS_ID: &str = "class_id";

#[derive(Debug)]
pub struct Profile {
    id: String,
    class_id: String,
    config: RwLock<ConfigStore>,
    rules: Vec<Box<dyn PolicyRule>>,
    outputs: Vec<(String, Box<dyn OutputRenderer>)>,
}

impl Profile {
    /// The standard enrollment profile.
    ///
    /// Rules are listed in `policyset.list`, each configured under
    /// `policyset.<rule>.class_id` and `policyset.<rule>.params.*`. Outputs
    /// are listed in `output.list` with `output.<out>.class_id`.
    pub fn enrollment(
        id: &str,
        class_id: &str,
        config: ConfigStore,
        context: &PluginContext,
    ) -> Result<Self, ProfileError> {
        let mut rules = Vec::new();
        for rule_id in config.get_list(PROP_POLICY_LIST) {
            let rule_config = config.get_sub_store(&format!("policyset.{rule_id}"));
            let rule_class = rule_config
                .get_string(PROP_CLASS_ID)
                .map_err(|e| ProfileError::configuration(id, e))?;
            let mut rule = context.registry().new_rule(rule_class, &rule_id)?;
            rule.init(&rule_config.get_sub_store("params"));
            rules.push(rule);
        }

        let mut outputs = Vec::new();
        for output_id in config.get_list(PROP_OUTPUT_LIST) {
            let output_config = config.get_sub_store(&format!("output.{output_id}"));
            let output_class = output_config
                .get_string(PROP_CLASS_ID)
                .map_err(|e| ProfileError::configuration(id, e))?;
            let output = context.registry().new_output(output_class, context.chain())?;
            outputs.push((output_id, output));
        }

        Ok(Self {
            id: id.to_string(),
            class_id: class_id.to_string(),
            config: RwLock::new(config),
            rules,
            outputs,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub fn name(&self) -> String {
        self.config.read().get_string_or(PROP_NAME, &self.id)
    }

    pub fn description(&self) -> String {
        self.config.read().get_string_or(PROP_DESC, "")
    }

    /// False when the flag is absent or unreadable.
    pub fn is_enabled(&self) -> bool {
        match self.config.read().get_boolean(PROP_ENABLE) {
            Ok(enabled) => enabled,
            Err(ConfigError::MissingKey(_)) => false,
            Err(e) => {
                warn!(profile_id = %self.id, error = %e, "unreadable enable flag, treating profile as disabled");
                false
            }
        }
    }

    pub fn enabled_by(&self) -> Option<String> {
        self.config
            .read()
            .get_string(PROP_ENABLE_BY)
            .ok()
            .map(str::to_string)
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> ConfigStore {
        self.config.read().clone()
    }

    pub fn rules(&self) -> &[Box<dyn PolicyRule>] {
        &self.rules
    }

    pub fn output_ids(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|(id, _)| id.as_str())
    }

    pub fn output(&self, id: &str) -> Option<&dyn OutputRenderer> {
        self.outputs
            .iter()
            .find(|(output_id, _)| output_id == id)
            .map(|(_, output)| output.as_ref())
    }

    /// Run the rule chain, stopping at the first rejection.
    pub fn execute_policies(&self, request: &mut Request) -> Result<PolicyResult, PolicyError> {
        let result = apply_rules(&self.rules, request)?;
        if let PolicyResult::Rejected(reason) = &result {
            info!(profile_id = %self.id, request_id = %request.id(), %reason, "request rejected by policy");
        }
        Ok(result)
    }

    /// Every value of every output, in configuration order.
    pub fn render_outputs(&self, locale: Locale, request: &Request) -> Vec<(String, Option<String>)> {
        let mut values = Vec::new();
        for (_, output) in &self.outputs {
            for name in output.value_names() {
                values.push((name.to_string(), output.value(name, locale, request)));
            }
        }
        values
    }

    /// Set the enable flag and owner, then commit. On a failed commit the
    /// in-memory configuration is restored.
    pub(crate) fn set_enabled(&self, enabled: bool, enabled_by: Option<&str>) -> Result<(), ConfigError> {
        let mut config = self.config.write();
        let previous = config.clone();
        config.put_boolean(PROP_ENABLE, enabled);
        if let Some(owner) = enabled_by {
            config.put_string(PROP_ENABLE_BY, owner);
        }
        if let Err(e) = config.commit(true) {
            *config = previous;
            return Err(e);
        }
        Ok(())
    }
}
