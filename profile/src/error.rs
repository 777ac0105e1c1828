use std::fmt;

use ca_issuance::config::ConfigError;
use thiserror::Error;

use crate::ldap::LdapError;

/// What a configured class id names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    Profile,
    Rule,
    Output,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Profile => "profile",
            Self::Rule => "policy rule",
            Self::Output => "output",
        })
    }
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile {0} not found")]
    ProfileNotFound(String),
    #[error("invalid profile id {0:?}: use letters, digits, '_' or '-'")]
    InvalidProfileId(String),
    #[error("profile {0} already exists")]
    DuplicateProfile(String),
    #[error("profile {0} is enabled")]
    ProfileEnabled(String),
    #[error("unknown {kind} class id {class_id}")]
    UnknownClass { kind: PluginKind, class_id: String },
    #[error("invalid configuration for profile {id}: {reason}")]
    Configuration { id: String, reason: String },
    #[error("profile store error: {0}")]
    Config(#[from] ConfigError),
    #[error("profile store error: {0}")]
    Ldap(#[from] LdapError),
}

impl ProfileError {
    pub(crate) fn configuration(id: &str, reason: impl fmt::Display) -> Self {
        Self::Configuration {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}
