//! Profiles persisted as directory entries, one per profile, below
//! `ou=certificateProfiles,ou=ca,<basedn>`.

use std::sync::Arc;

use ca_issuance::config::ConfigStore;
use tracing::warn;

use super::{is_valid_profile_id, ProfileStore};
use crate::error::ProfileError;
use crate::ldap::{LdapConfigBackend, LdapConnFactory, LdapEntry, PooledConnection};

pub const ATTR_CN: &str = "cn";
pub const ATTR_CLASS_ID: &str = "classId";
pub const ATTR_CONFIG: &str = "certProfileConfig";
pub const ATTR_OBJECT_CLASS: &str = "objectClass";

#[derive(Debug)]
pub struct LdapProfileStore {
    factory: Arc<dyn LdapConnFactory>,
    base_dn: String,
}

impl LdapProfileStore {
    pub fn new(factory: Arc<dyn LdapConnFactory>, basedn: &str) -> Self {
        Self {
            factory,
            base_dn: format!("ou=certificateProfiles,ou=ca,{basedn}"),
        }
    }

    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    fn entry_dn(&self, id: &str) -> String {
        format!("cn={id},{}", self.base_dn)
    }

    fn config_backend(&self, id: &str) -> Arc<LdapConfigBackend> {
        Arc::new(LdapConfigBackend::new(
            Arc::clone(&self.factory),
            self.entry_dn(id),
            ATTR_CONFIG,
        ))
    }
}

impl ProfileStore for LdapProfileStore {
    /// Entries missing `cn` or `classId` are skipped.
    fn list(&self) -> Result<Vec<(String, String)>, ProfileError> {
        let mut conn = PooledConnection::borrow(&*self.factory)?;
        let entries = conn.search_one_level(&self.base_dn)?;
        let mut profiles = Vec::with_capacity(entries.len());
        for entry in entries {
            match (entry.attribute(ATTR_CN), entry.attribute(ATTR_CLASS_ID)) {
                (Some(id), Some(class_id)) => profiles.push((id.to_string(), class_id.to_string())),
                _ => warn!(dn = %entry.dn(), "skipping malformed profile entry"),
            }
        }
        Ok(profiles)
    }

    fn open(&self, id: &str, _class_id: &str) -> Result<ConfigStore, ProfileError> {
        Ok(ConfigStore::open(self.config_backend(id))?)
    }

    fn create(&self, id: &str, class_id: &str) -> Result<ConfigStore, ProfileError> {
        if !is_valid_profile_id(id) {
            return Err(ProfileError::InvalidProfileId(id.to_string()));
        }
        let entry = LdapEntry::new(self.entry_dn(id))
            .with_attribute(ATTR_OBJECT_CLASS, ["top", "certProfile"])
            .with_attribute(ATTR_CN, [id])
            .with_attribute(ATTR_CLASS_ID, [class_id])
            .with_attribute(ATTR_CONFIG, [""]);
        let mut conn = PooledConnection::borrow(&*self.factory)?;
        conn.add(entry)?;
        Ok(ConfigStore::with_backend(self.config_backend(id)))
    }

    fn delete(&self, id: &str) -> Result<(), ProfileError> {
        let mut conn = PooledConnection::borrow(&*self.factory)?;
        conn.delete(&self.entry_dn(id))?;
        Ok(())
    }
}
