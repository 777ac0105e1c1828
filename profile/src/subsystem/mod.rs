//! Profile registry over a persistent store.
//!
//! The registry map sits behind one `RwLock`; every mutation holds the write
//! lock for its whole duration and writes the store before touching the map,
//! so a store failure leaves the registry as it was.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ca_issuance::config::ConfigStore;
use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::error::{PluginKind, ProfileError};
use crate::plugin::PluginContext;
use crate::profile::Profile;

pub mod file;
pub mod ldap;

pub use file::FileProfileStore;
pub use ldap::LdapProfileStore;

pub const PROP_CHECK_OWNER: &str = "checkOwner";

/// Persistence for the set of profiles.
pub trait ProfileStore: Send + Sync + fmt::Debug {
    /// Persisted `(id, class id)` pairs.
    fn list(&self) -> Result<Vec<(String, String)>, ProfileError>;

    /// Configuration of a profile that is already persisted.
    fn open(&self, id: &str, class_id: &str) -> Result<ConfigStore, ProfileError>;

    /// Persist a new profile and return its configuration store.
    fn create(&self, id: &str, class_id: &str) -> Result<ConfigStore, ProfileError>;

    fn delete(&self, id: &str) -> Result<(), ProfileError>;
}

/// Profile ids end up in list properties, file names and RDN values, so
/// they are limited to `[A-Za-z0-9_-]+`.
pub fn is_valid_profile_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn lookup(profiles: &BTreeMap<String, Arc<Profile>>, id: &str) -> Result<Arc<Profile>, ProfileError> {
    profiles
        .get(id)
        .cloned()
        .ok_or_else(|| ProfileError::ProfileNotFound(id.to_string()))
}

#[derive(Debug)]
pub struct ProfileSubsystem {
    store: Box<dyn ProfileStore>,
    context: PluginContext,
    check_owner: bool,
    profiles: RwLock<BTreeMap<String, Arc<Profile>>>,
}

impl ProfileSubsystem {
    /// `config` is the subsystem configuration; only `checkOwner` is read
    /// here, defaulting to off.
    pub fn new(store: Box<dyn ProfileStore>, context: PluginContext, config: &ConfigStore) -> Self {
        let check_owner = config
            .get_boolean_or(PROP_CHECK_OWNER, false)
            .unwrap_or_else(|e| {
                warn!(error = %e, "invalid checkOwner setting, owner check disabled");
                false
            });
        Self {
            store,
            context,
            check_owner,
            profiles: RwLock::new(BTreeMap::new()),
        }
    }

    /// Load every persisted profile. Any failure is fatal.
    pub fn startup(&self) -> Result<(), ProfileError> {
        for (id, class_id) in self.store.list()? {
            self.create_profile(&id, &class_id, true).map_err(|e| {
                error!(profile_id = %id, error = %e, "cannot load profile");
                e
            })?;
        }
        info!(count = self.profiles.read().len(), "profiles loaded");
        Ok(())
    }

    /// Instantiate and register a profile.
    ///
    /// With `not_new` the profile is read from the store as-is (startup
    /// load); otherwise it is persisted first.
    pub fn create_profile(
        &self,
        id: &str,
        class_id: &str,
        not_new: bool,
    ) -> Result<Arc<Profile>, ProfileError> {
        if !is_valid_profile_id(id) {
            return Err(ProfileError::InvalidProfileId(id.to_string()));
        }
        let mut profiles = self.profiles.write();
        if profiles.contains_key(id) {
            return Err(ProfileError::DuplicateProfile(id.to_string()));
        }
        if !self.context.registry().has_profile_class(class_id) {
            return Err(ProfileError::UnknownClass {
                kind: PluginKind::Profile,
                class_id: class_id.to_string(),
            });
        }

        let config = if not_new {
            self.store.open(id, class_id)?
        } else {
            self.store.create(id, class_id)?
        };

        let profile = match self.context.new_profile(id, class_id, config) {
            Ok(profile) => Arc::new(profile),
            Err(e) => {
                if !not_new {
                    if let Err(rollback) = self.store.delete(id) {
                        error!(profile_id = %id, error = %rollback, "cannot remove partially created profile");
                    }
                }
                return Err(e);
            }
        };

        profiles.insert(id.to_string(), Arc::clone(&profile));
        if !not_new {
            info!(profile_id = %id, %class_id, "profile created");
        }
        Ok(profile)
    }

    /// Remove a disabled profile from the store and the registry.
    pub fn delete_profile(&self, id: &str) -> Result<(), ProfileError> {
        let mut profiles = self.profiles.write();
        if lookup(&profiles, id)?.is_enabled() {
            return Err(ProfileError::ProfileEnabled(id.to_string()));
        }
        self.store.delete(id)?;
        profiles.remove(id);
        info!(profile_id = %id, "profile deleted");
        Ok(())
    }

    pub fn enable_profile(&self, id: &str, enabled_by: &str) -> Result<(), ProfileError> {
        let profiles = self.profiles.write();
        let profile = lookup(&profiles, id)?;
        profile.set_enabled(true, Some(enabled_by))?;
        info!(profile_id = %id, %enabled_by, "profile enabled");
        Ok(())
    }

    pub fn disable_profile(&self, id: &str) -> Result<(), ProfileError> {
        let profiles = self.profiles.write();
        let profile = lookup(&profiles, id)?;
        profile.set_enabled(false, None)?;
        info!(profile_id = %id, "profile disabled");
        Ok(())
    }

    /// False for unknown profiles and unreadable flags.
    pub fn is_profile_enabled(&self, id: &str) -> bool {
        self.profile(id).is_some_and(|p| p.is_enabled())
    }

    pub fn profile_enabled_by(&self, id: &str) -> Option<String> {
        self.profile(id)?.enabled_by()
    }

    pub fn profile(&self, id: &str) -> Option<Arc<Profile>> {
        self.profiles.read().get(id).cloned()
    }

    pub fn profile_ids(&self) -> Vec<String> {
        self.profiles.read().keys().cloned().collect()
    }

    pub fn profile_class_id(&self, id: &str) -> Option<String> {
        self.profile(id).map(|p| p.class_id().to_string())
    }

    /// Whether approvals must come from the profile's owner.
    pub fn check_owner(&self) -> bool {
        self.check_owner
    }

    /// True when `principal` may approve requests of profile `id`.
    pub fn approve_owner_check(&self, id: &str, principal: &str) -> bool {
        if !self.check_owner {
            return true;
        }
        self.profile_enabled_by(id).as_deref() == Some(principal)
    }
}
