//! Profiles persisted as one file each, indexed by the subsystem config.
//!
//! Subsystem config layout:
//!
//! ```text
//! list=caUserCert,caServerCert
//! caUserCert.class_id=caEnrollImpl
//! caUserCert.config=/var/lib/ca/profiles/caUserCert.cfg
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use ca_issuance::config::{ConfigStore, FileBackend};
use parking_lot::Mutex;
use tracing::{error, warn};

use super::{is_valid_profile_id, ProfileStore};
use crate::error::ProfileError;

pub const PROP_LIST: &str = "list";

#[derive(Debug)]
pub struct FileProfileStore {
    config: Mutex<ConfigStore>,
    profile_dir: PathBuf,
}

impl FileProfileStore {
    /// `config` is the subsystem store holding the id list; new profile
    /// files are placed in `profile_dir`.
    pub fn new(config: ConfigStore, profile_dir: impl Into<PathBuf>) -> Self {
        Self {
            config: Mutex::new(config),
            profile_dir: profile_dir.into(),
        }
    }

    fn ids(config: &ConfigStore) -> Vec<String> {
        config.get_list(PROP_LIST)
    }

    fn config_path(config: &ConfigStore, id: &str) -> Result<PathBuf, ProfileError> {
        config
            .get_string(&format!("{id}.config"))
            .map(PathBuf::from)
            .map_err(|e| ProfileError::configuration(id, e))
    }

    /// Apply `edit` to a copy of the subsystem config and commit it; the
    /// copy replaces the live config only once the commit succeeds.
    fn update(&self, edit: impl FnOnce(&mut ConfigStore)) -> Result<(), ProfileError> {
        let mut live = self.config.lock();
        let mut next = live.clone();
        edit(&mut next);
        next.commit(true)?;
        *live = next;
        Ok(())
    }
}

impl ProfileStore for FileProfileStore {
    fn list(&self) -> Result<Vec<(String, String)>, ProfileError> {
        let config = self.config.lock();
        Self::ids(&config)
            .into_iter()
            .map(|id| -> Result<(String, String), ProfileError> {
                let class_id = config
                    .get_string(&format!("{id}.class_id"))
                    .map_err(|e| ProfileError::configuration(&id, e))?
                    .to_string();
                Ok((id, class_id))
            })
            .collect()
    }

    fn open(&self, id: &str, _class_id: &str) -> Result<ConfigStore, ProfileError> {
        let path = Self::config_path(&self.config.lock(), id)?;
        Ok(ConfigStore::open(Arc::new(FileBackend::new(path)))?)
    }

    fn create(&self, id: &str, class_id: &str) -> Result<ConfigStore, ProfileError> {
        if !is_valid_profile_id(id) {
            return Err(ProfileError::InvalidProfileId(id.to_string()));
        }
        let path = self.profile_dir.join(format!("{id}.cfg"));
        let backend = Arc::new(FileBackend::new(&path));
        let store = ConfigStore::with_backend(backend.clone());
        store.commit(true)?;

        let registered = self.update(|config| {
            let mut ids = Self::ids(config);
            ids.push(id.to_string());
            config.put_string(PROP_LIST, ids.join(","));
            config.put_string(format!("{id}.class_id"), class_id);
            config.put_string(format!("{id}.config"), path.display().to_string());
        });
        if let Err(e) = registered {
            if let Err(cleanup) = backend.delete() {
                warn!(profile_id = %id, error = %cleanup, "cannot remove profile file");
            }
            return Err(e);
        }
        Ok(store)
    }

    fn delete(&self, id: &str) -> Result<(), ProfileError> {
        let path = Self::config_path(&self.config.lock(), id)?;
        self.update(|config| {
            let ids: Vec<String> = Self::ids(config).into_iter().filter(|i| i != id).collect();
            config.put_string(PROP_LIST, ids.join(","));
            config.remove(&format!("{id}.class_id"));
            config.remove(&format!("{id}.config"));
        })?;
        // The id is gone from the list; a leftover file is only clutter.
        if let Err(e) = FileBackend::new(&path).delete() {
            error!(profile_id = %id, path = %path.display(), error = %e, "cannot remove profile file");
        }
        Ok(())
    }
}
