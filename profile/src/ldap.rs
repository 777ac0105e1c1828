//! Directory access for the LDAP profile backend.
//!
//! Connections come from an [`LdapConnFactory`] and are handed out wrapped
//! in a [`PooledConnection`], which returns them to the factory on drop.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ca_issuance::config::{parse_properties, serialize_properties, ConfigBackend, ConfigError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LdapError {
    #[error("no such object: {0}")]
    NoSuchObject(String),
    #[error("entry already exists: {0}")]
    AlreadyExists(String),
    #[error("directory connection failed: {0}")]
    Connection(String),
    #[error("connection already returned to the pool")]
    Returned,
}

/// One directory entry. Attribute names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdapEntry {
    dn: String,
    attributes: BTreeMap<String, Vec<String>>,
}

impl LdapEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.set_attribute(name, values.into_iter().map(Into::into).collect());
        self
    }

    pub fn dn(&self) -> &str {
        &self.dn
    }

    pub fn set_attribute(&mut self, name: &str, values: Vec<String>) {
        self.attributes.insert(name.to_ascii_lowercase(), values);
    }

    /// First value of `name`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(String::as_str)
    }

    pub fn values(&self, name: &str) -> &[String] {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

pub trait LdapConnection: Send {
    /// Entries immediately below `base`.
    fn search_one_level(&mut self, base: &str) -> Result<Vec<LdapEntry>, LdapError>;

    fn read(&mut self, dn: &str) -> Result<LdapEntry, LdapError>;

    fn add(&mut self, entry: LdapEntry) -> Result<(), LdapError>;

    /// Replace every value of `attribute` on `dn`.
    fn replace(&mut self, dn: &str, attribute: &str, values: Vec<String>) -> Result<(), LdapError>;

    fn delete(&mut self, dn: &str) -> Result<(), LdapError>;
}

pub trait LdapConnFactory: Send + Sync + fmt::Debug {
    fn get_conn(&self) -> Result<Box<dyn LdapConnection>, LdapError>;

    fn return_conn(&self, conn: Box<dyn LdapConnection>);
}

/// A borrowed connection, returned to its factory when dropped.
pub struct PooledConnection<'a> {
    connection: Option<Box<dyn LdapConnection>>,
    factory: &'a dyn LdapConnFactory,
}

impl<'a> PooledConnection<'a> {
    pub fn borrow(factory: &'a dyn LdapConnFactory) -> Result<Self, LdapError> {
        Ok(Self {
            connection: Some(factory.get_conn()?),
            factory,
        })
    }

    fn conn(&mut self) -> Result<&mut (dyn LdapConnection + 'static), LdapError> {
        self.connection.as_deref_mut().ok_or(LdapError::Returned)
    }

    pub fn search_one_level(&mut self, base: &str) -> Result<Vec<LdapEntry>, LdapError> {
        self.conn()?.search_one_level(base)
    }

    pub fn read(&mut self, dn: &str) -> Result<LdapEntry, LdapError> {
        self.conn()?.read(dn)
    }

    pub fn add(&mut self, entry: LdapEntry) -> Result<(), LdapError> {
        self.conn()?.add(entry)
    }

    pub fn replace(
        &mut self,
        dn: &str,
        attribute: &str,
        values: Vec<String>,
    ) -> Result<(), LdapError> {
        self.conn()?.replace(dn, attribute, values)
    }

    pub fn delete(&mut self, dn: &str) -> Result<(), LdapError> {
        self.conn()?.delete(dn)
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            self.factory.return_conn(conn);
        }
    }
}

impl fmt::Debug for PooledConnection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("returned", &self.connection.is_none())
            .finish()
    }
}

/// Profile configuration stored as one attribute of a directory entry.
#[derive(Debug, Clone)]
pub struct LdapConfigBackend {
    factory: Arc<dyn LdapConnFactory>,
    dn: String,
    attribute: String,
}

impl LdapConfigBackend {
    pub fn new(factory: Arc<dyn LdapConnFactory>, dn: impl Into<String>, attribute: &str) -> Self {
        Self {
            factory,
            dn: dn.into(),
            attribute: attribute.to_string(),
        }
    }

    pub fn dn(&self) -> &str {
        &self.dn
    }
}

impl From<LdapError> for ConfigError {
    fn from(e: LdapError) -> Self {
        ConfigError::Backend(e.to_string())
    }
}

impl ConfigBackend for LdapConfigBackend {
    fn load(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        let mut conn = PooledConnection::borrow(&*self.factory)?;
        let entry = conn.read(&self.dn)?;
        parse_properties(entry.attribute(&self.attribute).unwrap_or_default())
    }

    /// Directory writes are durable once acknowledged; `sync` has no extra
    /// effect.
    fn store(&self, props: &BTreeMap<String, String>, _sync: bool) -> Result<(), ConfigError> {
        let mut conn = PooledConnection::borrow(&*self.factory)?;
        conn.replace(&self.dn, &self.attribute, vec![serialize_properties(props)])?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod memory;
