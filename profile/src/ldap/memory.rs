//! In-process directory for tests. Connections share one entry map;
//! failures can be injected per operation.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{LdapConnFactory, LdapConnection, LdapEntry, LdapError};

#[derive(Debug, Default)]
pub(crate) struct InMemoryDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

#[derive(Debug, Default)]
struct DirectoryState {
    entries: BTreeMap<String, LdapEntry>,
    outstanding: usize,
    returned: usize,
    fail_next: Option<Operation>,
}

/// Directory operation kinds, for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Connect,
    Search,
    Read,
    Add,
    Replace,
    Delete,
}

fn normalize_dn(dn: &str) -> String {
    dn.split(',')
        .map(|rdn| rdn.trim().to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(",")
}

impl InMemoryDirectory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Seed an entry without going through a connection.
    pub(crate) fn insert(&self, entry: LdapEntry) {
        self.state
            .lock()
            .entries
            .insert(normalize_dn(entry.dn()), entry);
    }

    pub(crate) fn entry(&self, dn: &str) -> Option<LdapEntry> {
        self.state.lock().entries.get(&normalize_dn(dn)).cloned()
    }

    /// Make the next operation of `kind` fail.
    pub(crate) fn fail_next(&self, kind: Operation) {
        self.state.lock().fail_next = Some(kind);
    }

    /// Connections handed out and not yet returned.
    pub(crate) fn outstanding(&self) -> usize {
        self.state.lock().outstanding
    }

    pub(crate) fn returned(&self) -> usize {
        self.state.lock().returned
    }
}

fn injected(state: &mut DirectoryState, kind: Operation) -> Result<(), LdapError> {
    if state.fail_next == Some(kind) {
        state.fail_next = None;
        return Err(LdapError::Connection(format!("injected {kind:?} failure")));
    }
    Ok(())
}

struct InMemoryConnection {
    state: Arc<Mutex<DirectoryState>>,
}

impl LdapConnection for InMemoryConnection {
    fn search_one_level(&mut self, base: &str) -> Result<Vec<LdapEntry>, LdapError> {
        let mut state = self.state.lock();
        injected(&mut state, Operation::Search)?;
        let base = normalize_dn(base);
        if !state.entries.contains_key(&base) {
            return Err(LdapError::NoSuchObject(base));
        }
        let suffix = format!(",{base}");
        Ok(state
            .entries
            .iter()
            .filter(|(dn, _)| {
                dn.strip_suffix(&suffix)
                    .is_some_and(|rdn| !rdn.is_empty() && !rdn.contains(','))
            })
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    fn read(&mut self, dn: &str) -> Result<LdapEntry, LdapError> {
        let mut state = self.state.lock();
        injected(&mut state, Operation::Read)?;
        state
            .entries
            .get(&normalize_dn(dn))
            .cloned()
            .ok_or_else(|| LdapError::NoSuchObject(dn.to_string()))
    }

    fn add(&mut self, entry: LdapEntry) -> Result<(), LdapError> {
        let mut state = self.state.lock();
        injected(&mut state, Operation::Add)?;
        let key = normalize_dn(entry.dn());
        if state.entries.contains_key(&key) {
            return Err(LdapError::AlreadyExists(entry.dn().to_string()));
        }
        state.entries.insert(key, entry);
        Ok(())
    }

    fn replace(&mut self, dn: &str, attribute: &str, values: Vec<String>) -> Result<(), LdapError> {
        let mut state = self.state.lock();
        injected(&mut state, Operation::Replace)?;
        let entry = state
            .entries
            .get_mut(&normalize_dn(dn))
            .ok_or_else(|| LdapError::NoSuchObject(dn.to_string()))?;
        entry.set_attribute(attribute, values);
        Ok(())
    }

    fn delete(&mut self, dn: &str) -> Result<(), LdapError> {
        let mut state = self.state.lock();
        injected(&mut state, Operation::Delete)?;
        state
            .entries
            .remove(&normalize_dn(dn))
            .map(|_| ())
            .ok_or_else(|| LdapError::NoSuchObject(dn.to_string()))
    }
}

impl LdapConnFactory for InMemoryDirectory {
    fn get_conn(&self) -> Result<Box<dyn LdapConnection>, LdapError> {
        let mut state = self.state.lock();
        injected(&mut state, Operation::Connect)?;
        state.outstanding += 1;
        Ok(Box::new(InMemoryConnection {
            state: Arc::clone(&self.state),
        }))
    }

    fn return_conn(&self, conn: Box<dyn LdapConnection>) {
        drop(conn);
        let mut state = self.state.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        state.returned += 1;
    }
}
