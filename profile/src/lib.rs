//! Profiles: configured policy chains and output renderers, and the
//! subsystem that keeps them in a file tree or a directory server.
//!
//! Everything here is built from configuration through the class-id
//! registry in [`plugin`]; no process-wide state is kept.

pub mod chain;
pub mod error;
pub mod ldap;
pub mod output;
pub mod plugin;
pub mod profile;
pub mod subsystem;

pub use error::ProfileError;
pub use profile::Profile;
pub use subsystem::{ProfileStore, ProfileSubsystem};
