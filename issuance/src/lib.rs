//! Issuance core: request context, certificate extensions, policy rules and
//! subject-name patterns.
//!
//! Nothing in this crate signs. Certificates arrive from the signing service
//! as DER plus a decoded summary; this crate edits what goes into them and
//! reads what came out.

pub mod certificate;
pub mod config;
pub mod der;
pub mod dn_pattern;
pub mod extensions;
pub mod name;
pub mod pattern;
pub mod policy;
pub mod request;
