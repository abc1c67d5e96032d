//! Turning synchronized DOM nodes into typed records.
//!
//! - [`fields`]: one node in, one scalar or flat record out
//! - [`composite`]: rosters, box scores, career tables and listing pages
//! - [`selectors`]: the fixed selector contracts both depend on

pub mod composite;
pub mod fields;
pub mod selectors;
