//! Kerbside CLI - offline queries over a saved feed dump.
//!
//! The `kerbside` binary builds one snapshot from a records file (and an
//! optional suburb boundary file) and answers a single query against it.

pub mod load;
pub mod report;

pub use load::load_snapshot;
