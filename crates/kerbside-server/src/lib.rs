//! Shared library surface for the kerbside server and its tests.

pub mod api;
pub mod config;
pub mod loops;
pub mod refresh;
pub mod state;
