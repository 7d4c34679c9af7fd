//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the TOML file named on the command line and
//! validates it into the explicit settings the supervisor wires together.
//! Nothing is ever written back.

pub mod config;
