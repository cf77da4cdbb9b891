//! Subcommand implementations.

pub(crate) mod check_config;
pub(crate) mod export;
pub(crate) mod run;
pub(crate) mod stats;
