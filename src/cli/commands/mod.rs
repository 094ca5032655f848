//! Subcommand implementations.

pub mod forum;
pub mod issues;
pub mod roles;
pub mod run;
pub mod status;
