//! CLI subcommand implementations.

pub mod eval;
pub mod run;
pub mod tune;
