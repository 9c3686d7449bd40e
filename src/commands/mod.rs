//! Subcommand implementations

pub mod detect;
pub mod export;
pub mod scan;
pub mod zones;
