//! CLI subcommand implementations for the stockcheck binary.

pub mod check_cmd;
pub mod doctor;
pub mod match_cmd;
pub mod output;
