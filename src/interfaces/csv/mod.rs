//! CSV adapters used by the replay CLI.

pub mod delivery_reader;
pub mod outcome_writer;
pub mod pending_reader;
