pub mod args;
pub mod cli;
pub mod config;
pub mod error;

pub use error::CliError;
