use inspector_transport::TransportCreationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("argument parsing error: {0}")]
    ArgParse(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Transport(#[from] TransportCreationError),
    #[error("connection error: {0}")]
    Connection(String),
}
