use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Invalid request body: {0}")]
    InvalidRequest(String),

    #[error("Invalid user: {0}")]
    InvalidUser(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),
}
