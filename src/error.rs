use std::fmt;

#[derive(Debug)]
pub enum ExpeditionError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Checkpoint(String),
    Config(String),
    Worker(String),
    Other(String),
}

impl fmt::Display for ExpeditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpeditionError::Io(e) => write!(f, "IO error: {}", e),
            ExpeditionError::Serialization(e) => write!(f, "Serialization error: {}", e),
            ExpeditionError::Checkpoint(e) => write!(f, "Checkpoint error: {}", e),
            ExpeditionError::Config(e) => write!(f, "Configuration error: {}", e),
            ExpeditionError::Worker(e) => write!(f, "Worker error: {}", e),
            ExpeditionError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for ExpeditionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExpeditionError::Io(e) => Some(e),
            ExpeditionError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ExpeditionError {
    fn from(err: std::io::Error) -> Self {
        ExpeditionError::Io(err)
    }
}

impl From<serde_json::Error> for ExpeditionError {
    fn from(err: serde_json::Error) -> Self {
        ExpeditionError::Serialization(err)
    }
}

impl From<String> for ExpeditionError {
    fn from(err: String) -> Self {
        ExpeditionError::Other(err)
    }
}

impl From<&str> for ExpeditionError {
    fn from(err: &str) -> Self {
        ExpeditionError::Other(err.to_string())
    }
}
