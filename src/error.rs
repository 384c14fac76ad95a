use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum CuboidError {
    Config(String),
    RunExists(PathBuf),
    Io(std::io::Error),
    Encode(Box<bincode::error::EncodeError>),
    Decode(Box<bincode::error::DecodeError>),
    Json(serde_json::Error),
    Cancelled,
    Worker(String),
    Other(String),
}

impl fmt::Display for CuboidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CuboidError::Config(e) => write!(f, "Configuration error: {}", e),
            CuboidError::RunExists(path) => write!(
                f,
                "Run file already exists: {} (clean the working directory or pass --fresh)",
                path.display()
            ),
            CuboidError::Io(e) => write!(f, "IO error: {}", e),
            CuboidError::Encode(e) => write!(f, "Record encode error: {}", e),
            CuboidError::Decode(e) => write!(f, "Record decode error: {}", e),
            CuboidError::Json(e) => write!(f, "JSON error: {}", e),
            CuboidError::Cancelled => write!(f, "Search cancelled"),
            CuboidError::Worker(e) => write!(f, "Worker failed: {}", e),
            CuboidError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for CuboidError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CuboidError::Io(e) => Some(e),
            CuboidError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<bincode::error::EncodeError> for CuboidError {
    fn from(err: bincode::error::EncodeError) -> Self {
        CuboidError::Encode(Box::new(err))
    }
}

impl From<bincode::error::DecodeError> for CuboidError {
    fn from(err: bincode::error::DecodeError) -> Self {
        CuboidError::Decode(Box::new(err))
    }
}

impl From<std::io::Error> for CuboidError {
    fn from(err: std::io::Error) -> Self {
        CuboidError::Io(err)
    }
}

impl From<serde_json::Error> for CuboidError {
    fn from(err: serde_json::Error) -> Self {
        CuboidError::Json(err)
    }
}

impl From<String> for CuboidError {
    fn from(err: String) -> Self {
        CuboidError::Other(err)
    }
}

impl From<&str> for CuboidError {
    fn from(err: &str) -> Self {
        CuboidError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_exists_message_names_path() {
        let err = CuboidError::RunExists(PathBuf::from("Working/Cuboid.1.nptf"));
        let msg = err.to_string();
        assert!(msg.contains("Cuboid.1.nptf"));
        assert!(msg.contains("--fresh"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CuboidError = io.into();
        assert!(matches!(err, CuboidError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
