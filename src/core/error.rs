use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    #[error("Cannot parse config: {0}")]
    ConfigError(String),
    #[error("Cannot resolve refresh mode: {0}")]
    ModeResolutionError(String),
    #[error("Fetch failed: {0}")]
    FetchError(String),
    #[error("Transform failed: {0}")]
    TransformError(String),
    #[error("Write failed: {0}")]
    WriteError(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl SyncError {
    /// Short stage label used in reports and log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::ConfigError(_) => "config",
            SyncError::ModeResolutionError(_) => "mode",
            SyncError::FetchError(_) => "fetch",
            SyncError::TransformError(_) => "transform",
            SyncError::WriteError(_) => "write",
            SyncError::IoError(_) => "io",
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::IoError(err.to_string())
    }
}

impl From<serde_yaml::Error> for SyncError {
    fn from(err: serde_yaml::Error) -> Self {
        SyncError::ConfigError(err.to_string())
    }
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        SyncError::ConfigError(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::FetchError(err.without_url().to_string())
    }
}

impl From<zip::result::ZipError> for SyncError {
    fn from(err: zip::result::ZipError) -> Self {
        SyncError::FetchError(format!("export archive: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_stage() {
        let err = SyncError::FetchError("timeout".to_string());
        assert_eq!(err.to_string(), "Fetch failed: timeout");
        assert_eq!(err.kind(), "fetch");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.yaml");
        let err: SyncError = io.into();
        assert!(matches!(err, SyncError::IoError(msg) if msg.contains("missing.yaml")));
    }
}
