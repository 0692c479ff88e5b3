//! Loading models from JSON documents.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::{Model, ModelDocument};
use crate::error::ConfigError;

/// Parses a JSON model document and builds the model.
pub fn load_model_from_str(json: &str) -> Result<Model, ConfigError> {
    let doc: ModelDocument = serde_json::from_str(json).map_err(|e| ConfigError::Json {
        message: e.to_string(),
    })?;
    Model::from_document(&doc)
}

/// Reads and builds the model stored at `path`.
pub fn load_model_from_path(path: impl AsRef<Path>) -> Result<Model, ConfigError> {
    let path = path.as_ref();
    let json = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let model = load_model_from_str(&json)?;
    debug!(
        path = %path.display(),
        classes = model.classes().count(),
        associations = model.associations().count(),
        "model loaded"
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"key": "m", "domains": [{{"key": "d", "subdomains": [{{"key": "s", "classes": [{{"key": "A"}}]}}]}}]}}"#
        )
        .unwrap();
        let model = load_model_from_path(file.path()).unwrap();
        assert_eq!(model.key(), "m");
        assert!(model.class("A").is_some());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_model_from_path(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(
            load_model_from_str("{not json"),
            Err(ConfigError::Json { .. })
        ));
    }
}
