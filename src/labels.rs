use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Fixed mapping between model class indices and emotion names. Loaded once
/// at pipeline construction and shared read-only across all models and
/// requests.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelEncoding {
    classes: Vec<String>,
}

impl LabelEncoding {
    pub fn new(classes: Vec<String>) -> Self {
        Self { classes }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| Error::ArtifactLoad {
            what: "label encoding",
            source: Box::new(e),
        })?;
        let encoding: Self = serde_json::from_str(&raw).map_err(|e| Error::ArtifactLoad {
            what: "label encoding",
            source: Box::new(e),
        })?;
        if encoding.classes.is_empty() {
            return Err(Error::ArtifactLoad {
                what: "label encoding",
                source: "no classes defined".into(),
            });
        }
        tracing::info!(classes = encoding.classes.len(), "label encoding loaded");
        Ok(encoding)
    }

    pub fn decode(&self, index: usize) -> Result<&str> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or(Error::UnknownClassIndex {
                index,
                num_classes: self.classes.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoding() -> LabelEncoding {
        LabelEncoding::new(vec!["angry".into(), "calm".into(), "happy".into(), "sad".into()])
    }

    #[test]
    fn decodes_known_indices() {
        assert_eq!(encoding().decode(0).unwrap(), "angry");
        assert_eq!(encoding().decode(3).unwrap(), "sad");
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let err = encoding().decode(4).unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownClassIndex {
                index: 4,
                num_classes: 4
            }
        ));
    }

    #[test]
    fn loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("label_encoder.json");
        std::fs::write(&path, r#"{"classes": ["angry", "happy"]}"#).unwrap();

        let encoding = LabelEncoding::load(&path).unwrap();
        assert_eq!(encoding.len(), 2);
        assert_eq!(encoding.decode(1).unwrap(), "happy");
    }

    #[test]
    fn empty_class_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("label_encoder.json");
        std::fs::write(&path, r#"{"classes": []}"#).unwrap();
        assert!(LabelEncoding::load(&path).is_err());
    }
}
