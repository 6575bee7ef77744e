use crate::error::{Result, TxnError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Kind of mutation an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Rename,
    Copy,
    Delete,
}

impl OperationType {
    /// Whether the operation needs a target path.
    pub fn has_target(self) -> bool {
        matches!(self, OperationType::Rename | OperationType::Copy)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationType::Rename => "rename",
            OperationType::Copy => "copy",
            OperationType::Delete => "delete",
        };
        f.pad(name)
    }
}

/// Per-operation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationMetadata {
    /// Caller's confidence in the operation, in `[0, 1]`.
    pub confidence: f64,
    /// Overwrite an existing target.
    pub force: bool,
    /// Copy the file aside before mutating it.
    pub create_backup: bool,
}

impl Default for OperationMetadata {
    fn default() -> Self {
        Self {
            confidence: 1.0,
            force: false,
            create_backup: false,
        }
    }
}

/// A single queued file mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOperation {
    #[serde(rename = "type")]
    pub op_type: OperationType,
    pub source: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,
    #[serde(default)]
    pub metadata: OperationMetadata,
}

impl FileOperation {
    pub fn rename(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self::with_target(OperationType::Rename, source.into(), target.into())
    }

    pub fn copy(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self::with_target(OperationType::Copy, source.into(), target.into())
    }

    pub fn delete(source: impl Into<PathBuf>) -> Self {
        Self {
            op_type: OperationType::Delete,
            source: source.into(),
            target: None,
            metadata: OperationMetadata::default(),
        }
    }

    fn with_target(op_type: OperationType, source: PathBuf, target: PathBuf) -> Self {
        Self {
            op_type,
            source,
            target: Some(target),
            metadata: OperationMetadata::default(),
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.metadata.force = force;
        self
    }

    pub fn create_backup(mut self, create_backup: bool) -> Self {
        self.metadata.create_backup = create_backup;
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.metadata.confidence = confidence;
        self
    }

    /// Target path, for operations that have one.
    pub fn target_path(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    /// Whether the operation destroys data at its source.
    pub fn is_destructive(&self) -> bool {
        self.op_type == OperationType::Delete
    }

    /// Checks the structural invariants that do not depend on disk state.
    pub fn check(&self) -> Result<()> {
        if !self.source.is_absolute() {
            return Err(TxnError::InvalidOperation(format!(
                "source must be an absolute path: {}",
                self.source.display()
            )));
        }

        if !(0.0..=1.0).contains(&self.metadata.confidence) {
            return Err(TxnError::InvalidOperation(format!(
                "confidence {} is outside [0, 1]",
                self.metadata.confidence
            )));
        }

        match (self.op_type.has_target(), &self.target) {
            (true, None) => Err(TxnError::InvalidOperation(format!(
                "{} of {} requires a target",
                self.op_type,
                self.source.display()
            ))),
            (true, Some(target)) if !target.is_absolute() => Err(TxnError::InvalidOperation(
                format!("target must be an absolute path: {}", target.display()),
            )),
            (true, Some(target)) if *target == self.source => Err(TxnError::InvalidOperation(
                format!("target equals source: {}", target.display()),
            )),
            (false, Some(target)) => Err(TxnError::InvalidOperation(format!(
                "delete takes no target (got {})",
                target.display()
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(
                f,
                "{} {} → {}",
                self.op_type,
                self.source.display(),
                target.display()
            ),
            None => write!(f, "{} {}", self.op_type, self.source.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    const ROOT: &str = "/tmp";
    #[cfg(windows)]
    const ROOT: &str = "C:\\tmp";

    fn abs(name: &str) -> PathBuf {
        Path::new(ROOT).join(name)
    }

    #[test]
    fn test_constructors_set_target() {
        let op = FileOperation::rename(abs("a"), abs("b"));
        assert_eq!(op.op_type, OperationType::Rename);
        assert_eq!(op.target_path(), Some(abs("b").as_path()));

        let op = FileOperation::delete(abs("a"));
        assert!(op.target.is_none());
        assert!(op.is_destructive());
    }

    #[test]
    fn test_check_accepts_valid_operations() {
        assert!(FileOperation::rename(abs("a"), abs("b")).check().is_ok());
        assert!(FileOperation::copy(abs("a"), abs("b")).check().is_ok());
        assert!(FileOperation::delete(abs("a")).check().is_ok());
    }

    #[test]
    fn test_check_rejects_same_source_and_target() {
        let op = FileOperation::copy(abs("a"), abs("a"));
        assert!(matches!(op.check(), Err(TxnError::InvalidOperation(_))));
    }

    #[test]
    fn test_check_rejects_relative_paths() {
        let op = FileOperation::rename("a.txt", abs("b"));
        assert!(matches!(op.check(), Err(TxnError::InvalidOperation(_))));

        let op = FileOperation::rename(abs("a"), "b.txt");
        assert!(matches!(op.check(), Err(TxnError::InvalidOperation(_))));
    }

    #[test]
    fn test_check_rejects_delete_with_target() {
        let mut op = FileOperation::delete(abs("a"));
        op.target = Some(abs("b"));
        assert!(matches!(op.check(), Err(TxnError::InvalidOperation(_))));
    }

    #[test]
    fn test_check_rejects_missing_target() {
        let mut op = FileOperation::rename(abs("a"), abs("b"));
        op.target = None;
        assert!(matches!(op.check(), Err(TxnError::InvalidOperation(_))));
    }

    #[test]
    fn test_check_rejects_confidence_out_of_range() {
        let op = FileOperation::delete(abs("a")).confidence(1.5);
        assert!(matches!(op.check(), Err(TxnError::InvalidOperation(_))));
    }

    #[test]
    fn test_deserialize_plan_entry() {
        let json = r#"{
            "type": "copy",
            "source": "/data/a.txt",
            "target": "/data/b.txt",
            "metadata": { "confidence": 0.8, "force": true }
        }"#;

        let op: FileOperation = serde_json::from_str(json).unwrap();
        assert_eq!(op.op_type, OperationType::Copy);
        assert!(op.metadata.force);
        assert!(!op.metadata.create_backup);
        assert_eq!(op.metadata.confidence, 0.8);
    }

    #[test]
    fn test_deserialize_without_metadata_uses_defaults() {
        let op: FileOperation =
            serde_json::from_str(r#"{ "type": "delete", "source": "/data/a.txt" }"#).unwrap();
        assert_eq!(op.metadata, OperationMetadata::default());
    }
}
