use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("destination folder does not exist: {}", .0.display())]
    DestinationMissing(PathBuf),
    #[error("destination folder is the source root: {}", .0.display())]
    DestinationIsSource(PathBuf),
    #[error("cannot traverse {}: {source}", path.display())]
    Traversal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write ledger {}: {message}", path.display())]
    Ledger { path: PathBuf, message: String },
    #[error("run cancelled before relocation")]
    Cancelled,
}

impl TriageError {
    pub fn exit_code(&self) -> i32 {
        match self {
            TriageError::NotADirectory(_)
            | TriageError::DestinationMissing(_)
            | TriageError::DestinationIsSource(_)
            | TriageError::Ledger { .. } => 1,
            TriageError::Traversal { .. } => 2,
            TriageError::Cancelled => 130,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TriageError;
    use std::path::PathBuf;

    #[test]
    fn precondition_failures_exit_with_one() {
        assert_eq!(TriageError::NotADirectory(PathBuf::from("/x")).exit_code(), 1);
        assert_eq!(
            TriageError::DestinationMissing(PathBuf::from("/q")).exit_code(),
            1
        );
        assert_eq!(
            TriageError::DestinationIsSource(PathBuf::from("/m")).exit_code(),
            1
        );
        let err = TriageError::Ledger {
            path: PathBuf::from("/l/ledger.json"),
            message: "read-only file system".to_string(),
        };
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn traversal_failure_exits_with_two() {
        let err = TriageError::Traversal {
            path: PathBuf::from("/m"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("/m"));
    }
}
