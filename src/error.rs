//! Typed errors callers need to match on.
//!
//! Most of the crate propagates `anyhow::Error`; the conditions below are the
//! ones a caller has to tell apart (for example to decide on a forced rebuild),
//! so they travel inside the `anyhow::Error` and can be recovered with
//! `downcast_ref::<IndexError>()`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The index database is missing its schema, from an incompatible
    /// version, or corrupt. Never rebuilt implicitly.
    #[error("index unavailable at {path}: {reason}. Run `repo-intel index --rebuild` to recreate it")]
    Unavailable { path: PathBuf, reason: String },

    /// A query named a file the index has no record of.
    #[error("file is not indexed: {0}")]
    FileNotIndexed(String),
}

impl IndexError {
    /// True if `err` (or anything in its chain) is an unavailable-index error.
    pub fn is_unavailable(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<IndexError>(),
                Some(IndexError::Unavailable { .. })
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_detected_through_context() {
        let err = anyhow::Error::new(IndexError::Unavailable {
            path: PathBuf::from("/tmp/x/index.db"),
            reason: "file is not a database".into(),
        })
        .context("opening index");
        assert!(IndexError::is_unavailable(&err));

        let other = anyhow::anyhow!("something else");
        assert!(!IndexError::is_unavailable(&other));
    }
}
