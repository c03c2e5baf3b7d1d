//! Reconciliation of a local document with its shared counterpart.
//!
//! When a file joins a session the engine reports the content it holds for
//! that path. Identical content binds straight away; anything else waits for
//! an explicit decision from the user. A [`Resolution`] moves forward only
//! by consuming itself, so a decided outcome can never be revised.

use thiserror::Error;

/// Error type for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// `resume` was called on an outcome that is already final.
    #[error("resolution already decided")]
    AlreadyDecided,
}

/// Outcome of reconciling one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Content agreed (or the user accepted one side). Holds the text the
    /// binding starts from.
    Accepted(String),
    /// Local and remote differ; waiting for the user.
    PendingMerge {
        /// Text in the local editor.
        local: String,
        /// Text held by the shared session.
        remote: String,
    },
    /// The user declined to bind this document.
    Cancelled,
}

/// The user's answer to a pending merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeDecision {
    /// Keep what is in the local editor.
    KeepLocal,
    /// Take the shared content.
    KeepRemote,
    /// A hand-merged text.
    Merged(String),
    /// Do not bind the document.
    Cancel,
}

impl Resolution {
    /// Compare local and remote content. Equality is exact: no whitespace or
    /// line-ending normalization.
    pub fn compare(local: &str, remote: &str) -> Self {
        if local == remote {
            Self::Accepted(local.to_owned())
        } else {
            Self::PendingMerge {
                local: local.to_owned(),
                remote: remote.to_owned(),
            }
        }
    }

    /// Apply the user's decision to a pending merge.
    pub fn resume(self, decision: MergeDecision) -> Result<Self, ReconcileError> {
        let Self::PendingMerge { local, remote } = self else {
            return Err(ReconcileError::AlreadyDecided);
        };
        Ok(match decision {
            MergeDecision::KeepLocal => Self::Accepted(local),
            MergeDecision::KeepRemote => Self::Accepted(remote),
            MergeDecision::Merged(text) => Self::Accepted(text),
            MergeDecision::Cancel => Self::Cancelled,
        })
    }

    /// Whether no further decision is needed.
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::PendingMerge { .. })
    }

    /// Whether the document ends up bound.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// The accepted content, if any.
    pub fn accepted_content(&self) -> Option<&str> {
        match self {
            Self::Accepted(content) => Some(content),
            _ => None,
        }
    }
}
