use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Type,
    Method,
    Field,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchKind::Type => f.write_str("type"),
            MatchKind::Method => f.write_str("method"),
            MatchKind::Field => f.write_str("field"),
        }
    }
}

/// Errors that abort a merge. Absence of evidence is never an error; these
/// only signal a broken ledger invariant.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("confirmed {kind} match for {old} without a target")]
    UnsetTarget { kind: MatchKind, old: String },
    #[error("{kind} target {new} of {old} is already claimed")]
    TargetClaimed {
        kind: MatchKind,
        old: String,
        new: String,
    },
}
