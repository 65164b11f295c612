//! Defines the error types used throughout ratset.
use std::fmt;

/// The primary error enum for all fallible operations in ratset.
///
/// Domain-level absence (an unknown member, an empty range, a missing key) is
/// never an error: those cases are expressed through `Option`, `bool`, and
/// empty `Vec` returns. The only fallible surface is score construction, which
/// rejects malformed input before it can reach a sorted set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The given text (or non-finite float) could not be converted into an
    /// exact rational score.
    InvalidScore(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidScore(input) => write!(f, "invalid score: {:?}", input),
        }
    }
}

impl std::error::Error for Error {}
