// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatcherError {
    /// The batcher is shutting down and does not admit new jobs.
    SubmissionRejected,
    /// A configuration value is out of range.
    InvalidConfig(String),
}

impl std::fmt::Display for BatcherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatcherError::SubmissionRejected => {
                write!(f, "failed to add job; batcher is shutting down")
            }
            BatcherError::InvalidConfig(reason) => write!(f, "invalid batcher config: {reason}"),
        }
    }
}

impl std::error::Error for BatcherError {}
