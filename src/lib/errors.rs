//! Custom error types for atlex operations.

use thiserror::Error;

/// Result type alias for atlex operations
pub type Result<T> = std::result::Result<T, AtlexError>;

/// Error type for atlex operations
#[derive(Error, Debug)]
pub enum AtlexError {
    /// A dataset read from the granule provider failed
    #[error("I/O failure reading '{dataset}': {reason}")]
    Io {
        /// Dataset path that failed
        dataset: String,
        /// Explanation of the failure
        reason: String,
    },

    /// The requested spatial region contains no photons on either beam
    #[error("spatial region contains no photons")]
    EmptyRegion,

    /// A joined ATL08 classification value was outside the defined classes
    #[error("invalid ATL08 classification: {value}")]
    Classification {
        /// The out-of-range classification value
        value: i8,
    },

    /// A record could not be posted to the outbound queue
    #[error("failed to post record to output queue: {reason}")]
    Post {
        /// Explanation of the failure
        reason: String,
    },

    /// A record buffer did not decode as the named record type
    #[error("malformed {rec_type} record: {reason}")]
    Malformed {
        /// Record type name
        rec_type: String,
        /// Explanation of the problem
        reason: String,
    },

    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },
}

impl AtlexError {
    /// Shorthand for an [`AtlexError::Io`] with owned strings.
    pub fn io(dataset: impl Into<String>, reason: impl Into<String>) -> Self {
        AtlexError::Io { dataset: dataset.into(), reason: reason.into() }
    }
}
