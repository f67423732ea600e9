//! Result type aliases for relayq.

use crate::RelayError;

/// A specialized `Result` type for relayq operations.
pub type RelayResult<T> = Result<T, RelayError>;
