//! HTTP handlers grouped by resource.

pub mod goods;
pub mod merchant;
pub mod ops;
pub mod orders;
pub mod users;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses a path segment into one of the typed UUID ids.
pub(crate) fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = uuid::Error>,
{
    T::from_str(raw).map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}

/// Default number of rows for best-seller listings.
pub(crate) const DEFAULT_LIMIT: usize = 10;
