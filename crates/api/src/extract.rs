//! Request extractors.

use std::str::FromStr;

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::{Role, UserId};
use domain::Principal;

use crate::error::ApiError;

/// Header carrying the caller's user id, set by the upstream identity layer.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's role (`CUSTOMER` or `MERCHANT`).
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller of a request.
///
/// Requests without valid identity headers are rejected with 401.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Principal);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match principal_from_headers(&parts.headers) {
            Ok(principal) => Ok(CurrentUser(principal)),
            Err(err) => {
                metrics::counter!("http_unauthorized_total").increment(1);
                Err(err)
            }
        }
    }
}

/// Anonymous callers send neither identity header and extract as `None`.
/// Headers that are present but malformed are still rejected with 401.
impl<S> OptionalFromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let headers = &parts.headers;
        if !headers.contains_key(USER_ID_HEADER) && !headers.contains_key(USER_ROLE_HEADER) {
            return Ok(None);
        }
        <CurrentUser as FromRequestParts<S>>::from_request_parts(parts, state)
            .await
            .map(Some)
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ApiError> {
    let value = headers
        .get(name)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {name} header")))?;
    value
        .to_str()
        .map(str::trim)
        .map_err(|_| ApiError::Unauthorized(format!("{name} header is not valid text")))
}

/// Reads the principal from the identity headers.
pub fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, ApiError> {
    let user_id = UserId::from_str(header(headers, USER_ID_HEADER)?)
        .map_err(|e| ApiError::Unauthorized(format!("invalid {USER_ID_HEADER}: {e}")))?;
    let role = Role::from_str(&header(headers, USER_ROLE_HEADER)?.to_ascii_uppercase())
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;
    Ok(Principal::new(user_id, role))
}
