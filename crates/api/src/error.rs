//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use reports::ReportError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The identity headers are missing or malformed.
    Unauthorized(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Report error.
    Report(ReportError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Report(err) => report_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::InsufficientStock { .. }
        | DomainError::Order(_)
        | DomainError::GoodsReferenced { .. } => StatusCode::CONFLICT,
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::Forbidden { .. } => StatusCode::FORBIDDEN,
        DomainError::Store(store_err) => store_status(store_err),
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Conflict { .. } => StatusCode::CONFLICT,
        StoreError::RowNotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    (domain_status(&err), err.to_string())
}

fn report_error_to_response(err: ReportError) -> (StatusCode, String) {
    let status = match &err {
        ReportError::Domain(domain_err) => domain_status(domain_err),
        ReportError::Store(store_err) => store_status(store_err),
        ReportError::InvalidRange { .. } => StatusCode::BAD_REQUEST,
    };
    (status, err.to_string())
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        ApiError::Report(err)
    }
}

#[cfg(test)]
mod tests {
    use common::{GoodsId, OrderStatus, UserId};
    use domain::{Action, LifecycleEvent, OrderError};

    use super::*;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_domain_error_statuses() {
        let goods_id = GoodsId::new();
        assert_eq!(
            status_of(DomainError::NotFound {
                entity: "goods",
                id: goods_id.to_string(),
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(DomainError::InsufficientStock {
                goods_id,
                requested: 3,
                remaining: 1,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DomainError::Order(OrderError::InvalidStateTransition {
                current: OrderStatus::PendingPayment,
                requested: LifecycleEvent::Ship,
            })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DomainError::GoodsReferenced { goods_id }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DomainError::Validation("empty order".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(DomainError::Forbidden {
                user_id: UserId::new(),
                action: Action::ShipOrder,
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(DomainError::Store(StoreError::InvalidRow {
                table: "goods",
                reason: "negative remaining".into(),
            })),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_report_errors_unwrap_domain_status() {
        let forbidden = ReportError::Domain(DomainError::Forbidden {
            user_id: UserId::new(),
            action: Action::ViewMerchantData,
        });
        assert_eq!(status_of(forbidden), StatusCode::FORBIDDEN);

        let now = chrono::Utc::now();
        let inverted = ReportError::InvalidRange {
            from: now,
            to: now - chrono::Duration::days(1),
        };
        assert_eq!(status_of(inverted), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unauthorized() {
        assert_eq!(
            ApiError::Unauthorized("missing X-User-Id".into())
                .into_response()
                .status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
