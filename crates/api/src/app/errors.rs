use std::str::FromStr;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use bazaar_core::{DomainError, DomainResult};
use bazaar_infra::OrderServiceError;

const INTERNAL_MESSAGE: &str = "internal server error";

pub fn service_error_to_response(err: OrderServiceError) -> axum::response::Response {
    match err {
        OrderServiceError::Domain(e) => domain_error_to_response(e),
        OrderServiceError::Store(e) => {
            tracing::error!(error = %e, "order store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", INTERNAL_MESSAGE)
        }
        OrderServiceError::Timeout(limit) => json_error(
            StatusCode::GATEWAY_TIMEOUT,
            "timeout",
            format!("operation did not finish within {} ms", limit.as_millis()),
        ),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::InvariantViolation(msg) => {
            tracing::error!(error = %msg, "domain invariant violated");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", INTERNAL_MESSAGE)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "code": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Serialize a mapped body, or answer with the mapping failure.
pub fn json_or_error(body: DomainResult<serde_json::Value>) -> axum::response::Response {
    match body {
        Ok(body) => axum::Json(body).into_response(),
        Err(e) => domain_error_to_response(e),
    }
}

/// Parse a path identifier, answering 400 `invalid_id` on failure.
pub fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, axum::response::Response> {
    raw.parse::<T>()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

/// Map a body/query extractor rejection onto the common error shape.
pub fn rejection_to_response(rejection: impl IntoResponse + std::fmt::Display) -> axum::response::Response {
    let message = rejection.to_string();
    let status = rejection.into_response().status();
    let status = if status.is_client_error() { StatusCode::BAD_REQUEST } else { status };
    json_error(status, "invalid_request", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bazaar_core::OrderId;
    use bazaar_infra::StoreError;

    #[test]
    fn domain_errors_map_to_client_statuses() {
        let cases = [
            (DomainError::validation("x"), StatusCode::BAD_REQUEST),
            (DomainError::invalid_id("x"), StatusCode::BAD_REQUEST),
            (DomainError::not_found("order"), StatusCode::NOT_FOUND),
            (DomainError::conflict("x"), StatusCode::CONFLICT),
            (DomainError::invariant("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn store_and_timeout_errors_do_not_leak_details() {
        let store = service_error_to_response(OrderServiceError::Store(StoreError::Backend(
            "password authentication failed".to_string(),
        )));
        assert_eq!(store.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let timeout = service_error_to_response(OrderServiceError::Timeout(Duration::from_millis(5)));
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn bad_ids_become_invalid_id_responses() {
        assert!(parse_id::<OrderId>("nope", "order").is_err());
        let id = OrderId::new();
        assert_eq!(parse_id::<OrderId>(&id.to_string(), "order").unwrap(), id);
    }
}
