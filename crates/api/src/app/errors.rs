use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use worklane_core::DomainError;
use worklane_events::DispatchError;

/// The only message a 404 ever carries; it must not hint at other tenants' rows.
pub const NOT_FOUND_MESSAGE: &str = "resource not found";

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::Unauthorized => json_error(StatusCode::UNAUTHORIZED, "unauthorized", "unauthorized"),
        DomainError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", NOT_FOUND_MESSAGE),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::Infrastructure(msg) => {
            tracing::error!(error = %msg, "infrastructure failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Domain(e) => domain_error_to_response(e),
        // Fully undone: report the cause as if nothing had been applied.
        DispatchError::PartialFailure {
            compensated: true,
            source,
            ..
        } => domain_error_to_response(source),
        DispatchError::PartialFailure {
            step,
            compensated: false,
            source,
        } => {
            tracing::error!(step, error = %source, "mutation left a flagged partial state");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "partial_failure",
                format!("step '{step}' failed; partial state was flagged"),
            )
        }
        DispatchError::NoHandler(name) | DispatchError::DuplicateHandler(name) => {
            tracing::error!(mutation = name, "mutation routing misconfigured");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
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
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_the_error_taxonomy_to_statuses() {
        let cases = [
            (DomainError::validation("x"), StatusCode::BAD_REQUEST),
            (DomainError::invalid_id("x"), StatusCode::BAD_REQUEST),
            (DomainError::Unauthorized, StatusCode::UNAUTHORIZED),
            (DomainError::forbidden("x"), StatusCode::FORBIDDEN),
            (DomainError::NotFound, StatusCode::NOT_FOUND),
            (DomainError::conflict("x"), StatusCode::CONFLICT),
            (DomainError::infrastructure("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn compensated_partial_failure_reports_its_cause() {
        let err = DispatchError::PartialFailure {
            step: "roles",
            compensated: true,
            source: DomainError::conflict("dup"),
        };
        assert_eq!(dispatch_error_to_response(err).status(), StatusCode::CONFLICT);

        let err = DispatchError::PartialFailure {
            step: "roles",
            compensated: false,
            source: DomainError::conflict("dup"),
        };
        assert_eq!(
            dispatch_error_to_response(err).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
