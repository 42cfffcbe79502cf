use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{json, Map, Value};

use imprint_core::DomainError;
use imprint_infra::StoreError;

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let (status, body) = domain_error_body(&err);
    (status, axum::Json(Value::Object(body))).into_response()
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Domain(e) => domain_error_to_response(e),
        StoreError::Backend(msg) => {
            tracing::error!(error = %msg, "storage backend failure");
            json_error(StatusCode::BAD_REQUEST, "error", msg)
        }
        StoreError::Batch { index, source } => {
            // Any row failure fails the whole batch with 400.
            let mut body = match source.root() {
                StoreError::Domain(e) => domain_error_body(e).1,
                other => message_body("error", other.to_string()),
            };
            body.insert("index".into(), json!(index));
            (StatusCode::BAD_REQUEST, axum::Json(Value::Object(body))).into_response()
        }
    }
}

fn domain_error_body(err: &DomainError) -> (StatusCode, Map<String, Value>) {
    match err {
        DomainError::Validation { field, message } => {
            let mut body = message_body("validation_error", message.clone());
            if let Some(field) = field {
                body.insert("field".into(), json!(field));
            }
            (StatusCode::BAD_REQUEST, body)
        }
        DomainError::NotFound { .. } => {
            (StatusCode::NOT_FOUND, message_body("not_found", err.to_string()))
        }
        DomainError::Integrity(msg) => {
            (StatusCode::BAD_REQUEST, message_body("integrity_error", msg.clone()))
        }
        DomainError::InvariantViolation(msg) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            message_body("invariant_violation", msg.clone()),
        ),
        DomainError::Conflict(msg) => (StatusCode::CONFLICT, message_body("conflict", msg.clone())),
    }
}

fn message_body(code: &str, message: String) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("error".into(), json!(code));
    body.insert("message".into(), json!(message));
    body
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
    fn statuses_follow_error_kind() {
        let cases = [
            (DomainError::field("amount", "must be positive"), StatusCode::BAD_REQUEST),
            (DomainError::not_found("invoice", 3), StatusCode::NOT_FOUND),
            (DomainError::integrity("still referenced"), StatusCode::BAD_REQUEST),
            (DomainError::conflict("duplicate"), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn batch_failures_are_bad_requests() {
        let err = StoreError::from(DomainError::not_found("payment", 7)).at_row(2);
        assert_eq!(store_error_to_response(err).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn validation_body_names_the_field() {
        let (_, body) = domain_error_body(&DomainError::field("quantity", "required"));
        assert_eq!(body["field"], "quantity");
        assert_eq!(body["error"], "validation_error");
    }
}
