use axum::{
    body::Body,
    http::{Response as HttpResponse, StatusCode},
    response::Response,
};
use iam_protocol::{serialize_json, ErrorEnvelope};
use serde::Serialize;

pub(crate) fn error_response(code: &str, message: impl Into<String>) -> ErrorEnvelope {
    let hint = match code {
        "missing_signature" => {
            "Configure the webhook secret in GitHub so deliveries carry X-Hub-Signature-256."
        }
        "unauthorized" => {
            "The webhook secret in GitHub must match IAM_FINDER_WEBHOOK_SECRET on the server."
        }
        "invalid_request" => "Send a GitHub pull_request event payload as JSON.",
        "busy" => "Too many policy runs are queued; redeliver the event later.",
        _ => "Check the server logs for details.",
    };
    ErrorEnvelope::new(code, message).with_hint(hint)
}

pub(crate) fn build_response<T: Serialize>(
    status: StatusCode,
    body: &T,
) -> Result<Response, StatusCode> {
    let bytes = serialize_json(body)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .into_bytes();

    HttpResponse::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(bytes))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

pub(crate) fn build_error(
    status: StatusCode,
    code: &str,
    message: impl Into<String>,
) -> Result<Response, StatusCode> {
    build_response(status, &error_response(code, message))
}
