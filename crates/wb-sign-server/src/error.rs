// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use warp::http::StatusCode;

/// Unified error taxonomy for the service. Every handler converts whatever
/// it fails with into one of these kinds so that the rejection filter can
/// render the standard `{code, message, data}` envelope without needing to
/// know about handler-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Input(String),

    #[error("{0}")]
    Auth(String),

    #[error("not found")]
    NotFound,

    #[error("answer mismatch or quiz missing")]
    QuizMismatch,

    #[error("question expired")]
    Expired,

    #[error("secret store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("ffi error: {0}")]
    Ffi(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Panic(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Input(_) => StatusCode::BAD_REQUEST,
            ServiceError::Auth(_) => StatusCode::UNAUTHORIZED,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::QuizMismatch => StatusCode::NOT_ACCEPTABLE,
            ServiceError::Expired => StatusCode::GONE,
            ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Ffi(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Panic(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl warp::reject::Reject for ServiceError {}

/// The `{code, message, data}` envelope every HTTP response is wrapped in.
#[derive(Debug, Serialize)]
pub struct ResponseEntity<T: Serialize> {
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ResponseEntity<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            message: "OK".to_string(),
            data: Some(data),
        }
    }
}

/// `warp::reply::json` sets `Content-Type: application/json` with no
/// charset; the HTTP API always responds `application/json; charset=utf-8`,
/// so every envelope is built through this helper instead of
/// `warp::reply::json` directly.
type JsonReply = warp::reply::WithHeader<warp::reply::Json>;

fn json_reply<T: Serialize>(body: &T) -> JsonReply {
    warp::reply::with_header(
        warp::reply::json(body),
        "Content-Type",
        "application/json; charset=utf-8",
    )
}

impl ResponseEntity<()> {
    pub fn ko(status: StatusCode, message: impl Into<String>) -> warp::reply::WithStatus<JsonReply> {
        let message = message.into();
        let message = if message.is_empty() {
            status.canonical_reason().unwrap_or("error").to_string()
        } else {
            message
        };
        warp::reply::with_status(
            json_reply(&ResponseEntity::<()> {
                code: status.as_u16(),
                message,
                data: None,
            }),
            status,
        )
    }
}

pub fn reply_ok<T: Serialize>(data: T) -> warp::reply::WithStatus<JsonReply> {
    warp::reply::with_status(json_reply(&ResponseEntity::ok(data)), StatusCode::OK)
}

/// Converts a rejected filter chain into the standard envelope. Installed as
/// the final `.recover()` stage of every route tree (see `routes.rs`).
pub async fn handle_rejection(
    err: warp::Rejection,
) -> Result<warp::reply::WithStatus<JsonReply>, std::convert::Infallible> {
    if let Some(service_err) = err.find::<ServiceError>() {
        let status = service_err.status_code();
        if status.is_server_error() {
            tracing::error!(error = %service_err, "request failed");
        } else {
            tracing::warn!(error = %service_err, "request rejected");
        }
        return Ok(ResponseEntity::ko(status, service_err.to_string()));
    }

    if err.is_not_found() {
        return Ok(ResponseEntity::ko(StatusCode::NOT_FOUND, ""));
    }

    if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        return Ok(ResponseEntity::ko(StatusCode::BAD_REQUEST, e.to_string()));
    }

    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(ResponseEntity::ko(StatusCode::METHOD_NOT_ALLOWED, ""));
    }

    tracing::error!(?err, "unhandled rejection");
    Ok(ResponseEntity::ko(StatusCode::INTERNAL_SERVER_ERROR, ""))
}
