use std::any::Any;
use std::error::Error as StdError;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use lifecycle::{BoxError, LifecycleError};
use serde_json::json;
use thiserror::Error;

const APPLICATION_JSON_UTF8: &str = "application/json; charset=utf-8";

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime already started")]
    AlreadyStarted,
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// An error carrying the HTTP status it should be answered with.
///
/// Handlers return it directly, or wrap it further; [`status_from_error`] finds
/// the status anywhere in the source chain.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct HttpError {
    status: StatusCode,
    #[source]
    source: BoxError,
}

impl HttpError {
    pub fn new(message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            status,
            source: message.into().into(),
        }
    }

    pub fn wrap(err: impl Into<BoxError>, status: StatusCode) -> Self {
        Self {
            status,
            source: err.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        json_message(self.status, &self.source.to_string())
    }
}

/// First status carried by an [`HttpError`] in the chain of `err`, or 500.
pub fn status_from_error(err: &(dyn StdError + 'static)) -> StatusCode {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(http) = e.downcast_ref::<HttpError>() {
            return http.status;
        }
        current = e.source();
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Response for a handler that panicked. An error payload answers with its
/// own message and the status found in its chain.
pub(crate) fn panic_response(payload: Box<dyn Any + Send>) -> Response {
    let payload = match payload.downcast::<HttpError>() {
        Ok(err) => return err.into_response(),
        Err(payload) => payload,
    };
    let payload = match payload.downcast::<BoxError>() {
        Ok(err) => {
            let status = status_from_error(&**err);
            tracing::error!(error = %err, %status, "request handler panicked");
            return json_message(status, &err.to_string());
        }
        Err(payload) => payload,
    };

    let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown".to_string()
    };
    tracing::error!(panic = %message, "request handler panicked");
    json_message(
        StatusCode::INTERNAL_SERVER_ERROR,
        &format!("panic: {message}"),
    )
}

fn json_message(status: StatusCode, message: &str) -> Response {
    (
        status,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(APPLICATION_JSON_UTF8),
            ),
            (
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
        ],
        json!({ "message": message }).to_string(),
    )
        .into_response()
}
