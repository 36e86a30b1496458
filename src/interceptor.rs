//! Response interceptor: every outgoing response passes through
//! [`intercept`] exactly once and leaves as one of three outcomes:
//!
//! ```text
//! InputFailure  → {"status":"fail","message":"<msg> Silakan gunakan foto lain."}  (own status)
//! HttpFailure   → {"status":"fail","message":"<msg>"}                              (own status)
//! Success       → untouched
//! ```
//!
//! Handlers signal a failure by returning [`InputError`] (bad user input) or
//! [`HttpError`] (anything with its own HTTP status). Both tag the response
//! with a marker extension; the interceptor never inspects error types.
//! Errors the framework produces on its own (unknown path, wrong method,
//! extractor rejections, body too large) carry no marker and are recognised
//! as non-JSON 4xx/5xx responses; only a `text/plain` body is reused as
//! their message. Handler panics are caught and become a 500
//! [`HttpError`].

use std::any::Any;

use axum::Router;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{debug, error, warn};

/// Appended to every input-error message.
pub const INPUT_ERROR_HINT: &str = "Silakan gunakan foto lain.";

/// Message for recovered handler panics.
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal server error occurred";

/// Framework error bodies longer than this are not used as the message.
const MAX_ERROR_BODY_BYTES: usize = 4 * 1024;

// ── Envelope ──────────────────────────────────────────────────────────────────

/// Canonical JSON body for every classified failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    pub status: &'static str,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: "fail",
            message: message.into(),
        }
    }
}

// ── Handler-facing error types ────────────────────────────────────────────────

/// Invalid end-user input (bad upload, unsupported file type, ...).
///
/// The client receives `message` plus [`INPUT_ERROR_HINT`]. A status outside
/// 4xx/5xx is replaced by 400.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct InputError {
    message: String,
    status_code: StatusCode,
}

impl InputError {
    pub fn new(status_code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: error_status_or(status_code, StatusCode::BAD_REQUEST),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }
}

impl IntoResponse for InputError {
    fn into_response(self) -> Response {
        let mut response = (self.status_code, self.message.clone()).into_response();
        response
            .extensions_mut()
            .insert(InputFailureMarker { message: self.message });
        response
    }
}

/// Error carrying its own HTTP status; the client receives `message` as-is.
/// A status outside 4xx/5xx is replaced by 500.
#[derive(Debug, Clone, Error)]
#[error("{status}: {message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: error_status_or(status, StatusCode::INTERNAL_SERVER_ERROR),
            message: message.into(),
        }
    }

    /// Error whose message is the status' canonical reason.
    pub fn from_status(status: StatusCode) -> Self {
        let status = error_status_or(status, StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, canonical_message(status))
    }

    pub fn not_found() -> Self {
        Self::from_status(StatusCode::NOT_FOUND)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.message.clone()).into_response();
        response
            .extensions_mut()
            .insert(HttpFailureMarker { message: self.message });
        response
    }
}

fn error_status_or(status: StatusCode, fallback: StatusCode) -> StatusCode {
    if status.is_client_error() || status.is_server_error() {
        status
    } else {
        fallback
    }
}

fn canonical_message(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("Error").to_string()
}

#[derive(Debug, Clone)]
struct InputFailureMarker {
    message: String,
}

#[derive(Debug, Clone)]
struct HttpFailureMarker {
    message: String,
}

// ── Classification ────────────────────────────────────────────────────────────

/// What the interceptor decided about one response.
#[derive(Debug)]
pub enum Outcome {
    InputFailure {
        status: StatusCode,
        message: String,
        headers: HeaderMap,
    },
    HttpFailure {
        status: StatusCode,
        message: String,
        headers: HeaderMap,
    },
    Success(Response),
}

/// Sort a response into exactly one [`Outcome`]. An input-error marker wins
/// over everything else.
pub async fn classify(response: Response) -> Outcome {
    let status = response.status();

    let input = response.extensions().get::<InputFailureMarker>().cloned();
    if let Some(InputFailureMarker { message }) = input {
        let (parts, _) = response.into_parts();
        return Outcome::InputFailure {
            status,
            message,
            headers: parts.headers,
        };
    }

    let http = response.extensions().get::<HttpFailureMarker>().cloned();
    if let Some(HttpFailureMarker { message }) = http {
        let (parts, _) = response.into_parts();
        return Outcome::HttpFailure {
            status,
            message,
            headers: parts.headers,
        };
    }

    let is_error = status.is_client_error() || status.is_server_error();
    if !is_error || is_json(response.headers()) {
        return Outcome::Success(response);
    }

    let (parts, body) = response.into_parts();
    let message = framework_message(status, &parts.headers, body).await;
    Outcome::HttpFailure {
        status,
        message,
        headers: parts.headers,
    }
}

/// Turn an [`Outcome`] back into the response sent to the client.
pub fn render(outcome: Outcome) -> Response {
    match outcome {
        Outcome::InputFailure {
            status,
            message,
            headers,
        } => {
            debug!(%status, %message, "input error rewritten");
            envelope(status, format!("{message} {INPUT_ERROR_HINT}"), headers)
        }
        Outcome::HttpFailure {
            status,
            message,
            headers,
        } => {
            if status.is_server_error() {
                warn!(%status, %message, "server error rewritten");
            } else {
                debug!(%status, %message, "http error rewritten");
            }
            envelope(status, message, headers)
        }
        Outcome::Success(response) => response,
    }
}

/// Classify and render one response.
pub async fn intercept(response: Response) -> Response {
    render(classify(response).await)
}

/// Middleware installed on the router: runs the rest of the stack, then
/// [`intercept`]s whatever it produced.
pub async fn intercept_layer(request: Request, next: Next) -> Response {
    intercept(next.run(request).await).await
}

fn envelope(status: StatusCode, message: String, mut headers: HeaderMap) -> Response {
    headers.remove(header::CONTENT_TYPE);
    headers.remove(header::CONTENT_LENGTH);

    let mut response = (status, Json(ErrorEnvelope::fail(message))).into_response();
    response.headers_mut().extend(headers);
    response
}

/// Bare media type of the response, lowercased, without parameters.
fn media_type(headers: &HeaderMap) -> Option<String> {
    let ct = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let mime = ct.split(';').next().unwrap_or("").trim();
    Some(mime.to_ascii_lowercase())
}

fn is_json(headers: &HeaderMap) -> bool {
    media_type(headers)
        .map(|mime| mime == "application/json" || mime.ends_with("+json"))
        .unwrap_or(false)
}

fn is_plain_text(headers: &HeaderMap) -> bool {
    media_type(headers).is_some_and(|mime| mime == "text/plain")
}

/// The framework's own `text/plain` body, or the canonical reason when the
/// body is of another type, empty, not UTF-8 or unreadable.
async fn framework_message(status: StatusCode, headers: &HeaderMap, body: Body) -> String {
    if !is_plain_text(headers) {
        return canonical_message(status);
    }
    match axum::body::to_bytes(body, MAX_ERROR_BODY_BYTES).await {
        Ok(bytes) => match std::str::from_utf8(&bytes) {
            Ok(text) if !text.trim().is_empty() => return text.trim().to_string(),
            Ok(_) => {}
            Err(e) => debug!(%status, "framework error body is not UTF-8: {e}"),
        },
        Err(e) => debug!(%status, "framework error body unreadable: {e}"),
    }
    canonical_message(status)
}

// ── Installation ──────────────────────────────────────────────────────────────

/// Fallback for paths no route matches.
pub async fn not_found() -> HttpError {
    HttpError::not_found()
}

/// Converts a caught handler panic into a 500 [`HttpError`] response.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    error!(%detail, "request handler panicked");
    HttpError::internal().into_response()
}

/// Wrap `router` so every response it produces, including the not-found
/// fallback, extractor rejections and panics, passes through [`intercept`].
pub fn install<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(intercept_layer))
}
