use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    RequestTimedOut,
    Rendering,
    /// A collaborator (store, bus, workflow engine) failed.
    Upstream,
    Internal,
}

/// Every failure in the resolution pipeline.
///
/// `status` is only set when the failure already knows how it should be
/// reported; the HTTP boundary turns anything without one into a 500.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct KernelError {
    pub kind: ErrorKind,
    pub status: Option<StatusCode>,
    pub message: String,
}

pub type KernelResult<T> = Result<T, KernelError>;

impl KernelError {
    fn new(kind: ErrorKind, status: Option<StatusCode>, message: impl Into<String>) -> Self {
        Self { kind, status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, Some(StatusCode::BAD_REQUEST), message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, Some(StatusCode::NOT_FOUND), message)
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestTimedOut, None, message)
    }

    pub fn rendering(message: impl Into<String>, status: StatusCode) -> Self {
        Self::new(ErrorKind::Rendering, Some(status), message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upstream, None, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, Some(StatusCode::INTERNAL_SERVER_ERROR), message)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::RequestTimedOut
    }

    /// Outermost policy: keep errors that carry a status, wrap the rest.
    pub fn into_response_error(self) -> Self {
        if self.status.is_some() {
            self
        } else {
            Self::internal(self.message)
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<serde_json::Error> for KernelError {
    fn from(e: serde_json::Error) -> Self {
        Self::upstream(format!("serialization error: {e}"))
    }
}

impl From<std::io::Error> for KernelError {
    fn from(e: std::io::Error) -> Self {
        Self::upstream(format!("io error: {e}"))
    }
}

impl IntoResponse for KernelError {
    fn into_response(self) -> Response {
        let err = self.into_response_error();
        let status = err.status_code();
        (status, Json(serde_json::json!({ "error": err.message }))).into_response()
    }
}
