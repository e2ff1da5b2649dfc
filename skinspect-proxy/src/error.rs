//! Error types for the inspect service.
//!
//! Every per-reference failure is an [`InspectError`]. Errors are `Clone`
//! because one pre-queue rejection resolves every remaining slot of a job.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use skinspect_core::StoreError;

/// Which ceiling an admission rejection hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityScope {
    /// Per-caller pending ceiling
    Caller,
    /// Global queue ceiling
    Queue,
}

impl CapacityScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapacityScope::Caller => "caller",
            CapacityScope::Queue => "queue",
        }
    }
}

/// Inspect error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InspectError {
    #[error("Improper parameter structure")]
    BadParams,

    #[error("Invalid inspect link structure")]
    InvalidReference,

    #[error("{}", capacity_message(.scope))]
    CapacityExceeded { scope: CapacityScope },

    /// Every attempt for the reference failed
    #[error("The inspection gateway didn't reply in time")]
    TtlExceeded,

    #[error("No inspection sessions are online, please try again later")]
    NoSessionsAvailable,

    /// One attempt failed; retried until the budget runs out
    #[error("Inspection attempt failed: {0}")]
    Protocol(String),

    #[error("Improper body format")]
    BadBody,

    #[error("Bad secret")]
    BadSecret,

    #[error("Something went wrong on our end, please try again")]
    Storage(String),
}

fn capacity_message(scope: &CapacityScope) -> &'static str {
    match scope {
        CapacityScope::Caller => "You have too many pending inspection requests",
        CapacityScope::Queue => "Queue size is full, please try again later",
    }
}

impl InspectError {
    /// Numeric code sent to callers
    pub fn code(&self) -> u16 {
        match self {
            InspectError::BadParams => 1,
            InspectError::InvalidReference => 2,
            InspectError::CapacityExceeded { scope: CapacityScope::Caller } => 3,
            InspectError::CapacityExceeded { scope: CapacityScope::Queue } => 11,
            InspectError::TtlExceeded => 4,
            InspectError::NoSessionsAvailable => 5,
            InspectError::Protocol(_) | InspectError::Storage(_) => 6,
            InspectError::BadBody => 7,
            InspectError::BadSecret => 8,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            InspectError::BadParams
            | InspectError::InvalidReference
            | InspectError::BadBody
            | InspectError::BadSecret
            | InspectError::CapacityExceeded { scope: CapacityScope::Caller } => {
                StatusCode::BAD_REQUEST
            }
            InspectError::CapacityExceeded { scope: CapacityScope::Queue }
            | InspectError::TtlExceeded
            | InspectError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            InspectError::NoSessionsAvailable => StatusCode::SERVICE_UNAVAILABLE,
            InspectError::Protocol(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// JSON body, also used as a bulk map value
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            code: self.code(),
            status: self.status().as_u16(),
        }
    }
}

impl From<StoreError> for InspectError {
    fn from(err: StoreError) -> Self {
        InspectError::Storage(err.to_string())
    }
}

/// Wire shape of an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: u16,
    pub status: u16,
}

impl IntoResponse for InspectError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
