use rusoto_core::RusotoError;
use std::error::Error as StdError;
use std::fmt;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Error codes AWS returns when a call is rate limited.
const THROTTLING_CODES: [&str; 4] = [
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
];

/// Error codes AWS returns when the caller lacks a permission.
const PERMISSION_CODES: [&str; 4] = [
    "UnauthorizedOperation",
    "AccessDenied",
    "AccessDeniedException",
    "AuthFailure",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Throttled,
    PermissionDenied,
    Other,
}

impl Display for ApiErrorKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            ApiErrorKind::Throttled => write!(f, "throttled"),
            ApiErrorKind::PermissionDenied => write!(f, "permission denied"),
            ApiErrorKind::Other => write!(f, "api error"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Value is None")]
    NoneValue,
    #[error("Failed to convert bigDecimal to primitive")]
    ToPrimitive,
    #[error("{operation} failed ({kind}): {message}")]
    Api {
        operation: &'static str,
        kind: ApiErrorKind,
        message: String,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("malformed event: {0}")]
    Event(String),
    #[error("failed to render report: {0}")]
    Render(String),
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to upload report to s3://{bucket}/{key}: {message}")]
    Upload {
        bucket: String,
        key: String,
        message: String,
    },
    #[error("failed to publish notification: {0}")]
    Notify(String),
}

impl AuditError {
    /// Wraps a rusoto failure for `operation`, classifying it from the
    /// response status and error code.
    pub fn api<E: StdError + 'static>(operation: &'static str, error: RusotoError<E>) -> Self {
        let kind = classify(&error);
        AuditError::Api {
            operation,
            kind,
            message: error.to_string(),
        }
    }

    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match *self {
            AuditError::Api { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

fn classify<E: StdError + 'static>(error: &RusotoError<E>) -> ApiErrorKind {
    match error {
        RusotoError::Unknown(response) => {
            let body = response.body_as_str();
            if THROTTLING_CODES.iter().any(|code| body.contains(code))
                || response.status.as_u16() == 429
            {
                ApiErrorKind::Throttled
            } else if PERMISSION_CODES.iter().any(|code| body.contains(code))
                || response.status.as_u16() == 403
            {
                ApiErrorKind::PermissionDenied
            } else {
                ApiErrorKind::Other
            }
        }
        RusotoError::Credentials(_) => ApiErrorKind::PermissionDenied,
        other => {
            let message = other.to_string();
            if THROTTLING_CODES.iter().any(|code| message.contains(code)) {
                ApiErrorKind::Throttled
            } else if PERMISSION_CODES.iter().any(|code| message.contains(code)) {
                ApiErrorKind::PermissionDenied
            } else {
                ApiErrorKind::Other
            }
        }
    }
}
