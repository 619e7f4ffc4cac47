use std::path::PathBuf;

use thiserror::Error;

use crate::model::form::ValidationErrors;

/// Failure talking to the catalog backend.
///
/// `Application` is the only variant whose message is meant for the user;
/// every other variant is an unknown failure from the user's point of view.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Application { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("Could not read {path:?}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Unknown(String),
}

impl ApiError {
    pub fn is_application(&self) -> bool {
        matches!(self, ApiError::Application { .. })
    }

    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Application { message, .. } => message.clone(),
            _ => fallback.to_string(),
        }
    }
}

/// Failure reading or writing the local cache.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cache entry {key} could not be accessed: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache entry {key} is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cache entry {key} could not be encoded: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of a session action that may touch both the backend and the
/// local mirror.
///
/// `Remote` means the backend rejected or never received the change and
/// nothing was mirrored. `Mirror` means the backend (if involved) committed
/// and in-memory state reflects it, but the cache could not be updated.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("{0}")]
    Invalid(#[from] ValidationErrors),

    #[error(transparent)]
    Remote(#[from] ApiError),

    #[error("Local cache out of date: {0}")]
    Mirror(#[from] StoreError),
}

impl SyncError {
    pub fn is_remote(&self) -> bool {
        matches!(self, SyncError::Remote(_))
    }

    pub fn is_mirror(&self) -> bool {
        matches!(self, SyncError::Mirror(_))
    }

    /// Text for the one-line notice shown after a failed action.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            SyncError::NotSignedIn => "Sign in to continue.".to_string(),
            SyncError::Invalid(errors) => errors.to_string(),
            SyncError::Remote(e) => e.user_message(fallback),
            SyncError::Mirror(_) => fallback.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_errors_surface_server_message() {
        let error = SyncError::from(ApiError::Application {
            status: 400,
            message: "Product not found.".to_string(),
        });
        assert!(error.is_remote());
        assert_eq!(error.user_message("Try again later."), "Product not found.");
    }

    #[test]
    fn unknown_errors_use_fallback() {
        let error = SyncError::from(ApiError::Unknown("socket closed".to_string()));
        assert_eq!(error.user_message("Try again later."), "Try again later.");

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = SyncError::from(StoreError::Io {
            key: "marketspace:products".to_string(),
            source: io,
        });
        assert!(error.is_mirror());
        assert_eq!(error.user_message("Try again later."), "Try again later.");
    }
}
