use thiserror::Error;
use uuid::Uuid;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// An attendance record already exists for this (session, member) pair.
    #[error("attendance has already been recorded for this member in this session")]
    AlreadyMarked,

    /// A member with the same normalized email address already exists.
    #[error("a member with this email address is already registered")]
    EmailExists,

    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("invalid ID: {0}")]
    InvalidId(String),

    #[error("invalid date: {0} (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("no member found with ID {0}")]
    MemberNotFound(Uuid),

    /// Raised by manual marking when no session is currently active.
    #[error("no session is currently active")]
    NoActiveSession,

    /// The named session does not exist or is not the active one.
    #[error("this session does not exist or is no longer active")]
    SessionNotActive,

    #[error("failed to encode QR code")]
    QrEncoding { source: qrcode::types::QrError },

    #[error("failed to render QR image")]
    QrImage { source: image::ImageError },

    /// Represents an SQL error.
    #[error("store unavailable")]
    Sqlx { source: sqlx::Error },
}
