//! Error types for coedit-engine
//!
//! One enum per failure family. Nothing here is fatal to the process:
//! admission failures end a single connection before it joins a room,
//! protocol failures drop a single event, and store/generation failures
//! are logged at the point of use.

use thiserror::Error;

/// Credential verification failure (see [`crate::session`])
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("no credential presented")]
    Missing,

    #[error("credential is not a well-formed token")]
    Malformed,

    #[error("credential has expired")]
    Expired,

    #[error("credential signature is invalid")]
    BadSignature,
}

/// Handshake admission failure. Always terminal for the connection:
/// no room is joined and no room state is created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("missing or malformed projectId")]
    InvalidProjectId,

    #[error("project not found")]
    ProjectNotFound,

    #[error("authentication required")]
    Unauthenticated,

    #[error("user is not a member of this project")]
    NotAMember,

    #[error("credential is not a well-formed token")]
    MalformedCredential,

    #[error("credential has expired")]
    Expired,

    #[error("credential signature is invalid")]
    BadSignature,
}

impl From<VerifyError> for AdmissionError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Missing => AdmissionError::Unauthenticated,
            VerifyError::Malformed => AdmissionError::MalformedCredential,
            VerifyError::Expired => AdmissionError::Expired,
            VerifyError::BadSignature => AdmissionError::BadSignature,
        }
    }
}

/// A malformed inbound event. The event is dropped and logged; the
/// connection stays open.
#[derive(Error, Debug)]
#[error("malformed event payload: {0}")]
pub struct ProtocolError(#[from] serde_json::Error);

/// Persistence collaborator failure. In-memory room state is unaffected;
/// the durable copy stays stale until the next successful checkpoint.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("store rejected the write: {0}")]
    WriteFailed(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Generation collaborator failure. Logged, never surfaced to clients.
#[derive(Error, Debug, Clone)]
pub enum GenerateError {
    #[error("generation request failed: {0}")]
    Request(String),

    #[error("generation returned unparseable content: {0}")]
    Unparseable(String),

    #[error("generation timed out after {0}s")]
    TimedOut(u64),
}
