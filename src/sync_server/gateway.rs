//! Connection gateway: handshake admission
//!
//! Admission runs between the WebSocket upgrade and the room join, and
//! is the only place the sync server touches auth or the project store.
//! It is transport-free: the connection layer captures the upgrade
//! request into a [`Handshake`] and everything after that is plain data,
//! so admission tests need no sockets.
//!
//! Credentials are read from the `token` cookie or the `Authorization`
//! header, never from query parameters, which end up in logs and
//! referrer headers.

use std::collections::HashMap;

use crate::error::AdmissionError;
use crate::session::{Identity, SessionVerifier};
use crate::store::{Project, ProjectId, ProjectStore};

/// Captured WebSocket upgrade request: query parameters plus headers.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    query: HashMap<String, String>,
    /// Header names lowercased; last value wins for repeated headers.
    headers: HashMap<String, String>,
}

impl Handshake {
    pub fn new(query_string: Option<&str>, headers: HashMap<String, String>) -> Self {
        Self {
            query: parse_query(query_string.unwrap_or_default()),
            headers,
        }
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// The session credential: `token` cookie first, then a bearer
    /// `Authorization` header.
    pub fn credential(&self) -> Option<String> {
        self.cookie("token")
            .or_else(|| {
                self.header("authorization")
                    .and_then(|v| v.strip_prefix("Bearer "))
                    .map(str::to_string)
            })
            .filter(|token| !token.is_empty())
    }

    fn cookie(&self, name: &str) -> Option<String> {
        let raw = self.header("cookie")?;
        raw.split(';').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key.trim() == name).then(|| value.trim().to_string())
        })
    }
}

fn parse_query(raw: &str) -> HashMap<String, String> {
    raw.split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// A successful admission: who connected, and to which project.
#[derive(Debug, Clone)]
pub struct Admission {
    pub identity: Identity,
    pub project: Project,
}

/// Admit or reject a handshake. Short-circuits on the first failure;
/// reads only, so concurrent admissions never contend on room state.
/// Joining the room is the caller's explicit next step.
pub async fn admit(
    handshake: &Handshake,
    store: &dyn ProjectStore,
    verifier: &SessionVerifier,
) -> Result<Admission, AdmissionError> {
    let project_id = handshake
        .query_param("projectId")
        .and_then(ProjectId::parse)
        .ok_or(AdmissionError::InvalidProjectId)?;

    let project = store
        .lookup_project(&project_id)
        .await
        .ok_or(AdmissionError::ProjectNotFound)?;

    let token = handshake
        .credential()
        .ok_or(AdmissionError::Unauthenticated)?;

    let identity = verifier.verify(&token)?;

    if !project.member_ids.contains(&identity.user_id) {
        return Err(AdmissionError::NotAMember);
    }

    Ok(Admission { identity, project })
}
