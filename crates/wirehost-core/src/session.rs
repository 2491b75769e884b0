//! The single automation session.
//!
//! The server holds at most one [`Session`] at a time. Its ID is a v4 UUID
//! generated on `POST /session`, so an ID is never handed out twice in a
//! run. Frame focus and element references live in the
//! [`ReferenceTable`](crate::element::ReferenceTable) next to the session in
//! the server state.

use chrono::{DateTime, Utc};
use url::Url;
use uuid::Uuid;

/// Session-scoped state other than element references.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    /// Last URI navigated to, as reported by `GET /session/:id/url`.
    current_uri: Option<Url>,
}

impl Session {
    /// Starts a new session with a fresh ID.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            current_uri: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Resource path of this session, used as the creation redirect target.
    pub fn path(&self) -> String {
        format!("/session/{}", self.id)
    }

    pub fn current_uri(&self) -> Option<&Url> {
        self.current_uri.as_ref()
    }

    pub fn set_current_uri(&mut self, uri: Url) {
        self.current_uri = Some(uri);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_get_distinct_ids() {
        let a = Session::new();
        let b = Session::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn path_embeds_the_id() {
        let session = Session::new();
        assert_eq!(session.path(), format!("/session/{}", session.id()));
    }

    #[test]
    fn current_uri_starts_empty() {
        let mut session = Session::new();
        assert!(session.current_uri().is_none());
        session.set_current_uri(Url::parse("http://example.com/").unwrap());
        assert_eq!(session.current_uri().unwrap().as_str(), "http://example.com/");
    }
}
