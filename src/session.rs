//! Per-user Sessions
//!
//! Each user has one in-memory slot holding the current upload. The slot
//! is a single-writer resource: every event that reads or changes it must
//! first obtain a [`DispatchPermit`], and a second permit for the same user
//! is refused until the first one is dropped. Nothing here survives a
//! restart.

use crate::artifacts::ArtifactKind;
use crate::menu::FileCategory;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;

/// Upload currently held for a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentArtifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub category: FileCategory,
    /// Original file name, for menu titles and wiki fallbacks
    pub file_name: String,
    pub message_id: i32,
}

#[derive(Debug, Default)]
struct Session {
    current: Option<CurrentArtifact>,
    busy: bool,
}

/// All sessions, keyed by user id
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the user's slot. `None` while another event holds it.
    pub fn try_begin(&self, user_id: i64) -> Option<DispatchPermit<'_>> {
        let mut sessions = self.sessions.lock();
        let session = sessions.entry(user_id).or_default();
        if session.busy {
            return None;
        }
        session.busy = true;
        Some(DispatchPermit { store: self, user_id })
    }

    /// Peek at a user's slot without claiming it
    pub fn peek(&self, user_id: i64) -> Option<CurrentArtifact> {
        self.sessions
            .lock()
            .get(&user_id)
            .and_then(|s| s.current.clone())
    }

    pub fn is_busy(&self, user_id: i64) -> bool {
        self.sessions.lock().get(&user_id).map(|s| s.busy).unwrap_or(false)
    }

    /// Number of users with an entry (held upload or in-flight event)
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_session<R>(&self, user_id: i64, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut sessions = self.sessions.lock();
        f(sessions.entry(user_id).or_default())
    }

    fn release(&self, user_id: i64) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(&user_id) {
            session.busy = false;
            if session.current.is_none() {
                sessions.remove(&user_id);
            }
        }
    }
}

/// Exclusive access to one user's slot, released on drop
#[derive(Debug)]
pub struct DispatchPermit<'a> {
    store: &'a SessionStore,
    user_id: i64,
}

impl DispatchPermit<'_> {
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn current(&self) -> Option<CurrentArtifact> {
        self.store.with_session(self.user_id, |s| s.current.clone())
    }

    /// Store a new upload, handing back the one it replaces
    pub fn replace(&self, artifact: CurrentArtifact) -> Option<CurrentArtifact> {
        self.store.with_session(self.user_id, |s| s.current.replace(artifact))
    }

    /// Empty the slot
    pub fn take(&self) -> Option<CurrentArtifact> {
        self.store.with_session(self.user_id, |s| s.current.take())
    }
}

impl Drop for DispatchPermit<'_> {
    fn drop(&mut self) {
        self.store.release(self.user_id);
    }
}
