//! Key-value storage underneath the session store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::{models::Session, services::session_store::SessionError, types::SessionCode};

/// A mutation applied to one session. Returning an error discards every
/// change it made.
pub type SessionMutation<'a> = &'a mut dyn FnMut(&mut Session) -> Result<(), SessionError>;

/// Storage seam for sessions. Implementations serialise `update` calls per
/// code; calls for different codes must not block each other beyond a
/// brief lookup.
pub trait SessionBackend: Send + Sync {
    /// Stores `session` unless its code is taken.
    fn insert_new(&self, session: Session) -> Result<(), SessionError>;

    /// Snapshot of the session under `code`.
    fn load(&self, code: &SessionCode) -> Option<Session>;

    /// Runs `apply` against the session under the per-code lock and returns
    /// the committed snapshot.
    fn update(&self, code: &SessionCode, apply: SessionMutation<'_>)
        -> Result<Session, SessionError>;

    fn remove(&self, code: &SessionCode) -> Option<Session>;

    /// Removes the session only if `pred` holds, checked under the entry
    /// lock so no mutation can slip in between the check and the removal.
    fn remove_if(
        &self,
        code: &SessionCode,
        pred: &mut dyn FnMut(&Session) -> bool,
    ) -> Option<Session>;

    /// Drops every session for which `keep` returns false. Returns how many
    /// were removed.
    fn retain(&self, keep: &mut dyn FnMut(&Session) -> bool) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local backend: a registry of per-code mutexes.
#[derive(Default)]
pub struct MemorySessionBackend {
    sessions: RwLock<HashMap<SessionCode, Arc<Mutex<Session>>>>,
}

impl MemorySessionBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionBackend for MemorySessionBackend {
    fn insert_new(&self, session: Session) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if sessions.contains_key(&session.code) {
            return Err(SessionError::Conflict(session.code));
        }
        sessions.insert(session.code.clone(), Arc::new(Mutex::new(session)));
        Ok(())
    }

    fn load(&self, code: &SessionCode) -> Option<Session> {
        let entry = {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            sessions.get(code).cloned()
        }?;
        let session = entry.lock().unwrap_or_else(|e| e.into_inner());
        Some(session.clone())
    }

    fn update(
        &self,
        code: &SessionCode,
        apply: SessionMutation<'_>,
    ) -> Result<Session, SessionError> {
        // The registry read guard stays alive so a concurrent remove cannot
        // orphan the entry being mutated.
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        let entry = sessions
            .get(code)
            .ok_or_else(|| SessionError::NotFound(code.clone()))?;
        let mut session = entry.lock().unwrap_or_else(|e| e.into_inner());

        let mut draft = session.clone();
        apply(&mut draft)?;
        *session = draft;
        Ok(session.clone())
    }

    fn remove(&self, code: &SessionCode) -> Option<Session> {
        let entry = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(code)?;
        let session = entry.lock().unwrap_or_else(|e| e.into_inner());
        Some(session.clone())
    }

    fn remove_if(
        &self,
        code: &SessionCode,
        pred: &mut dyn FnMut(&Session) -> bool,
    ) -> Option<Session> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let matched = {
            let session = sessions.get(code)?.lock().unwrap_or_else(|e| e.into_inner());
            pred(&session)
        };
        if !matched {
            return None;
        }
        let entry = sessions.remove(code)?;
        let session = entry.lock().unwrap_or_else(|e| e.into_inner());
        Some(session.clone())
    }

    fn retain(&self, keep: &mut dyn FnMut(&Session) -> bool) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, entry| {
            let session = entry.lock().unwrap_or_else(|e| e.into_inner());
            keep(&session)
        });
        before - sessions.len()
    }

    fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::test_support::active_session;
    use crate::models::SessionStatus;

    #[test]
    fn insert_new_rejects_taken_code() {
        let backend = MemorySessionBackend::new();
        backend.insert_new(active_session(&["r1"], &["a"])).unwrap();
        let err = backend
            .insert_new(active_session(&["r2"], &["b"]))
            .unwrap_err();
        assert!(matches!(err, SessionError::Conflict(_)));

        let stored = backend.load(&"TEST42".parse().unwrap()).unwrap();
        assert_eq!(stored.users[0].as_str(), "a");
    }

    #[test]
    fn failed_update_leaves_session_untouched() {
        let backend = MemorySessionBackend::new();
        let session = active_session(&["r1"], &["a"]);
        let code = session.code.clone();
        backend.insert_new(session).unwrap();

        let err = backend
            .update(&code, &mut |s| {
                s.status = SessionStatus::Finished;
                Err(SessionError::InvalidState("nope".into()))
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        assert_eq!(backend.load(&code).unwrap().status, SessionStatus::Active);
    }

    #[test]
    fn update_on_missing_code_is_not_found() {
        let backend = MemorySessionBackend::new();
        let code: SessionCode = "ZZZZ".parse().unwrap();
        let err = backend.update(&code, &mut |_| Ok(())).unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[test]
    fn remove_if_keeps_session_when_predicate_fails() {
        let backend = MemorySessionBackend::new();
        let session = active_session(&["r1"], &["a"]);
        let code = session.code.clone();
        backend.insert_new(session).unwrap();

        assert!(backend
            .remove_if(&code, &mut |s| s.status == SessionStatus::Pending)
            .is_none());
        assert_eq!(backend.len(), 1);

        let removed = backend.remove_if(&code, &mut |s| s.status == SessionStatus::Active);
        assert_eq!(removed.map(|s| s.code), Some(code.clone()));
        assert!(backend.load(&code).is_none());
    }

    #[test]
    fn retain_reports_removed_count() {
        let backend = MemorySessionBackend::new();
        let mut other = active_session(&["r1"], &["b"]);
        other.code = "OTHER1".parse().unwrap();
        other.status = SessionStatus::Finished;
        backend.insert_new(active_session(&["r1"], &["a"])).unwrap();
        backend.insert_new(other).unwrap();

        let removed = backend.retain(&mut |s| !s.is_finished());
        assert_eq!(removed, 1);
        assert_eq!(backend.len(), 1);
    }
}
