use crate::session::{ChatTurn, SessionData, SessionMeta, SessionStore};
use anyhow::Result;
use std::path::PathBuf;
use tracing::debug;

/// Holds the store and the session currently being chatted in.
#[derive(Debug)]
pub struct SessionManager {
    pub store: SessionStore,
    pub current_session: Option<SessionData>,
}

impl SessionManager {
    /// Create a SessionManager with the default store location.
    pub fn new() -> Result<Self> {
        let store = SessionStore::new_default()?;
        Ok(Self {
            store,
            current_session: None,
        })
    }

    /// Create a SessionManager rooted at an explicit path.
    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self> {
        let store = SessionStore::new(root)?;
        Ok(Self {
            store,
            current_session: None,
        })
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionMeta>> {
        self.store.list().map_err(|e| anyhow::anyhow!(e))
    }

    /// Start a fresh session.
    pub fn create_session(&mut self) -> Result<()> {
        let session = self.store.create()?;
        debug!(id = %session.meta.id, "created session");
        self.current_session = Some(session);
        Ok(())
    }

    /// Load a session by ID.
    pub fn load_session(&mut self, id: &str) -> Result<()> {
        let session = self.store.load(id)?;
        self.current_session = Some(session);
        Ok(())
    }

    /// Resume the most recent session; leaves no session current when none
    /// exist yet.
    pub fn load_latest_session(&mut self) -> Result<()> {
        if let Some(session) = self.store.get_latest()? {
            self.current_session = Some(session);
        }
        Ok(())
    }

    /// Delete a session by ID, clearing it if it is the current one.
    pub fn delete_session(&mut self, id: &str) -> Result<()> {
        self.store.delete(id)?;
        if let Some(current) = &self.current_session
            && current.meta.id == id
        {
            self.current_session = None;
        }
        Ok(())
    }

    /// The turns of the current session, empty when there is none.
    pub fn current_turns(&self) -> Vec<ChatTurn> {
        self.current_session
            .as_ref()
            .map(|s| s.turns.clone())
            .unwrap_or_default()
    }

    /// Append a turn to the current session and persist. The first user
    /// turn also titles the session.
    pub fn append_turn(&mut self, turn: ChatTurn) -> Result<()> {
        if let Some(ref mut session) = self.current_session {
            if session.meta.title_is_default
                && turn.role == crate::session::Role::User
                && !turn.content.is_empty()
            {
                session.set_initial_prompt(&turn.content);
                session.meta.title_is_default = false;
            }
            session.append_turn(turn);
            self.store.save(session)?;
        }
        Ok(())
    }

    /// Clear the current session's conversation.
    pub fn clear_current_conversation(&mut self) -> Result<()> {
        if let Some(ref mut session) = self.current_session {
            session.clear_turns();
            self.store.save(session)?;
        }
        Ok(())
    }

    /// Record usage for one completed request.
    pub fn record_usage(&mut self, tokens: u64, tool_calls: u64) -> Result<()> {
        if let Some(ref mut session) = self.current_session {
            session.increment_requests();
            if tokens > 0 {
                session.increment_token_count(tokens);
            }
            for _ in 0..tool_calls {
                session.increment_tool_calls();
            }
            self.store.save(session)?;
        }
        Ok(())
    }

    pub fn record_tool_call_success(&mut self, tool_name: &str) -> Result<()> {
        if let Some(ref mut session) = self.current_session {
            session.record_tool_call_success(tool_name);
            self.store.save(session)?;
        }
        Ok(())
    }

    pub fn record_tool_call_failure(&mut self, tool_name: &str) -> Result<()> {
        if let Some(ref mut session) = self.current_session {
            session.record_tool_call_failure(tool_name);
            self.store.save(session)?;
        }
        Ok(())
    }

    /// One-line summary for the status bar.
    pub fn current_session_info(&self) -> Option<String> {
        self.current_session.as_ref().map(|session| {
            format!(
                "{} · {} turns · {} tokens",
                session.meta.title,
                session.turns.len(),
                session.token_count
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use tempfile::tempdir;

    #[test]
    fn test_append_turn_persists_and_titles() {
        let dir = tempdir().expect("Failed to create temp directory");
        let mut mgr = SessionManager::with_root(dir.path()).expect("Failed to create manager");
        mgr.create_session().expect("Failed to create session");

        mgr.append_turn(ChatTurn::user("what is the capital of France?"))
            .expect("Failed to append turn");
        mgr.append_turn(ChatTurn::assistant("Paris."))
            .expect("Failed to append turn");

        let id = mgr.current_session.as_ref().unwrap().meta.id.clone();
        let loaded = mgr.store.load(&id).expect("Failed to load session");
        assert_eq!(loaded.turns.len(), 2);
        assert_eq!(loaded.turns[0].role, Role::User);
        assert_eq!(loaded.turns[1].role, Role::Assistant);
        assert!(loaded.meta.title.starts_with("what is the capital"));
        assert!(!loaded.meta.title_is_default);
    }

    #[test]
    fn test_current_turns_empty_without_session() {
        let dir = tempdir().expect("Failed to create temp directory");
        let mgr = SessionManager::with_root(dir.path()).expect("Failed to create manager");
        assert!(mgr.current_turns().is_empty());
    }

    #[test]
    fn test_load_latest_session_none_is_ok() {
        let dir = tempdir().expect("Failed to create temp directory");
        let mut mgr = SessionManager::with_root(dir.path()).expect("Failed to create manager");
        mgr.load_latest_session().expect("load_latest should not fail");
        assert!(mgr.current_session.is_none());
    }

    #[test]
    fn test_load_latest_session_resumes_turns() {
        let dir = tempdir().expect("Failed to create temp directory");
        {
            let mut mgr = SessionManager::with_root(dir.path()).expect("Failed to create manager");
            mgr.create_session().expect("Failed to create session");
            mgr.append_turn(ChatTurn::user("hello")).unwrap();
        }
        let mut mgr2 = SessionManager::with_root(dir.path()).expect("Failed to create manager");
        mgr2.load_latest_session().expect("Failed to load latest");
        assert_eq!(mgr2.current_turns().len(), 1);
    }

    #[test]
    fn test_delete_current_session_clears_it() {
        let dir = tempdir().expect("Failed to create temp directory");
        let mut mgr = SessionManager::with_root(dir.path()).expect("Failed to create manager");
        mgr.create_session().expect("Failed to create session");
        let id = mgr.current_session.as_ref().unwrap().meta.id.clone();
        mgr.delete_session(&id).expect("Failed to delete session");
        assert!(mgr.current_session.is_none());
    }

    #[test]
    fn test_record_usage_counts() {
        let dir = tempdir().expect("Failed to create temp directory");
        let mut mgr = SessionManager::with_root(dir.path()).expect("Failed to create manager");
        mgr.create_session().expect("Failed to create session");
        mgr.record_usage(42, 2).expect("Failed to record usage");
        mgr.record_tool_call_success("web_search").unwrap();
        mgr.record_tool_call_failure("wikipedia").unwrap();

        let session = mgr.current_session.as_ref().unwrap();
        assert_eq!(session.requests, 1);
        assert_eq!(session.token_count, 42);
        assert_eq!(session.tool_calls, 2);
        assert_eq!(*session.tool_call_successes.get("web_search").unwrap(), 1);
        assert_eq!(*session.tool_call_failures.get("wikipedia").unwrap(), 1);
    }
}
