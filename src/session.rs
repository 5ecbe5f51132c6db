//! Conversation sessions.
//!
//! Keeps the last `max_history` exchanges per session and renders them as
//! the plain-text history the orchestrator folds into its system prompt.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Exchange {
    user: String,
    assistant: String,
}

pub struct SessionManager {
    max_history: usize,
    sessions: Mutex<HashMap<String, VecDeque<Exchange>>>,
}

impl SessionManager {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start an empty session and return its id.
    pub fn create_session(&self) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.lock()?.insert(id.clone(), VecDeque::new());
        Ok(id)
    }

    /// Append an exchange, evicting the oldest beyond `max_history`.
    /// Unknown ids start a new session under that id.
    pub fn add_exchange(&self, session_id: &str, user: &str, assistant: &str) -> Result<()> {
        let mut sessions = self.lock()?;
        let history = sessions.entry(session_id.to_string()).or_default();
        history.push_back(Exchange {
            user: user.to_string(),
            assistant: assistant.to_string(),
        });
        while history.len() > self.max_history {
            history.pop_front();
        }
        Ok(())
    }

    /// `User: ...\nAssistant: ...` lines, or `None` for an unknown or
    /// empty session.
    pub fn get_conversation_history(&self, session_id: &str) -> Result<Option<String>> {
        let sessions = self.lock()?;
        let Some(history) = sessions.get(session_id) else {
            return Ok(None);
        };
        if history.is_empty() {
            return Ok(None);
        }
        let lines: Vec<String> = history
            .iter()
            .map(|e| format!("User: {}\nAssistant: {}", e.user, e.assistant))
            .collect();
        Ok(Some(lines.join("\n")))
    }

    pub fn clear_session(&self, session_id: &str) -> Result<()> {
        self.lock()?.remove(session_id);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, VecDeque<Exchange>>>> {
        self.sessions
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))
    }
}
