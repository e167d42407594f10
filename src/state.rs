use crate::domain::monitor::MonitorSession;
use crate::domain::questionnaire::WizardSession;
use crate::middleware::RateLimiter;
use crate::model::ModelBundle;
use crate::store::{HistoryStore, UserStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct AppState {
    pub users: UserStore,
    pub history: HistoryStore,
    /// `None` when the trained artifacts are absent; diagnostics degrade,
    /// everything else keeps working.
    pub model: Option<Arc<ModelBundle>>,
    pub session_key: Vec<u8>,
    /// username -> in-flight questionnaire
    pub wizard_sessions: Arc<RwLock<HashMap<String, WizardSession>>>,
    /// username -> active session monitor
    pub monitors: Arc<RwLock<HashMap<String, MonitorSession>>>,
    pub login_limiter: RateLimiter,
    pub register_limiter: RateLimiter,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Drop questionnaires nobody has touched for `max_age`; returns how
    /// many were evicted.
    pub async fn evict_stale_wizards(&self, max_age: chrono::Duration) -> usize {
        let cutoff = chrono::Utc::now() - max_age;
        let mut sessions = self.wizard_sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.last_activity > cutoff);
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_state() -> AppState {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "nexus-guardian-state-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        AppState {
            users: UserStore::open(&dir).unwrap(),
            history: HistoryStore::open(&dir).unwrap(),
            model: None,
            session_key: b"test-key-test-key-test-key-1234!".to_vec(),
            wizard_sessions: Arc::new(RwLock::new(HashMap::new())),
            monitors: Arc::new(RwLock::new(HashMap::new())),
            login_limiter: RateLimiter::new(5, 60),
            register_limiter: RateLimiter::new(10, 60),
        }
    }

    #[tokio::test]
    async fn eviction_keeps_slow_but_active_interviews() {
        let state = test_state();
        let now = chrono::Utc::now();

        // Started hours ago but still being answered.
        let mut active = WizardSession::new();
        active.started_at = now - chrono::Duration::hours(3);
        active.step = 7;

        let mut stale = WizardSession::new();
        stale.started_at = now - chrono::Duration::hours(3);
        stale.last_activity = now - chrono::Duration::hours(3);

        {
            let mut sessions = state.wizard_sessions.write().await;
            sessions.insert("active".to_string(), active);
            sessions.insert("stale".to_string(), stale);
        }

        assert_eq!(state.evict_stale_wizards(chrono::Duration::hours(1)).await, 1);
        let sessions = state.wizard_sessions.read().await;
        assert!(sessions.contains_key("active"));
        assert!(!sessions.contains_key("stale"));
    }
}
