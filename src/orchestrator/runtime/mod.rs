pub(crate) mod diagram;
pub(crate) mod extractor;
pub(crate) mod fusion;
pub(crate) mod gate;
pub(crate) mod state;
pub(crate) mod synthesizer;
pub(crate) mod util;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::orchestrator::config::EngineConfig;
use crate::orchestrator::types::RecordRef;

use self::state::Session;
use self::util::duration_to_ms;

pub(crate) struct SessionSlot {
    meeting_id: String,
    epoch: u64,
    state: Mutex<Session>,
}

impl SessionSlot {
    pub(crate) fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Session> {
        self.state.lock().await
    }

    async fn deactivate(&self) {
        self.state.lock().await.active = false;
    }
}

pub(crate) struct SessionRegistry {
    config: EngineConfig,
    sessions: Mutex<HashMap<String, Arc<SessionSlot>>>,
    next_epoch: AtomicU64,
}

impl SessionRegistry {
    pub(crate) fn new(config: EngineConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
            next_epoch: AtomicU64::new(1),
        }
    }

    fn create_slot(&self, meeting_id: &str, record: RecordRef, now: Instant) -> Arc<SessionSlot> {
        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst);
        Arc::new(SessionSlot {
            meeting_id: meeting_id.to_string(),
            epoch,
            state: Mutex::new(Session::new(meeting_id, epoch, record, now, &self.config)),
        })
    }

    pub(crate) async fn get_or_create(&self, meeting_id: &str, now: Instant) -> Arc<SessionSlot> {
        let mut sessions = self.sessions.lock().await;

        if let Some(slot) = sessions.get(meeting_id).cloned() {
            let mut session = slot.lock().await;
            if !session.is_idle(now, self.config.idle_timeout) {
                session.touch(now);
                drop(session);
                return slot;
            }
            session.active = false;
            info!(
                target: "session_registry",
                meeting_id,
                epoch = slot.epoch,
                idle_ms = duration_to_ms(now.saturating_duration_since(session.last_activity)),
                "expired idle session before reuse"
            );
        }

        let slot = self.create_slot(meeting_id, RecordRef::Ephemeral, now);
        sessions.insert(meeting_id.to_string(), Arc::clone(&slot));
        info!(
            target: "session_registry",
            meeting_id,
            epoch = slot.epoch,
            "created session on first data"
        );
        slot
    }

    pub(crate) async fn get(&self, meeting_id: &str, now: Instant) -> Option<Arc<SessionSlot>> {
        let mut sessions = self.sessions.lock().await;
        let slot = sessions.get(meeting_id).cloned()?;

        let mut session = slot.lock().await;
        if session.is_idle(now, self.config.idle_timeout) {
            session.active = false;
            drop(session);
            sessions.remove(meeting_id);
            info!(
                target: "session_registry",
                meeting_id,
                epoch = slot.epoch,
                "reaped idle session on access"
            );
            return None;
        }
        drop(session);
        Some(slot)
    }

    pub(crate) async fn reset(
        &self,
        meeting_id: &str,
        record: RecordRef,
        now: Instant,
    ) -> Arc<SessionSlot> {
        let slot = self.create_slot(meeting_id, record, now);
        let previous = {
            let mut sessions = self.sessions.lock().await;
            sessions.insert(meeting_id.to_string(), Arc::clone(&slot))
        };

        if let Some(previous) = previous {
            previous.deactivate().await;
            info!(
                target: "session_registry",
                meeting_id,
                previous_epoch = previous.epoch,
                epoch = slot.epoch,
                "reset existing session"
            );
        } else {
            info!(
                target: "session_registry",
                meeting_id,
                epoch = slot.epoch,
                "started session"
            );
        }
        slot
    }

    pub(crate) async fn remove(&self, meeting_id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(meeting_id);
        match removed {
            Some(slot) => {
                slot.deactivate().await;
                info!(
                    target: "session_registry",
                    meeting_id,
                    epoch = slot.epoch,
                    "removed session"
                );
                true
            }
            None => false,
        }
    }

    pub(crate) async fn is_current(&self, meeting_id: &str, epoch: u64) -> bool {
        self.sessions
            .lock()
            .await
            .get(meeting_id)
            .is_some_and(|slot| slot.epoch == epoch)
    }

    pub(crate) async fn reap_expired(&self, now: Instant) -> Vec<String> {
        let mut sessions = self.sessions.lock().await;
        let mut expired = Vec::new();

        for (meeting_id, slot) in sessions.iter() {
            let mut session = slot.lock().await;
            if session.is_idle(now, self.config.idle_timeout) {
                session.active = false;
                info!(
                    target: "session_registry",
                    meeting_id = meeting_id.as_str(),
                    epoch = slot.epoch,
                    age_ms = duration_to_ms(now.saturating_duration_since(session.created_at)),
                    "reaped idle session"
                );
                expired.push(meeting_id.clone());
            }
        }

        for meeting_id in &expired {
            sessions.remove(meeting_id);
        }
        expired
    }

    pub(crate) async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
