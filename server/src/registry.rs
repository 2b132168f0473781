use crate::game::TableState;
use crate::persistence::{SnapshotStore, StoreError};
use crate::session::{SessionCmd, SessionHandle, SessionTuning, TableSession, COMMAND_QUEUE_DEPTH};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Named map of live table sessions. The lock guards only creation, lookup
/// and removal; all table state lives behind each session's own writer.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    tables: Mutex<HashMap<String, SessionHandle>>,
    store: SnapshotStore,
    tuning: SessionTuning,
}

impl Registry {
    pub fn new(store: SnapshotStore, tuning: SessionTuning) -> Self {
        Registry {
            inner: Arc::new(RegistryInner {
                tables: Mutex::new(HashMap::new()),
                store,
                tuning,
            }),
        }
    }

    /// Bring every table with a snapshot on disk back up. Restored tables
    /// start with nobody connected.
    pub async fn restore_all(&self) -> Result<usize, StoreError> {
        let names = self.inner.store.scan().await?;
        let mut restored = 0;
        for name in names {
            match self.inner.store.load(&name).await {
                Ok(Some(state)) => {
                    info!(table = %name, players = state.players.len(), "restoring table");
                    let mut tables = self.inner.tables.lock();
                    self.spawn_locked(&mut tables, state);
                    restored += 1;
                }
                Ok(None) => {}
                Err(e) => warn!(table = %name, error = %e, "failed to restore table"),
            }
        }
        Ok(restored)
    }

    pub fn get(&self, name: &str) -> Option<SessionHandle> {
        self.inner.tables.lock().get(name).cloned()
    }

    pub async fn get_or_create(&self, name: &str) -> SessionHandle {
        if let Some(handle) = self.get(name) {
            return handle;
        }
        // Load outside the lock, then re-check for a racing creator.
        let loaded = self.inner.store.load(name).await.ok().flatten();
        let mut tables = self.inner.tables.lock();
        if let Some(handle) = tables.get(name) {
            return handle.clone();
        }
        let state = loaded.unwrap_or_else(|| TableState::new(name));
        self.spawn_locked(&mut tables, state)
    }

    fn spawn_locked(
        &self,
        tables: &mut HashMap<String, SessionHandle>,
        state: TableState,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::channel::<SessionCmd>(COMMAND_QUEUE_DEPTH);
        tables.insert(state.name.clone(), tx.clone());
        let session = TableSession::new(
            state,
            rx,
            self.inner.store.clone(),
            self.inner.tuning.clone(),
            self.clone(),
        );
        tokio::spawn(session.run());
        tx
    }

    /// Called by a session tearing itself down.
    pub(crate) fn remove(&self, name: &str) {
        self.inner.tables.lock().remove(name);
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.inner.store
    }
}
