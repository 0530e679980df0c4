//! Isolated workflow sessions keyed by id

use crate::workflow::session::Workflow;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// A session shared between the caller's requests
pub type SharedWorkflow = Arc<Mutex<Workflow>>;

type WorkflowFactory = Box<dyn Fn() -> Workflow + Send + Sync>;

/// Hands every caller its own `Workflow`; sessions never see each other's state.
pub struct SessionRegistry {
    factory: WorkflowFactory,
    sessions: Mutex<HashMap<Uuid, SharedWorkflow>>,
}

impl SessionRegistry {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Workflow + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start a fresh session
    pub async fn create(&self) -> (Uuid, SharedWorkflow) {
        let id = Uuid::new_v4();
        let workflow = Arc::new(Mutex::new((self.factory)()));
        self.sessions.lock().await.insert(id, workflow.clone());
        debug!("Created session {}", id);
        (id, workflow)
    }

    pub async fn get(&self, id: &Uuid) -> Option<SharedWorkflow> {
        self.sessions.lock().await.get(id).cloned()
    }

    /// Drop a session; returns whether it existed
    pub async fn remove(&self, id: &Uuid) -> bool {
        let removed = self.sessions.lock().await.remove(id).is_some();
        if removed {
            debug!("Removed session {}", id);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
