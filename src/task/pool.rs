//! Fixed pool of environment clients ("conversation slots").
//!
//! Each slot owns one client and at most one live session. Sessions are
//! created lazily on first use and then re-pointed at new dataset items with
//! `reset`; they are only closed at pool teardown.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::conversation::{ConversationMessage, StepOutput};
use crate::env::{EnvClient, SessionId};
use crate::error::{HarnessError, Result};

/// One pool slot: a client plus its (lazily created) session.
#[derive(Debug)]
pub struct PoolSlot<C> {
    client: C,
    session: Option<SessionId>,
}

impl<C> PoolSlot<C> {
    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Owns `n_clients` adapters of one environment and hands them out by data
/// index. Holding a [`ClientHandle`] locks its slot, so rollouts that map to
/// the same slot run one after another.
#[derive(Debug)]
pub struct Task<C> {
    name: String,
    data_len: usize,
    slots: Vec<Arc<Mutex<PoolSlot<C>>>>,
}

impl<C: EnvClient> Task<C> {
    /// Build a pool from already-constructed clients.
    pub fn new(name: impl Into<String>, clients: Vec<C>) -> Result<Self> {
        let name = name.into();
        let data_len = match clients.first() {
            Some(client) => client.len(),
            None => {
                return Err(HarnessError::Config(format!(
                    "task '{name}' needs at least one client"
                )))
            }
        };

        let slots = clients
            .into_iter()
            .map(|client| {
                Arc::new(Mutex::new(PoolSlot {
                    client,
                    session: None,
                }))
            })
            .collect();

        Ok(Self {
            name,
            data_len,
            slots,
        })
    }

    /// Build `n_clients` clients with `factory`, all sharing one configuration.
    pub fn from_factory<F>(name: impl Into<String>, n_clients: usize, mut factory: F) -> Result<Self>
    where
        F: FnMut() -> Result<C>,
    {
        let clients = (0..n_clients)
            .map(|_| factory())
            .collect::<Result<Vec<_>>>()?;
        Self::new(name, clients)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of addressable dataset items.
    pub fn len(&self) -> usize {
        self.data_len
    }

    pub fn is_empty(&self) -> bool {
        self.data_len == 0
    }

    pub fn n_clients(&self) -> usize {
        self.slots.len()
    }

    /// Slot serving `data_idx` (round-robin).
    pub fn slot_for(&self, data_idx: usize) -> usize {
        data_idx % self.slots.len()
    }

    /// Lock the slot for `data_idx`, create its session if needed and reset
    /// it to `data_idx`.
    ///
    /// Waits while another caller holds the same slot.
    pub async fn select(&self, data_idx: usize) -> Result<ClientHandle<C>> {
        let slot = self.slot_for(data_idx);
        let mut guard = Arc::clone(&self.slots[slot]).lock_owned().await;

        let session = match guard.session.clone() {
            Some(session) => session,
            None => {
                let session = guard.client.create().await?;
                debug!(task = %self.name, slot, session = %session, "slot session created");
                guard.session = Some(session.clone());
                session
            }
        };

        guard.client.reset(&session, data_idx).await?;

        Ok(ClientHandle {
            guard,
            session,
            slot,
            data_idx,
        })
    }

    /// Run `f` against the slot's state once no rollout holds it.
    pub async fn inspect<R>(&self, slot: usize, f: impl FnOnce(&PoolSlot<C>) -> R) -> Option<R> {
        let cell = self.slots.get(slot)?;
        let guard = cell.lock().await;
        Some(f(&guard))
    }

    /// Close every slot's session (best effort). Slots stay usable; the next
    /// `select` creates a fresh session.
    pub async fn close_all(&self) {
        let mut closed = 0;
        for cell in &self.slots {
            let mut slot = cell.lock().await;
            if let Some(session) = slot.session.take() {
                slot.client.close(&session).await;
                closed += 1;
            }
        }
        info!(task = %self.name, closed, "task sessions closed");
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Exclusive access to one slot's client and session for one rollout.
///
/// Dropping the handle releases the slot.
#[derive(Debug)]
pub struct ClientHandle<C> {
    guard: OwnedMutexGuard<PoolSlot<C>>,
    session: SessionId,
    slot: usize,
    data_idx: usize,
}

impl<C: EnvClient> ClientHandle<C> {
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn data_idx(&self) -> usize {
        self.data_idx
    }

    pub fn client(&self) -> &C {
        &self.guard.client
    }

    pub fn conversation_start(&self) -> &[ConversationMessage] {
        self.guard.client.conversation_start()
    }

    pub fn observe(&self) -> String {
        self.guard.client.observe(&self.session)
    }

    pub async fn step(&mut self, action_text: &str) -> Result<StepOutput> {
        self.guard.client.step(&self.session, action_text).await
    }

    pub fn is_success(&self, last: &StepOutput) -> bool {
        self.guard.client.is_success(last)
    }
}
