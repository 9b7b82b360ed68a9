//! Correlation registry: job id → waiting client connection.
//!
//! The only shared mutable state between the dispatcher and the result
//! correlator. All access goes through the atomic operations below; there is
//! no way to reach the underlying map.
//!
//! Lifecycle of a job id, from the registry's point of view:
//!
//! ```text
//! UNREGISTERED --insert--> REGISTERED --take/remove--> DELIVERED | DROPPED
//!                                     \--take_expired--> EXPIRED
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use sentinel_core::JobId;

use crate::connection::{ConnectionClosed, ConnectionHandle};

/// Where a job stands relative to its acknowledgement.
#[derive(Debug)]
enum AckState {
    /// Dispatch in progress; holds a message that arrived too early.
    Pending(Option<String>),
    Acknowledged,
    /// Dispatch was rolled back.
    Abandoned,
}

/// What [`Registration::deliver`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Held until the acknowledgement goes out.
    Parked,
    /// The dispatch was rolled back; the message is gone.
    Discarded,
}

/// A waiting client for one job.
///
/// Clones share the acknowledgement state. Until [`Registration::acknowledge`]
/// runs, anything delivered is parked, so the client always sees the ack
/// first. The state lock only ever covers in-memory channel sends.
#[derive(Debug, Clone)]
pub struct Registration {
    pub connection: ConnectionHandle,
    pub expires_at: Option<DateTime<Utc>>,
    ack: Arc<Mutex<AckState>>,
}

impl Registration {
    pub fn new(connection: ConnectionHandle, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            connection,
            expires_at,
            ack: Arc::new(Mutex::new(AckState::Pending(None))),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Send the acknowledgement, then flush anything parked behind it.
    ///
    /// No-op once acknowledged or abandoned.
    pub fn acknowledge(&self, ack: String) -> Result<(), ConnectionClosed> {
        let mut state = self.state();
        let parked = match &mut *state {
            AckState::Pending(parked) => parked.take(),
            AckState::Acknowledged | AckState::Abandoned => return Ok(()),
        };
        *state = AckState::Acknowledged;

        self.connection.send(ack)?;
        match parked {
            Some(text) => self.connection.send(text),
            None => Ok(()),
        }
    }

    /// Forward `text` to the client, or park it until the ack is out.
    pub fn deliver(&self, text: String) -> Result<Delivery, ConnectionClosed> {
        let mut state = self.state();
        match &mut *state {
            AckState::Acknowledged => self.connection.send(text).map(|()| Delivery::Sent),
            AckState::Pending(slot) => {
                *slot = Some(text);
                Ok(Delivery::Parked)
            }
            AckState::Abandoned => Ok(Delivery::Discarded),
        }
    }

    /// Mark the dispatch as failed, discarding anything parked.
    pub fn abandon(&self) {
        *self.state() = AckState::Abandoned;
    }

    fn state(&self) -> MutexGuard<'_, AckState> {
        self.ack.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    entries: Mutex<HashMap<JobId, Registration>>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` as the recipient of `job_id`'s result.
    ///
    /// Returns the caller's handle on the new, not yet acknowledged,
    /// registration. An existing entry for the same id is replaced.
    pub fn insert(
        &self,
        job_id: JobId,
        connection: ConnectionHandle,
        expires_at: Option<DateTime<Utc>>,
    ) -> Registration {
        let registration = Registration::new(connection, expires_at);
        self.lock().insert(job_id, registration.clone());
        registration
    }

    /// Lookup-and-remove in one step. At most one caller ever gets `Some`.
    pub fn take(&self, job_id: &JobId) -> Option<Registration> {
        self.lock().remove(job_id)
    }

    /// Remove without returning the registration.
    pub fn remove(&self, job_id: &JobId) -> bool {
        self.lock().remove(job_id).is_some()
    }

    /// Remove and return every registration whose deadline is at or before `now`.
    pub fn take_expired(&self, now: DateTime<Utc>) -> Vec<(JobId, Registration)> {
        let mut entries = self.lock();
        let expired: Vec<JobId> = entries
            .iter()
            .filter(|(_, reg)| reg.is_expired_at(now))
            .map(|(id, _)| *id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| entries.remove(&id).map(|reg| (id, reg)))
            .collect()
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.lock().contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Registration>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
