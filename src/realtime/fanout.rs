//! Live viewer membership and broadcast.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use metrics::{counter, gauge};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::canvas::UpdateEvent;
use crate::util::sync::{read_or_recover, write_or_recover};

const OWNER: &str = "realtime::fanout";
const METRIC_SESSIONS: &str = "pixelwar_fanout_sessions";
const METRIC_DELIVERY_FAILURES: &str = "pixelwar_fanout_delivery_failures_total";

pub type SessionId = Uuid;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("viewer connection closed")]
    Closed,
    #[error("viewer did not accept the event within {0:?}")]
    Stalled(Duration),
}

/// One live viewer. Implementations must be safe to call from concurrent broadcasts.
#[async_trait]
pub trait ViewerConnection: Send + Sync {
    async fn deliver(&self, event: &UpdateEvent) -> Result<(), DeliveryError>;
}

/// Viewer backed by a bounded channel; the receiving half feeds the transport.
pub struct ChannelViewer {
    sender: mpsc::Sender<UpdateEvent>,
    timeout: Duration,
}

impl ChannelViewer {
    pub fn new(buffer: usize, timeout: Duration) -> (Self, mpsc::Receiver<UpdateEvent>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender, timeout }, receiver)
    }
}

#[async_trait]
impl ViewerConnection for ChannelViewer {
    async fn deliver(&self, event: &UpdateEvent) -> Result<(), DeliveryError> {
        match tokio::time::timeout(self.timeout, self.sender.send(event.clone())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DeliveryError::Closed),
            Err(_) => Err(DeliveryError::Stalled(self.timeout)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Registry of live viewers.
///
/// Broadcasts work on a copy of the membership taken when the call starts, so registering or
/// unregistering during a broadcast never blocks on delivery.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<dyn ViewerConnection>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection: Arc<dyn ViewerConnection>) -> SessionId {
        let id = Uuid::new_v4();
        let count = {
            let mut sessions = write_or_recover(&self.sessions, OWNER, "register");
            sessions.insert(id, connection);
            sessions.len()
        };
        gauge!(METRIC_SESSIONS).set(count as f64);
        debug!(target = "pixelwar::fanout", session_id = %id, sessions = count, "Viewer registered");
        id
    }

    /// Remove a viewer. Returns `false` when it was already gone.
    pub fn unregister(&self, id: SessionId) -> bool {
        let (removed, count) = {
            let mut sessions = write_or_recover(&self.sessions, OWNER, "unregister");
            (sessions.remove(&id).is_some(), sessions.len())
        };
        if removed {
            gauge!(METRIC_SESSIONS).set(count as f64);
            debug!(target = "pixelwar::fanout", session_id = %id, sessions = count, "Viewer unregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        read_or_recover(&self.sessions, OWNER, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every member in parallel. Members whose delivery fails are removed;
    /// the others are unaffected.
    pub async fn broadcast(&self, event: &UpdateEvent) -> BroadcastReport {
        let members: Vec<(SessionId, Arc<dyn ViewerConnection>)> =
            read_or_recover(&self.sessions, OWNER, "broadcast")
                .iter()
                .map(|(id, connection)| (*id, Arc::clone(connection)))
                .collect();

        let outcomes = join_all(members.iter().map(|(id, connection)| async move {
            (*id, connection.deliver(event).await)
        }))
        .await;

        let mut report = BroadcastReport::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.dropped += 1;
                    counter!(METRIC_DELIVERY_FAILURES).increment(1);
                    debug!(
                        target = "pixelwar::fanout",
                        session_id = %id,
                        error = %err,
                        "Delivery failed; dropping viewer"
                    );
                    self.unregister(id);
                }
            }
        }
        report
    }
}
