//! Client session management.
//!
//! One [`ClientSession`] per connected socket. Notifications are pushed
//! through the session's outbox to the connection's writer task and are
//! considered delivered once the writer has put the frame on the
//! transport. Broadcast fans out with independent completion: a dead or
//! erroring session is logged and pruned, never allowed to block delivery
//! to the others.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use callisto_core::CellOutput;
use futures::future::join_all;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::ServerFrame;

/// Frame queued for a session's writer task.
pub struct Outbound {
    /// Frame to put on the wire.
    pub frame: ServerFrame,
    /// Resolved by the writer after the transport write: `true` on
    /// success, dropped or `false` when the write failed. `None` for
    /// fire-and-forget frames (replies, errors).
    pub delivered: Option<oneshot::Sender<bool>>,
}

/// One connected client.
pub struct ClientSession {
    id: u64,
    outbox: mpsc::UnboundedSender<Outbound>,
}

impl ClientSession {
    /// Session identifier (unique for the lifetime of the manager).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Send a frame without waiting for delivery (replies, errors).
    pub fn send(&self, frame: ServerFrame) -> bool {
        self.outbox
            .send(Outbound {
                frame,
                delivered: None,
            })
            .is_ok()
    }

    /// Push a notification and wait until the writer task has put it on
    /// the transport.
    ///
    /// Returns `false` when the session closed before the write
    /// completed. Delivery depends only on this session's writer, never
    /// on the remote client cooperating.
    async fn notify(&self, frame: ServerFrame) -> bool {
        let (tx, rx) = oneshot::channel();
        if self
            .outbox
            .send(Outbound {
                frame,
                delivered: Some(tx),
            })
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }
}

/// Tracks the set of connected clients.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<FxHashMap<u64, Arc<ClientSession>>>,
    next_id: AtomicU64,
}

impl SessionManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session.
    ///
    /// Returns the session handle and the outbox receiver the connection's
    /// writer task drains. The session observes only notifications
    /// broadcast after this call.
    pub fn register(&self) -> (Arc<ClientSession>, mpsc::UnboundedReceiver<Outbound>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(ClientSession { id, outbox: tx });
        self.sessions
            .write()
            .expect("session set lock poisoned")
            .insert(id, session.clone());
        (session, rx)
    }

    /// Remove a session; it receives no further notifications.
    pub fn remove(&self, id: u64) {
        self.sessions
            .write()
            .expect("session set lock poisoned")
            .remove(&id);
    }

    /// Number of connected sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().expect("session set lock poisoned").len()
    }

    /// Whether no sessions are connected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.sessions
            .read()
            .expect("session set lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Tell every connected session a cell run started, awaiting delivery
    /// to each.
    pub async fn start_execution(&self, path: &str, cell_id: &str) {
        self.broadcast(ServerFrame::StartCellExecution {
            path: path.to_string(),
            cell_id: cell_id.to_string(),
        })
        .await;
    }

    /// Tell every connected session a cell run finished, awaiting delivery
    /// to each.
    pub async fn end_execution(&self, path: &str, cell_id: &str, output: CellOutput) {
        self.broadcast(ServerFrame::EndCellExecution {
            path: path.to_string(),
            cell_id: cell_id.to_string(),
            cell_output: output,
        })
        .await;
    }

    /// Fan out a notification with independent completion; sessions whose
    /// delivery failed are pruned.
    async fn broadcast(&self, frame: ServerFrame) {
        let sessions = self.snapshot();
        let delivered = join_all(sessions.iter().map(|s| s.notify(frame.clone()))).await;

        for (session, ok) in sessions.iter().zip(delivered) {
            if !ok {
                tracing::warn!(session = session.id(), "delivery failed, pruning session");
                self.remove(session.id());
            }
        }
    }
}
