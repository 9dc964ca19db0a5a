//! Typed pipeline events.
//!
//! Observers subscribe to the [`EventKind`]s they care about and receive
//! [`PipelineEvent`]s over a crossbeam channel. Subscribers whose receiver
//! has been dropped are pruned on the next publish.

use crate::pipeline::clock::Timestamp;
use crate::pipeline::executive::ExecuteReason;
use crate::pipeline::extent::Extent;
use crate::pipeline::id::NodeId;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};

/// Discriminant used to filter subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    InformationComplete,
    ExtentsPropagated,
    ExtentClamped,
    NodeExecuted,
    NodeReused,
    NodeFailed,
    PieceWritten,
}

impl EventKind {
    pub fn all() -> &'static [EventKind] {
        &[
            EventKind::InformationComplete,
            EventKind::ExtentsPropagated,
            EventKind::ExtentClamped,
            EventKind::NodeExecuted,
            EventKind::NodeReused,
            EventKind::NodeFailed,
            EventKind::PieceWritten,
        ]
    }
}

/// Messages published by the executive and the piece writer.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// An information pass finished; `failed` lists nodes whose branch is unusable.
    InformationComplete { pass: u64, failed: Vec<NodeId> },
    ExtentsPropagated { pass: u64 },
    /// A request reached outside a producer's whole extent and was cut back.
    ExtentClamped {
        node_id: NodeId,
        requested: Extent,
        clamped: Extent,
    },
    NodeExecuted {
        node_id: NodeId,
        reason: ExecuteReason,
        timestamp: Timestamp,
    },
    NodeReused { node_id: NodeId },
    NodeFailed { node_id: NodeId, message: String },
    PieceWritten {
        piece: u32,
        num_points: usize,
        num_cells: usize,
    },
}

impl PipelineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PipelineEvent::InformationComplete { .. } => EventKind::InformationComplete,
            PipelineEvent::ExtentsPropagated { .. } => EventKind::ExtentsPropagated,
            PipelineEvent::ExtentClamped { .. } => EventKind::ExtentClamped,
            PipelineEvent::NodeExecuted { .. } => EventKind::NodeExecuted,
            PipelineEvent::NodeReused { .. } => EventKind::NodeReused,
            PipelineEvent::NodeFailed { .. } => EventKind::NodeFailed,
            PipelineEvent::PieceWritten { .. } => EventKind::PieceWritten,
        }
    }
}

struct Subscriber {
    kinds: Vec<EventKind>,
    tx: Sender<PipelineEvent>,
}

/// Fan-out of events to subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
    capacity: Option<usize>,
}

impl EventBus {
    /// `capacity` bounds each subscriber's queue; full queues drop new events.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            subscribers: Vec::new(),
            capacity,
        }
    }

    pub fn subscribe(&mut self, kinds: &[EventKind]) -> Receiver<PipelineEvent> {
        let (tx, rx) = match self.capacity {
            Some(cap) => bounded(cap),
            None => unbounded(),
        };
        self.subscribers.push(Subscriber {
            kinds: kinds.to_vec(),
            tx,
        });
        rx
    }

    pub fn publish(&mut self, event: PipelineEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        let kind = event.kind();
        self.subscribers.retain(|sub| {
            if !sub.kinds.contains(&kind) {
                return true;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::trace!("Event subscriber queue full, dropping {:?}", kind);
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
