//! Error types for simulation runs.
//!
//! Every variant is fatal to the run that raised it. Errors propagate with `?`
//! up to [`crate::harness::run_simulation`], which is the only place that turns
//! them back into a value.

use thiserror::Error;

use crate::message::{MessageId, MessageKind, NodeId};

/// Fatal simulation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// A message reached a node it was not addressed to.
    #[error("message {message_id} was meant for node {expected}, but arrived at node {actual}")]
    MisroutedMessage {
        message_id: MessageId,
        expected: NodeId,
        actual: NodeId,
    },

    /// A message was addressed to a node that does not exist in this cluster.
    #[error("message {message_id} addressed to unknown node {node}")]
    UnknownNode { message_id: MessageId, node: NodeId },

    /// A task referred to a node id outside the cluster.
    #[error("no node with id {node}")]
    NoSuchNode { node: NodeId },

    /// A node received a message kind it has no handler for.
    #[error("node {node} cannot handle {kind} in {context}")]
    UnexpectedMessage {
        node: NodeId,
        kind: MessageKind,
        context: &'static str,
    },

    /// The envelope's declared kind and its payload disagree.
    #[error("message {message_id} declares kind {declared} but carries a {actual} payload")]
    PayloadMismatch {
        message_id: MessageId,
        declared: MessageKind,
        actual: MessageKind,
    },

    /// A response arrived for an RPC nobody is waiting on.
    #[error("response for unregistered rpc {message_id}")]
    UnknownRpc { message_id: MessageId },

    /// A suspended RPC was resumed before its response was stored.
    #[error("rpc {message_id} resumed without a registered response")]
    RpcResumedWithoutResponse { message_id: MessageId },

    /// A safety invariant was violated.
    #[error("invariant '{invariant}' violated at time {time}: {message}")]
    InvariantViolation {
        invariant: String,
        message: String,
        time: u64,
    },
}

impl SimError {
    /// Returns true if this error came from an oracle rather than harness wiring.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, SimError::InvariantViolation { .. })
    }
}

/// Result type for simulation operations.
pub type SimResult<T> = std::result::Result<T, SimError>;
