//! Simulated cluster members.
//!
//! A node is a passive state holder plus two entry points the runtime drives:
//! a long-lived main loop ([`Node::start`]) and a per-request handler
//! ([`Node::handle_request`]). Both run as scheduled tasks; a node never runs
//! code outside of one.

mod pinger;
mod raft;

pub use pinger::{PING_ROUNDS, PingerNode};
pub use raft::{ELECTION_POLL_INTERVAL, RaftNode, RaftTiming, Role};

use crate::error::SimResult;
use crate::message::{Envelope, MessageKind, NodeId};
use crate::runtime::{Runtime, World};

/// Capability shared by every node type the runtime can host.
pub trait Node: Sized + 'static {
    /// This node's id; equal to its index in [`World::nodes`].
    fn id(&self) -> NodeId;

    /// Messages delivered by the router and not yet dispatched.
    fn inbox_mut(&mut self) -> &mut Vec<Envelope>;

    /// Returns true if this node type has a handler for `kind`.
    fn accepts(&self, kind: MessageKind) -> bool;

    /// Entry point of the main loop. Scheduled once per node when a run starts.
    fn start(world: &mut World<Self>, id: NodeId) -> SimResult<()>;

    /// Handles one request-kind message. Runs as its own task.
    fn handle_request(&mut self, rt: &mut Runtime<Self>, envelope: Envelope) -> SimResult<()>;

    /// Appends a delivered message to the inbox.
    fn deliver(&mut self, envelope: Envelope) {
        self.inbox_mut().push(envelope);
    }
}
