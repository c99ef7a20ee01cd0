//! Minimal ping node.
//!
//! Exercises the runtime, router and RPC table without any protocol state:
//! each node pings a random member (possibly itself) for a fixed number of
//! rounds and answers every ping it receives. A pinger cluster always drains.

use crate::error::SimResult;
use crate::message::{Envelope, MessageKind, NodeId, Payload, PingRequest, PingResponse};
use crate::node::Node;
use crate::runtime::{Runtime, World};

/// Rounds each pinger runs before its main loop ends.
pub const PING_ROUNDS: u32 = 10;

#[derive(Debug, Clone)]
pub struct PingerNode {
    id: NodeId,
    nr_nodes: u8,
    rounds_completed: u32,
    pings_answered: u32,
    inbox: Vec<Envelope>,
}

impl PingerNode {
    pub fn new(id: NodeId, nr_nodes: u8) -> Self {
        Self {
            id,
            nr_nodes,
            rounds_completed: 0,
            pings_answered: 0,
            inbox: Vec::new(),
        }
    }

    /// Pings that got a response.
    pub fn rounds_completed(&self) -> u32 {
        self.rounds_completed
    }

    /// Pings this node replied to.
    pub fn pings_answered(&self) -> u32 {
        self.pings_answered
    }

    /// True once the main loop has run all of its rounds.
    pub fn is_finished(&self) -> bool {
        self.rounds_completed >= PING_ROUNDS
    }

    fn ping_round(world: &mut World<Self>, id: NodeId) -> SimResult<()> {
        world.with_node(id, |node, rt| {
            if node.is_finished() {
                tracing::debug!(node = %id, "main loop finished");
                return;
            }
            let upper = u64::from(node.nr_nodes.saturating_sub(1));
            // Bounded by nr_nodes - 1, which fits in a u8.
            let target = NodeId::new(u8::try_from(rt.random_range(0, upper)).unwrap_or(0));
            tracing::debug!(node = %id, target = %target, round = node.rounds_completed, "pinging");
            rt.rpc(
                id,
                target,
                Payload::PingRequest(PingRequest),
                Box::new(move |w: &mut World<Self>, response: Envelope| {
                    Self::on_pong(w, id, response)
                }),
            );
        })
    }

    fn on_pong(world: &mut World<Self>, id: NodeId, envelope: Envelope) -> SimResult<()> {
        if envelope.kind != MessageKind::PingResponse {
            return Err(envelope.unexpected("ping round"));
        }
        world.with_node(id, |node, _| {
            node.rounds_completed += 1;
            tracing::debug!(node = %id, from = %envelope.from, "got pong");
        })?;
        Self::ping_round(world, id)
    }
}

impl Node for PingerNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn inbox_mut(&mut self) -> &mut Vec<Envelope> {
        &mut self.inbox
    }

    fn accepts(&self, kind: MessageKind) -> bool {
        matches!(kind, MessageKind::PingRequest | MessageKind::PingResponse)
    }

    fn start(world: &mut World<Self>, id: NodeId) -> SimResult<()> {
        tracing::debug!(node = %id, "starting ping loop");
        Self::ping_round(world, id)
    }

    fn handle_request(&mut self, rt: &mut Runtime<Self>, envelope: Envelope) -> SimResult<()> {
        envelope.check_destination(self.id)?;
        if envelope.kind != MessageKind::PingRequest {
            return Err(envelope.unexpected("ping handler"));
        }
        self.pings_answered += 1;
        rt.send_message(envelope.reply(Payload::PingResponse(PingResponse)));
        Ok(())
    }
}
