//! Simulation runtime and the per-run world arena.
//!
//! The [`Runtime`] owns every shared resource of a run (clock, random source,
//! scheduler, network and the RPC correlation table) and exposes the small set
//! of primitives nodes use to interact with each other:
//!
//! - [`Runtime::sleep`] / [`Runtime::request_work`] - schedule a task
//! - [`Runtime::send_message`] - fire-and-forget send
//! - [`Runtime::rpc`] - send a request and suspend until its response arrives
//!
//! Suspension is explicit: the caller hands over a boxed continuation which is
//! resumed later by a freshly scheduled task. Continuations receive the whole
//! [`World`] so they can re-enter their node by id.
//!
//! ```text
//! ┌──────────────────────── World<N> ────────────────────────┐
//! │ Runtime<N>                                               │
//! │   clock · rng · scheduler<Task<N>> · network · rpc table │
//! │ nodes: Vec<N>  (indexed by NodeId)                       │
//! └──────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use crate::clock::SimClock;
use crate::error::{SimError, SimResult};
use crate::message::{Envelope, MessageId, NodeId, Payload};
use crate::network::{NetworkStats, SimNetwork};
use crate::node::Node;
use crate::rng::SimRng;
use crate::scheduler::Scheduler;

/// A unit of scheduled work.
pub type Task<N> = Box<dyn FnOnce(&mut World<N>) -> SimResult<()>>;

/// What to do once an RPC response arrives.
pub type RpcContinuation<N> = Box<dyn FnOnce(&mut World<N>, Envelope) -> SimResult<()>>;

// ============================================================================
// Runtime
// ============================================================================

/// Coordinator for one simulation run.
pub struct Runtime<N> {
    clock: SimClock,
    rng: SimRng,
    scheduler: Scheduler<Task<N>>,
    network: SimNetwork,
    next_message_id: u64,
    /// Suspended RPC callers, keyed by request id.
    waiting: BTreeMap<MessageId, RpcContinuation<N>>,
    /// Responses that arrived but whose caller has not resumed yet.
    responses: BTreeMap<MessageId, Envelope>,
}

impl<N: Node> Runtime<N> {
    /// Creates a runtime at time zero.
    pub fn new(rng: SimRng, max_jitter: u64, max_network_delay: u64) -> Self {
        Self {
            clock: SimClock::new(),
            rng,
            scheduler: Scheduler::new(max_jitter),
            network: SimNetwork::new(max_network_delay),
            next_message_id: 0,
            waiting: BTreeMap::new(),
            responses: BTreeMap::new(),
        }
    }

    /// Resumes `task` after `delay` ticks (plus jitter).
    pub fn sleep(&mut self, delay: u64, task: Task<N>) {
        let now = self.clock.now();
        self.scheduler
            .schedule_task_with_delay(task, delay, now, &mut self.rng);
    }

    /// Submits `task` to run as soon as jitter allows.
    pub fn request_work(&mut self, task: Task<N>) {
        let now = self.clock.now();
        self.scheduler.schedule_task(task, now, &mut self.rng);
    }

    /// Hands `envelope` to the network without waiting for any reply.
    pub fn send_message(&mut self, envelope: Envelope) {
        let now = self.clock.now();
        self.network.push_entry(envelope, now, &mut self.rng);
    }

    /// Allocates a fresh message id.
    pub fn next_message_id(&mut self) -> MessageId {
        let id = MessageId::from_raw(self.next_message_id);
        self.next_message_id += 1;
        id
    }

    /// Sends a request and parks `continuation` until the matching response
    /// has been delivered and a resume task has run.
    pub fn rpc(
        &mut self,
        from: NodeId,
        to: NodeId,
        payload: Payload,
        continuation: RpcContinuation<N>,
    ) -> MessageId {
        let message_id = self.next_message_id();
        self.waiting.insert(message_id, continuation);
        self.send_message(Envelope::new(message_id, from, to, payload));
        message_id
    }

    /// Stores `response` and schedules the suspended caller's resumption.
    ///
    /// The caller is never resumed inline.
    pub fn register_rpc_completion(
        &mut self,
        message_id: MessageId,
        response: Envelope,
    ) -> SimResult<()> {
        if !self.waiting.contains_key(&message_id) {
            return Err(SimError::UnknownRpc { message_id });
        }
        self.responses.insert(message_id, response);
        self.request_work(Box::new(move |world: &mut World<N>| {
            world.resume_rpc(message_id)
        }));
        Ok(())
    }

    /// Draws from `[lo, hi]` using the run's random source.
    pub fn random_range(&mut self, lo: u64, hi: u64) -> u64 {
        self.rng.draw(lo, hi)
    }

    /// Current virtual time.
    pub fn get_time(&self) -> u64 {
        self.clock.now()
    }

    /// Advances the clock by one tick.
    pub fn tick(&mut self) {
        self.clock.tick();
    }

    /// Number of RPCs whose caller has not resumed yet.
    pub fn pending_rpcs(&self) -> usize {
        self.waiting.len()
    }

    /// Returns true if any task is queued.
    pub fn has_work(&self) -> bool {
        self.scheduler.has_work()
    }

    /// Number of queued tasks, due or not.
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.pending()
    }

    /// Returns true if any message is in flight.
    pub fn has_messages(&self) -> bool {
        self.network.has_messages()
    }

    /// Removes every message that has arrived by now.
    pub fn fetch_ready(&mut self) -> Vec<Envelope> {
        let now = self.clock.now();
        self.network.fetch_ready(now)
    }

    pub fn network_stats(&self) -> NetworkStats {
        *self.network.stats()
    }

    fn pop_ready(&mut self) -> Option<Task<N>> {
        let now = self.clock.now();
        self.scheduler.pop_ready(now).map(|pending| pending.task)
    }

    fn take_rpc(&mut self, message_id: MessageId) -> SimResult<(RpcContinuation<N>, Envelope)> {
        let response = self
            .responses
            .remove(&message_id)
            .ok_or(SimError::RpcResumedWithoutResponse { message_id })?;
        let continuation = self
            .waiting
            .remove(&message_id)
            .ok_or(SimError::UnknownRpc { message_id })?;
        Ok((continuation, response))
    }
}

// ============================================================================
// World
// ============================================================================

/// Arena owning the runtime and every node of one run.
pub struct World<N> {
    pub runtime: Runtime<N>,
    pub nodes: Vec<N>,
}

impl<N: Node> World<N> {
    pub fn new(runtime: Runtime<N>, nodes: Vec<N>) -> Self {
        Self { runtime, nodes }
    }

    pub fn node(&self, id: NodeId) -> Option<&N> {
        self.nodes.get(id.as_usize())
    }

    /// Runs `f` against node `id` with mutable access to the runtime.
    pub fn with_node<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut N, &mut Runtime<N>) -> R,
    ) -> SimResult<R> {
        let node = self
            .nodes
            .get_mut(id.as_usize())
            .ok_or(SimError::NoSuchNode { node: id })?;
        Ok(f(node, &mut self.runtime))
    }

    /// Enqueues the main loop of every node, in id order.
    pub fn start_nodes(&mut self) {
        let ids: Vec<NodeId> = self.nodes.iter().map(Node::id).collect();
        for id in ids {
            self.runtime
                .request_work(Box::new(move |world: &mut World<N>| N::start(world, id)));
        }
    }

    /// Runs every task that is due at the current time, including tasks that
    /// become due while draining. Returns the number of tasks run.
    pub fn run_until_blocked(&mut self) -> SimResult<usize> {
        let mut ran = 0;
        while let Some(task) = self.runtime.pop_ready() {
            task(self)?;
            ran += 1;
        }
        Ok(ran)
    }

    /// Hands a stored response to its suspended caller.
    pub fn resume_rpc(&mut self, message_id: MessageId) -> SimResult<()> {
        let (continuation, response) = self.runtime.take_rpc(message_id)?;
        continuation(self, response)
    }

    /// Drains node `id`'s inbox: requests spawn handler tasks, responses
    /// complete their RPCs.
    pub fn dispatch(&mut self, id: NodeId) -> SimResult<()> {
        let inbox = self.with_node(id, |node, _| std::mem::take(node.inbox_mut()))?;
        tracing::debug!(node = %id, messages = inbox.len(), "dispatching inbox");

        for envelope in inbox {
            envelope.check_destination(id)?;
            envelope.check_kind()?;
            let accepted = self.with_node(id, |node, _| node.accepts(envelope.kind))?;
            if !accepted {
                return Err(envelope.unexpected("dispatch"));
            }

            if envelope.kind.is_request() {
                tracing::trace!(node = %id, message_id = %envelope.message_id, kind = %envelope.kind, "spawning handler");
                self.runtime
                    .request_work(Box::new(move |world: &mut World<N>| {
                        world.handle_request(id, envelope)
                    }));
            } else {
                tracing::trace!(node = %id, message_id = %envelope.message_id, kind = %envelope.kind, "completing rpc");
                self.runtime
                    .register_rpc_completion(envelope.message_id, envelope)?;
            }
        }
        Ok(())
    }

    fn handle_request(&mut self, id: NodeId, envelope: Envelope) -> SimResult<()> {
        self.with_node(id, |node, rt| node.handle_request(rt, envelope))?
    }
}
