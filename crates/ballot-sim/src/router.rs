//! Moves delivered messages from the network into node inboxes.

use std::collections::BTreeSet;

use crate::error::{SimError, SimResult};
use crate::node::Node;
use crate::runtime::World;

/// Runs one routing round.
///
/// Every message that has arrived is appended to its destination's inbox.
/// Afterwards exactly one dispatch task is scheduled per node that received
/// something, in ascending node id order. Returns the number of messages routed.
pub fn route<N: Node>(world: &mut World<N>) -> SimResult<usize> {
    let ready = world.runtime.fetch_ready();
    let routed = ready.len();
    let mut ready_nodes = BTreeSet::new();

    for envelope in ready {
        let node = world
            .nodes
            .get_mut(envelope.to.as_usize())
            .ok_or(SimError::UnknownNode {
                message_id: envelope.message_id,
                node: envelope.to,
            })?;
        node.deliver(envelope);
        ready_nodes.insert(envelope.to);
    }

    for id in ready_nodes {
        tracing::trace!(node = %id, "scheduling dispatch");
        world
            .runtime
            .request_work(Box::new(move |w: &mut World<N>| w.dispatch(id)));
    }
    Ok(routed)
}
