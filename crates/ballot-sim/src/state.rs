//! Cluster state snapshots and fingerprints.
//!
//! A [`ClusterState`] is captured once per harness step. Its 64-bit hash is
//! the unit of coverage: the fuzzer counts an input as interesting when it
//! reaches a hash it has not seen before.
//!
//! Node hashes are BLAKE3 over a fixed little-endian encoding, truncated to
//! the first 8 bytes, so fingerprints are identical on every platform.

use serde::{Deserialize, Serialize};

use crate::message::{NodeId, Term};
use crate::node::{RaftNode, Role};

/// Election state of one node at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub id: NodeId,
    pub role: Role,
    pub term: Term,
    pub voted_for: Option<NodeId>,
    pub votes_received: u32,
}

impl NodeState {
    /// Size of the byte encoding fed to the hasher.
    const ENCODED_LEN: usize = 1 + 1 + 8 + 2 + 4;

    pub fn capture(node: &RaftNode) -> Self {
        Self {
            id: node.id(),
            role: node.role(),
            term: node.term(),
            voted_for: node.voted_for(),
            votes_received: node.votes_received(),
        }
    }

    fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[0] = self.id.as_u8();
        buf[1] = self.role.as_u8();
        buf[2..10].copy_from_slice(&self.term.as_u64().to_le_bytes());
        // Presence flag keeps "no vote" distinct from a vote for node 0.
        match self.voted_for {
            Some(id) => {
                buf[10] = 1;
                buf[11] = id.as_u8();
            }
            None => {
                buf[10] = 0;
                buf[11] = 0;
            }
        }
        buf[12..16].copy_from_slice(&self.votes_received.to_le_bytes());
        buf
    }

    /// 64-bit fingerprint mixing every field.
    pub fn hash(&self) -> u64 {
        let digest = blake3::hash(&self.encode());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }
}

/// Ordered snapshot of every node, in node id order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    pub nodes: Vec<NodeState>,
}

impl ClusterState {
    pub fn capture(nodes: &[RaftNode]) -> Self {
        Self {
            nodes: nodes.iter().map(NodeState::capture).collect(),
        }
    }

    /// Order-sensitive combination of the node hashes.
    pub fn hash(&self) -> u64 {
        self.nodes
            .iter()
            .fold(0u64, |h, node| h.rotate_left(5) ^ node.hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state(id: u8, role: Role, term: u64, voted_for: Option<u8>, votes: u32) -> NodeState {
        NodeState {
            id: NodeId::new(id),
            role,
            term: Term::new(term),
            voted_for: voted_for.map(NodeId::new),
            votes_received: votes,
        }
    }

    #[test]
    fn equal_snapshots_hash_equal() {
        let a = ClusterState {
            nodes: vec![state(0, Role::Leader, 2, Some(0), 2), state(1, Role::Follower, 2, Some(0), 0)],
        };
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn no_vote_differs_from_vote_for_zero() {
        let none = state(1, Role::Follower, 1, None, 0);
        let zero = state(1, Role::Follower, 1, Some(0), 0);
        assert_ne!(none.hash(), zero.hash());
    }

    #[test]
    fn cluster_hash_is_order_sensitive() {
        let x = state(0, Role::Leader, 1, Some(0), 2);
        let y = state(1, Role::Follower, 1, Some(0), 0);
        let forward = ClusterState { nodes: vec![x, y] };
        let backward = ClusterState { nodes: vec![y, x] };
        assert_ne!(forward.hash(), backward.hash());
    }

    #[test]
    fn empty_cluster_hashes_to_zero() {
        assert_eq!(ClusterState { nodes: vec![] }.hash(), 0);
    }

    #[test]
    fn node_hash_is_stable() {
        let s = state(3, Role::Candidate, 7, Some(3), 1);
        assert_eq!(s.hash(), s.hash());
        assert_eq!(
            ClusterState { nodes: vec![s] }.hash(),
            s.hash(),
            "single-node cluster hash is the node hash"
        );
    }

    proptest! {
        #[test]
        fn changing_term_changes_hash(term in 0u64..1_000_000, bump in 1u64..1_000) {
            let a = state(0, Role::Follower, term, None, 0);
            let b = state(0, Role::Follower, term + bump, None, 0);
            prop_assert_ne!(a.hash(), b.hash());
        }

        #[test]
        fn changing_role_changes_hash(term in 0u64..1_000) {
            let roles = [Role::Leader, Role::Follower, Role::Candidate];
            let hashes: Vec<u64> = roles.iter().map(|&r| state(0, r, term, None, 0).hash()).collect();
            prop_assert_ne!(hashes[0], hashes[1]);
            prop_assert_ne!(hashes[1], hashes[2]);
            prop_assert_ne!(hashes[0], hashes[2]);
        }
    }
}
