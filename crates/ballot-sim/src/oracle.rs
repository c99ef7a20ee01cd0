//! Safety oracle.
//!
//! The oracle inspects the cluster after every harness step and fails the run
//! as soon as a safety property is broken. It reads nodes only through
//! [`LeaderView`], so any node type that can report its role and term can be
//! checked.
//!
//! # Available Checkers
//!
//! - [`ElectionSafetyChecker`]: at most one leader per term

use std::collections::BTreeMap;

use crate::error::{SimError, SimResult};
use crate::message::{NodeId, Term};
use crate::node::Role;

// ============================================================================
// Invariant Result
// ============================================================================

/// Result of an invariant check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantResult {
    /// The invariant holds.
    Ok,
    /// The invariant is violated.
    Violated {
        /// Name of the violated invariant.
        invariant: String,
        /// Description of the violation.
        message: String,
        /// Additional context.
        context: Vec<(String, String)>,
    },
}

impl InvariantResult {
    /// Returns true if the invariant holds.
    pub fn is_ok(&self) -> bool {
        matches!(self, InvariantResult::Ok)
    }

    /// Converts to a `SimError` if violated.
    pub fn into_error(self, time: u64) -> Option<SimError> {
        match self {
            InvariantResult::Ok => None,
            InvariantResult::Violated {
                invariant, message, ..
            } => Some(SimError::InvariantViolation {
                invariant,
                message,
                time,
            }),
        }
    }
}

// ============================================================================
// Leader View
// ============================================================================

/// Read-only view of the election state of a node.
pub trait LeaderView {
    fn id(&self) -> NodeId;
    fn role(&self) -> Role;
    fn term(&self) -> Term;
}

// ============================================================================
// Election Safety Checker
// ============================================================================

/// Verifies that no two nodes are ever leader in the same term.
///
/// The first leader observed for a term is remembered for the rest of the
/// run, so a second leader is caught even if the first has since stepped down.
#[derive(Debug, Default)]
pub struct ElectionSafetyChecker {
    leaders: BTreeMap<Term, NodeId>,
    checks_performed: u64,
}

impl ElectionSafetyChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `node` is leader in `term`.
    pub fn record_leader(&mut self, term: Term, node: NodeId) -> InvariantResult {
        self.checks_performed += 1;

        match self.leaders.get(&term) {
            Some(&existing) if existing != node => InvariantResult::Violated {
                invariant: "election_safety".to_string(),
                message: format!(
                    "two leaders in term {term}: node {existing} and node {node} are both leaders"
                ),
                context: vec![
                    ("term".to_string(), term.to_string()),
                    ("first_leader".to_string(), existing.to_string()),
                    ("second_leader".to_string(), node.to_string()),
                ],
            },
            Some(_) => InvariantResult::Ok,
            None => {
                tracing::debug!(node = %node, term = %term, "recorded leader");
                self.leaders.insert(term, node);
                InvariantResult::Ok
            }
        }
    }

    /// Leader recorded for each term so far.
    pub fn leaders(&self) -> &BTreeMap<Term, NodeId> {
        &self.leaders
    }

    pub fn checks_performed(&self) -> u64 {
        self.checks_performed
    }
}

// ============================================================================
// Raft Oracle
// ============================================================================

/// Per-step invariant enforcement for a Raft cluster.
#[derive(Debug, Default)]
pub struct RaftOracle {
    election_safety: ElectionSafetyChecker,
}

impl RaftOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks every invariant against the current node states.
    pub fn enforce_invariants<V: LeaderView>(&mut self, nodes: &[V], time: u64) -> SimResult<()> {
        for node in nodes.iter().filter(|n| n.role() == Role::Leader) {
            if let Some(err) = self
                .election_safety
                .record_leader(node.term(), node.id())
                .into_error(time)
            {
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn leaders(&self) -> &BTreeMap<Term, NodeId> {
        self.election_safety.leaders()
    }

    pub fn checks_performed(&self) -> u64 {
        self.election_safety.checks_performed()
    }
}
