//! Raft leader election.
//!
//! Only the election half of Raft is modelled: terms, votes and heartbeats.
//! There is no log, so AppendEntries carries just the leader's term.
//!
//! The main loop is written as a chain of steps. Each step either finishes by
//! suspending (an RPC or a sleep, whose continuation is the next step) or by
//! calling the next step directly:
//!
//! ```text
//!            ┌──────────── run ────────────┐
//!            │ Leader         Follower/Cand│
//!            ▼                             ▼
//!     heartbeat_round ──rpc──┐   check_election_timeout ──sleep(10)──► run
//!            ▲               │             │ timed out
//!            └── response ◄──┘             ▼
//!                                   request_votes ──rpc──► on_vote_response
//!                                          ▲                     │
//!                                          └─────── next peer ◄──┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::SimResult;
use crate::message::{
    AppendEntriesRequest, AppendEntriesResponse, Envelope, MessageKind, NodeId, Payload,
    RequestVoteRequest, RequestVoteResponse, Term,
};
use crate::node::Node;
use crate::oracle::LeaderView;
use crate::runtime::{Runtime, World};

/// Ticks a follower waits between election timeout checks.
pub const ELECTION_POLL_INTERVAL: u64 = 10;

/// Raft role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Role {
    #[default]
    Follower,
    Candidate,
    Leader,
}

impl Role {
    /// Stable numeric tag, used when hashing cluster state.
    pub fn as_u8(self) -> u8 {
        match self {
            Role::Leader => 0,
            Role::Follower => 1,
            Role::Candidate => 2,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::Follower => "follower",
            Role::Candidate => "candidate",
            Role::Leader => "leader",
        };
        f.write_str(name)
    }
}

/// Election timing, in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftTiming {
    pub election_timeout_min: u64,
    pub election_timeout_max: u64,
    pub heartbeat_interval: u64,
}

/// A Raft node restricted to leader election.
#[derive(Debug, Clone)]
pub struct RaftNode {
    id: NodeId,
    nr_nodes: u8,
    timing: RaftTiming,
    role: Role,
    term: Term,
    voted_for: Option<NodeId>,
    votes_received: u32,
    last_heartbeat_time: u64,
    inbox: Vec<Envelope>,
}

impl RaftNode {
    pub fn new(id: NodeId, nr_nodes: u8, timing: RaftTiming) -> Self {
        Self {
            id,
            nr_nodes,
            timing,
            role: Role::Follower,
            term: Term::ZERO,
            voted_for: None,
            votes_received: 0,
            last_heartbeat_time: 0,
            inbox: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn term(&self) -> Term {
        self.term
    }

    pub fn voted_for(&self) -> Option<NodeId> {
        self.voted_for
    }

    pub fn votes_received(&self) -> u32 {
        self.votes_received
    }

    pub fn last_heartbeat_time(&self) -> u64 {
        self.last_heartbeat_time
    }

    pub fn nr_nodes(&self) -> u8 {
        self.nr_nodes
    }

    pub fn timing(&self) -> RaftTiming {
        self.timing
    }

    /// First peer with id `>= from`, skipping self.
    fn next_peer(&self, from: u8) -> Option<NodeId> {
        (from..self.nr_nodes)
            .find(|&i| i != self.id.as_u8())
            .map(NodeId::new)
    }

    fn has_majority(&self) -> bool {
        self.votes_received > u32::from(self.nr_nodes) / 2
    }

    fn step_down(&mut self, term: Term, now: u64) {
        self.term = term;
        self.role = Role::Follower;
        self.voted_for = None;
        self.last_heartbeat_time = now;
    }

    fn become_candidate(&mut self, now: u64) {
        self.role = Role::Candidate;
        self.term = self.term.next();
        self.voted_for = Some(self.id);
        self.votes_received = 1;
        self.last_heartbeat_time = now;
    }

    // ========================================================================
    // Main loop
    // ========================================================================

    fn run(world: &mut World<Self>, id: NodeId) -> SimResult<()> {
        match world.with_node(id, |node, _| node.role)? {
            Role::Leader => Self::heartbeat_round(world, id, 0),
            Role::Follower | Role::Candidate => Self::check_election_timeout(world, id),
        }
    }

    fn check_election_timeout(world: &mut World<Self>, id: NodeId) -> SimResult<()> {
        let timed_out = world.with_node(id, |node, rt| {
            let timeout = rt.random_range(
                node.timing.election_timeout_min,
                node.timing.election_timeout_max,
            );
            let now = rt.get_time();
            if now.saturating_sub(node.last_heartbeat_time) < timeout {
                rt.sleep(
                    ELECTION_POLL_INTERVAL,
                    Box::new(move |w: &mut World<Self>| Self::run(w, id)),
                );
                return false;
            }
            node.become_candidate(now);
            tracing::info!(node = %id, term = %node.term, "election timeout, becoming candidate");
            true
        })?;

        if timed_out {
            Self::request_votes(world, id, 0)
        } else {
            Ok(())
        }
    }

    fn heartbeat_round(world: &mut World<Self>, id: NodeId, from: u8) -> SimResult<()> {
        let sent = world.with_node(id, |node, rt| {
            let Some(peer) = node.next_peer(from) else {
                return false;
            };
            tracing::debug!(node = %id, peer = %peer, term = %node.term, "sending heartbeat");
            let request = AppendEntriesRequest {
                term: node.term,
                leader_id: id,
            };
            rt.rpc(
                id,
                peer,
                Payload::AppendEntriesRequest(request),
                Box::new(move |w: &mut World<Self>, response: Envelope| {
                    Self::on_append_entries_response(w, id, peer, response)
                }),
            );
            true
        })?;

        if sent {
            Ok(())
        } else {
            Self::finish_heartbeat_round(world, id)
        }
    }

    fn on_append_entries_response(
        world: &mut World<Self>,
        id: NodeId,
        peer: NodeId,
        envelope: Envelope,
    ) -> SimResult<()> {
        let response = envelope.append_entries_response("heartbeat round")?;
        let stepped_down = world.with_node(id, |node, rt| {
            if response.term <= node.term {
                return false;
            }
            tracing::info!(
                node = %id,
                peer = %peer,
                term = %response.term,
                "higher term in heartbeat response, stepping down"
            );
            node.step_down(response.term, rt.get_time());
            true
        })?;

        if stepped_down {
            Self::finish_heartbeat_round(world, id)
        } else {
            Self::heartbeat_round(world, id, peer.as_u8() + 1)
        }
    }

    fn finish_heartbeat_round(world: &mut World<Self>, id: NodeId) -> SimResult<()> {
        let still_leader = world.with_node(id, |node, rt| {
            if node.role != Role::Leader {
                return false;
            }
            rt.sleep(
                node.timing.heartbeat_interval,
                Box::new(move |w: &mut World<Self>| Self::run(w, id)),
            );
            true
        })?;

        if still_leader {
            Ok(())
        } else {
            Self::run(world, id)
        }
    }

    fn request_votes(world: &mut World<Self>, id: NodeId, from: u8) -> SimResult<()> {
        let sent = world.with_node(id, |node, rt| {
            if node.role != Role::Candidate {
                tracing::debug!(node = %id, role = %node.role, "no longer a candidate, aborting election");
                return false;
            }
            let Some(peer) = node.next_peer(from) else {
                tracing::debug!(node = %id, term = %node.term, votes = node.votes_received, "election failed, will retry");
                return false;
            };
            tracing::debug!(node = %id, peer = %peer, term = %node.term, "requesting vote");
            let request = RequestVoteRequest {
                term: node.term,
                candidate_id: id,
            };
            rt.rpc(
                id,
                peer,
                Payload::RequestVoteRequest(request),
                Box::new(move |w: &mut World<Self>, response: Envelope| {
                    Self::on_vote_response(w, id, peer, response)
                }),
            );
            true
        })?;

        if sent { Ok(()) } else { Self::run(world, id) }
    }

    fn on_vote_response(
        world: &mut World<Self>,
        id: NodeId,
        peer: NodeId,
        envelope: Envelope,
    ) -> SimResult<()> {
        let response = envelope.request_vote_response("election round")?;
        let keep_going = world.with_node(id, |node, rt| {
            tracing::debug!(
                node = %id,
                peer = %peer,
                term = %response.term,
                granted = response.vote_granted,
                "vote response received"
            );
            if node.role != Role::Candidate {
                tracing::debug!(node = %id, "no longer a candidate after response, aborting election");
                return false;
            }
            if response.term > node.term {
                tracing::info!(node = %id, term = %response.term, "higher term in vote response, stepping down");
                node.step_down(response.term, rt.get_time());
                return false;
            }
            if response.term == node.term && response.vote_granted {
                node.votes_received += 1;
                if node.has_majority() {
                    tracing::info!(
                        node = %id,
                        term = %node.term,
                        votes = node.votes_received,
                        "won election, becoming leader"
                    );
                    node.role = Role::Leader;
                    return false;
                }
            } else if response.term < node.term {
                tracing::debug!(
                    node = %id,
                    stale_term = %response.term,
                    term = %node.term,
                    "ignoring stale vote response"
                );
            }
            true
        })?;

        if keep_going {
            Self::request_votes(world, id, peer.as_u8() + 1)
        } else {
            Self::run(world, id)
        }
    }

    // ========================================================================
    // Request handlers
    // ========================================================================

    /// Handles a heartbeat and replies with the current term.
    pub fn handle_append_entries(
        &mut self,
        rt: &mut Runtime<Self>,
        envelope: Envelope,
    ) -> SimResult<AppendEntriesResponse> {
        envelope.check_destination(self.id)?;
        let Payload::AppendEntriesRequest(request) = envelope.payload else {
            return Err(envelope.unexpected("append entries handler"));
        };

        if request.term > self.term {
            tracing::info!(
                node = %self.id,
                leader = %request.leader_id,
                term = %request.term,
                "heartbeat from higher term, stepping down"
            );
            self.step_down(request.term, rt.get_time());
        } else if request.term == self.term {
            // Same term: recognise the leader but keep the vote.
            self.role = Role::Follower;
            self.last_heartbeat_time = rt.get_time();
            tracing::trace!(node = %self.id, leader = %request.leader_id, "heartbeat accepted");
        }

        let response = AppendEntriesResponse { term: self.term };
        rt.send_message(envelope.reply(Payload::AppendEntriesResponse(response)));
        Ok(response)
    }

    /// Handles a vote request and replies with the decision.
    pub fn handle_request_vote(
        &mut self,
        rt: &mut Runtime<Self>,
        envelope: Envelope,
    ) -> SimResult<RequestVoteResponse> {
        envelope.check_destination(self.id)?;
        let Payload::RequestVoteRequest(request) = envelope.payload else {
            return Err(envelope.unexpected("request vote handler"));
        };

        if request.term > self.term {
            self.term = request.term;
            self.role = Role::Follower;
            self.voted_for = None;
        }

        let can_vote = self
            .voted_for
            .is_none_or(|candidate| candidate == request.candidate_id);
        let vote_granted = request.term >= self.term && can_vote;
        if vote_granted {
            self.voted_for = Some(request.candidate_id);
            self.last_heartbeat_time = rt.get_time();
        }
        tracing::debug!(
            node = %self.id,
            candidate = %request.candidate_id,
            term = %request.term,
            granted = vote_granted,
            "vote request handled"
        );

        let response = RequestVoteResponse {
            term: self.term,
            vote_granted,
        };
        rt.send_message(envelope.reply(Payload::RequestVoteResponse(response)));
        Ok(response)
    }
}

impl Node for RaftNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn inbox_mut(&mut self) -> &mut Vec<Envelope> {
        &mut self.inbox
    }

    fn accepts(&self, kind: MessageKind) -> bool {
        matches!(
            kind,
            MessageKind::AppendEntriesRequest
                | MessageKind::AppendEntriesResponse
                | MessageKind::RequestVoteRequest
                | MessageKind::RequestVoteResponse
        )
    }

    fn start(world: &mut World<Self>, id: NodeId) -> SimResult<()> {
        world.with_node(id, |node, rt| {
            node.last_heartbeat_time = rt.get_time();
            tracing::info!(node = %id, "starting raft main loop as follower");
        })?;
        Self::run(world, id)
    }

    fn handle_request(&mut self, rt: &mut Runtime<Self>, envelope: Envelope) -> SimResult<()> {
        match envelope.kind {
            MessageKind::AppendEntriesRequest => {
                self.handle_append_entries(rt, envelope)?;
            }
            MessageKind::RequestVoteRequest => {
                self.handle_request_vote(rt, envelope)?;
            }
            _ => return Err(envelope.unexpected("raft request handler")),
        }
        Ok(())
    }
}

impl LeaderView for RaftNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn role(&self) -> Role {
        self.role
    }

    fn term(&self) -> Term {
        self.term
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageId;
    use crate::rng::SimRng;

    const TIMING: RaftTiming = RaftTiming {
        election_timeout_min: 150,
        election_timeout_max: 300,
        heartbeat_interval: 50,
    };

    fn runtime() -> Runtime<RaftNode> {
        Runtime::new(SimRng::new(0), 0, 0)
    }

    fn node(id: u8) -> RaftNode {
        RaftNode::new(NodeId::new(id), 5, TIMING)
    }

    fn vote_request(candidate: u8, to: u8, term: u64) -> Envelope {
        Envelope::new(
            MessageId::from_raw(u64::from(candidate)),
            NodeId::new(candidate),
            NodeId::new(to),
            Payload::RequestVoteRequest(RequestVoteRequest {
                term: Term::new(term),
                candidate_id: NodeId::new(candidate),
            }),
        )
    }

    fn heartbeat(leader: u8, to: u8, term: u64) -> Envelope {
        Envelope::new(
            MessageId::from_raw(100),
            NodeId::new(leader),
            NodeId::new(to),
            Payload::AppendEntriesRequest(AppendEntriesRequest {
                term: Term::new(term),
                leader_id: NodeId::new(leader),
            }),
        )
    }

    #[test]
    fn grants_first_vote_in_term_and_denies_second() {
        let mut rt = runtime();
        let mut n = node(0);

        let first = n.handle_request_vote(&mut rt, vote_request(1, 0, 1)).unwrap();
        assert!(first.vote_granted);
        assert_eq!(first.term, Term::new(1));
        assert_eq!(n.voted_for(), Some(NodeId::new(1)));

        let second = n.handle_request_vote(&mut rt, vote_request(2, 0, 1)).unwrap();
        assert!(!second.vote_granted);
        assert_eq!(n.voted_for(), Some(NodeId::new(1)));
    }

    #[test]
    fn repeated_request_from_same_candidate_is_granted() {
        let mut rt = runtime();
        let mut n = node(0);
        n.handle_request_vote(&mut rt, vote_request(1, 0, 1)).unwrap();
        let again = n.handle_request_vote(&mut rt, vote_request(1, 0, 1)).unwrap();
        assert!(again.vote_granted);
    }

    #[test]
    fn higher_term_resets_vote() {
        let mut rt = runtime();
        let mut n = node(0);
        n.handle_request_vote(&mut rt, vote_request(1, 0, 1)).unwrap();
        let resp = n.handle_request_vote(&mut rt, vote_request(2, 0, 2)).unwrap();
        assert!(resp.vote_granted);
        assert_eq!(n.term(), Term::new(2));
        assert_eq!(n.voted_for(), Some(NodeId::new(2)));
    }

    #[test]
    fn stale_vote_request_is_denied() {
        let mut rt = runtime();
        let mut n = node(0);
        n.handle_append_entries(&mut rt, heartbeat(3, 0, 4)).unwrap();
        let resp = n.handle_request_vote(&mut rt, vote_request(1, 0, 2)).unwrap();
        assert!(!resp.vote_granted);
        assert_eq!(resp.term, Term::new(4));
    }

    #[test]
    fn heartbeat_from_same_term_keeps_vote() {
        let mut rt = runtime();
        let mut n = node(0);
        n.handle_request_vote(&mut rt, vote_request(1, 0, 3)).unwrap();
        let resp = n.handle_append_entries(&mut rt, heartbeat(1, 0, 3)).unwrap();
        assert_eq!(resp.term, Term::new(3));
        assert_eq!(n.role(), Role::Follower);
        assert_eq!(n.voted_for(), Some(NodeId::new(1)));
    }

    #[test]
    fn heartbeat_from_higher_term_clears_vote() {
        let mut rt = runtime();
        let mut n = node(0);
        n.handle_request_vote(&mut rt, vote_request(1, 0, 3)).unwrap();
        n.handle_append_entries(&mut rt, heartbeat(2, 0, 5)).unwrap();
        assert_eq!(n.term(), Term::new(5));
        assert_eq!(n.voted_for(), None);
    }

    #[test]
    fn handlers_reply_with_request_id() {
        let mut rt = runtime();
        let mut n = node(0);
        let req = vote_request(1, 0, 1);
        n.handle_request_vote(&mut rt, req).unwrap();
        let sent = rt.fetch_ready();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message_id, req.message_id);
        assert_eq!(sent[0].to, NodeId::new(1));
        assert_eq!(sent[0].kind, MessageKind::RequestVoteResponse);
    }

    #[test]
    fn handler_rejects_misrouted_request() {
        let mut rt = runtime();
        let mut n = node(0);
        assert!(n.handle_request_vote(&mut rt, vote_request(1, 3, 1)).is_err());
    }

    #[test]
    fn peers_skip_self() {
        let n = node(2);
        assert_eq!(n.next_peer(0), Some(NodeId::new(0)));
        assert_eq!(n.next_peer(2), Some(NodeId::new(3)));
        assert_eq!(n.next_peer(5), None);
        let last = node(4);
        assert_eq!(last.next_peer(4), None);
    }

    #[test]
    fn majority_is_strict() {
        let mut n = node(0);
        n.votes_received = 2;
        assert!(!n.has_majority());
        n.votes_received = 3;
        assert!(n.has_majority());
    }
}
