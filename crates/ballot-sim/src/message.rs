//! Protocol messages.
//!
//! ## Ping
//! - [`PingRequest`] / [`PingResponse`] - liveness probe used by the pinger node
//!
//! ## Leader election
//! - [`AppendEntriesRequest`] - Leader → Follower: heartbeat carrying the leader's term
//! - [`AppendEntriesResponse`] - Follower → Leader: the follower's current term
//! - [`RequestVoteRequest`] - Candidate → All: vote for me in this term
//! - [`RequestVoteResponse`] - Voter → Candidate: the voter's term and decision
//!
//! Responses reuse the request's [`MessageId`]; that id is the RPC correlation key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

// ============================================================================
// Identifiers
// ============================================================================

/// Index of a node within the cluster. Nodes are numbered `0..nr_nodes`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct NodeId(u8);

impl NodeId {
    pub fn new(id: u8) -> Self {
        Self(id)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        usize::from(self.0)
    }
}

impl From<u8> for NodeId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raft election term.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Term(u64);

impl Term {
    pub const ZERO: Term = Term(0);

    pub fn new(term: u64) -> Self {
        Self(term)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the following term.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique (per runtime) message identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct MessageId(u64);

impl MessageId {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse;

/// Leader heartbeat. Log entries are not replicated, so only the term travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: Term,
    pub leader_id: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: Term,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteRequest {
    pub term: Term,
    pub candidate_id: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    pub term: Term,
    pub vote_granted: bool,
}

/// Discriminant of a [`Payload`], carried separately on the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    PingRequest,
    PingResponse,
    AppendEntriesRequest,
    AppendEntriesResponse,
    RequestVoteRequest,
    RequestVoteResponse,
}

impl MessageKind {
    /// Returns true for kinds that open an RPC (and spawn a handler on receipt).
    pub fn is_request(self) -> bool {
        matches!(
            self,
            MessageKind::PingRequest
                | MessageKind::AppendEntriesRequest
                | MessageKind::RequestVoteRequest
        )
    }

    /// Returns true for kinds that complete an RPC.
    pub fn is_response(self) -> bool {
        !self.is_request()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::PingRequest => "PING_REQUEST",
            MessageKind::PingResponse => "PING_RESPONSE",
            MessageKind::AppendEntriesRequest => "APPEND_ENTRIES_REQUEST",
            MessageKind::AppendEntriesResponse => "APPEND_ENTRIES_RESPONSE",
            MessageKind::RequestVoteRequest => "REQUEST_VOTE_REQUEST",
            MessageKind::RequestVoteResponse => "REQUEST_VOTE_RESPONSE",
        };
        f.write_str(name)
    }
}

/// Message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    PingRequest(PingRequest),
    PingResponse(PingResponse),
    AppendEntriesRequest(AppendEntriesRequest),
    AppendEntriesResponse(AppendEntriesResponse),
    RequestVoteRequest(RequestVoteRequest),
    RequestVoteResponse(RequestVoteResponse),
}

impl Payload {
    /// Returns the kind this payload belongs to.
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::PingRequest(_) => MessageKind::PingRequest,
            Payload::PingResponse(_) => MessageKind::PingResponse,
            Payload::AppendEntriesRequest(_) => MessageKind::AppendEntriesRequest,
            Payload::AppendEntriesResponse(_) => MessageKind::AppendEntriesResponse,
            Payload::RequestVoteRequest(_) => MessageKind::RequestVoteRequest,
            Payload::RequestVoteResponse(_) => MessageKind::RequestVoteResponse,
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// An addressed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: MessageId,
    pub kind: MessageKind,
    pub from: NodeId,
    pub to: NodeId,
    pub payload: Payload,
}

impl Envelope {
    /// Creates an envelope whose kind is taken from the payload.
    pub fn new(message_id: MessageId, from: NodeId, to: NodeId, payload: Payload) -> Self {
        Self {
            message_id,
            kind: payload.kind(),
            from,
            to,
            payload,
        }
    }

    /// Builds the reply to this envelope: same id, endpoints swapped.
    pub fn reply(&self, payload: Payload) -> Self {
        Envelope::new(self.message_id, self.to, self.from, payload)
    }

    /// Fails if the declared kind does not match the payload variant.
    pub fn check_kind(&self) -> SimResult<()> {
        let actual = self.payload.kind();
        if actual != self.kind {
            return Err(SimError::PayloadMismatch {
                message_id: self.message_id,
                declared: self.kind,
                actual,
            });
        }
        Ok(())
    }

    /// Fails unless this envelope is addressed to `node`.
    pub fn check_destination(&self, node: NodeId) -> SimResult<()> {
        if self.to != node {
            return Err(SimError::MisroutedMessage {
                message_id: self.message_id,
                expected: self.to,
                actual: node,
            });
        }
        Ok(())
    }

    /// Extracts an AppendEntries response, or fails with `context`.
    pub fn append_entries_response(&self, context: &'static str) -> SimResult<AppendEntriesResponse> {
        self.check_kind()?;
        match self.payload {
            Payload::AppendEntriesResponse(resp) => Ok(resp),
            _ => Err(self.unexpected(context)),
        }
    }

    /// Extracts a RequestVote response, or fails with `context`.
    pub fn request_vote_response(&self, context: &'static str) -> SimResult<RequestVoteResponse> {
        self.check_kind()?;
        match self.payload {
            Payload::RequestVoteResponse(resp) => Ok(resp),
            _ => Err(self.unexpected(context)),
        }
    }

    /// Builds the error for a message that reached the wrong handler.
    pub fn unexpected(&self, context: &'static str) -> SimError {
        SimError::UnexpectedMessage {
            node: self.to,
            kind: self.kind,
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote_request() -> Envelope {
        Envelope::new(
            MessageId::from_raw(7),
            NodeId::new(1),
            NodeId::new(2),
            Payload::RequestVoteRequest(RequestVoteRequest {
                term: Term::new(3),
                candidate_id: NodeId::new(1),
            }),
        )
    }

    #[test]
    fn envelope_kind_follows_payload() {
        assert_eq!(vote_request().kind, MessageKind::RequestVoteRequest);
        assert!(vote_request().kind.is_request());
    }

    #[test]
    fn reply_swaps_endpoints_and_keeps_id() {
        let req = vote_request();
        let resp = req.reply(Payload::RequestVoteResponse(RequestVoteResponse {
            term: Term::new(3),
            vote_granted: true,
        }));
        assert_eq!(resp.message_id, req.message_id);
        assert_eq!(resp.from, req.to);
        assert_eq!(resp.to, req.from);
        assert!(resp.kind.is_response());
    }

    #[test]
    fn mismatched_kind_is_rejected() {
        let mut env = vote_request();
        env.kind = MessageKind::PingRequest;
        assert!(matches!(
            env.check_kind(),
            Err(SimError::PayloadMismatch { .. })
        ));
    }

    #[test]
    fn wrong_destination_is_rejected() {
        let err = vote_request().check_destination(NodeId::new(4)).unwrap_err();
        assert_eq!(
            err,
            SimError::MisroutedMessage {
                message_id: MessageId::from_raw(7),
                expected: NodeId::new(2),
                actual: NodeId::new(4),
            }
        );
    }

    #[test]
    fn extracting_the_wrong_response_fails() {
        let env = vote_request();
        assert!(matches!(
            env.append_entries_response("test"),
            Err(SimError::UnexpectedMessage { .. })
        ));
    }
}
