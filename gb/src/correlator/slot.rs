//! Single-capacity holder for the in-flight request
//!
//! The slot holds at most one [`PendingRequest`]. Installing a new request
//! resolves the previous occupant as [`Outcome::Superseded`]; every other
//! resolution goes through [`PendingSlot::try_resolve`], where the first
//! matching attempt wins and later attempts find the slot empty or holding a
//! different request.
//!
//! Resolving consumes the request, so a waiter can never observe two outcomes.

use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::debug;

use super::messages::{Outcome, RequestId, RequestKind};

/// Correlation record for the command currently awaiting its ack
#[derive(Debug)]
pub struct PendingRequest {
    id: RequestId,
    kind: RequestKind,
    issued_at: Instant,
    deadline: Instant,
    reply_tx: oneshot::Sender<Outcome>,
}

impl PendingRequest {
    fn new(kind: RequestKind, timeout: Duration, reply_tx: oneshot::Sender<Outcome>) -> Self {
        let issued_at = Instant::now();
        Self {
            id: RequestId::new(),
            kind,
            issued_at,
            deadline: issued_at + timeout,
            reply_tx,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Time since the request was installed
    pub fn elapsed(&self) -> Duration {
        self.issued_at.elapsed()
    }

    /// Deliver the outcome to the waiter
    ///
    /// Returns false if the waiter already went away; the request counts as
    /// resolved either way.
    fn resolve(self, outcome: Outcome) -> bool {
        debug!(request_id = %self.id, kind = %self.kind, outcome = outcome.label(), "PendingRequest::resolve");
        self.reply_tx.send(outcome).is_ok()
    }
}

/// Returned by [`PendingSlot::install`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    pub id: RequestId,
    pub deadline: Instant,
    /// Kind of the request this one superseded, if any
    pub superseded: Option<RequestKind>,
}

/// The slot itself. Owned by the Correlator task; never shared.
#[derive(Debug, Default)]
pub struct PendingSlot {
    current: Option<PendingRequest>,
}

impl PendingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the occupant with a new request for `kind`
    ///
    /// A previous occupant is resolved as `Superseded` before it is evicted.
    pub fn install(
        &mut self,
        kind: RequestKind,
        timeout: Duration,
        reply_tx: oneshot::Sender<Outcome>,
    ) -> RequestTicket {
        let request = PendingRequest::new(kind, timeout, reply_tx);
        let ticket_id = request.id;
        let deadline = request.deadline;
        debug!(request_id = %ticket_id, %kind, ?timeout, "PendingSlot::install: called");

        let superseded = self.current.replace(request).map(|previous| {
            let previous_kind = previous.kind;
            debug!(request_id = %previous.id, kind = %previous_kind, "PendingSlot::install: superseding");
            previous.resolve(Outcome::Superseded);
            previous_kind
        });

        RequestTicket {
            id: ticket_id,
            deadline,
            superseded,
        }
    }

    /// Resolve the occupant if `matches` holds for it
    ///
    /// `outcome` is only evaluated when the match succeeds. Returns whether
    /// this call was the resolver.
    pub fn try_resolve<M, O>(&mut self, matches: M, outcome: O) -> bool
    where
        M: FnOnce(&PendingRequest) -> bool,
        O: FnOnce(&PendingRequest) -> Outcome,
    {
        let Some(request) = self.current.take_if(|request| matches(&*request)) else {
            debug!("PendingSlot::try_resolve: no matching request");
            return false;
        };

        let outcome = outcome(&request);
        if !request.resolve(outcome) {
            debug!("PendingSlot::try_resolve: waiter already dropped");
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    pub fn current_kind(&self) -> Option<RequestKind> {
        self.current.as_ref().map(PendingRequest::kind)
    }

    pub fn current_id(&self) -> Option<RequestId> {
        self.current.as_ref().map(PendingRequest::id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::sync::oneshot::error::TryRecvError;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn ack(payload: &str) -> impl FnOnce(&PendingRequest) -> Outcome + '_ {
        move |request| Outcome::Acknowledged {
            payload: payload.to_string(),
            latency_ms: request.elapsed().as_millis() as u64,
        }
    }

    #[test]
    fn test_install_into_empty_slot() {
        let mut slot = PendingSlot::new();
        assert!(slot.is_empty());

        let (tx, _rx) = oneshot::channel();
        let ticket = slot.install(RequestKind::Ping, TIMEOUT, tx);

        assert!(!slot.is_empty());
        assert_eq!(ticket.superseded, None);
        assert_eq!(slot.current_kind(), Some(RequestKind::Ping));
        assert_eq!(slot.current_id(), Some(ticket.id));
    }

    #[test]
    fn test_install_supersedes_previous() {
        let mut slot = PendingSlot::new();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();

        let first = slot.install(RequestKind::TurnOn, TIMEOUT, tx1);
        let second = slot.install(RequestKind::Ping, TIMEOUT, tx2);

        assert_eq!(rx1.try_recv().unwrap(), Outcome::Superseded);
        assert_eq!(second.superseded, Some(RequestKind::TurnOn));
        assert_ne!(first.id, second.id);
        assert_eq!(slot.current_id(), Some(second.id));
        assert!(matches!(rx2.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_matching_resolve_delivers_and_evicts() {
        let mut slot = PendingSlot::new();
        let (tx, mut rx) = oneshot::channel();
        slot.install(RequestKind::Ping, TIMEOUT, tx);

        assert!(slot.try_resolve(|r| r.kind().accepts(crate::correlator::AckKind::Ping), ack("ACK ping")));
        assert!(slot.is_empty());

        match rx.try_recv().unwrap() {
            Outcome::Acknowledged { payload, .. } => assert_eq!(payload, "ACK ping"),
            other => panic!("Expected Acknowledged, got {:?}", other),
        }
    }

    #[test]
    fn test_non_matching_resolve_is_noop() {
        let mut slot = PendingSlot::new();
        let (tx, mut rx) = oneshot::channel();
        slot.install(RequestKind::TurnOn, TIMEOUT, tx);

        assert!(!slot.try_resolve(|r| r.kind().accepts(crate::correlator::AckKind::Ping), ack("ACK ping")));
        assert!(!slot.is_empty());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_resolve_on_empty_slot_is_noop() {
        let mut slot = PendingSlot::new();
        let mut evaluated = false;
        let resolved = slot.try_resolve(
            |_| true,
            |_| {
                evaluated = true;
                Outcome::TimedOut
            },
        );
        assert!(!resolved);
        assert!(!evaluated);
    }

    #[test]
    fn test_stale_deadline_does_not_touch_newer_request() {
        let mut slot = PendingSlot::new();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();

        let stale = slot.install(RequestKind::Ping, TIMEOUT, tx1);
        slot.install(RequestKind::Ping, TIMEOUT, tx2);

        assert!(!slot.try_resolve(|r| r.id() == stale.id, |_| Outcome::TimedOut));
        assert!(!slot.is_empty());
        assert!(matches!(rx2.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_second_resolution_loses() {
        let mut slot = PendingSlot::new();
        let (tx, mut rx) = oneshot::channel();
        let ticket = slot.install(RequestKind::Ping, TIMEOUT, tx);

        assert!(slot.try_resolve(|r| r.id() == ticket.id, |_| Outcome::TimedOut));
        assert!(!slot.try_resolve(|_| true, ack("ACK ping")));
        assert_eq!(rx.try_recv().unwrap(), Outcome::TimedOut);
    }

    #[test]
    fn test_resolve_with_dropped_waiter_still_evicts() {
        let mut slot = PendingSlot::new();
        let (tx, rx) = oneshot::channel();
        slot.install(RequestKind::TurnOn, TIMEOUT, tx);
        drop(rx);

        assert!(slot.try_resolve(|_| true, |_| Outcome::TimedOut));
        assert!(slot.is_empty());
    }

    #[test]
    fn test_deadline_is_issue_time_plus_timeout() {
        let mut slot = PendingSlot::new();
        let (tx, _rx) = oneshot::channel();
        let before = Instant::now();
        let ticket = slot.install(RequestKind::Ping, TIMEOUT, tx);
        assert!(ticket.deadline >= before + TIMEOUT);
        assert!(ticket.deadline <= Instant::now() + TIMEOUT);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Install(bool),
        AckOn,
        AckPing,
        DeadlineFor(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<bool>().prop_map(Op::Install),
            Just(Op::AckOn),
            Just(Op::AckPing),
            (0usize..16).prop_map(Op::DeadlineFor),
        ]
    }

    proptest! {
        #[test]
        fn prop_every_request_observes_at_most_one_outcome(ops in proptest::collection::vec(op_strategy(), 1..40)) {
            let mut slot = PendingSlot::new();
            let mut waiters = Vec::new();
            let mut tickets = Vec::new();

            for op in ops {
                match op {
                    Op::Install(ping) => {
                        let kind = if ping { RequestKind::Ping } else { RequestKind::TurnOn };
                        let (tx, rx) = oneshot::channel();
                        tickets.push(slot.install(kind, TIMEOUT, tx).id);
                        waiters.push(rx);
                    }
                    Op::AckOn => {
                        slot.try_resolve(|r| r.kind().accepts(crate::correlator::AckKind::On), ack("ACK on"));
                    }
                    Op::AckPing => {
                        slot.try_resolve(|r| r.kind().accepts(crate::correlator::AckKind::Ping), ack("ACK ping"));
                    }
                    Op::DeadlineFor(index) => {
                        if let Some(id) = tickets.get(index).copied() {
                            slot.try_resolve(|r| r.id() == id, |_| Outcome::TimedOut);
                        }
                    }
                }

                // Slot cardinality <= 1 and only the newest request can be live
                if let Some(current) = slot.current_id() {
                    prop_assert_eq!(Some(&current), tickets.last());
                }
            }

            let live = slot.current_id();
            for (id, mut rx) in tickets.into_iter().zip(waiters) {
                let first = rx.try_recv();
                if Some(id) == live {
                    prop_assert!(matches!(first, Err(TryRecvError::Empty)));
                } else {
                    prop_assert!(first.is_ok());
                    prop_assert!(rx.try_recv().is_err());
                }
            }
        }
    }
}
