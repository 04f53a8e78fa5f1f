//! The connection's finite state machine.
//!
//! This is deliberately not the full RFC 9293 diagram: there is no
//! TIME_WAIT (the final ACK of a close simply drops the connection to
//! CLOSED) and no simultaneous-open handling, matching a stop-and-wait,
//! single-socket engine rather than a general-purpose stack.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Start,
    Closed,
    Connecting,
    Listen,
    SynSent,
    SynReceived,
    SynAckSent,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    LastAck,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    SocketOpen,
    Connect,
    SynSent,
    SynAckReceived,
    Listen,
    SynReceived,
    SynAckSent,
    AckReceived,
    AckTimeOut,
    Close,
    PartnerDead,
    FinReceived,
}

impl Default for State {
    fn default() -> Self {
        State::Start
    }
}

impl State {
    /// Applies `event` to `self`, returning the new state and whether the
    /// transition requires the TCB to be cleared.
    pub fn declare(self, event: Event) -> (State, bool) {
        use Event::*;
        use State::*;

        match (self, event) {
            (_, SocketOpen) => (Closed, true),
            (Closed, Connect) => (Connecting, false),
            (Closed, Listen) => (Listen, false),
            (Connecting, SynSent) => (SynSent, false),
            (SynSent, SynAckReceived) => (Established, false),
            (SynSent, AckTimeOut) => (Connecting, false),
            (Listen, SynReceived) => (SynReceived, false),
            (SynReceived, SynAckSent) => (SynAckSent, false),
            (SynAckSent, AckReceived) => (Established, false),
            (SynAckSent, AckTimeOut) => (SynReceived, false),
            (Established, Close) => (FinWait1, false),
            (Established, FinReceived) => (CloseWait, false),
            (FinWait1, AckReceived) => (FinWait2, false),
            (FinWait1, FinReceived) => (Closing, false),
            (FinWait2, FinReceived) => (Closed, true),
            (Closing, AckReceived) => (Closed, true),
            (CloseWait, Close) => (LastAck, false),
            (LastAck, AckReceived) => (Closed, true),
            (_, PartnerDead) => (Closed, true),
            (same, _) => (same, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_path_for_active_open() {
        let (s, cleared) = State::Start.declare(Event::SocketOpen);
        assert_eq!(s, State::Closed);
        assert!(cleared);

        let (s, _) = s.declare(Event::Connect);
        assert_eq!(s, State::Connecting);

        let (s, _) = s.declare(Event::SynSent);
        assert_eq!(s, State::SynSent);

        let (s, cleared) = s.declare(Event::SynAckReceived);
        assert_eq!(s, State::Established);
        assert!(!cleared);
    }

    #[test]
    fn handshake_path_for_passive_open() {
        let s = State::Closed.declare(Event::Listen).0;
        assert_eq!(s, State::Listen);
        let s = s.declare(Event::SynReceived).0;
        assert_eq!(s, State::SynReceived);
        let s = s.declare(Event::SynAckSent).0;
        assert_eq!(s, State::SynAckSent);
        let s = s.declare(Event::AckReceived).0;
        assert_eq!(s, State::Established);
    }

    #[test]
    fn unlisted_pairs_are_no_ops() {
        let (s, cleared) = State::Established.declare(Event::SynReceived);
        assert_eq!(s, State::Established);
        assert!(!cleared);
    }

    #[test]
    fn partner_dead_clears_from_any_state() {
        let (s, cleared) = State::SynSent.declare(Event::PartnerDead);
        assert_eq!(s, State::Closed);
        assert!(cleared);
    }

    #[test]
    fn passive_close_path() {
        let s = State::Established.declare(Event::FinReceived).0;
        assert_eq!(s, State::CloseWait);
        let s = s.declare(Event::Close).0;
        assert_eq!(s, State::LastAck);
        let (s, cleared) = s.declare(Event::AckReceived);
        assert_eq!(s, State::Closed);
        assert!(cleared);
    }

    #[test]
    fn active_close_path_with_simultaneous_fin() {
        let s = State::Established.declare(Event::Close).0;
        assert_eq!(s, State::FinWait1);
        let s = s.declare(Event::FinReceived).0;
        assert_eq!(s, State::Closing);
        let (s, cleared) = s.declare(Event::AckReceived);
        assert_eq!(s, State::Closed);
        assert!(cleared);
    }
}
