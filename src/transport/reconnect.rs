//! Reconnect state machine for the push channel.
//!
//! `step` is pure: it maps the current state and a connection event to the
//! next state and the action the driver should take. The driver owns the
//! socket and the timers; nothing here sleeps.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// WebSocket close code for a deliberate, normal shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Retry behavior after an abnormal disconnect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Fixed delay before each retry, in milliseconds.
    pub delay_ms: u64,
    /// Retries allowed since the last successful open.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay_ms: 3000,
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Where the connection stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// A connect is pending; `attempt` counts retries since the last open
    /// (0 for the first connect).
    Connecting { attempt: u32 },
    Connected,
    /// Retries exhausted. Terminal for the session.
    GivingUp,
}

/// Something that happened to the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Caller wants a connection.
    Start,
    /// Handshake completed.
    Opened,
    /// Socket closed or connect failed; `None` means no close frame.
    Closed { code: Option<u16> },
    /// Caller is shutting the channel down.
    Stop,
}

/// What the driver should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    None,
    Connect,
    ConnectAfter(Duration),
    GiveUp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub next: ConnectionState,
    pub action: Action,
}

impl Transition {
    fn stay(state: ConnectionState) -> Self {
        Self {
            next: state,
            action: Action::None,
        }
    }
}

fn is_normal(code: Option<u16>) -> bool {
    code == Some(NORMAL_CLOSURE)
}

/// Retry if the budget allows, otherwise give up.
fn retry(retries_so_far: u32, policy: &ReconnectPolicy) -> Transition {
    if retries_so_far < policy.max_attempts {
        Transition {
            next: ConnectionState::Connecting {
                attempt: retries_so_far + 1,
            },
            action: Action::ConnectAfter(policy.delay()),
        }
    } else {
        Transition {
            next: ConnectionState::GivingUp,
            action: Action::GiveUp,
        }
    }
}

/// Advance the state machine.
pub fn step(
    state: ConnectionState,
    event: ConnectionEvent,
    policy: &ReconnectPolicy,
) -> Transition {
    use ConnectionEvent as E;
    use ConnectionState as S;

    match (state, event) {
        (S::GivingUp, _) => Transition::stay(S::GivingUp),

        (_, E::Stop) => Transition::stay(S::Disconnected),

        (S::Disconnected, E::Start) => Transition {
            next: S::Connecting { attempt: 0 },
            action: Action::Connect,
        },

        (S::Connecting { .. }, E::Opened) => Transition::stay(S::Connected),

        (S::Connecting { .. } | S::Connected, E::Closed { code }) if is_normal(code) => {
            Transition::stay(S::Disconnected)
        }
        (S::Connecting { attempt }, E::Closed { .. }) => retry(attempt, policy),
        (S::Connected, E::Closed { .. }) => retry(0, policy),

        // Duplicate starts, stale opens, closes of an already closed socket
        (state, _) => Transition::stay(state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ABNORMAL: ConnectionEvent = ConnectionEvent::Closed { code: Some(1006) };

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            delay_ms: 3000,
            max_attempts,
        }
    }

    #[test]
    fn test_start_connects_immediately() {
        let t = step(
            ConnectionState::Disconnected,
            ConnectionEvent::Start,
            &policy(10),
        );
        assert_eq!(t.next, ConnectionState::Connecting { attempt: 0 });
        assert_eq!(t.action, Action::Connect);
    }

    #[test]
    fn test_normal_close_never_retries() {
        let p = policy(10);
        let t = step(
            ConnectionState::Connected,
            ConnectionEvent::Closed {
                code: Some(NORMAL_CLOSURE),
            },
            &p,
        );
        assert_eq!(t, Transition::stay(ConnectionState::Disconnected));

        let t = step(ConnectionState::Connected, ConnectionEvent::Stop, &p);
        assert_eq!(t, Transition::stay(ConnectionState::Disconnected));
    }

    #[test]
    fn test_abnormal_close_retries_with_fixed_delay() {
        let t = step(ConnectionState::Connected, ABNORMAL, &policy(10));
        assert_eq!(t.next, ConnectionState::Connecting { attempt: 1 });
        assert_eq!(t.action, Action::ConnectAfter(Duration::from_secs(3)));

        let t = step(
            ConnectionState::Connecting { attempt: 4 },
            ConnectionEvent::Closed { code: None },
            &policy(10),
        );
        assert_eq!(t.next, ConnectionState::Connecting { attempt: 5 });
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let p = policy(3);
        let mut state = step(ConnectionState::Disconnected, ConnectionEvent::Start, &p).next;
        let mut retries = 0;

        loop {
            let t = step(state, ABNORMAL, &p);
            state = t.next;
            match t.action {
                Action::ConnectAfter(_) => retries += 1,
                Action::GiveUp => break,
                other => panic!("unexpected action {:?}", other),
            }
        }

        assert_eq!(retries, 3);
        assert_eq!(state, ConnectionState::GivingUp);
        assert_eq!(
            step(state, ConnectionEvent::Start, &p),
            Transition::stay(ConnectionState::GivingUp)
        );
    }

    #[test]
    fn test_open_resets_retry_budget() {
        let p = policy(2);
        let state = ConnectionState::Connecting { attempt: 2 };
        let state = step(state, ConnectionEvent::Opened, &p).next;
        assert_eq!(state, ConnectionState::Connected);

        let t = step(state, ABNORMAL, &p);
        assert_eq!(t.next, ConnectionState::Connecting { attempt: 1 });
    }

    #[test]
    fn test_zero_attempts_gives_up_on_first_failure() {
        let t = step(ConnectionState::Connecting { attempt: 0 }, ABNORMAL, &policy(0));
        assert_eq!(t.action, Action::GiveUp);
    }

    fn any_event() -> impl Strategy<Value = ConnectionEvent> {
        prop_oneof![
            Just(ConnectionEvent::Start),
            Just(ConnectionEvent::Opened),
            Just(ConnectionEvent::Stop),
            Just(ConnectionEvent::Closed {
                code: Some(NORMAL_CLOSURE)
            }),
            Just(ConnectionEvent::Closed { code: None }),
            Just(ABNORMAL),
        ]
    }

    proptest! {
        #[test]
        fn prop_retries_between_opens_are_bounded(
            max in 0u32..6,
            events in proptest::collection::vec(any_event(), 0..64),
        ) {
            let p = policy(max);
            let mut state = ConnectionState::Disconnected;
            let mut retries_since_open = 0u32;

            for event in events {
                let t = step(state, event, &p);
                match t.action {
                    Action::ConnectAfter(_) => retries_since_open += 1,
                    Action::Connect => retries_since_open = 0,
                    _ => {}
                }
                if t.next == ConnectionState::Connected {
                    retries_since_open = 0;
                }
                prop_assert!(retries_since_open <= max);
                if state == ConnectionState::GivingUp {
                    prop_assert_eq!(t.next, ConnectionState::GivingUp);
                }
                state = t.next;
            }
        }
    }
}
