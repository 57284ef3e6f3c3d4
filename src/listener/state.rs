// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Per-datagram decision core of a listener child.
//!
//! Kept free of I/O so spoofed-source and completion behavior can be
//! exercised with synthetic datagrams.

use std::net::{IpAddr, Ipv4Addr};

/// What the receive loop should do with one datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Drop silently: wrong source, or the expected count was already met.
    Ignore,
    /// Record the payload and forward it to the coordinator.
    Accept {
        payload: String,
        /// True when this datagram met the expected count.
        complete: bool,
    },
}

/// Tracks one listener's progress toward the expected message count.
///
/// Only datagrams whose source address equals the coordinator's bind address
/// count; anything else on a shared broadcast segment (other hosts, stray
/// processes) is discarded without a report.
pub struct ListenerState {
    expected_source: Ipv4Addr,
    target: usize,
    accepted: usize,
}

impl ListenerState {
    pub fn new(expected_source: Ipv4Addr, target: usize) -> Self {
        Self {
            expected_source,
            target,
            accepted: 0,
        }
    }

    pub fn on_datagram(&mut self, source: IpAddr, payload: &[u8]) -> Disposition {
        if source != IpAddr::V4(self.expected_source) {
            return Disposition::Ignore;
        }
        if self.accepted >= self.target {
            return Disposition::Ignore;
        }
        self.accepted += 1;
        Disposition::Accept {
            payload: String::from_utf8_lossy(payload).into_owned(),
            complete: self.accepted == self.target,
        }
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    pub fn complete(&self) -> bool {
        self.accepted >= self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> Ipv4Addr {
        "10.0.0.2".parse().unwrap()
    }

    #[test]
    fn test_accepts_from_expected_source() {
        let mut state = ListenerState::new(coordinator(), 4);
        let disposition = state.on_datagram(IpAddr::V4(coordinator()), b"First message to send");
        assert_eq!(
            disposition,
            Disposition::Accept {
                payload: "First message to send".to_string(),
                complete: false,
            }
        );
        assert_eq!(state.accepted(), 1);
    }

    #[test]
    fn test_drops_spoofed_source() {
        let mut state = ListenerState::new(coordinator(), 4);
        let spoofed: IpAddr = "10.0.0.99".parse().unwrap();
        assert_eq!(state.on_datagram(spoofed, b"payload"), Disposition::Ignore);
        assert_eq!(state.accepted(), 0);
        assert!(!state.complete());
    }

    #[test]
    fn test_drops_ipv6_source() {
        let mut state = ListenerState::new(coordinator(), 4);
        let v6: IpAddr = "::1".parse().unwrap();
        assert_eq!(state.on_datagram(v6, b"payload"), Disposition::Ignore);
    }

    #[test]
    fn test_complete_on_final_datagram() {
        let mut state = ListenerState::new(coordinator(), 2);
        let src = IpAddr::V4(coordinator());

        assert!(matches!(
            state.on_datagram(src, b"one"),
            Disposition::Accept {
                complete: false,
                ..
            }
        ));
        assert!(matches!(
            state.on_datagram(src, b"two"),
            Disposition::Accept { complete: true, .. }
        ));
        assert!(state.complete());
    }

    #[test]
    fn test_ignores_after_complete() {
        let mut state = ListenerState::new(coordinator(), 1);
        let src = IpAddr::V4(coordinator());

        state.on_datagram(src, b"one");
        assert_eq!(state.on_datagram(src, b"late"), Disposition::Ignore);
        assert_eq!(state.accepted(), 1);
    }

    #[test]
    fn test_non_utf8_payload_is_reported_lossily() {
        let mut state = ListenerState::new(coordinator(), 4);
        let disposition = state.on_datagram(IpAddr::V4(coordinator()), &[0xff, 0xfe, b'a']);
        match disposition {
            Disposition::Accept { payload, .. } => assert!(payload.ends_with('a')),
            other => panic!("expected accept, got {:?}", other),
        }
    }
}
