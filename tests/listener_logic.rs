// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Listener-side behavior: the datagram filter against the real message
//! fixture, and report forwarding over a real Unix socket pair.

use std::net::IpAddr;

use broadcast_probe::ipc::{ControlChannel, Report};
use broadcast_probe::listener::{Disposition, ListenerState};
use broadcast_probe::MESSAGES;

fn coordinator_addr() -> IpAddr {
    "192.168.7.1".parse().unwrap()
}

#[test]
fn test_accepts_the_full_fixture() {
    let IpAddr::V4(source) = coordinator_addr() else {
        unreachable!()
    };
    let mut state = ListenerState::new(source, MESSAGES.len());

    for (i, message) in MESSAGES.iter().enumerate() {
        match state.on_datagram(coordinator_addr(), message.as_bytes()) {
            Disposition::Accept { payload, complete } => {
                assert_eq!(payload, *message);
                assert_eq!(complete, i == MESSAGES.len() - 1);
            }
            Disposition::Ignore => panic!("message {} unexpectedly ignored", i),
        }
    }
    assert!(state.complete());
}

#[test]
fn test_spoofed_source_never_counts_toward_completion() {
    let IpAddr::V4(source) = coordinator_addr() else {
        unreachable!()
    };
    let mut state = ListenerState::new(source, MESSAGES.len());
    let spoofed: IpAddr = "192.168.7.99".parse().unwrap();

    // A full spoofed sequence first, then the real one
    for message in &MESSAGES {
        assert_eq!(
            state.on_datagram(spoofed, message.as_bytes()),
            Disposition::Ignore
        );
    }
    assert_eq!(state.accepted(), 0);

    for message in &MESSAGES {
        assert!(matches!(
            state.on_datagram(coordinator_addr(), message.as_bytes()),
            Disposition::Accept { .. }
        ));
    }
    assert!(state.complete());
}

/// A listener's report stream as the coordinator sees it: one ready report,
/// then one message report per accepted datagram, then EOF.
#[tokio::test]
async fn test_report_stream_over_socket_pair() {
    let (coordinator_end, listener_end) = tokio::net::UnixStream::pair().unwrap();
    let mut coordinator = ControlChannel::new(coordinator_end);
    let mut listener = ControlChannel::new(listener_end);

    let feeder = tokio::spawn(async move {
        listener.send(&Report::Listening).await.unwrap();
        let IpAddr::V4(source) = coordinator_addr() else {
            unreachable!()
        };
        let mut state = ListenerState::new(source, MESSAGES.len());
        for message in &MESSAGES {
            if let Disposition::Accept { payload, .. } =
                state.on_datagram(coordinator_addr(), message.as_bytes())
            {
                listener.send(&Report::Message { payload }).await.unwrap();
            }
        }
        // Dropping the channel is the listener exiting
    });

    assert_eq!(coordinator.recv().await.unwrap(), Some(Report::Listening));
    for message in &MESSAGES {
        assert_eq!(
            coordinator.recv().await.unwrap(),
            Some(Report::Message {
                payload: message.to_string()
            })
        );
    }
    assert_eq!(coordinator.recv().await.unwrap(), None);

    feeder.await.unwrap();
}
