// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Multi-process verification harness for IPv4 limited-broadcast delivery.
//!
//! One binary, two roles. The coordinator (default role) picks a local
//! source address, spawns listener children, broadcasts a fixed message
//! sequence to `255.255.255.255`, and verifies that every child received
//! every distinct message. Each listener binds the shared port on all
//! interfaces and forwards accepted payloads back over a per-child Unix
//! socket control channel.

use std::net::Ipv4Addr;
use std::os::unix::io::RawFd;

pub mod config;
pub mod coordinator;
pub mod ipc;
pub mod listener;
pub mod logging;
pub mod net;
pub mod validation;

/// The ordered message sequence the coordinator broadcasts. Receipt is
/// verified by distinct content, not by arrival order.
pub const MESSAGES: [&str; 4] = [
    "First message to send",
    "Second message to send",
    "Third message to send",
    "Fourth message to send",
];

/// IPv4 limited-broadcast destination: delivered to every host on the
/// local broadcast domain.
pub const BROADCAST_ADDR: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 255);

/// File descriptor the spawner installs the child's control channel on.
pub const CONTROL_CHANNEL_FD: RawFd = 3;
