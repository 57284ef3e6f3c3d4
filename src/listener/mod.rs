// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Listener (child) role.
//!
//! Binds the shared port on all interfaces, reports readiness over the
//! inherited control channel, and forwards every datagram that came from the
//! coordinator's source address. Exits on its own once the full message
//! count has arrived.

mod state;

pub use state::{Disposition, ListenerState};

use anyhow::{Context, Result};
use std::os::unix::io::FromRawFd;
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::time::sleep;

use crate::ipc::{ControlChannel, Report};
use crate::logging::{Facility, Logger, Severity};
use crate::{log_debug, log_info, log_kv, net, CONTROL_CHANNEL_FD, MESSAGES};

/// Reclaim the control channel the spawner installed before exec.
///
/// Called exactly once, from the listener entry point; from here on the
/// descriptor is owned by the returned stream.
fn inherited_control_channel() -> Result<ControlChannel<UnixStream>> {
    let std_stream = unsafe { std::os::unix::net::UnixStream::from_raw_fd(CONTROL_CHANNEL_FD) };
    std_stream
        .set_nonblocking(true)
        .context("failed to configure control channel")?;
    let stream =
        UnixStream::from_std(std_stream).context("failed to adopt inherited control channel")?;
    Ok(ControlChannel::new(stream))
}

/// Listener process entry: `binding -> ready -> receiving -> draining`.
pub async fn run(port: u16, grace: Duration, logger: &Logger) -> Result<()> {
    // Same scan the coordinator runs; both sides must resolve the same
    // address or the source filter drops everything.
    let expected_source = net::probe_source_addr()?;

    let socket = net::broadcast_recv_socket(port)?;
    let mut channel = inherited_control_channel()?;

    channel
        .send(&Report::Listening)
        .await
        .context("failed to report readiness")?;
    log_info!(
        logger,
        Facility::Listener,
        &format!(
            "listening on port {}, accepting datagrams from {}",
            port, expected_source
        )
    );

    let mut state = ListenerState::new(expected_source, MESSAGES.len());
    let mut buf = vec![0u8; 2048];

    while !state.complete() {
        let (len, from) = socket
            .recv_from(&mut buf)
            .await
            .context("receive socket failed")?;
        match state.on_datagram(from.ip(), &buf[..len]) {
            Disposition::Ignore => {
                log_debug!(
                    logger,
                    Facility::Listener,
                    &format!("ignoring datagram from {}", from)
                );
            }
            Disposition::Accept { payload, complete } => {
                let count = state.accepted().to_string();
                let expected = MESSAGES.len().to_string();
                log_kv!(
                    logger,
                    Severity::Debug,
                    Facility::Listener,
                    "datagram accepted",
                    "count" => &count,
                    "expected" => &expected
                );
                channel
                    .send(&Report::Message { payload })
                    .await
                    .context("failed to forward received message")?;
                if complete {
                    break;
                }
            }
        }
    }

    // Close the receive socket before lingering so nothing new is consumed,
    // then give the final report time to reach the coordinator.
    drop(socket);
    log_info!(
        logger,
        Facility::Listener,
        "full message count received, draining before exit"
    );
    sleep(grace).await;
    Ok(())
}
