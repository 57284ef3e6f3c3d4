// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Listener child lifecycle: spawn, exit detection, termination.
//!
//! Each child is this same binary re-invoked with the `listener` subcommand.
//! Its control channel is one end of a Unix socket pair, installed as a fixed
//! descriptor across exec so the child can reclaim it without any handshake.

use anyhow::{Context, Result};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::os::unix::io::IntoRawFd;
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::process::{Child, Command};

use crate::ipc::ControlChannel;
use crate::logging::{Facility, Logger};
use crate::{log_debug, log_warning, CONTROL_CHANNEL_FD};

/// One spawned listener process, as tracked by the coordinator.
pub struct ListenerHandle {
    pub id: usize,
    pub child: Child,
}

/// Spawn one listener child and hand back its process handle and the
/// coordinator's end of the control channel.
///
/// The socket pair is created and the child's end moved to the agreed
/// descriptor in a `pre_exec` closure before any message is sent, so a ready
/// report can never race the registration of its channel.
pub async fn spawn_listener(
    id: usize,
    port: u16,
    grace: Duration,
    logger: &Logger,
) -> Result<(ListenerHandle, ControlChannel<UnixStream>)> {
    let (coordinator_sock, listener_sock) = UnixStream::pair()
        .context("failed to create control channel socket pair")?;

    let listener_sock_std = listener_sock
        .into_std()
        .context("failed to detach child control socket")?;
    let listener_fd = listener_sock_std.into_raw_fd();

    let mut command = Command::new(std::env::current_exe()?);
    command
        .arg("listener")
        .arg("--port")
        .arg(port.to_string())
        .arg("--grace-ms")
        .arg(grace.as_millis().to_string())
        .process_group(0);

    // Move the child's end to the agreed descriptor. dup2 clears
    // close-on-exec on the target; if the pair already landed there, only
    // the flag needs clearing.
    unsafe {
        command.pre_exec(move || {
            if listener_fd != CONTROL_CHANNEL_FD {
                if libc::dup2(listener_fd, CONTROL_CHANNEL_FD) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                if libc::close(listener_fd) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
            } else if libc::fcntl(listener_fd, libc::F_SETFD, 0) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let spawn_result = command.spawn();

    // The child holds its own copy of the descriptor now (or the spawn
    // failed); either way release ours so its EOF tracks the child's life.
    unsafe { libc::close(listener_fd) };

    let child = spawn_result.with_context(|| format!("failed to spawn listener {}", id))?;

    log_debug!(
        logger,
        Facility::Spawner,
        &format!(
            "listener {} spawned (pid {:?}), control channel on fd {}",
            id,
            child.id(),
            CONTROL_CHANNEL_FD
        )
    );

    Ok((
        ListenerHandle { id, child },
        ControlChannel::new(coordinator_sock),
    ))
}

/// Ask a listener to terminate.
///
/// SIGTERM first; if signal delivery fails (the process may already be a
/// zombie awaiting reaping), fall back to the runtime's kill.
pub fn terminate(handle: &mut ListenerHandle, logger: &Logger) {
    let Some(pid) = handle.child.id() else {
        // Already reaped
        return;
    };
    if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        log_warning!(
            logger,
            Facility::Spawner,
            &format!(
                "failed to deliver SIGTERM to listener {} (pid {}): {}, force killing",
                handle.id, pid, e
            )
        );
        let _ = handle.child.start_kill();
    } else {
        log_debug!(
            logger,
            Facility::Spawner,
            &format!("sent SIGTERM to listener {} (pid {})", handle.id, pid)
        );
    }
}
