// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Coordinator (parent) role.
//!
//! Spawns the listener children, broadcasts the message sequence once all of
//! them are ready, and decides the verdict. The decision logic itself lives
//! in [`RunState`]; this module is the I/O loop around it: real sockets,
//! child processes, control channels, and the watchdog.

mod run_state;
mod spawner;

pub use run_state::{Action, Event, Phase, RunState, Verdict};
pub use spawner::ListenerHandle;

use anyhow::{anyhow, Context, Result};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddrV4;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::ipc::Report;
use crate::logging::{Facility, Logger};
use crate::validation::validate_source_addr;
use crate::{
    log_critical, log_debug, log_error, log_info, log_warning, net, BROADCAST_ADDR, MESSAGES,
};

/// How often exited children are swept with `try_wait`.
const EXIT_SWEEP_INTERVAL: Duration = Duration::from_millis(250);

/// How long terminated children get to exit before being force-killed.
const TERMINATE_WAIT: Duration = Duration::from_millis(500);

/// Run the coordinator role to completion and return the verdict.
///
/// Every exit path, pass or fail, signals any still-tracked child before
/// returning.
pub async fn run(config: &Config, logger: &Logger) -> Result<Verdict> {
    let source = net::probe_source_addr()?;
    validate_source_addr(source).map_err(|reason| anyhow!(reason))?;
    log_info!(
        logger,
        Facility::Coordinator,
        &format!(
            "broadcasting from {} to {}:{} across {} listeners",
            source,
            BROADCAST_ADDR,
            config.port,
            config.listeners
        )
    );

    let send_socket = net::broadcast_send_socket(source, config.port)?;

    // Channels are registered at spawn time, before any send, so no report
    // can be lost to a late subscription.
    let (report_tx, report_rx) = mpsc::channel::<(usize, Report)>(64);
    let mut children: HashMap<usize, ListenerHandle> = HashMap::new();
    for id in 0..config.listeners {
        let (handle, mut channel) =
            match spawner::spawn_listener(id, config.port, config.grace(), logger).await {
                Ok(spawned) => spawned,
                Err(e) => {
                    // A partial fleet is useless; tear down whatever started
                    terminate_survivors(&mut children, logger).await;
                    return Err(e);
                }
            };
        children.insert(id, handle);

        let tx = report_tx.clone();
        let channel_logger = logger.clone();
        tokio::spawn(async move {
            loop {
                match channel.recv().await {
                    Ok(Some(report)) => {
                        if tx.send((id, report)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        log_warning!(
                            channel_logger,
                            Facility::ControlChannel,
                            &format!("listener {} control channel error: {}", id, e)
                        );
                        break;
                    }
                }
            }
        });
    }
    drop(report_tx);

    let state = RunState::new(config.listeners, &MESSAGES);
    let verdict = event_loop(
        state,
        send_socket,
        config.port,
        config.watchdog_timeout(),
        report_rx,
        &mut children,
        logger,
    )
    .await;

    terminate_survivors(&mut children, logger).await;
    verdict
}

/// Drive the state machine off the three event sources: listener reports,
/// the child exit sweep, and the watchdog.
async fn event_loop(
    mut state: RunState,
    send_socket: UdpSocket,
    port: u16,
    watchdog: Duration,
    mut report_rx: mpsc::Receiver<(usize, Report)>,
    children: &mut HashMap<usize, ListenerHandle>,
    logger: &Logger,
) -> Result<Verdict> {
    let mut send_socket = Some(send_socket);
    let deadline = tokio::time::Instant::now() + watchdog;
    let mut exit_sweep = tokio::time::interval(EXIT_SWEEP_INTERVAL);
    let mut reports_open = true;

    loop {
        let events: Vec<Event> = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                log_error!(
                    logger,
                    Facility::Coordinator,
                    &format!("watchdog expired after {:?}", watchdog)
                );
                vec![Event::WatchdogExpired]
            }

            maybe_report = report_rx.recv(), if reports_open => {
                match maybe_report {
                    Some((listener, Report::Listening)) => {
                        log_info!(
                            logger,
                            Facility::Coordinator,
                            &format!("listener {} is ready", listener)
                        );
                        vec![Event::Ready { listener }]
                    }
                    Some((listener, Report::Message { payload })) => {
                        log_debug!(
                            logger,
                            Facility::Coordinator,
                            &format!("listener {} reported {:?}", listener, payload)
                        );
                        vec![Event::Report { listener, payload }]
                    }
                    None => {
                        // Every control channel closed; exits surface via
                        // the sweep.
                        reports_open = false;
                        Vec::new()
                    }
                }
            }

            _ = exit_sweep.tick() => sweep_exited(children, logger),
        };

        if let Some(verdict) = apply(&mut state, events, &mut send_socket, port, logger).await? {
            return Ok(verdict);
        }
    }
}

/// Feed events through the state machine and execute the resulting actions.
///
/// Send completions are fed back as events, so the next send is only issued
/// once the previous one has finished: the sequence is strictly serial.
async fn apply(
    state: &mut RunState,
    events: Vec<Event>,
    send_socket: &mut Option<UdpSocket>,
    port: u16,
    logger: &Logger,
) -> Result<Option<Verdict>> {
    let mut queue: VecDeque<Event> = events.into();
    while let Some(event) = queue.pop_front() {
        for action in state.handle(event) {
            match action {
                Action::SendNext(index) => {
                    let socket = send_socket
                        .as_ref()
                        .context("send requested after socket close")?;
                    let message = MESSAGES[index];
                    let destination = SocketAddrV4::new(BROADCAST_ADDR, port);
                    match socket.send_to(message.as_bytes(), destination).await {
                        Ok(_) => {
                            log_info!(
                                logger,
                                Facility::Coordinator,
                                &format!("sent message {} of {}", index + 1, MESSAGES.len())
                            );
                            queue.push_back(Event::SendCompleted);
                        }
                        Err(e) => {
                            log_error!(
                                logger,
                                Facility::Coordinator,
                                &format!("broadcast send {} failed: {}", index + 1, e)
                            );
                            queue.push_back(Event::SendFailed {
                                error: e.to_string(),
                            });
                        }
                    }
                }
                Action::CloseSendSocket => {
                    log_debug!(
                        logger,
                        Facility::Coordinator,
                        "message sequence complete, closing send socket"
                    );
                    send_socket.take();
                }
                Action::Conclude(verdict) => return Ok(Some(verdict)),
            }
        }
    }
    Ok(None)
}

/// Non-blocking `try_wait` sweep over all tracked children.
///
/// Exited children are dropped from the tracked set so cleanup never signals
/// a reaped pid.
fn sweep_exited(children: &mut HashMap<usize, ListenerHandle>, logger: &Logger) -> Vec<Event> {
    let mut events = Vec::new();
    let mut exited = Vec::new();
    for (id, handle) in children.iter_mut() {
        match handle.child.try_wait() {
            Ok(Some(status)) => exited.push((*id, status)),
            Ok(None) => continue,
            Err(e) => {
                log_warning!(
                    logger,
                    Facility::Spawner,
                    &format!("error checking listener {}: {}", id, e)
                );
            }
        }
    }
    for (id, status) in exited {
        children.remove(&id);
        if status.success() {
            log_info!(
                logger,
                Facility::Spawner,
                &format!("listener {} exited cleanly", id)
            );
        } else {
            log_critical!(
                logger,
                Facility::Spawner,
                &format!("listener {} exited with {}", id, status)
            );
        }
        events.push(Event::Exited {
            listener: id,
            success: status.success(),
        });
    }
    events
}

/// Signal every still-tracked child, then reap them, force-killing whatever
/// ignores the signal.
async fn terminate_survivors(children: &mut HashMap<usize, ListenerHandle>, logger: &Logger) {
    if children.is_empty() {
        return;
    }
    log_info!(
        logger,
        Facility::Spawner,
        &format!("terminating {} remaining listener(s)", children.len())
    );
    for handle in children.values_mut() {
        spawner::terminate(handle, logger);
    }

    let deadline = tokio::time::Instant::now() + TERMINATE_WAIT;
    loop {
        children.retain(|_, handle| !matches!(handle.child.try_wait(), Ok(Some(_))));
        if children.is_empty() {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            for (id, handle) in children.iter_mut() {
                log_warning!(
                    logger,
                    Facility::Spawner,
                    &format!("listener {} ignored SIGTERM, force killing", id)
                );
                let _ = handle.child.start_kill();
            }
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
