// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Event-driven core of the coordinator.
//!
//! All run bookkeeping lives here: per-listener records, the ready/death/done
//! counters, and the send cursor. The surrounding I/O loop feeds discrete
//! events in and executes the returned actions, so every phase transition and
//! failure path can be exercised with synthetic event sequences.

/// Coordinator phase. Failure is reachable from any phase via watchdog
/// expiry, a send error, or all listeners dying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Listeners spawned, waiting for every ready report
    WaitingReady,
    /// Broadcasting the message sequence, one send in flight
    Sending,
    /// All messages sent, collecting remaining reports
    Collecting,
    /// Verdict reached, no further events are acted on
    Concluded,
}

/// One discrete occurrence the I/O loop observed.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A listener reported its receive socket is bound
    Ready { listener: usize },
    /// A listener forwarded one accepted datagram payload
    Report { listener: usize, payload: String },
    /// A listener process exited; `success` is a zero exit code
    Exited { listener: usize, success: bool },
    /// The in-flight broadcast send completed
    SendCompleted,
    /// The in-flight broadcast send failed
    SendFailed { error: String },
    /// The global watchdog fired
    WatchdogExpired,
}

/// What the I/O loop must do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Broadcast the message at this index in the fixed sequence
    SendNext(usize),
    /// All messages sent, the send socket is no longer needed
    CloseSendSocket,
    /// The run is over
    Conclude(Verdict),
}

/// Final outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Every listener received every distinct message
    Pass,
    /// Why the run failed
    Fail(String),
}

/// Coordinator-side record of one listener process.
#[derive(Debug)]
struct ListenerRecord {
    ready: bool,
    /// Payloads this listener reported, in arrival order
    received: Vec<String>,
    done: bool,
    /// Cleared when the process exits, expectedly or not
    alive: bool,
}

impl ListenerRecord {
    fn new() -> Self {
        Self {
            ready: false,
            received: Vec::new(),
            done: false,
            alive: true,
        }
    }
}

/// The coordinator's run state machine.
///
/// Owns every mutable coordination value for one run. Events arriving after
/// the verdict are ignored, so late reports from a draining listener are
/// harmless.
pub struct RunState {
    listeners: Vec<ListenerRecord>,
    messages: &'static [&'static str],
    phase: Phase,
    ready_count: usize,
    death_count: usize,
    done_count: usize,
    /// Index of the next message to send
    cursor: usize,
}

impl RunState {
    pub fn new(listener_count: usize, messages: &'static [&'static str]) -> Self {
        Self {
            listeners: (0..listener_count).map(|_| ListenerRecord::new()).collect(),
            messages,
            phase: Phase::WaitingReady,
            ready_count: 0,
            death_count: 0,
            done_count: 0,
            cursor: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Apply one event, returning the actions it triggers.
    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        if self.phase == Phase::Concluded {
            return Vec::new();
        }
        match event {
            Event::Ready { listener } => self.on_ready(listener),
            Event::Report { listener, payload } => self.on_report(listener, payload),
            Event::Exited { listener, success } => self.on_exited(listener, success),
            Event::SendCompleted => self.on_send_completed(),
            Event::SendFailed { error } => self.conclude_fail(format!("send failed: {}", error)),
            Event::WatchdogExpired => {
                let diagnostic = self.progress_diagnostic();
                self.conclude_fail(format!("watchdog expired, {}", diagnostic))
            }
        }
    }

    fn on_ready(&mut self, listener: usize) -> Vec<Action> {
        let Some(record) = self.listeners.get_mut(listener) else {
            return Vec::new();
        };
        if record.ready {
            return Vec::new();
        }
        record.ready = true;
        self.ready_count += 1;

        // No send happens until every listener is bound; a datagram sent
        // earlier would be silently missed by the stragglers.
        if self.phase == Phase::WaitingReady && self.ready_count == self.listeners.len() {
            self.phase = Phase::Sending;
            return vec![Action::SendNext(self.cursor)];
        }
        Vec::new()
    }

    fn on_send_completed(&mut self) -> Vec<Action> {
        if self.phase != Phase::Sending {
            return Vec::new();
        }
        self.cursor += 1;
        if self.cursor < self.messages.len() {
            vec![Action::SendNext(self.cursor)]
        } else {
            self.phase = Phase::Collecting;
            vec![Action::CloseSendSocket]
        }
    }

    fn on_report(&mut self, listener: usize, payload: String) -> Vec<Action> {
        let target = self.messages.len();
        let Some(record) = self.listeners.get_mut(listener) else {
            return Vec::new();
        };
        record.received.push(payload);
        if !record.done && record.received.len() >= target {
            record.done = true;
            self.done_count += 1;
        }
        if self.done_count == self.listeners.len() {
            return self.verify();
        }
        Vec::new()
    }

    fn on_exited(&mut self, listener: usize, success: bool) -> Vec<Action> {
        let Some(record) = self.listeners.get_mut(listener) else {
            return Vec::new();
        };
        if !record.alive {
            return Vec::new();
        }
        record.alive = false;

        // A zero exit, or any exit after the full count was reported, is the
        // listener's normal shutdown.
        if success || record.done {
            return Vec::new();
        }
        self.death_count += 1;
        if self.death_count == self.listeners.len() {
            return self.conclude_fail("all listener processes died before completing".to_string());
        }
        Vec::new()
    }

    /// Every listener reported the full count; check content.
    ///
    /// Order is not checked, only that each listener's reports cover every
    /// distinct message in the sequence.
    fn verify(&mut self) -> Vec<Action> {
        let mut failures = Vec::new();
        for (id, record) in self.listeners.iter().enumerate() {
            let matched = self
                .messages
                .iter()
                .filter(|expected| record.received.iter().any(|r| r == *expected))
                .count();
            if matched != self.messages.len() {
                failures.push(format!(
                    "listener {} matched {} of {} distinct messages",
                    id,
                    matched,
                    self.messages.len()
                ));
            }
        }
        if failures.is_empty() {
            self.phase = Phase::Concluded;
            vec![Action::Conclude(Verdict::Pass)]
        } else {
            self.conclude_fail(failures.join("; "))
        }
    }

    fn conclude_fail(&mut self, reason: String) -> Vec<Action> {
        self.phase = Phase::Concluded;
        vec![Action::Conclude(Verdict::Fail(reason))]
    }

    /// Per-listener progress summary for the watchdog diagnostic.
    fn progress_diagnostic(&self) -> String {
        let per_listener: Vec<String> = self
            .listeners
            .iter()
            .enumerate()
            .map(|(id, r)| {
                format!(
                    "listener {}: ready={} received={} done={} alive={}",
                    id,
                    r.ready,
                    r.received.len(),
                    r.done,
                    r.alive
                )
            })
            .collect();
        format!(
            "{} of {} sends completed, {}",
            self.cursor,
            self.messages.len(),
            per_listener.join(", ")
        )
    }
}
