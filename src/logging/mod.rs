// SPDX-License-Identifier: Apache-2.0 OR MIT
// Structured stderr logging for the harness processes

mod facility;
mod logger;
#[macro_use]
mod macros;
mod severity;

// Public exports
pub use facility::Facility;
pub use logger::{LogEntry, LogSink, Logger, StderrJsonSink};
pub use severity::Severity;
