// SPDX-License-Identifier: Apache-2.0 OR MIT

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use broadcast_probe::config::Config;
use broadcast_probe::coordinator::{self, Verdict};
use broadcast_probe::logging::{Facility, Logger};
use broadcast_probe::{listener, log_error, log_notice, net};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Optional JSON5 settings file (coordinator role only)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Parser, Debug, PartialEq)]
enum Command {
    /// Run a listener child (intended to be spawned by the coordinator)
    Listener {
        /// UDP port shared with the coordinator
        #[arg(long)]
        port: u16,
        /// Delay before exit once the full message count arrived
        #[arg(long, default_value_t = 500)]
        grace_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let logger = Logger::stderr_json();

    match args.command {
        Some(Command::Listener { port, grace_ms }) => {
            listener::run(port, Duration::from_millis(grace_ms), &logger).await?;
        }
        None => {
            if let Some(reason) = net::skip_reason() {
                log_notice!(
                    logger,
                    Facility::Coordinator,
                    &format!("run skipped: {}", reason)
                );
                return Ok(());
            }

            let config = match args.config {
                Some(path) => Config::load_from_file(&path)?,
                None => Config::default(),
            };
            config.validate()?;

            match coordinator::run(&config, &logger).await? {
                Verdict::Pass => {
                    log_notice!(
                        logger,
                        Facility::Coordinator,
                        "pass: every listener received every message"
                    );
                }
                Verdict::Fail(reason) => {
                    log_error!(logger, Facility::Coordinator, &format!("fail: {}", reason));
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
