// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Control messages between each listener child and the coordinator.
//!
//! The control channel is independent of the UDP path under test: a Unix
//! socket pair created at spawn time, carrying length-delimited JSON frames.

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// What a listener tells the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Report {
    /// Receive socket bound; the listener is ready for traffic. Sent once.
    Listening,
    /// One accepted datagram's payload, as text. Sent per datagram.
    Message { payload: String },
}

/// Typed report link over any byte stream.
///
/// Frames are a 4-byte big-endian length followed by the JSON payload, so a
/// report survives partial reads and coalesced writes on the socket.
pub struct ControlChannel<S> {
    framed: Framed<S, LengthDelimitedCodec>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ControlChannel<S> {
    pub fn new(stream: S) -> Self {
        Self {
            framed: Framed::new(stream, LengthDelimitedCodec::new()),
        }
    }

    pub async fn send(&mut self, report: &Report) -> Result<()> {
        let bytes: Bytes = serde_json::to_vec(report)
            .context("failed to serialize report")?
            .into();
        self.framed
            .send(bytes)
            .await
            .context("failed to write report frame")?;
        Ok(())
    }

    /// Next report, or `None` once the peer closed its end.
    pub async fn recv(&mut self) -> Result<Option<Report>> {
        match self.framed.next().await {
            Some(frame) => {
                let frame = frame.context("failed to read report frame")?;
                let report =
                    serde_json::from_slice(&frame).context("failed to deserialize report")?;
                Ok(Some(report))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_report_round_trip() {
        let (client, server) = tokio::io::duplex(1024);
        let mut sender = ControlChannel::new(client);
        let mut receiver = ControlChannel::new(server);

        sender.send(&Report::Listening).await.unwrap();
        sender
            .send(&Report::Message {
                payload: "First message to send".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(receiver.recv().await.unwrap(), Some(Report::Listening));
        assert_eq!(
            receiver.recv().await.unwrap(),
            Some(Report::Message {
                payload: "First message to send".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_recv_none_on_peer_close() {
        let (client, server) = tokio::io::duplex(1024);
        let mut receiver = ControlChannel::new(server);

        drop(client);

        assert_eq!(receiver.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_many_reports_in_order() {
        let (client, server) = tokio::io::duplex(4096);
        let mut sender = ControlChannel::new(client);
        let mut receiver = ControlChannel::new(server);

        for i in 0..10 {
            sender
                .send(&Report::Message {
                    payload: format!("payload {}", i),
                })
                .await
                .unwrap();
        }
        drop(sender);

        for i in 0..10 {
            assert_eq!(
                receiver.recv().await.unwrap(),
                Some(Report::Message {
                    payload: format!("payload {}", i)
                })
            );
        }
        assert_eq!(receiver.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_an_error() {
        let (client, server) = tokio::io::duplex(1024);
        let mut receiver = ControlChannel::<_>::new(server);

        // A well-framed payload that is not a Report
        let mut framed = Framed::new(client, LengthDelimitedCodec::new());
        framed.send(Bytes::from_static(b"not json")).await.unwrap();

        assert!(receiver.recv().await.is_err());
    }
}
