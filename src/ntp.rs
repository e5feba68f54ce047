//! Startup clock-skew probe against an NTP pool.
//!
//! Only used to log an initial estimate of how far the local clock drifts
//! from network time, so the heartbeat skew numbers in the timing tracker can
//! be read with context. Probe failures are reported to the caller and must
//! never take the process down.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::config::NtpConfig;
use crate::error::ProbeError;
use crate::events::epoch_ms;

/// Seconds between the NTP epoch (1900) and the unix epoch (1970).
const NTP_UNIX_EPOCH_DELTA: u64 = 2_208_988_800;
const NTP_PORT: u16 = 123;
const NTP_PACKET_LEN: usize = 48;
/// LI = 0, version 3, mode 3 (client).
const NTP_CLIENT_REQUEST: u8 = 0x1b;

#[derive(Debug, Clone)]
pub struct ClockSkew {
    /// Estimated `server − local` offset in milliseconds.
    pub offset_ms: i64,
    pub server: String,
}

#[async_trait]
pub trait ClockProbe: Send + Sync {
    async fn estimate(&self) -> Result<ClockSkew, ProbeError>;
}

/// SNTP client over a plain UDP exchange.
pub struct SntpProbe {
    servers: Vec<String>,
    reply_timeout: Duration,
}

impl SntpProbe {
    pub fn from_config(config: &NtpConfig) -> Self {
        Self {
            servers: config.servers.clone(),
            reply_timeout: Duration::from_millis(config.reply_timeout_ms),
        }
    }

    async fn query(&self, server: &str) -> Result<i64, ProbeError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect((server, NTP_PORT)).await?;

        let mut request = [0u8; NTP_PACKET_LEN];
        request[0] = NTP_CLIENT_REQUEST;

        let sent_at = epoch_ms();
        socket.send(&request).await?;

        let mut reply = [0u8; NTP_PACKET_LEN];
        let received = tokio::time::timeout(self.reply_timeout, socket.recv(&mut reply))
            .await
            .map_err(|_| ProbeError::Timeout {
                server: server.to_string(),
                timeout_ms: self.reply_timeout.as_millis() as u64,
            })??;
        let received_at = epoch_ms();

        let server_ms = parse_transmit_timestamp(&reply[..received])?;
        // midpoint of the exchange approximates the moment the server stamped
        Ok(server_ms - (sent_at + received_at) / 2)
    }
}

#[async_trait]
impl ClockProbe for SntpProbe {
    async fn estimate(&self) -> Result<ClockSkew, ProbeError> {
        for server in &self.servers {
            match self.query(server).await {
                Ok(offset_ms) => {
                    debug!(%server, offset_ms, "time server replied");
                    return Ok(ClockSkew {
                        offset_ms,
                        server: server.clone(),
                    });
                }
                Err(err) => warn!(%server, error = %err, "time server query failed"),
            }
        }
        Err(ProbeError::AllServersFailed)
    }
}

/// Extract the transmit timestamp (bytes 40..48) of an NTP reply as epoch
/// milliseconds.
fn parse_transmit_timestamp(reply: &[u8]) -> Result<i64, ProbeError> {
    if reply.len() < NTP_PACKET_LEN {
        return Err(ProbeError::MalformedReply(format!(
            "reply too short: {} bytes",
            reply.len()
        )));
    }

    let seconds = u32::from_be_bytes([reply[40], reply[41], reply[42], reply[43]]) as u64;
    let fraction = u32::from_be_bytes([reply[44], reply[45], reply[46], reply[47]]) as u64;

    if seconds < NTP_UNIX_EPOCH_DELTA {
        return Err(ProbeError::MalformedReply(format!(
            "transmit timestamp predates the unix epoch: {seconds}"
        )));
    }

    let unix_seconds = seconds - NTP_UNIX_EPOCH_DELTA;
    let millis = unix_seconds * 1000 + (fraction * 1000) / (1u64 << 32);
    Ok(millis as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_with_transmit(seconds: u32, fraction: u32) -> [u8; NTP_PACKET_LEN] {
        let mut reply = [0u8; NTP_PACKET_LEN];
        reply[40..44].copy_from_slice(&seconds.to_be_bytes());
        reply[44..48].copy_from_slice(&fraction.to_be_bytes());
        reply
    }

    #[test]
    fn test_parse_transmit_timestamp() {
        // 2024-01-01T00:00:00Z = unix 1704067200
        let seconds = (1_704_067_200 + NTP_UNIX_EPOCH_DELTA) as u32;
        let reply = reply_with_transmit(seconds, 0);
        assert_eq!(parse_transmit_timestamp(&reply).unwrap(), 1_704_067_200_000);
    }

    #[test]
    fn test_parse_transmit_timestamp_fraction() {
        let seconds = (1_704_067_200 + NTP_UNIX_EPOCH_DELTA) as u32;
        // half a second
        let reply = reply_with_transmit(seconds, 1 << 31);
        assert_eq!(parse_transmit_timestamp(&reply).unwrap(), 1_704_067_200_500);
    }

    #[test]
    fn test_parse_short_reply_rejected() {
        assert!(matches!(
            parse_transmit_timestamp(&[0u8; 12]),
            Err(ProbeError::MalformedReply(_))
        ));
    }

    #[test]
    fn test_parse_pre_epoch_timestamp_rejected() {
        let reply = reply_with_transmit(1000, 0);
        assert!(matches!(
            parse_transmit_timestamp(&reply),
            Err(ProbeError::MalformedReply(_))
        ));
    }
}
