use serde::{Deserialize, Serialize};

use crate::cli::Args;

/// Fixed batching hint appended to every connection URL. The provider splits
/// snapshot delivery into chunks of this size, which is also why empty update
/// batches can repeat (see [`crate::classifier::Classification::EmptyBatch`]).
pub const SNAPSHOT_BATCH_SIZE: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub domain: String,
    pub channel: String,
    pub api_key: String,
}

impl FeedConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "https://{}/{}?ApiKey={}&snapshotBatchSize={}",
            self.domain, self.channel, self.api_key, SNAPSHOT_BATCH_SIZE
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NtpConfig {
    pub servers: Vec<String>,
    pub reply_timeout_ms: u64,
}

impl Default for NtpConfig {
    fn default() -> Self {
        Self {
            servers: vec!["pl.pool.ntp.org".to_string()],
            reply_timeout_ms: 6000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub ntp: NtpConfig,
}

impl AppConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            feed: FeedConfig {
                domain: args.feed_domain.clone(),
                channel: args.channel_name.clone(),
                api_key: args.api_key.clone(),
            },
            ntp: NtpConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_feed() -> FeedConfig {
        FeedConfig {
            domain: "feed.example.com".to_string(),
            channel: "live".to_string(),
            api_key: "secret".to_string(),
        }
    }

    #[test]
    fn test_connection_url_shape() {
        assert_eq!(
            sample_feed().connection_url(),
            "https://feed.example.com/live?ApiKey=secret&snapshotBatchSize=10"
        );
    }

    #[test]
    fn test_ntp_defaults() {
        let ntp = NtpConfig::default();
        assert_eq!(ntp.servers, vec!["pl.pool.ntp.org".to_string()]);
        assert_eq!(ntp.reply_timeout_ms, 6000);
    }
}
