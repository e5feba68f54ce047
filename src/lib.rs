pub mod classifier;
pub mod cli;
pub mod config;
pub mod consumer;
pub mod error;
pub mod events;
pub mod ntp;
pub mod orchestrator;
pub mod signalr;
pub mod timing;
pub mod transport;

pub use classifier::{classify, classify_batch, Classification, Decoded};
pub use config::{AppConfig, FeedConfig, NtpConfig};
pub use consumer::{ConsumerState, FeedConsumer};
pub use error::{ConsumerError, ProbeError, TimingError, TransportError};
pub use events::{ConnectionSignal, ConnectionStatusChange, FeedEvent};
pub use orchestrator::Orchestrator;
pub use signalr::SignalrTransport;
pub use timing::{LifecyclePhaseTimestamps, LifecycleTimingTracker};
pub use transport::HubTransport;
