// src/config/settings.rs

use clap::Parser;
use std::time::Duration;

/// Process settings. Every flag can also come from the environment.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Real-time bidding engine for inbound calls")]
pub struct Settings {
    #[arg(short, long, env = "RTB_PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "RTB_LOG_DIR", default_value = "logs")]
    pub log_dir: String,

    #[arg(long, env = "RTB_TARGETS_FILE", default_value = "static/targets.json")]
    pub targets_file: String,

    #[arg(long, env = "RTB_CAMPAIGNS_FILE", default_value = "static/campaigns.json")]
    pub campaigns_file: String,

    /// Upper bound on outbound bid requests in flight across all auctions.
    #[arg(long, env = "RTB_MAX_IN_FLIGHT", default_value_t = 256)]
    pub max_in_flight: usize,

    #[arg(long, env = "RTB_LEDGER_BUFFER_SIZE", default_value_t = 10_000)]
    pub ledger_buffer_size: usize,

    #[arg(long, env = "RTB_LEDGER_BATCH_SIZE", default_value_t = 100)]
    pub ledger_batch_size: usize,

    #[arg(long, env = "RTB_LEDGER_FLUSH_INTERVAL_MS", default_value_t = 1000)]
    pub ledger_flush_interval_ms: u64,

    #[arg(long, env = "RTB_LOG_RETENTION_HOURS", default_value_t = 72)]
    pub log_retention_hours: u64,

    /// Seconds between target health checks; 0 disables the monitor.
    #[arg(long, env = "RTB_HEALTH_INTERVAL_SECS", default_value_t = 30)]
    pub health_interval_secs: u64,

    /// Start the bundled mock bidder on this port.
    #[arg(long, env = "RTB_MOCK_BIDDER_PORT")]
    pub mock_bidder_port: Option<u16>,
}

impl Settings {
    pub fn health_interval(&self) -> Option<Duration> {
        (self.health_interval_secs > 0).then(|| Duration::from_secs(self.health_interval_secs))
    }
}
