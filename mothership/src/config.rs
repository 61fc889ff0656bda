// Command line interface
// runtime configuration (addresses, transport tuning, queue sizing)
use anyhow::Result;
use clap::Parser;
use std::time::Duration;

use fleet_protocol::send::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub retry_timeout_ms: u64,
    pub max_retries: u32,
    pub queue_capacity: usize,
    pub demo_missions: u16,
    pub demo_interval_ms: u64,
}

#[derive(Parser, Debug, Clone)]
pub struct Cli {
    #[arg(long, default_value = "0.0.0.0:7878")] pub bind_addr: String,
    #[arg(long, default_value_t = 1000)]         pub retry_timeout_ms: u64,
    #[arg(long, default_value_t = 5)]            pub max_retries: u32,
    #[arg(long, default_value_t = 100)]          pub queue_capacity: usize,
    /// Missions the built-in generator feeds the intake queue (0 disables it).
    #[arg(long, default_value_t = 20)]           pub demo_missions: u16,
    #[arg(long, default_value_t = 2000)]         pub demo_interval_ms: u64,
}

impl Cli {
    pub fn parse_and_build_config() -> Result<Config> {
        let c = <Cli as Parser>::parse();
        Ok(Config {
            bind_addr: c.bind_addr,
            retry_timeout_ms: c.retry_timeout_ms,
            max_retries: c.max_retries,
            queue_capacity: c.queue_capacity,
            demo_missions: c.demo_missions,
            demo_interval_ms: c.demo_interval_ms,
        })
    }
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(self.retry_timeout_ms),
            max_retries: self.max_retries,
        }
    }
}
