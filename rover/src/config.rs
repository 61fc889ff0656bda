// Command line interface
// runtime configuration (identity, link tuning, battery and device simulation)
use anyhow::{bail, Result};
use clap::Parser;
use std::time::Duration;

use fleet_protocol::send::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub rover_id: u8,
    pub mothership_addr: String,
    pub bind_addr: String,
    pub batch_size: u8,
    pub backoff_ms: u64,
    pub slot_wait_ms: u64,
    pub retry_timeout_ms: u64,
    pub max_retries: u32,
    pub battery_low_pct: f64,
    pub battery_critical_pct: f64,
    pub battery_recharge_target: f64,
    pub battery_recharge_per_sec: f64,
    pub battery_check_secs: u64,
    pub task_battery_cost: f64,
    pub max_speed: f64,
    pub move_drain_per_unit: f64,
    pub arrival_threshold: f64,
    pub camera_image_bytes: usize,
    pub camera_chunk_bytes: usize,
    pub camera_fail_chance: f64,
    pub install_base_chance: f64,
}

#[derive(Parser, Debug, Clone)]
pub struct Cli {
    /// Fleet-unique rover id; 0 is reserved for the coordinator.
    #[arg(long)]                                     pub rover_id: u8,
    #[arg(long, default_value = "127.0.0.1:7878")]   pub mothership_addr: String,
    #[arg(long, default_value = "0.0.0.0:0")]        pub bind_addr: String,
    #[arg(long, default_value_t = 2)]                pub batch_size: u8,
    #[arg(long, default_value_t = 5000)]             pub backoff_ms: u64,
    #[arg(long, default_value_t = 8000)]             pub slot_wait_ms: u64,
    #[arg(long, default_value_t = 1000)]             pub retry_timeout_ms: u64,
    #[arg(long, default_value_t = 5)]                pub max_retries: u32,
    #[arg(long, default_value_t = 20.0)]             pub battery_low_pct: f64,
    #[arg(long, default_value_t = 10.0)]             pub battery_critical_pct: f64,
    #[arg(long, default_value_t = 80.0)]             pub battery_recharge_target: f64,
    #[arg(long, default_value_t = 5.0)]              pub battery_recharge_per_sec: f64,
    #[arg(long, default_value_t = 5)]                pub battery_check_secs: u64,
    #[arg(long, default_value_t = 3.0)]              pub task_battery_cost: f64,
    /// Plane units covered per one-second movement step.
    #[arg(long, default_value_t = 0.05)]             pub max_speed: f64,
    #[arg(long, default_value_t = 4.0)]              pub move_drain_per_unit: f64,
    #[arg(long, default_value_t = 0.001)]            pub arrival_threshold: f64,
    #[arg(long, default_value_t = 4096)]             pub camera_image_bytes: usize,
    #[arg(long, default_value_t = 512)]              pub camera_chunk_bytes: usize,
    #[arg(long, default_value_t = 0.1)]              pub camera_fail_chance: f64,
    #[arg(long, default_value_t = 0.9)]              pub install_base_chance: f64,
}

impl Cli {
    pub fn parse_and_build_config() -> Result<Config> {
        let c = <Cli as Parser>::parse();
        Self::build(c)
    }

    pub fn build(c: Cli) -> Result<Config> {
        if c.rover_id == 0 {
            bail!("rover id 0 is reserved for the coordinator");
        }
        Ok(Config {
            rover_id: c.rover_id,
            mothership_addr: c.mothership_addr,
            bind_addr: c.bind_addr,
            batch_size: c.batch_size.max(1),
            backoff_ms: c.backoff_ms,
            slot_wait_ms: c.slot_wait_ms,
            retry_timeout_ms: c.retry_timeout_ms,
            max_retries: c.max_retries,
            battery_low_pct: c.battery_low_pct,
            battery_critical_pct: c.battery_critical_pct,
            battery_recharge_target: c.battery_recharge_target,
            battery_recharge_per_sec: c.battery_recharge_per_sec,
            battery_check_secs: c.battery_check_secs,
            task_battery_cost: c.task_battery_cost,
            max_speed: c.max_speed,
            move_drain_per_unit: c.move_drain_per_unit,
            arrival_threshold: c.arrival_threshold,
            camera_image_bytes: c.camera_image_bytes,
            camera_chunk_bytes: c.camera_chunk_bytes,
            camera_fail_chance: c.camera_fail_chance,
            install_base_chance: c.install_base_chance,
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
