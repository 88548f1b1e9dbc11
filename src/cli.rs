use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use delta_rpi::engine::{Config, Mode};

#[derive(Error, Debug)]
pub enum TimeoutError {
    #[error("invalid timeout '{0}'")]
    BadTimeout(String),
}

fn parse_timeout(input: &str) -> Result<Duration, TimeoutError> {
    input
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
        .ok_or_else(|| TimeoutError::BadTimeout(input.to_string()))
}

/// Delta inverter simulator (slave mode) or datalogger (master mode) for RPI H5A
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Slave address
    #[clap(long, short, default_value_t = 1)]
    pub address: u8,

    /// Serial device or 'auto'
    #[clap(long, short, default_value = "/dev/ttyUSB0")]
    pub device: String,

    /// UART baud rate
    #[clap(long, short, default_value_t = 19200)]
    pub baudrate: u32,

    /// Read timeout in seconds, can be fractional
    #[clap(long, short, default_value = "2.0", parse(try_from_str = parse_timeout))]
    pub timeout: Duration,

    /// Skip port sanity checks
    #[clap(long, short)]
    pub force: bool,

    /// Show debug information
    #[clap(long)]
    pub debug: bool,

    /// Print readings as json, one object per line
    #[clap(long, short)]
    pub json: bool,

    /// Drop readings while there is no DC voltage on string 1
    #[clap(long, short)]
    pub skip_idle: bool,

    /// Either "master" or "slave"
    #[clap(possible_values = ["master", "slave"])]
    pub mode: Mode,
}

impl Cli {
    pub fn engine_config(&self) -> Config {
        Config {
            debug: self.debug,
            ..Config::new(self.mode, self.address)
        }
    }
}
