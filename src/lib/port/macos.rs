use super::{OpenPortError, Rs485};
use anyhow::Result;
use log::debug;
use serialport::SerialPort;
use serialport::TTYPort as NativePort;
use std::process::Command;

/// Whether any process holds `port_name` open, as reported by `lsof`.
/// Assumes the port is free when `lsof` can't be run.
pub fn is_port_open(port_name: &str) -> bool {
    match Command::new("lsof").arg("-t").arg(port_name).output() {
        Ok(out) => out.status.success() && !out.stdout.is_empty(),
        Err(e) => {
            debug!("lsof unavailable, not checking {}: {}", port_name, e);
            false
        }
    }
}

fn unsupported(port: &NativePort) -> anyhow::Error {
    OpenPortError::Rs485Error {
        port_name: port.name().unwrap_or_default(),
    }
    .into()
}

/// No kernel RS-485 mode on macOS; USB adapters switch direction in hardware
/// and `open_port` leaves the port as it is.
impl Rs485 for NativePort {
    fn rs485_is_enabled(&self) -> Result<bool> {
        Err(unsupported(self))
    }

    fn rs485_enable(&self, _enable: bool) -> Result<()> {
        Err(unsupported(self))
    }
}
