#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
use linux::is_port_open;
#[cfg(target_os = "macos")]
use macos::is_port_open;

pub use serialport::SerialPort;

use anyhow::{Context, Result};
use core::time::Duration;
use log::debug;
use serialport::{self, ClearBuffer, SerialPortInfo, SerialPortType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenPortError {
    #[error("no RS-485 adapter found")]
    NoCompatiblePort,
    #[error("{port_name:?} busy")]
    PortBusy { port_name: String },
    #[error("rs485 configuration failed on {port_name:?}")]
    Rs485Error { port_name: String },
}

trait Rs485 {
    fn rs485_is_enabled(&self) -> Result<bool>;
    fn rs485_enable(&self, enable: bool) -> Result<()>;

    fn rs485_is_supported(&self) -> bool {
        match self.rs485_is_enabled() {
            Ok(enabled) => self.rs485_enable(enabled).is_ok(),
            Err(_) => false,
        }
    }
}

#[derive(PartialEq)]
struct UsbId(u16, u16);

static COMPATIBLE_IDS: &[UsbId] = &[
    UsbId(0x0403, 0x6001), // FTDI FT232R USB UART
    UsbId(0x0403, 0x6014), // FTDI FT232H Single HS USB-UART/FIFO IC
    UsbId(0x1a86, 0x7523), // QinHeng Electronics HL-340 USB-Serial adapter
    UsbId(0x10c4, 0xea60), // Silicon Labs CP210x UART Bridge
    UsbId(0x067b, 0x2303), // Prolific PL2303 Serial Port
];

/// Open `port_name` ("auto" picks the first known USB RS-485 adapter) with
/// reads blocking for at most `timeout`.
pub fn open_port(
    port_name: &str,
    baudrate: u32,
    timeout: Duration,
    force: bool,
) -> Result<Box<dyn SerialPort>> {
    let true_name: String = if port_name == "auto" {
        guess_port()?
    } else {
        port_name.to_string()
    };

    if !force && is_port_open(&true_name) {
        return Err(OpenPortError::PortBusy {
            port_name: true_name,
        }
        .into());
    }

    let port = serialport::new(&true_name, baudrate)
        .timeout(timeout)
        .open_native()
        .with_context(|| format!("can't open {}", true_name))?;

    if port.rs485_is_supported() && port.rs485_enable(true).is_err() && !force {
        return Err(OpenPortError::Rs485Error {
            port_name: true_name,
        }
        .into());
    }

    port.clear(ClearBuffer::All)?;

    debug!(
        "open_port OK: {} @ {} baud, timeout {:?}",
        &true_name, baudrate, timeout
    );
    Ok(Box::new(port))
}

fn is_rs485_adapter(info: &SerialPortInfo) -> bool {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => COMPATIBLE_IDS.contains(&UsbId(usb.vid, usb.pid)),
        // on-board UARTs with kernel RS-485 support, e.g. on a Raspberry Pi hat
        SerialPortType::Unknown => {
            !is_port_open(&info.port_name)
                && serialport::new(&info.port_name, 9600)
                    .open_native()
                    .map_or(false, |p| p.rs485_is_supported())
        }
        SerialPortType::PciPort | SerialPortType::BluetoothPort => false,
    }
}

fn guess_port() -> Result<String> {
    let name = serialport::available_ports()?
        .into_iter()
        .find(is_rs485_adapter)
        .map(|info| info.port_name)
        .ok_or(OpenPortError::NoCompatiblePort)?;

    debug!("auto-selected {}", name);
    Ok(name)
}
