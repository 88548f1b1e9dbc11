//! Poll/respond cycle for both ends of the link.
//!
//! Master: `Idle -> AwaitResponse -> Idle`, one poll per cycle.
//! Slave: `Idle -> AwaitPoll -> Idle`, answering polls with a canned payload.
//! Per-message problems go to the sink and never end the loop; only
//! transport failures do.

use std::fmt::Display;
use std::io::{ErrorKind, Read, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, error, info};
use thiserror::Error;

use crate::fields::{layout, payload_size, Field, FIELDS};
use crate::fixture::canned_payload;
use crate::frame::{self, Frame, FramingError, RequestClass};
use crate::payload::{self, DecodeError};
use crate::sink::Sink;

/// Read current values; the only command this engine speaks.
pub const COMMAND: u8 = 0x60;
pub const SUB_COMMAND: u8 = 0x01;

pub const READ_BYTES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Master,
    Slave,
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Master => "master".fmt(f),
            Mode::Slave => "slave".fmt(f),
        }
    }
}

#[derive(Error, Debug)]
pub enum ModeError {
    #[error("invalid mode '{0}', expected 'master' or 'slave'")]
    BadMode(String),
}

impl FromStr for Mode {
    type Err = ModeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "master" => Ok(Mode::Master),
            "slave" => Ok(Mode::Slave),
            _ => Err(ModeError::BadMode(input.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    AwaitResponse,
    AwaitPoll,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("inverter {address} rejected cmd={command:#04x}, cmdsub={sub_command:#04x}")]
    Rejected {
        address: u8,
        command: u8,
        sub_command: u8,
    },
    #[error("can't decode response cmd={command:#04x}, cmdsub={sub_command:#04x} from {address}, only cmd=0x60, cmdsub=0x01 is supported")]
    UnsupportedResponse {
        address: u8,
        command: u8,
        sub_command: u8,
    },
    #[error("unsupported request cmd={command:#04x}, cmdsub={sub_command:#04x}, only cmd=0x60, cmdsub=0x01 is answered")]
    UnsupportedCommand { command: u8, sub_command: u8 },
    #[error("dropped frame: {0}")]
    Framing(#[from] FramingError),
    #[error("bad payload from inverter {address}: {source}")]
    Decode {
        address: u8,
        #[source]
        source: DecodeError,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    /// Inverter address polled (master) or answered to (slave).
    pub address: u8,
    /// Dump every frame sent and received.
    pub debug: bool,
    /// Pause between sending a poll and reading the answer.
    pub settle: Duration,
}

impl Config {
    pub fn new(mode: Mode, address: u8) -> Self {
        Self {
            mode,
            address,
            debug: false,
            settle: Duration::from_millis(100),
        }
    }
}

/// Stop request shared with whoever wants to end the loop, typically a
/// signal handler. Checked once per cycle.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Engine<P: Read + Write, S: Sink> {
    port: P,
    sink: S,
    config: Config,
    cancel: CancelToken,
    state: State,
    table: &'static [Field],
    reply: Vec<u8>,
}

impl<P: Read + Write, S: Sink> Engine<P, S> {
    pub fn new(port: P, sink: S, config: Config, cancel: CancelToken) -> Result<Self> {
        let engine = Self {
            port,
            sink,
            config,
            cancel,
            state: State::Idle,
            table: FIELDS,
            reply: Vec::new(),
        };

        debug!(
            "payload layout {} ({} bytes)",
            layout(engine.table),
            payload_size(engine.table)
        );

        match engine.config.mode {
            Mode::Master => Ok(engine),
            Mode::Slave => {
                let reply = canned_payload().context("corrupted canned payload")?;
                Ok(engine.with_reply(reply)?)
            }
        }
    }

    /// Replace the payload served in slave mode.
    pub fn with_reply(mut self, reply: Vec<u8>) -> Result<Self, DecodeError> {
        let expected = payload_size(self.table);
        if reply.len() != expected {
            return Err(DecodeError::Length {
                expected,
                actual: reply.len(),
            });
        }
        self.reply = reply;
        Ok(self)
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Cycle until cancelled or the transport fails.
    pub fn run(&mut self) -> Result<()> {
        info!(
            "{} mode, address {}",
            self.config.mode, self.config.address
        );

        while !self.cancel.is_cancelled() {
            match self.config.mode {
                Mode::Master => self.poll()?,
                Mode::Slave => self.serve()?,
            }
        }

        info!("stop requested");
        Ok(())
    }

    /// One master cycle: poll the inverter and handle whatever came back.
    pub fn poll(&mut self) -> Result<()> {
        let address = self.config.address;
        let request = frame::encode(RequestClass::Poll, address, COMMAND, SUB_COMMAND, &[])?;
        self.send(&request)?;
        self.transition(State::AwaitResponse);

        if !self.config.settle.is_zero() {
            thread::sleep(self.config.settle);
        }

        let bytes = self.receive()?;
        let mut frames = frame::scan(&bytes);
        for frame in frames.by_ref() {
            if frame.address != address {
                debug!("ignoring frame for address {}", frame.address);
                continue;
            }

            match frame.request_class {
                RequestClass::Poll => debug!("ignoring poll for address {}", frame.address),
                RequestClass::Reject => self.sink.report(&EngineError::Rejected {
                    address,
                    command: frame.command,
                    sub_command: frame.sub_command,
                }),
                RequestClass::Accept => self.accept(frame),
            }
        }
        self.report_rejected(frames.rejected());

        self.transition(State::Idle);
        Ok(())
    }

    fn accept(&mut self, frame: Frame) {
        if !frame.is_command(COMMAND, SUB_COMMAND) {
            self.sink.report(&EngineError::UnsupportedResponse {
                address: frame.address,
                command: frame.command,
                sub_command: frame.sub_command,
            });
            return;
        }

        match payload::decode(&frame.data, self.table) {
            Ok(records) => {
                if let Err(e) = self.sink.persist(Utc::now(), &records) {
                    error!("failed to store reading: {:#}", e);
                }
            }
            Err(source) => self.sink.report(&EngineError::Decode {
                address: frame.address,
                source,
            }),
        }
    }

    /// One slave cycle: answer every poll for our address found in one read.
    pub fn serve(&mut self) -> Result<()> {
        self.transition(State::AwaitPoll);

        let bytes = self.receive()?;
        let mut requests = frame::scan(&bytes);
        for request in requests.by_ref() {
            if request.request_class != RequestClass::Poll || request.address != self.config.address {
                continue;
            }

            if request.is_command(COMMAND, SUB_COMMAND) {
                let reply = frame::encode(
                    RequestClass::Accept,
                    self.config.address,
                    COMMAND,
                    SUB_COMMAND,
                    &self.reply,
                )?;
                self.send(&reply)?;
            } else {
                self.sink.report(&EngineError::UnsupportedCommand {
                    command: request.command,
                    sub_command: request.sub_command,
                });
            }
        }
        self.report_rejected(requests.rejected());

        self.transition(State::Idle);
        Ok(())
    }

    /// Damaged frames go to the sink; stray STX bytes in line noise do not.
    fn report_rejected(&mut self, rejected: &[FramingError]) {
        for e in rejected {
            if matches!(
                e,
                FramingError::ChecksumMismatch { .. } | FramingError::BadTerminator { .. }
            ) {
                self.sink.report(&EngineError::Framing(e.clone()));
            }
        }
    }

    fn transition(&mut self, state: State) {
        debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        if self.config.debug {
            info!(">>> SEND: {}", hex::encode(bytes));
        }
        self.port.write_all(bytes).context("serial write failed")?;
        self.port.flush().context("serial flush failed")?;
        Ok(())
    }

    /// Everything sent until the line goes quiet: keep reading until a read
    /// times out or returns nothing.
    fn receive(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut buffer = [0u8; READ_BYTES];

        loop {
            let n = match self.port.read(&mut buffer) {
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    0
                }
                Err(e) => return Err(e).context("serial read failed"),
            };

            if n == 0 {
                break;
            }
            data.extend_from_slice(&buffer[..n]);
        }

        if self.config.debug && !data.is_empty() {
            info!(">>> RAW RECEIVE: {}", hex::encode(&data));
        }
        Ok(data)
    }
}
