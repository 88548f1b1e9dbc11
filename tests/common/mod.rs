use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};

use delta_rpi::engine::{CancelToken, Config, EngineError, Mode};
use delta_rpi::payload::TelemetryRecord;
use delta_rpi::sink::Sink;

/// Serves queued reads one chunk at a time. An empty chunk, or running dry,
/// is a read timeout, i.e. the end of one cycle's input. Optionally cancels
/// a token when it runs dry so `run` terminates.
#[derive(Default)]
pub struct MockPort {
    pub reads: VecDeque<Vec<u8>>,
    pub written: Vec<u8>,
    pub stop_when_empty: Option<CancelToken>,
}

impl MockPort {
    pub fn with_reads(reads: Vec<Vec<u8>>) -> Self {
        Self {
            reads: reads.into(),
            ..Default::default()
        }
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            Some(chunk) if chunk.is_empty() => {
                Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"))
            }
            Some(mut chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.reads.push_front(chunk.split_off(n));
                }
                Ok(n)
            }
            None => {
                if let Some(token) = &self.stop_when_empty {
                    token.cancel();
                }
                Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"))
            }
        }
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub readings: Vec<Vec<TelemetryRecord>>,
    pub errors: Vec<String>,
}

impl Sink for RecordingSink {
    fn persist(&mut self, _timestamp: DateTime<Utc>, records: &[TelemetryRecord]) -> Result<()> {
        self.readings.push(records.to_vec());
        Ok(())
    }

    fn report(&mut self, error: &EngineError) {
        self.errors.push(error.to_string());
    }
}

pub fn config(mode: Mode, address: u8) -> Config {
    Config {
        settle: Duration::ZERO,
        ..Config::new(mode, address)
    }
}
