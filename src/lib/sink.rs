use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use json::JsonValue;
use log::{debug, warn};

use crate::engine::EngineError;
use crate::payload::{TelemetryRecord, Value};

/// Receives everything the engine produces: decoded readings and the
/// per-message errors it recovered from.
pub trait Sink {
    fn persist(&mut self, timestamp: DateTime<Utc>, records: &[TelemetryRecord]) -> Result<()>;

    fn report(&mut self, error: &EngineError) {
        warn!("{}", error);
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn persist(&mut self, timestamp: DateTime<Utc>, records: &[TelemetryRecord]) -> Result<()> {
        (**self).persist(timestamp, records)
    }

    fn report(&mut self, error: &EngineError) {
        (**self).report(error)
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Text(s) => s.trim_end_matches('\0').to_string(),
        v => v.to_string(),
    }
}

/// Human readable table, one block per reading.
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Sink for ConsoleSink<W> {
    fn persist(&mut self, _timestamp: DateTime<Utc>, records: &[TelemetryRecord]) -> Result<()> {
        writeln!(self.out, "{}", "=".repeat(61))?;
        for record in records {
            writeln!(
                self.out,
                "{:<40} {:>20} {:<10}",
                record.label,
                display_value(&record.value),
                record.unit
            )?;
        }
        self.out.flush()?;
        Ok(())
    }
}

/// One JSON object per line.
pub struct JsonSink<W: Write> {
    out: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn json_value(value: &Value) -> JsonValue {
    match value {
        Value::Text(s) => s.trim_end_matches('\0').into(),
        Value::Int(v) => (*v).into(),
        Value::Float(v) => (*v).into(),
    }
}

impl<W: Write> Sink for JsonSink<W> {
    fn persist(&mut self, timestamp: DateTime<Utc>, records: &[TelemetryRecord]) -> Result<()> {
        let mut values = JsonValue::new_array();
        for record in records {
            let mut entry = JsonValue::new_object();
            entry.insert("key", record.key.map_or(JsonValue::Null, JsonValue::from))?;
            entry.insert("label", record.label)?;
            entry.insert("value", json_value(&record.value))?;
            entry.insert("unit", record.unit)?;
            values.push(entry)?;
        }

        let mut reading = JsonValue::new_object();
        reading.insert("timestamp", timestamp.to_rfc3339())?;
        reading.insert("values", values)?;

        writeln!(self.out, "{}", reading.dump())?;
        self.out.flush()?;
        Ok(())
    }
}

/// Drops readings taken while the inverter is not generating, i.e. while the
/// DC voltage on string 1 reads zero.
pub struct GenerationFilter<S: Sink> {
    inner: S,
}

impl<S: Sink> GenerationFilter<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

fn generating(records: &[TelemetryRecord]) -> bool {
    records
        .iter()
        .find(|record| record.key == Some("dcv1"))
        .and_then(|record| record.value.as_f64())
        .map_or(true, |v| v != 0.0)
}

impl<S: Sink> Sink for GenerationFilter<S> {
    fn persist(&mut self, timestamp: DateTime<Utc>, records: &[TelemetryRecord]) -> Result<()> {
        if !generating(records) {
            debug!("no DC voltage on string 1, skipping reading");
            return Ok(());
        }
        self.inner.persist(timestamp, records)
    }

    fn report(&mut self, error: &EngineError) {
        self.inner.report(error)
    }
}
