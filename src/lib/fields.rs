//! Telemetry payload of the Delta RPI M-series answer to command 0x60/0x01.
//!
//! Offsets are payload offsets; add 6 for the position within the frame.
//!
//! ```text
//!   0  11s  SAP part number              91  H  dcv1
//!  11  18s  SAP serial number            93  H  dca1
//!  29   6s  unknown                      95  H  dcw1
//!  35   2s  DSP FW rev/date (x2)         97  H  dcv2
//!  39   2s  redundant MCU rev/date (x2)  99  H  dca2
//!  43   2s  display MCU rev/date (x2)   101  H  dcw2
//!  47   8s  zero                        103  H  acw2
//!  55   H   acv1                        105 4s  zero
//!  57   H   aca1                        109  I  wh_today
//!  59   H   acw1                        113  I  time_today
//!  61   H   freq1                       117  I  kwh_total
//!  63   H   acv2                        121  I  time_total
//!  65   H   freq2                       125 38s zero
//!  67  24s  zero
//! ```

use itertools::Itertools;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    U16 = 2,
    U32 = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Raw bytes shown as text.
    Text { size: usize },
    /// Two bytes rendered as "MA.MI".
    Version,
    /// Big-endian unsigned scaled by 10^scale.
    Float { width: Width, scale: i32 },
    /// Big-endian unsigned, unscaled.
    Int { width: Width },
}

impl FieldKind {
    pub const fn size(&self) -> usize {
        match self {
            FieldKind::Text { size } => *size,
            FieldKind::Version => 2,
            FieldKind::Float { width, .. } | FieldKind::Int { width } => *width as usize,
        }
    }

    /// Struct-style layout specifier.
    pub fn layout(&self) -> String {
        match self {
            FieldKind::Text { size } => format!("{}s", size),
            FieldKind::Version => "2s".to_string(),
            FieldKind::Float { width, .. } | FieldKind::Int { width } => match width {
                Width::U16 => "H".to_string(),
                Width::U32 => "I".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    /// Column name used by storage sinks, if the value is worth keeping.
    pub key: Option<&'static str>,
    pub label: &'static str,
    pub kind: FieldKind,
    pub unit: &'static str,
}

impl Field {
    pub const fn text(label: &'static str, size: usize) -> Self {
        Field {
            key: None,
            label,
            kind: FieldKind::Text { size },
            unit: "",
        }
    }

    pub const fn version(label: &'static str) -> Self {
        Field {
            key: None,
            label,
            kind: FieldKind::Version,
            unit: "MA,MI",
        }
    }

    pub const fn float(
        key: &'static str,
        label: &'static str,
        width: Width,
        scale: i32,
        unit: &'static str,
    ) -> Self {
        Field {
            key: Some(key),
            label,
            kind: FieldKind::Float { width, scale },
            unit,
        }
    }

    pub const fn int(
        key: &'static str,
        label: &'static str,
        width: Width,
        unit: &'static str,
    ) -> Self {
        Field {
            key: Some(key),
            label,
            kind: FieldKind::Int { width },
            unit,
        }
    }

    pub const fn size(&self) -> usize {
        self.kind.size()
    }

    /// Power of ten applied to the raw value; only floats are scaled.
    pub fn scale(&self) -> i32 {
        match self.kind {
            FieldKind::Float { scale, .. } => scale,
            _ => 0,
        }
    }
}

use Width::{U16, U32};

pub const FIELDS: &[Field] = &[
    Field::text("SAP part number", 11),
    Field::text("SAP serial number", 18),
    Field::text("Unknown1", 6),
    Field::version("DSP FW Rev"),
    Field::version("DSP FW Date"),
    Field::version("Redundant MCU FW Rev"),
    Field::version("Redundant MCU FW Date"),
    Field::version("Display MCU FW Rev"),
    Field::version("Display MCU FW Date"),
    Field::text("Zero1", 8),
    Field::float("acv1", "AC Voltage(Phase1)", U16, -1, "V"),
    Field::float("aca1", "AC Current(Phase1)", U16, -2, "A"),
    Field::int("acw1", "AC Power(Phase1)", U16, "W"),
    Field::float("freq1", "AC Frequency(Phase1)", U16, -2, "Hz"),
    Field::float("acv2", "AC Voltage(Phase1) [Redundant]", U16, -1, "V"),
    Field::float("freq2", "AC Frequency(Phase1) [Redundant]", U16, -2, "Hz"),
    Field::text("Zero2", 24),
    Field::float("dcv1", "DC Voltage(String1)", U16, -1, "V"),
    Field::float("dca1", "DC Current(String1)", U16, -2, "A"),
    Field::int("dcw1", "DC Power(String1)", U16, "W"),
    Field::float("dcv2", "DC Voltage(String2)", U16, -1, "V"),
    Field::float("dca2", "DC Current(String2)", U16, -2, "A"),
    Field::int("dcw2", "DC Power(String2)", U16, "W"),
    Field::int("acw2", "AC Power(Phase1) [Redundant]", U16, "W"),
    Field::text("Zero3", 4),
    Field::int("wh_today", "Supplied AC energy today", U32, "Wh"),
    Field::int("time_today", "Inverter runtime today", U32, "s"),
    Field::int("kwh_total", "Supplied AC energy (lifetime)", U32, "Wh"),
    Field::int("time_total", "Inverter runtime (lifetime)", U32, "s"),
    Field::text("Zero4", 38),
];

pub const fn payload_size(table: &[Field]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < table.len() {
        total += table[i].size();
        i += 1;
    }
    total
}

pub const PAYLOAD_SIZE: usize = payload_size(FIELDS);

/// Big-endian layout of the whole table, e.g. `>11s18s...H...I38s`.
pub fn layout(table: &[Field]) -> String {
    format!(">{}", table.iter().map(|field| field.kind.layout()).join(""))
}

/// Start offset of every field.
pub fn offsets(table: &[Field]) -> Vec<usize> {
    table
        .iter()
        .scan(0, |offset, field| {
            let start = *offset;
            *offset += field.size();
            Some(start)
        })
        .collect()
}

pub fn find(table: &'static [Field], key: &str) -> Option<(usize, &'static Field)> {
    table
        .iter()
        .find_position(|field| field.key == Some(key))
}
