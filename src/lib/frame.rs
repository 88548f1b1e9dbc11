//! Delta RS-485 framing.
//!
//! ```text
//! STX | class | address | size | command | sub | data (size - 2) | crc lo | crc hi | ETX
//! ```
//!
//! The checksum covers everything between STX and the checksum itself.

use std::fmt::Display;

use log::debug;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use thiserror::Error;

use crate::checksum::checksum;

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;

/// STX, class, address, size, then crc lo, crc hi, ETX.
const OVERHEAD: usize = 7;
/// A frame carrying only command and sub-command.
const MIN_FRAME: usize = OVERHEAD + 2;

pub const MAX_DATA: usize = 0xFF - 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum RequestClass {
    /// ENQ, master to slave
    Poll = 0x05,
    /// ACK, slave reply carrying data
    Accept = 0x06,
    /// NAK, slave refused the request
    Reject = 0x15,
}

impl Display for RequestClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestClass::Poll => "POLL".fmt(f),
            RequestClass::Accept => "ACCEPT".fmt(f),
            RequestClass::Reject => "REJECT".fmt(f),
        }
    }
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("{0} data bytes do not fit in one frame (max {})", MAX_DATA)]
    DataTooLong(usize),
}

/// Reasons a candidate frame starting at an STX byte was skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("bad request class {class:#04x} at offset {offset}")]
    BadRequestClass { offset: usize, class: u8 },
    #[error("bad size {size} at offset {offset}")]
    BadSize { offset: usize, size: u8 },
    #[error("incomplete frame at offset {offset}: need {needed} bytes, have {available}")]
    Incomplete {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("bad terminator {etx:#04x} at offset {offset}")]
    BadTerminator { offset: usize, etx: u8 },
    #[error("checksum mismatch at offset {offset}: computed {computed:#06x}, received {received:#06x}")]
    ChecksumMismatch {
        offset: usize,
        computed: u16,
        received: u16,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub request_class: RequestClass,
    pub address: u8,
    pub command: u8,
    pub sub_command: u8,
    pub data: Vec<u8>,
    pub checksum: u16,
}

impl Frame {
    /// Value of the size byte: command, sub-command and data.
    pub fn size(&self) -> usize {
        2 + self.data.len()
    }

    pub fn is_command(&self, command: u8, sub_command: u8) -> bool {
        self.command == command && self.sub_command == sub_command
    }

    pub fn verify(&self) -> bool {
        let mut inner = vec![
            self.request_class as u8,
            self.address,
            self.size() as u8,
            self.command,
            self.sub_command,
        ];
        inner.extend_from_slice(&self.data);
        self.size() <= 0xFF && checksum(&inner) == self.checksum
    }

    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        encode(
            self.request_class,
            self.address,
            self.command,
            self.sub_command,
            &self.data,
        )
    }
}

pub fn encode(
    request_class: RequestClass,
    address: u8,
    command: u8,
    sub_command: u8,
    data: &[u8],
) -> Result<Vec<u8>, FrameError> {
    if data.len() > MAX_DATA {
        return Err(FrameError::DataTooLong(data.len()));
    }

    let mut buffer = Vec::with_capacity(MIN_FRAME + data.len());
    buffer.push(STX);
    buffer.extend_from_slice(&[
        request_class as u8,
        address,
        (2 + data.len()) as u8,
        command,
        sub_command,
    ]);
    buffer.extend_from_slice(data);

    let cs = checksum(&buffer[1..]);
    buffer.extend_from_slice(&cs.to_le_bytes());
    buffer.push(ETX);
    Ok(buffer)
}

/// Lazily extract every valid frame from `buffer`.
///
/// Anything that does not validate is skipped one byte at a time, so the
/// scan always terminates and never fails. A frame cut short by the end of
/// the buffer is skipped as well; accumulate a complete read before scanning.
pub fn scan(buffer: &[u8]) -> Scanner<'_> {
    Scanner {
        buffer,
        cursor: 0,
        rejected: Vec::new(),
    }
}

pub struct Scanner<'a> {
    buffer: &'a [u8],
    cursor: usize,
    rejected: Vec<FramingError>,
}

impl<'a> Scanner<'a> {
    /// Candidates skipped so far, in buffer order.
    pub fn rejected(&self) -> &[FramingError] {
        &self.rejected
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        while self.cursor + MIN_FRAME <= self.buffer.len() {
            if self.buffer[self.cursor] != STX {
                self.cursor += 1;
                continue;
            }

            match parse_at(self.buffer, self.cursor) {
                Ok(frame) => {
                    self.cursor += OVERHEAD + frame.size();
                    return Some(frame);
                }
                Err(e) => {
                    debug!("{}", e);
                    self.rejected.push(e);
                    self.cursor += 1;
                }
            }
        }
        None
    }
}

fn parse_at(buffer: &[u8], offset: usize) -> Result<Frame, FramingError> {
    let window = &buffer[offset..];

    let request_class = RequestClass::from_u8(window[1]).ok_or(FramingError::BadRequestClass {
        offset,
        class: window[1],
    })?;
    let address = window[2];
    let size = window[3];

    if size < 2 {
        return Err(FramingError::BadSize { offset, size });
    }

    let size = size as usize;
    if window.len() < OVERHEAD + size {
        return Err(FramingError::Incomplete {
            offset,
            needed: OVERHEAD + size,
            available: window.len(),
        });
    }

    let etx = window[6 + size];
    if etx != ETX {
        return Err(FramingError::BadTerminator { offset, etx });
    }

    let received = u16::from_le_bytes([window[4 + size], window[5 + size]]);
    let computed = checksum(&window[1..4 + size]);
    if computed != received {
        return Err(FramingError::ChecksumMismatch {
            offset,
            computed,
            received,
        });
    }

    Ok(Frame {
        request_class,
        address,
        command: window[4],
        sub_command: window[5],
        data: window[6..4 + size].to_vec(),
        checksum: received,
    })
}
