//! CDC-ACM line coding (baud rate, data bits, parity, stop bits).
//!
//! Mirrors the 7-byte payload of the CDC `SET_LINE_CODING` /
//! `GET_LINE_CODING` class requests:
//!
//! ```text
//! ┌──────────────────┬─────────────┬─────────────┬───────────┐
//! │ dwDTERate (LE32) │ bCharFormat │ bParityType │ bDataBits │
//! │     4 bytes      │   1 byte    │   1 byte    │  1 byte   │
//! └──────────────────┴─────────────┴─────────────┴───────────┘
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

/// Size of the encoded line coding payload.
pub const LINE_CODING_LEN: usize = 7;

/// Stop bits, encoded as the CDC `bCharFormat` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum StopBits {
    One = 0,
    OnePointFive = 1,
    Two = 2,
}

impl StopBits {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::One),
            1 => Some(Self::OnePointFive),
            2 => Some(Self::Two),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::One => "1",
            Self::OnePointFive => "1.5",
            Self::Two => "2",
        }
    }
}

/// Parity, encoded as the CDC `bParityType` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Parity {
    None = 0,
    Odd = 1,
    Even = 2,
    Mark = 3,
    Space = 4,
}

impl Parity {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Odd),
            2 => Some(Self::Even),
            3 => Some(Self::Mark),
            4 => Some(Self::Space),
            _ => None,
        }
    }

    fn letter(self) -> char {
        match self {
            Self::None => 'N',
            Self::Odd => 'O',
            Self::Even => 'E',
            Self::Mark => 'M',
            Self::Space => 'S',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCodingError {
    /// Payload is not exactly 7 bytes.
    BadLength(usize),
    BadStopBits(u8),
    BadParity(u8),
    /// CDC allows 5, 6, 7, 8 or 16 data bits.
    BadDataBits(u8),
}

impl fmt::Display for LineCodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLength(n) => write!(f, "line coding payload is {n} bytes, expected 7"),
            Self::BadStopBits(c) => write!(f, "invalid bCharFormat {c}"),
            Self::BadParity(c) => write!(f, "invalid bParityType {c}"),
            Self::BadDataBits(c) => write!(f, "invalid bDataBits {c}"),
        }
    }
}

/// Serial line parameters of the wired device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCoding {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for LineCoding {
    /// 115200-8-N-1, the coding the radio is driven at.
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl LineCoding {
    /// Encode as the CDC class request payload.
    pub fn to_bytes(&self) -> [u8; LINE_CODING_LEN] {
        let rate = self.baud_rate.to_le_bytes();
        [
            rate[0],
            rate[1],
            rate[2],
            rate[3],
            self.stop_bits as u8,
            self.parity as u8,
            self.data_bits,
        ]
    }

    /// Decode a CDC class request payload, rejecting out-of-range codes.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, LineCodingError> {
        if raw.len() != LINE_CODING_LEN {
            return Err(LineCodingError::BadLength(raw.len()));
        }
        let baud_rate = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let stop_bits = StopBits::from_code(raw[4]).ok_or(LineCodingError::BadStopBits(raw[4]))?;
        let parity = Parity::from_code(raw[5]).ok_or(LineCodingError::BadParity(raw[5]))?;
        let data_bits = raw[6];
        if !matches!(data_bits, 5..=8 | 16) {
            return Err(LineCodingError::BadDataBits(data_bits));
        }
        Ok(Self {
            baud_rate,
            data_bits,
            parity,
            stop_bits,
        })
    }
}

impl fmt::Display for LineCoding {
    /// Conventional `115200-8-N-1` notation.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.baud_rate,
            self.data_bits,
            self.parity.letter(),
            self.stop_bits.label()
        )
    }
}
