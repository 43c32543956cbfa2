//! Byte layouts of the TCD1304 board's commands and frames.
//!
//! | Mode            | Request                                      | Response        |
//! |-----------------|----------------------------------------------|-----------------|
//! | 8-bit simple    | `A2 tt`                                      | N bytes         |
//! | 12-bit simple   | `A1 tt`                                      | 2N bytes, LE    |
//! | 12-bit extended | `45 52 SH:be32 ICG:be32 AVG:be16` (12 bytes) | 2N bytes, LE    |
//!
//! 12-bit samples are padded into 16-bit little-endian words; the top nibble
//! is masked off on decode.

use log::warn;

use crate::data::model::{BitDepth, SensorFrame};
use crate::error::FormatError;

use super::command::{Command, ExtendedTiming};

pub const OP_READ_12BIT: u8 = 0xA1;
pub const OP_READ_8BIT: u8 = 0xA2;
/// `"ER"`, the key that opens an extended-protocol request.
pub const EXTENDED_KEY: [u8; 2] = [0x45, 0x52];

pub const SIMPLE_COMMAND_LEN: usize = 2;
pub const EXTENDED_COMMAND_LEN: usize = 12;

const SAMPLE_MASK_12BIT: u16 = 0x0FFF;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub fn encode_command(command: &Command) -> Vec<u8> {
    match *command {
        Command::Read8 { integration } => vec![OP_READ_8BIT, integration],
        Command::Read12 { integration } => vec![OP_READ_12BIT, integration],
        Command::Extended(timing) => {
            let mut out = Vec::with_capacity(EXTENDED_COMMAND_LEN);
            out.extend_from_slice(&EXTENDED_KEY);
            out.extend_from_slice(&timing.sh_period().to_be_bytes());
            out.extend_from_slice(&timing.icg_period().to_be_bytes());
            out.extend_from_slice(&timing.averages().to_be_bytes());
            out
        }
    }
}

/// Parse an encoded request back into a [`Command`].
pub fn decode_command(bytes: &[u8]) -> Result<Command, FormatError> {
    match bytes {
        [OP_READ_8BIT, integration] => Ok(Command::Read8 {
            integration: *integration,
        }),
        [OP_READ_12BIT, integration] => Ok(Command::Read12 {
            integration: *integration,
        }),
        [op, _] => Err(FormatError::UnknownOpcode(*op)),
        [k0, k1, rest @ ..] if [*k0, *k1] == EXTENDED_KEY && rest.len() == 10 => {
            let sh = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
            let icg = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]);
            let averages = u16::from_be_bytes([rest[8], rest[9]]);
            ExtendedTiming::new(sh, icg, averages)
                .map(Command::Extended)
                .map_err(FormatError::Timing)
        }
        other => Err(FormatError::UnknownCommand { len: other.len() }),
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Decode exactly `expected_len` bytes into a frame.
pub fn decode_frame(
    raw: &[u8],
    bit_depth: BitDepth,
    expected_len: usize,
) -> Result<SensorFrame, FormatError> {
    let width = bit_depth.bytes_per_sample();
    if raw.len() % width != 0 {
        return Err(FormatError::UnalignedLength {
            len: raw.len(),
            width,
        });
    }
    if raw.len() != expected_len {
        return Err(FormatError::LengthMismatch {
            len: raw.len(),
            expected: expected_len,
        });
    }
    Ok(decode_samples(raw, bit_depth))
}

/// Like [`decode_frame`] but zero-pads a short buffer and drops the tail of a
/// long one instead of failing.
pub fn decode_frame_tolerant(raw: &[u8], bit_depth: BitDepth, expected_len: usize) -> SensorFrame {
    if raw.len() != expected_len {
        warn!(
            "tolerant decode: {} bytes where {expected_len} were expected",
            raw.len()
        );
    }
    let mut buf = raw[..raw.len().min(expected_len)].to_vec();
    buf.resize(expected_len, 0);
    // A trailing half sample is dropped by chunks_exact.
    decode_samples(&buf, bit_depth)
}

fn decode_samples(raw: &[u8], bit_depth: BitDepth) -> SensorFrame {
    let samples = match bit_depth {
        BitDepth::Eight => raw.iter().map(|&b| u16::from(b)).collect(),
        BitDepth::Twelve => raw
            .chunks_exact(2)
            .map(|w| u16::from_le_bytes([w[0], w[1]]) & SAMPLE_MASK_12BIT)
            .collect(),
    };
    SensorFrame::from_samples(samples, bit_depth)
}

/// Wire bytes the board would send for `samples`, the inverse of decoding.
pub fn encode_frame(samples: &[u16], bit_depth: BitDepth) -> Vec<u8> {
    match bit_depth {
        BitDepth::Eight => samples.iter().map(|&s| s as u8).collect(),
        BitDepth::Twelve => samples
            .iter()
            .flat_map(|&s| (s & SAMPLE_MASK_12BIT).to_le_bytes())
            .collect(),
    }
}
