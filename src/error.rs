use std::io;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// A frame or command whose byte layout does not match what was declared.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("{len} bytes is not a multiple of the {width}-byte sample width")]
    UnalignedLength { len: usize, width: usize },

    #[error("frame is {len} bytes, expected {expected}")]
    LengthMismatch { len: usize, expected: usize },

    #[error("command of {len} bytes is not a known encoding")]
    UnknownCommand { len: usize },

    #[error("unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),

    #[error("encoded timing is invalid: {0}")]
    Timing(ConfigError),
}

/// Invalid acquisition settings, rejected before any I/O happens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("ICG period {icg} is not a multiple of SH period {sh}")]
    TimingNotDivisible { sh: u32, icg: u32 },

    #[error("SH period {0} ticks is below the minimum of 20")]
    ShPeriodTooSmall(u32),

    #[error("ICG period {0} ticks is below the minimum of 14776")]
    IcgPeriodTooSmall(u32),

    #[error("averaging count must be at least 1")]
    ZeroAverages,

    #[error("pixel count must be non-zero")]
    ZeroPixels,

    #[error("timing of {0} microseconds does not fit the 32-bit tick counter")]
    TimingOverflow(u64),

    #[error("integration byte sweeps need a simple-protocol command")]
    NotSimpleProtocol,
}

/// Failure of a single acquisition.
///
/// Transport and configuration errors are fatal. A short or malformed frame
/// leaves the link usable and the caller carries on with a zero frame.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),

    #[error("incomplete frame: received {received} of {expected} bytes")]
    Incomplete { received: usize, expected: usize },

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AcquisitionError {
    /// Whether the session can keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AcquisitionError::Incomplete { .. } | AcquisitionError::Format(_)
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("need at least 2 points with distinct pixels, got {found}")]
    InsufficientPoints { found: usize },

    #[error("calibration point ({pixel}, {wavelength}) is not finite")]
    NonFinite { pixel: f64, wavelength: f64 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("frame has {frame} samples but the axis has {axis}")]
    AxisLength { frame: usize, axis: usize },

    #[error("reference pixel {index} is outside a {len}-pixel frame")]
    ReferencePixel { index: usize, len: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("sample has {sample} points but reference has {reference}")]
    LengthMismatch { sample: usize, reference: usize },
}
