use std::time::Duration;

use serde::Serialize;

use crate::data::model::BitDepth;
use crate::error::{ConfigError, FormatError};

/// Pixels returned by the simple (`0xA1`/`0xA2`) firmware.
pub const SIMPLE_PIXEL_COUNT: usize = 3648;
/// Pixels returned by the extended (`"ER"`) firmware, dummy pixels included.
pub const EXTENDED_PIXEL_COUNT: usize = 3694;
/// Wall-clock budget for one frame to arrive.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Shortest SH gate the board accepts, in ticks.
pub const MIN_SH_PERIOD: u32 = 20;
/// Shortest ICG cycle, one full readout of the array, in ticks.
pub const MIN_ICG_PERIOD: u32 = 14776;
/// The timing counters run at 2 MHz.
pub const TICKS_PER_MICROSECOND: u64 = 2;

// ---------------------------------------------------------------------------
// ExtendedTiming – validated SH/ICG periods
// ---------------------------------------------------------------------------

/// Shutter (SH) and integration-clear (ICG) periods for the extended
/// protocol, validated against the device limits on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtendedTiming {
    sh_period: u32,
    icg_period: u32,
    averages: u16,
}

impl ExtendedTiming {
    /// Periods in device ticks.
    pub fn new(sh_period: u32, icg_period: u32, averages: u16) -> Result<Self, ConfigError> {
        if averages == 0 {
            return Err(ConfigError::ZeroAverages);
        }
        if sh_period < MIN_SH_PERIOD {
            return Err(ConfigError::ShPeriodTooSmall(sh_period));
        }
        if icg_period % sh_period != 0 {
            return Err(ConfigError::TimingNotDivisible {
                sh: sh_period,
                icg: icg_period,
            });
        }
        if icg_period < MIN_ICG_PERIOD {
            return Err(ConfigError::IcgPeriodTooSmall(icg_period));
        }
        Ok(ExtendedTiming {
            sh_period,
            icg_period,
            averages,
        })
    }

    /// Periods in microseconds, converted at 2 ticks/µs.
    pub fn from_micros(sh_us: u64, icg_us: u64, averages: u16) -> Result<Self, ConfigError> {
        let ticks = |us: u64| {
            us.checked_mul(TICKS_PER_MICROSECOND)
                .and_then(|t| u32::try_from(t).ok())
                .ok_or(ConfigError::TimingOverflow(us))
        };
        Self::new(ticks(sh_us)?, ticks(icg_us)?, averages)
    }

    pub fn sh_period(&self) -> u32 {
        self.sh_period
    }

    pub fn icg_period(&self) -> u32 {
        self.icg_period
    }

    pub fn averages(&self) -> u16 {
        self.averages
    }

    /// Total on-device integration time covered by one response.
    pub fn integration_time(&self) -> Duration {
        let micros = u64::from(self.icg_period) * u64::from(self.averages) / TICKS_PER_MICROSECOND;
        Duration::from_micros(micros)
    }
}

// ---------------------------------------------------------------------------
// Command – one request to the sensor board
// ---------------------------------------------------------------------------

/// A read request. The variant fixes the bit depth of the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Command {
    /// `0xA2`: 8-bit read with an integration byte.
    Read8 { integration: u8 },
    /// `0xA1`: 12-bit read with an integration byte (`0xB0`..=`0xD7`).
    Read12 { integration: u8 },
    /// `"ER"` key followed by SH/ICG periods and an averaging count.
    Extended(ExtendedTiming),
}

impl Command {
    pub fn bit_depth(&self) -> BitDepth {
        match self {
            Command::Read8 { .. } => BitDepth::Eight,
            Command::Read12 { .. } | Command::Extended(_) => BitDepth::Twelve,
        }
    }

    /// Same request with a different integration byte. `None` for the
    /// extended protocol, which has no such byte.
    pub fn with_integration(self, integration: u8) -> Option<Command> {
        match self {
            Command::Read8 { .. } => Some(Command::Read8 { integration }),
            Command::Read12 { .. } => Some(Command::Read12 { integration }),
            Command::Extended(_) => None,
        }
    }

    /// Wire bytes for this command.
    pub fn encode(&self) -> Vec<u8> {
        super::codec::encode_command(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Command, FormatError> {
        super::codec::decode_command(bytes)
    }
}

// ---------------------------------------------------------------------------
// AcquisitionConfig
// ---------------------------------------------------------------------------

/// Everything needed to request and size one frame. Immutable per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionConfig {
    command: Command,
    pixel_count: usize,
    timeout: Duration,
}

impl AcquisitionConfig {
    pub fn new(command: Command, pixel_count: usize, timeout: Duration) -> Result<Self, ConfigError> {
        if pixel_count == 0 {
            return Err(ConfigError::ZeroPixels);
        }
        Ok(AcquisitionConfig {
            command,
            pixel_count,
            timeout,
        })
    }

    /// 8-bit simple read of the full 3648-pixel array.
    pub fn simple_8bit(integration: u8) -> Self {
        AcquisitionConfig {
            command: Command::Read8 { integration },
            pixel_count: SIMPLE_PIXEL_COUNT,
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// 12-bit simple read of the full 3648-pixel array.
    pub fn simple_12bit(integration: u8) -> Self {
        AcquisitionConfig {
            command: Command::Read12 { integration },
            pixel_count: SIMPLE_PIXEL_COUNT,
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Extended-protocol read of all 3694 pixels. The deadline is stretched
    /// by the programmed integration time so long exposures do not time out.
    pub fn extended(timing: ExtendedTiming) -> Self {
        AcquisitionConfig {
            command: Command::Extended(timing),
            pixel_count: EXTENDED_PIXEL_COUNT,
            timeout: DEFAULT_READ_TIMEOUT + timing.integration_time(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pixel_count(mut self, pixel_count: usize) -> Result<Self, ConfigError> {
        if pixel_count == 0 {
            return Err(ConfigError::ZeroPixels);
        }
        self.pixel_count = pixel_count;
        Ok(self)
    }

    /// This configuration with its integration byte replaced.
    pub fn with_integration(&self, integration: u8) -> Result<Self, ConfigError> {
        let command = self
            .command
            .with_integration(integration)
            .ok_or(ConfigError::NotSimpleProtocol)?;
        Ok(AcquisitionConfig {
            command,
            ..self.clone()
        })
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.command.bit_depth()
    }

    pub fn pixel_count(&self) -> usize {
        self.pixel_count
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Bytes in a complete response: `N * bytes_per_sample`.
    pub fn expected_bytes(&self) -> usize {
        self.pixel_count * self.bit_depth().bytes_per_sample()
    }
}
