use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::data::model::SensorFrame;
use crate::error::AcquisitionError;

use super::codec::decode_frame;
use super::command::AcquisitionConfig;
use super::transport::Transport;

// ---------------------------------------------------------------------------
// LinkSession – request/response cycle over one exclusive transport
// ---------------------------------------------------------------------------

/// Owns the transport for the lifetime of a session. One acquisition at a
/// time; nothing carries over between calls except the open link.
pub struct LinkSession<T: Transport> {
    transport: T,
}

impl<T: Transport> LinkSession<T> {
    pub fn new(transport: T) -> Self {
        LinkSession { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Request one frame and wait for it.
    ///
    /// Reads block with the time left before the deadline as their timeout.
    /// Bytes past the expected length are dropped. A deadline hit with a short
    /// buffer yields [`AcquisitionError::Incomplete`].
    pub fn acquire(&mut self, config: &AcquisitionConfig) -> Result<SensorFrame, AcquisitionError> {
        let expected = config.expected_bytes();

        self.transport.clear_input()?;
        let command = config.command().encode();
        trace!("request {:02X?}, expecting {expected} bytes", command);
        self.transport.write_all(&command)?;

        let started = Instant::now();
        let deadline = started + config.timeout();
        let mut buffer = Vec::with_capacity(expected);

        while buffer.len() < expected {
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "Timeout reached. Received {} bytes out of {expected}.",
                    buffer.len()
                );
                return Err(AcquisitionError::Incomplete {
                    received: buffer.len(),
                    expected,
                });
            }
            let chunk = self
                .transport
                .read_available(expected - buffer.len(), deadline - now)?;
            buffer.extend_from_slice(&chunk);
        }

        if buffer.len() > expected {
            debug!("discarding {} surplus bytes", buffer.len() - expected);
            buffer.truncate(expected);
        }
        debug!("frame complete in {:?}", started.elapsed());

        Ok(decode_frame(&buffer, config.bit_depth(), expected)?)
    }

    /// [`acquire`](Self::acquire), substituting an all-zero frame for a
    /// recoverable failure. Fatal errors still propagate.
    pub fn acquire_or_zero(
        &mut self,
        config: &AcquisitionConfig,
    ) -> Result<SensorFrame, AcquisitionError> {
        match self.acquire(config) {
            Err(e) if e.is_recoverable() => {
                warn!("{e}; substituting a zero frame");
                Ok(SensorFrame::zeroed(config.pixel_count(), config.bit_depth()))
            }
            other => other,
        }
    }

    /// Element-wise mean of `count` acquisitions. Dropped frames count as
    /// zeros, exactly as they would in a single acquisition.
    pub fn acquire_averaged(
        &mut self,
        config: &AcquisitionConfig,
        count: usize,
    ) -> Result<Vec<f64>, AcquisitionError> {
        let count = count.max(1);
        let mut sum = vec![0.0; config.pixel_count()];
        for i in 0..count {
            let frame = self.acquire_or_zero(config)?;
            for (acc, &s) in sum.iter_mut().zip(frame.samples()) {
                *acc += f64::from(s);
            }
            trace!("averaged frame {}/{count}", i + 1);
        }
        let n = count as f64;
        Ok(sum.into_iter().map(|v| v / n).collect())
    }

    /// Acquire an averaged frame for every integration byte in
    /// `integrations`, pausing between settings so the sensor settles.
    pub fn sweep_integration<I>(
        &mut self,
        template: &AcquisitionConfig,
        integrations: I,
        averages: usize,
        pause: Duration,
    ) -> Result<Vec<(u8, Vec<f64>)>, AcquisitionError>
    where
        I: IntoIterator<Item = u8>,
    {
        let configs = integrations
            .into_iter()
            .map(|i| template.with_integration(i).map(|c| (i, c)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(configs.len());
        for (n, (integration, config)) in configs.iter().enumerate() {
            if n > 0 && !pause.is_zero() {
                thread::sleep(pause);
            }
            info!("exposure 0x{integration:02X} ({}/{})", n + 1, configs.len());
            out.push((*integration, self.acquire_averaged(config, averages)?));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::BitDepth;
    use crate::link::codec::encode_frame;
    use crate::link::command::{Command, ExtendedTiming};
    use std::collections::VecDeque;
    use std::io;

    /// In-process stand-in for the serial port. Bytes in `pending` model
    /// whatever already sits in the OS buffer; `script` is released one chunk
    /// per read after a command has been written.
    #[derive(Default)]
    struct ScriptedTransport {
        pending: Vec<u8>,
        script: VecDeque<Vec<u8>>,
        writes: Vec<Vec<u8>>,
        clears: usize,
        fail_writes: bool,
    }

    impl ScriptedTransport {
        fn with_chunks(chunks: Vec<Vec<u8>>) -> Self {
            ScriptedTransport {
                script: chunks.into(),
                ..Default::default()
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn clear_input(&mut self) -> io::Result<()> {
            self.clears += 1;
            self.pending.clear();
            Ok(())
        }

        fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "unplugged"));
            }
            self.writes.push(bytes.to_vec());
            Ok(())
        }

        fn read_available(&mut self, _max: usize, wait: Duration) -> io::Result<Vec<u8>> {
            if !self.pending.is_empty() {
                return Ok(std::mem::take(&mut self.pending));
            }
            match self.script.pop_front() {
                Some(chunk) => Ok(chunk),
                None => {
                    thread::sleep(wait.min(Duration::from_millis(2)));
                    Ok(Vec::new())
                }
            }
        }
    }

    fn small_12bit(pixels: usize) -> AcquisitionConfig {
        AcquisitionConfig::simple_12bit(0xB8)
            .with_pixel_count(pixels)
            .unwrap()
            .with_timeout(Duration::from_millis(200))
    }

    #[test]
    fn clears_then_writes_the_command() {
        let config = small_12bit(2);
        let mut t = ScriptedTransport::with_chunks(vec![vec![1, 0, 2, 0]]);
        t.pending = vec![0xAA; 5];
        let mut session = LinkSession::new(t);

        let frame = session.acquire(&config).unwrap();
        assert_eq!(frame.samples(), &[1, 2]);

        let t = session.into_transport();
        assert_eq!(t.clears, 1);
        assert_eq!(t.writes, vec![vec![0xA1, 0xB8]]);
    }

    #[test]
    fn surplus_bytes_are_dropped() {
        let config = small_12bit(2);
        let t = ScriptedTransport::with_chunks(vec![vec![5, 0, 6, 0, 0xFF, 0xFF, 0xFF]]);
        let mut session = LinkSession::new(t);
        assert_eq!(session.acquire(&config).unwrap().samples(), &[5, 6]);
    }

    #[test]
    fn short_frame_becomes_zero_frame() {
        let config = small_12bit(4);
        let t = ScriptedTransport::with_chunks(vec![vec![1, 2, 3]]);
        let mut session = LinkSession::new(t);

        let err = session.acquire(&config).unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::Incomplete {
                received: 3,
                expected: 8
            }
        ));

        let frame = session.acquire_or_zero(&config).unwrap();
        assert_eq!(frame, SensorFrame::zeroed(4, BitDepth::Twelve));
    }

    #[test]
    fn transport_errors_propagate() {
        let config = small_12bit(4);
        let t = ScriptedTransport {
            fail_writes: true,
            ..Default::default()
        };
        let mut session = LinkSession::new(t);
        let err = session.acquire_or_zero(&config).unwrap_err();
        assert!(matches!(err, AcquisitionError::Transport(_)));
    }

    #[test]
    fn averaging_divides_by_count() {
        let config = small_12bit(2);
        let t = ScriptedTransport::with_chunks(vec![
            encode_frame(&[10, 100], BitDepth::Twelve),
            encode_frame(&[20, 300], BitDepth::Twelve),
        ]);
        let mut session = LinkSession::new(t);
        let avg = session.acquire_averaged(&config, 2).unwrap();
        assert_eq!(avg, vec![15.0, 200.0]);
    }

    #[test]
    fn sweep_steps_the_integration_byte() {
        let config = small_12bit(1);
        let t = ScriptedTransport::with_chunks(vec![vec![1, 0], vec![2, 0], vec![3, 0]]);
        let mut session = LinkSession::new(t);

        let out = session
            .sweep_integration(&config, 0xB0..0xB3, 1, Duration::ZERO)
            .unwrap();
        assert_eq!(
            out,
            vec![(0xB0, vec![1.0]), (0xB1, vec![2.0]), (0xB2, vec![3.0])]
        );
        let writes = session.into_transport().writes;
        assert_eq!(writes, vec![vec![0xA1, 0xB0], vec![0xA1, 0xB1], vec![0xA1, 0xB2]]);
    }

    #[test]
    fn sweep_rejects_extended_protocol_before_io() {
        let timing = ExtendedTiming::new(20, 20_000, 1).unwrap();
        let config = AcquisitionConfig::extended(timing);
        assert!(matches!(config.command(), Command::Extended(_)));

        let mut session = LinkSession::new(ScriptedTransport::default());
        let err = session
            .sweep_integration(&config, [0xB0], 1, Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::Config(_)));
        assert!(session.transport().writes.is_empty());
    }
}
