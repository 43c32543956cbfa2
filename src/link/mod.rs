/// Serial link to the sensor board.
///
/// ```text
///   AcquisitionConfig ──► codec::encode_command ──► Transport::write_all
///                                                        │
///   SensorFrame ◄── codec::decode_frame ◄── Transport::read_available (until
///                                           expected_bytes or deadline)
/// ```

pub mod codec;
pub mod command;
pub mod session;
pub mod transport;

pub use command::{AcquisitionConfig, Command, ExtendedTiming};
pub use session::LinkSession;
pub use transport::{SerialTransport, Transport};
