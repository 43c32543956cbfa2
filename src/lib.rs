//! Acquisition and processing for TCD1304 linear-CCD spectrometers.
//!
//! ```text
//!   config ─► link (serial request/response) ─► processing ─► analysis / export
//!                                                   ▲
//!                                      calibration ─┘
//! ```

pub mod analysis;
pub mod calibration;
pub mod config;
pub mod data;
pub mod error;
pub mod link;
pub mod processing;
pub mod synth;
