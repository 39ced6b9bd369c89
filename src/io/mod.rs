//! Byte-stream handling: frame boundary detection and payload decoding

pub mod decoder;
pub mod detector;

pub use decoder::{decode, decode_bytes, encode};
pub use detector::{DetectorConfig, FrameDetector};
