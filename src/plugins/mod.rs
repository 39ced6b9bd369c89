//! External plugin interface
//!
//! Plugins connect over TCP and receive frames in batches plus raw device
//! bytes as single-line JSON messages (see [`protocol`]). Anything a plugin
//! writes back is handed to the caller, which forwards it to the device.

pub mod protocol;
pub mod server;

pub use protocol::{encode_frames, encode_raw};
pub use server::{PluginHandle, PluginServer};
