//! # SerialVis-RS: Serial Telemetry Frame Engine
//!
//! Turns a raw byte stream from a serial-like device into structured frames
//! of named, typed measurements, and derives plot data from them.
//!
//! ## Architecture
//!
//! - **IO**: frame boundary detection and payload decoding (plain text, hex,
//!   Base64)
//! - **Parsing**: fixed-separator split or a user-supplied Rhai script
//! - **Builder**: binds parsed fields to the project's group/dataset schema,
//!   or reads frames the device sends as JSON
//! - **Backend**: a worker thread fed through crossbeam channels, with
//!   reconfiguration ordered by a generation counter
//! - **Analysis**: FFT spectra, multi-curve plots and axis ranging
//! - **Plugins**: TCP server broadcasting frames to external tools
//!
//! ## Configuration
//!
//! Session settings are stored in the platform-appropriate data directory
//! under `dev.serialvis.serialvis-rs`:
//!
//! - **Linux**: `~/.local/share/dev.serialvis.serialvis-rs/`
//! - **macOS**: `~/Library/Application Support/dev.serialvis.serialvis-rs/`
//! - **Windows**: `%APPDATA%\dev.serialvis.serialvis-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use serialvis_rs::{
//!     analysis::Dashboard,
//!     backend::{self, PipelineMessage},
//!     config::{ProjectFile, SessionSettings},
//! };
//!
//! let settings = SessionSettings::load_or_default();
//! let project = ProjectFile::load("telemetry.json")?;
//! let mut session = backend::spawn(&settings, Some(project))?;
//!
//! session.reader.feed(b"$21.5,40;")?;
//!
//! let mut dashboard = Dashboard::new(settings.plot_points);
//! for msg in session.handle.drain() {
//!     if let PipelineMessage::Frame(frame) = msg {
//!         dashboard.update(&frame);
//!     }
//! }
//! ```

pub mod analysis;
pub mod backend;
pub mod builder;
pub mod config;
pub mod error;
pub mod io;
pub mod parser;
pub mod plugins;
pub mod scripting;
pub mod types;

// Re-export commonly used types
pub use backend::{spawn, PipelineCommand, PipelineHandle, PipelineMessage, Session};
pub use builder::FrameBuilder;
pub use config::{OperationMode, ProjectFile, SessionSettings};
pub use error::{Result, SerialVisError};
pub use io::{DetectorConfig, FrameDetector};
pub use scripting::{ScriptEngine, ScriptLoader};
pub use types::{Dataset, Frame, Group, PipelineStats};
