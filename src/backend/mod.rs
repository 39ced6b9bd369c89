//! Session pipeline
//!
//! Frame processing runs on a dedicated worker thread so that the thread
//! reading the device never waits for scripts or JSON parsing. The pieces
//! talk through crossbeam channels:
//!
//! - [`FrameReader`] - owned by the I/O thread; feeds raw bytes to the frame
//!   detector and queues complete payloads
//! - [`PipelineWorker`] - decodes, parses and binds queued payloads in order
//! - [`PipelineHandle`] - controller/consumer side; sends [`PipelineCommand`]s
//!   and receives [`PipelineMessage`]s
//!
//! # Reconfiguration
//!
//! Loading a project or switching the operation mode bumps a shared
//! generation counter and publishes the new detector settings. The reader
//! applies them on its next [`FrameReader::feed`], discarding any partially
//! received frame. The worker drops payloads tagged with an older generation
//! and applies the command before touching payloads of the new one.
//!
//! # Example
//!
//! ```ignore
//! use serialvis_rs::backend;
//! use serialvis_rs::config::SessionSettings;
//!
//! let mut session = backend::spawn(&SessionSettings::default(), None)?;
//! session.reader.feed(b"1,2,3\n")?;
//!
//! for msg in session.handle.drain() {
//!     if let PipelineMessage::Frame(frame) = msg {
//!         println!("{}", frame.to_json());
//!     }
//! }
//! session.close()?;
//! ```

mod reader;
mod worker;

pub use reader::FrameReader;
pub use worker::PipelineWorker;

use crate::config::{OperationMode, OverflowPolicy, ProjectFile, SessionSettings};
use crate::error::{Result, SerialVisError};
use crate::io::DetectorConfig;
use crate::types::{Frame, PipelineStats};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Capacity of the command and message channels
const COMMAND_CAPACITY: usize = 256;
const MESSAGE_CAPACITY: usize = 10_000;

/// Message sent from the controller to the worker
#[derive(Debug, Clone)]
pub enum PipelineCommand {
    /// Switch to a new project
    LoadProject {
        project: Arc<ProjectFile>,
        generation: u64,
    },
    /// Switch operation mode
    SetOperationMode {
        mode: OperationMode,
        generation: u64,
    },
    /// Load a parser script for the current project
    ///
    /// Carries no generation: the frame boundaries do not change, so payloads
    /// already queued are built with the new script once it is installed.
    LoadScript(String),
    /// Request current statistics
    RequestStats,
    /// Stop the worker
    Shutdown,
}

/// Message sent from the worker to the consumer
#[derive(Debug, Clone)]
pub enum PipelineMessage {
    /// A frame was built
    Frame(Frame),
    /// A payload produced no frame
    FrameDropped { sequence: u64, reason: String },
    /// A project became active
    ProjectLoaded {
        title: String,
        groups: usize,
        datasets: usize,
    },
    /// A parser script became active
    ScriptLoaded,
    /// A parser script was rejected, the previous parser stays active
    ScriptError(String),
    /// The detector discarded its buffer
    BufferOverflow { size: usize, limit: usize },
    /// Statistics snapshot
    Stats(PipelineStats),
    /// The worker stopped
    Shutdown,
}

/// One detected payload waiting for the worker
#[derive(Debug, Clone)]
pub(crate) struct WorkItem {
    pub payload: Vec<u8>,
    pub generation: u64,
}

/// Counters updated by both the reader and the worker
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub payloads_received: AtomicU64,
    pub frames_built: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub queue_drops: AtomicU64,
    pub stale_payloads: AtomicU64,
    pub buffer_overflows: AtomicU64,
    pub bytes_received: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            payloads_received: self.payloads_received.load(Ordering::Relaxed),
            frames_built: self.frames_built.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            queue_drops: self.queue_drops.load(Ordering::Relaxed),
            stale_payloads: self.stale_payloads.load(Ordering::Relaxed),
            buffer_overflows: self.buffer_overflows.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// State shared by the reader, the worker and the handle
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub generation: AtomicU64,
    /// Detector settings the reader has not applied yet
    pub pending_detector: Mutex<Option<(u64, DetectorConfig)>>,
    pub stats: StatsCounters,
    pub running: AtomicBool,
}

impl Shared {
    /// Publish new detector settings under a fresh generation
    fn publish(&self, config: DetectorConfig) -> Result<u64> {
        let mut pending = self
            .pending_detector
            .lock()
            .map_err(|e| SerialVisError::Channel(format!("Detector lock poisoned: {}", e)))?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *pending = Some((generation, config));
        Ok(generation)
    }
}

/// Controller and consumer side of a session
pub struct PipelineHandle {
    command_tx: Sender<PipelineCommand>,
    message_rx: Receiver<PipelineMessage>,
    shared: Arc<Shared>,
    mode: OperationMode,
    project: Option<Arc<ProjectFile>>,
    max_buffer_size: usize,
}

impl PipelineHandle {
    /// Try to receive a message without blocking
    pub fn try_recv(&self) -> Option<PipelineMessage> {
        self.message_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next message
    pub fn recv_timeout(&self, timeout: Duration) -> Option<PipelineMessage> {
        match self.message_rx.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Receive all pending messages
    pub fn drain(&self) -> Vec<PipelineMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.message_rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Blocking iterator over messages, ends when the worker stops
    pub fn messages(&self) -> crossbeam_channel::Iter<'_, PipelineMessage> {
        self.message_rx.iter()
    }

    /// Send a command to the worker
    pub fn send_command(&self, cmd: PipelineCommand) -> bool {
        self.command_tx.send(cmd).is_ok()
    }

    pub fn mode(&self) -> OperationMode {
        self.mode
    }

    pub fn project(&self) -> Option<&ProjectFile> {
        self.project.as_deref()
    }

    /// Make `project` the active project
    ///
    /// Fails without side effects when the project's frame delimiters are
    /// unusable.
    pub fn load_project(&mut self, project: ProjectFile) -> Result<()> {
        let project = Arc::new(project);
        let generation = self.reconfigure(self.mode, Some(&project))?;
        tracing::info!("Activating project '{}' (generation {})", project.title, generation);

        self.project = Some(project.clone());
        self.send(PipelineCommand::LoadProject {
            project,
            generation,
        })
    }

    /// Switch the operation mode
    pub fn set_operation_mode(&mut self, mode: OperationMode) -> Result<()> {
        let generation = self.reconfigure(mode, self.project.as_deref())?;
        tracing::info!("Switching to {} mode (generation {})", mode, generation);

        self.mode = mode;
        self.send(PipelineCommand::SetOperationMode { mode, generation })
    }

    /// Load a parser script for the active project
    ///
    /// Applies to every payload the worker builds after the script is
    /// installed, including payloads queued before this call.
    pub fn load_script(&self, source: impl Into<String>) -> Result<()> {
        self.send(PipelineCommand::LoadScript(source.into()))
    }

    /// Ask the worker for a [`PipelineMessage::Stats`] message
    pub fn request_stats(&self) {
        let _ = self.command_tx.send(PipelineCommand::RequestStats);
    }

    /// Current statistics, read directly from the shared counters
    pub fn stats(&self) -> PipelineStats {
        self.shared.stats.snapshot()
    }

    /// Whether the worker thread is still running
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(PipelineCommand::Shutdown);
    }

    fn reconfigure(&self, mode: OperationMode, project: Option<&ProjectFile>) -> Result<u64> {
        let config = DetectorConfig::for_mode(mode, project)
            .with_max_buffer_size(self.max_buffer_size);
        config.validate()?;
        self.shared.publish(config)
    }

    fn send(&self, cmd: PipelineCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|_| SerialVisError::Channel("Pipeline worker has stopped".to_string()))
    }
}

/// A running session
pub struct Session {
    pub reader: FrameReader,
    pub handle: PipelineHandle,
    pub worker: JoinHandle<()>,
}

impl Session {
    /// Stop the worker and wait for it
    pub fn close(self) -> Result<()> {
        self.handle.shutdown();
        drop(self.reader);
        self.worker
            .join()
            .map_err(|_| SerialVisError::Channel("Pipeline worker panicked".to_string()))
    }
}

/// Start a session pipeline on its own thread
pub fn spawn(settings: &SessionSettings, project: Option<ProjectFile>) -> Result<Session> {
    let project = project.map(Arc::new);
    let mode = settings.operation_mode;
    let detector = DetectorConfig::for_mode(mode, project.as_deref())
        .with_max_buffer_size(settings.max_buffer_size);

    let (cmd_tx, cmd_rx) = bounded(COMMAND_CAPACITY);
    let (msg_tx, msg_rx) = bounded(MESSAGE_CAPACITY);
    let (work_tx, work_rx) = bounded(settings.effective_queue_capacity());

    let shared = Arc::new(Shared {
        running: AtomicBool::new(true),
        ..Default::default()
    });

    let reader = FrameReader::new(
        detector,
        work_tx,
        work_rx.clone(),
        msg_tx.clone(),
        shared.clone(),
        settings.overflow_policy,
    )?;

    let mut worker = PipelineWorker::new(
        settings,
        project.clone(),
        cmd_rx,
        work_rx,
        msg_tx,
        shared.clone(),
    );
    let thread = std::thread::Builder::new()
        .name("serialvis-pipeline".to_string())
        .spawn(move || worker.run())?;

    tracing::info!(
        "Session started in {} mode (queue {} payloads, {:?} on overflow)",
        mode,
        settings.effective_queue_capacity(),
        settings.overflow_policy
    );

    Ok(Session {
        reader,
        handle: PipelineHandle {
            command_tx: cmd_tx,
            message_rx: msg_rx,
            shared,
            mode,
            project,
            max_buffer_size: settings.max_buffer_size,
        },
        worker: thread,
    })
}

/// Whether a full queue should evict its oldest payload
pub(crate) fn evicts_oldest(policy: OverflowPolicy) -> bool {
    matches!(policy, OverflowPolicy::DropOldest)
}
