//! Pipeline worker thread
//!
//! The worker owns everything needed to turn a payload into a frame: the
//! active project, the script loader and the [`FrameBuilder`]. It handles
//! commands and payloads from a single loop, so a payload is always built
//! with the configuration that was active when it was detected.
//!
//! # Ordering
//!
//! Payloads are processed strictly in queue order. Each carries the
//! generation of the detector settings that produced it:
//!
//! - older than the worker's generation: discarded as stale
//! - newer: the worker first applies queued commands until it catches up

use crate::backend::{PipelineCommand, PipelineMessage, Shared, StatsCounters, WorkItem};
use crate::builder::FrameBuilder;
use crate::config::{DecoderMethod, OperationMode, ProjectFile, SessionSettings};
use crate::parser::parser_for;
use crate::scripting::{ScriptEngine, ScriptLoader};
use crossbeam_channel::{select, Receiver, Sender, TryRecvError};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Builds frames from queued payloads on the pipeline thread
pub struct PipelineWorker {
    command_rx: Receiver<PipelineCommand>,
    work_rx: Receiver<WorkItem>,
    message_tx: Sender<PipelineMessage>,
    shared: Arc<Shared>,
    running: bool,
    /// Generation of the configuration currently applied
    generation: u64,
    mode: OperationMode,
    /// Decoder used outside project mode
    decoder: DecoderMethod,
    project: Arc<ProjectFile>,
    loader: ScriptLoader,
    builder: FrameBuilder,
}

impl PipelineWorker {
    pub(crate) fn new(
        settings: &SessionSettings,
        project: Option<Arc<ProjectFile>>,
        command_rx: Receiver<PipelineCommand>,
        work_rx: Receiver<WorkItem>,
        message_tx: Sender<PipelineMessage>,
        shared: Arc<Shared>,
    ) -> Self {
        let mode = settings.operation_mode;
        let generation = shared.generation.load(Ordering::SeqCst);
        let project = project.unwrap_or_default();

        let mut worker = Self {
            command_rx,
            work_rx,
            message_tx,
            shared,
            running: true,
            generation,
            mode,
            decoder: settings.decoder,
            builder: FrameBuilder::for_mode(mode, settings.decoder),
            project: project.clone(),
            loader: ScriptLoader::new(Arc::new(ScriptEngine::new())),
        };
        worker.apply_project(project);
        worker
    }

    /// Run the worker loop until shutdown or until both channels close
    pub fn run(&mut self) {
        tracing::info!("Pipeline worker started");
        let command_rx = self.command_rx.clone();
        let work_rx = self.work_rx.clone();

        while self.running {
            self.process_commands();
            if !self.running {
                break;
            }

            select! {
                recv(command_rx) -> cmd => match cmd {
                    Ok(cmd) => self.handle_command(cmd),
                    Err(_) => self.running = false,
                },
                recv(work_rx) -> item => match item {
                    Ok(item) => self.process(item),
                    Err(_) => {
                        tracing::debug!("Frame reader closed");
                        self.running = false;
                    }
                },
            }
        }

        self.shared.running.store(false, Ordering::SeqCst);
        let _ = self.message_tx.send(PipelineMessage::Shutdown);
        tracing::info!("Pipeline worker stopped");
    }

    /// Process pending commands without blocking
    fn process_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running = false;
                    break;
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: PipelineCommand) {
        match cmd {
            PipelineCommand::LoadProject {
                project,
                generation,
            } => {
                self.generation = generation;
                self.apply_project(project);
            }
            PipelineCommand::SetOperationMode { mode, generation } => {
                self.generation = generation;
                self.mode = mode;
                self.rebuild();
            }
            PipelineCommand::LoadScript(source) => self.load_script(source),
            PipelineCommand::RequestStats => {
                let _ = self
                    .message_tx
                    .send(PipelineMessage::Stats(self.shared.stats.snapshot()));
            }
            PipelineCommand::Shutdown => {
                self.running = false;
            }
        }
    }

    fn apply_project(&mut self, project: Arc<ProjectFile>) {
        if let Some(code) = &project.frame_parser_code {
            match self.loader.load(code) {
                Ok(()) => self.notify(PipelineMessage::ScriptLoaded),
                Err(e) => self.notify(PipelineMessage::ScriptError(e.to_string())),
            }
        }

        self.project = project;
        self.rebuild();
        self.notify(PipelineMessage::ProjectLoaded {
            title: self.project.title.clone(),
            groups: self.project.groups.len(),
            datasets: self.project.dataset_count(),
        });
    }

    fn load_script(&mut self, source: String) {
        match self.loader.load(&source) {
            Ok(()) => {
                let mut project = (*self.project).clone();
                project.frame_parser_code = Some(source);
                self.project = Arc::new(project);
                self.rebuild();
                self.notify(PipelineMessage::ScriptLoaded);
            }
            Err(e) => self.notify(PipelineMessage::ScriptError(e.to_string())),
        }
    }

    fn rebuild(&mut self) {
        self.builder = match self.mode {
            OperationMode::ProjectFile => FrameBuilder::new(
                OperationMode::ProjectFile,
                self.project.clone(),
                parser_for(&self.project, &self.loader),
                self.project.decoder,
            ),
            mode => FrameBuilder::for_mode(mode, self.decoder),
        };
        tracing::debug!("Frame builder ready: {:?}", self.builder);
    }

    fn process(&mut self, item: WorkItem) {
        if item.generation < self.generation {
            StatsCounters::bump(&self.shared.stats.stale_payloads, 1);
            tracing::trace!(
                "Discarding stale payload (generation {} < {})",
                item.generation,
                self.generation
            );
            return;
        }

        while item.generation > self.generation {
            match self.command_rx.recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(_) => {
                    self.running = false;
                    return;
                }
            }
            if !self.running {
                return;
            }
        }

        match self.builder.build(&item.payload) {
            Ok(frame) => {
                StatsCounters::bump(&self.shared.stats.frames_built, 1);
                let _ = self.message_tx.send(PipelineMessage::Frame(frame));
            }
            Err(e) => {
                StatsCounters::bump(&self.shared.stats.frames_dropped, 1);
                tracing::debug!("Dropping frame: {}", e);
                let _ = self.message_tx.send(PipelineMessage::FrameDropped {
                    sequence: self.builder.next_sequence(),
                    reason: e.to_string(),
                });
            }
        }
    }

    fn notify(&self, msg: PipelineMessage) {
        let _ = self.message_tx.send(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameDetection;
    use crate::types::{Dataset, Group};
    use crossbeam_channel::bounded;

    fn create_test_worker(
        project: Option<ProjectFile>,
    ) -> (
        PipelineWorker,
        Receiver<PipelineMessage>,
        Sender<PipelineCommand>,
        Sender<WorkItem>,
    ) {
        let (cmd_tx, cmd_rx) = bounded(16);
        let (msg_tx, msg_rx) = bounded(64);
        let (work_tx, work_rx) = bounded(16);
        let settings = SessionSettings {
            operation_mode: OperationMode::ProjectFile,
            ..Default::default()
        };

        let worker = PipelineWorker::new(
            &settings,
            project.map(Arc::new),
            cmd_rx,
            work_rx,
            msg_tx,
            Arc::new(Shared::default()),
        );
        (worker, msg_rx, cmd_tx, work_tx)
    }

    fn project(code: Option<&str>) -> ProjectFile {
        let mut project = ProjectFile::new("Worker");
        project.frame_detection = FrameDetection::EndDelimiterOnly;
        project.frame_parser_code = code.map(str::to_string);
        let mut group = Group::new("G", "");
        group.datasets.push(Dataset::new("A", 1));
        group.datasets.push(Dataset::new("B", 2));
        project.groups.push(group);
        project
    }

    fn item(payload: &[u8], generation: u64) -> WorkItem {
        WorkItem {
            payload: payload.to_vec(),
            generation,
        }
    }

    #[test]
    fn test_worker_creation_reports_project() {
        let (_worker, msg_rx, _, _) = create_test_worker(Some(project(None)));
        match msg_rx.try_recv() {
            Ok(PipelineMessage::ProjectLoaded {
                title,
                groups,
                datasets,
            }) => {
                assert_eq!(title, "Worker");
                assert_eq!(groups, 1);
                assert_eq!(datasets, 2);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_script_project_uses_script() {
        let code = "fn parse(frame, separator) { frame.split(\";\") }";
        let (mut worker, msg_rx, _, _) = create_test_worker(Some(project(Some(code))));
        assert!(matches!(msg_rx.try_recv(), Ok(PipelineMessage::ScriptLoaded)));

        worker.process(item(b"7;8", 0));
        let frame = msg_rx
            .try_iter()
            .find_map(|msg| match msg {
                PipelineMessage::Frame(frame) => Some(frame),
                _ => None,
            })
            .unwrap();
        assert_eq!(frame.groups[0].datasets[1].value, "8");
    }

    #[test]
    fn test_broken_script_keeps_previous_parser() {
        let code = "fn parse(frame, separator) { frame.split(\";\") }";
        let (mut worker, msg_rx, _, _) = create_test_worker(Some(project(Some(code))));
        while msg_rx.try_recv().is_ok() {}

        worker.handle_command(PipelineCommand::LoadScript("fn parse(".to_string()));
        assert!(matches!(msg_rx.try_recv(), Ok(PipelineMessage::ScriptError(_))));

        worker.process(item(b"1;2", 0));
        assert!(matches!(msg_rx.try_recv(), Ok(PipelineMessage::Frame(_))));
    }

    #[test]
    fn test_script_applies_to_queued_payloads() {
        let code = "fn parse(frame, separator) { frame.split(\";\") }";
        let (mut worker, msg_rx, cmd_tx, work_tx) = create_test_worker(Some(project(Some(code))));
        while msg_rx.try_recv().is_ok() {}

        work_tx.send(item(b"1|2", 0)).unwrap();
        cmd_tx
            .send(PipelineCommand::LoadScript(
                "fn parse(frame, separator) { frame.split(\"|\") }".to_string(),
            ))
            .unwrap();
        drop(work_tx);
        worker.run();

        let frame = msg_rx
            .try_iter()
            .find_map(|msg| match msg {
                PipelineMessage::Frame(frame) => Some(frame),
                _ => None,
            })
            .unwrap();
        assert_eq!(frame.fields, vec!["1", "2"]);
        drop(cmd_tx);
    }

    #[test]
    fn test_stale_payloads_are_discarded() {
        let (mut worker, msg_rx, _, _) = create_test_worker(Some(project(None)));
        while msg_rx.try_recv().is_ok() {}

        worker.handle_command(PipelineCommand::SetOperationMode {
            mode: OperationMode::QuickPlot,
            generation: 3,
        });
        worker.process(item(b"1,2", 2));
        assert!(msg_rx.try_recv().is_err());
        assert_eq!(worker.shared.stats.snapshot().stale_payloads, 1);
    }

    #[test]
    fn test_newer_payload_waits_for_command() {
        let (mut worker, msg_rx, cmd_tx, _) = create_test_worker(Some(project(None)));
        while msg_rx.try_recv().is_ok() {}

        cmd_tx
            .send(PipelineCommand::SetOperationMode {
                mode: OperationMode::QuickPlot,
                generation: 1,
            })
            .unwrap();
        worker.process(item(b"5,6,7", 1));

        assert_eq!(worker.mode, OperationMode::QuickPlot);
        match msg_rx.try_recv() {
            Ok(PipelineMessage::Frame(frame)) => assert_eq!(frame.dataset_count(), 3),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_build_failure_reports_drop() {
        let (mut worker, msg_rx, _, _) = create_test_worker(None);
        while msg_rx.try_recv().is_ok() {}

        worker.process(item(b"1,2", 0));
        assert!(matches!(
            msg_rx.try_recv(),
            Ok(PipelineMessage::FrameDropped { sequence: 0, .. })
        ));
        assert_eq!(worker.shared.stats.snapshot().frames_dropped, 1);
    }

    #[test]
    fn test_shutdown_command() {
        let (mut worker, msg_rx, cmd_tx, _work_tx) = create_test_worker(None);
        cmd_tx.send(PipelineCommand::Shutdown).unwrap();
        worker.run();

        assert!(!worker.running);
        assert!(msg_rx
            .try_iter()
            .any(|msg| matches!(msg, PipelineMessage::Shutdown)));
    }
}
