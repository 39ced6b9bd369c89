//! SerialVis-RS - Command Line Entry Point
//!
//! Reads device bytes from stdin, builds frames with the configured session
//! settings and prints every frame as one JSON line on stdout.
//!
//! ```text
//! serialvis-rs [PROJECT.json]
//! ```
//!
//! Passing a project file switches the session to project mode. With the
//! plugin server enabled in the settings, frames are also broadcast over TCP
//! and bytes sent by plugins are echoed to stderr.

use anyhow::Context;
use serialvis_rs::{
    backend::{self, PipelineMessage},
    config::{OperationMode, ProjectFile, SessionSettings},
    plugins::PluginServer,
    SerialVisError,
};
use std::io::{Read, Write};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const READ_CHUNK_SIZE: usize = 4096;

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only frames
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,serialvis_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .init();

    tracing::info!("Starting SerialVis-RS");

    let mut settings = SessionSettings::load_or_default();
    let project = match std::env::args_os().nth(1) {
        Some(path) => {
            let project = ProjectFile::load(&path)
                .with_context(|| format!("Failed to load project {:?}", path))?;
            settings.operation_mode = OperationMode::ProjectFile;
            Some(project)
        }
        None => None,
    };

    let plugins = if settings.plugin.enabled {
        Some(PluginServer::start(&settings.plugin).context("Failed to start plugin server")?)
    } else {
        None
    };
    let plugin_handle = plugins.as_ref().map(PluginServer::handle);

    let session = backend::spawn(&settings, project).context("Failed to start session")?;
    let mut reader = session.reader;
    let handle = session.handle;

    // Consumer thread: print frames and forward them to plugins
    let consumer = std::thread::Builder::new()
        .name("serialvis-output".to_string())
        .spawn(move || -> anyhow::Result<()> {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for msg in handle.messages() {
                match msg {
                    PipelineMessage::Frame(frame) => {
                        writeln!(out, "{}", frame.to_json())?;
                        if let Some(plugins) = &plugin_handle {
                            plugins.register_frame(&frame);
                        }
                    }
                    PipelineMessage::ScriptError(reason) => {
                        tracing::warn!("Parser script rejected: {}", reason)
                    }
                    PipelineMessage::BufferOverflow { size, limit } => {
                        tracing::warn!("Frame buffer overflow ({} > {} bytes)", size, limit)
                    }
                    PipelineMessage::Shutdown => break,
                    _ => {}
                }
            }
            let stats = handle.stats();
            tracing::info!(
                "{} frames built, {} dropped ({:.1}% success), {} bytes received",
                stats.frames_built,
                stats.frames_dropped,
                stats.success_rate(),
                stats.bytes_received
            );
            Ok(())
        })?;

    let mut stdin = std::io::stdin().lock();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = stdin.read(&mut buf).context("Failed to read stdin")?;
        if n == 0 {
            break;
        }

        if let Some(server) = &plugins {
            server.handle().send_raw(&buf[..n]);
            for bytes in server.incoming().try_iter() {
                tracing::info!("Plugin wrote {} bytes: {:?}", bytes.len(), String::from_utf8_lossy(&bytes));
            }
        }

        match reader.feed(&buf[..n]) {
            Ok(_) => {}
            Err(SerialVisError::BufferOverflow { .. }) => {}
            Err(e) => return Err(e).context("Pipeline stopped"),
        }
    }

    tracing::info!("Input closed, shutting down");
    drop(reader);
    session
        .worker
        .join()
        .map_err(|_| anyhow::anyhow!("Pipeline worker panicked"))?;
    consumer
        .join()
        .map_err(|_| anyhow::anyhow!("Output thread panicked"))??;

    if let Some(server) = plugins {
        server.shutdown();
    }
    Ok(())
}
