//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use serialvis_rs::backend::PipelineHandle;
use serialvis_rs::{Frame, PipelineMessage};
use std::time::{Duration, Instant};

/// Upper bound for waiting on the pipeline thread
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Collect messages until `done` returns true or the timeout expires
pub fn collect_until<F>(handle: &PipelineHandle, mut done: F) -> Vec<PipelineMessage>
where
    F: FnMut(&[PipelineMessage]) -> bool,
{
    let deadline = Instant::now() + test_timeout();
    let mut messages = Vec::new();
    while !done(&messages) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match handle.recv_timeout(remaining) {
            Some(msg) => messages.push(msg),
            None => break,
        }
    }
    messages
}

/// Wait for `count` frames
pub fn wait_for_frames(handle: &PipelineHandle, count: usize) -> Vec<Frame> {
    let messages = collect_until(handle, |msgs| frames(msgs).len() >= count);
    let frames = frames(&messages);
    assert_eq!(
        frames.len(),
        count,
        "expected {} frames, got {:?}",
        count,
        messages
    );
    frames
}

/// Frames contained in a message list
pub fn frames(messages: &[PipelineMessage]) -> Vec<Frame> {
    messages
        .iter()
        .filter_map(|msg| match msg {
            PipelineMessage::Frame(frame) => Some(frame.clone()),
            _ => None,
        })
        .collect()
}
