//! Producer side of the pipeline

use crate::backend::{evicts_oldest, PipelineMessage, Shared, StatsCounters, WorkItem};
use crate::config::OverflowPolicy;
use crate::error::{Result, SerialVisError};
use crate::io::{DetectorConfig, FrameDetector};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Feeds device bytes into the frame detector and queues the payloads
///
/// Lives on the thread that reads the device. Never blocks on frame
/// processing unless the overflow policy is [`OverflowPolicy::Block`].
pub struct FrameReader {
    detector: FrameDetector,
    work_tx: Sender<WorkItem>,
    /// Used to evict the oldest payload from a full queue
    work_rx: Receiver<WorkItem>,
    message_tx: Sender<PipelineMessage>,
    shared: Arc<Shared>,
    policy: OverflowPolicy,
    generation: u64,
}

impl FrameReader {
    pub(crate) fn new(
        config: DetectorConfig,
        work_tx: Sender<WorkItem>,
        work_rx: Receiver<WorkItem>,
        message_tx: Sender<PipelineMessage>,
        shared: Arc<Shared>,
        policy: OverflowPolicy,
    ) -> Result<Self> {
        let generation = shared.generation.load(Ordering::SeqCst);
        Ok(Self {
            detector: FrameDetector::new(config)?,
            work_tx,
            work_rx,
            message_tx,
            shared,
            policy,
            generation,
        })
    }

    /// Detector settings currently in use
    pub fn detector_config(&self) -> &DetectorConfig {
        self.detector.config()
    }

    /// Bytes waiting for a frame boundary
    pub fn pending(&self) -> usize {
        self.detector.pending()
    }

    /// Feed received bytes, returning how many payloads were queued
    ///
    /// Payloads completed by `bytes` are queued even when the detector then
    /// discards an oversized tail; the overflow is returned as an error after
    /// they have been queued.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<usize> {
        self.apply_pending_config()?;
        StatsCounters::bump(&self.shared.stats.bytes_received, bytes.len() as u64);

        let payloads = self.detector.feed(bytes)?;
        let count = payloads.len();
        for payload in payloads {
            self.enqueue(WorkItem {
                payload,
                generation: self.generation,
            })?;
        }
        StatsCounters::bump(&self.shared.stats.payloads_received, count as u64);

        if let Err(SerialVisError::BufferOverflow { size, limit }) =
            self.detector.take_overflow()
        {
            StatsCounters::bump(&self.shared.stats.buffer_overflows, 1);
            let _ = self
                .message_tx
                .try_send(PipelineMessage::BufferOverflow { size, limit });
            return Err(SerialVisError::BufferOverflow { size, limit });
        }
        Ok(count)
    }

    fn apply_pending_config(&mut self) -> Result<()> {
        if self.shared.generation.load(Ordering::SeqCst) == self.generation {
            return Ok(());
        }

        let pending = self
            .shared
            .pending_detector
            .lock()
            .map_err(|e| SerialVisError::Channel(format!("Detector lock poisoned: {}", e)))?
            .take();

        if let Some((generation, config)) = pending {
            tracing::debug!(
                "Applying {} detector settings (generation {})",
                config.detection,
                generation
            );
            self.detector.reconfigure(config)?;
            self.generation = generation;
        }
        Ok(())
    }

    fn enqueue(&self, item: WorkItem) -> Result<()> {
        if !evicts_oldest(self.policy) {
            return self
                .work_tx
                .send(item)
                .map_err(|_| SerialVisError::Channel("Pipeline worker has stopped".to_string()));
        }

        let mut item = item;
        loop {
            match self.work_tx.try_send(item) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    if self.work_rx.try_recv().is_ok() {
                        StatsCounters::bump(&self.shared.stats.queue_drops, 1);
                        tracing::trace!("Work queue full, dropped oldest payload");
                    }
                    item = rejected;
                }
                Err(TrySendError::Disconnected(_)) => {
                    return Err(SerialVisError::Channel(
                        "Pipeline worker has stopped".to_string(),
                    ))
                }
            }
        }
    }
}

impl std::fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader")
            .field("detector", &self.detector)
            .field("policy", &self.policy)
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn reader(
        capacity: usize,
        policy: OverflowPolicy,
    ) -> (FrameReader, Receiver<WorkItem>, Receiver<PipelineMessage>, Arc<Shared>) {
        let (work_tx, work_rx) = bounded(capacity);
        let (msg_tx, msg_rx) = bounded(16);
        let shared = Arc::new(Shared::default());
        let reader = FrameReader::new(
            DetectorConfig::end_delimited("\n").with_max_buffer_size(16),
            work_tx,
            work_rx.clone(),
            msg_tx,
            shared.clone(),
            policy,
        )
        .unwrap();
        (reader, work_rx, msg_rx, shared)
    }

    #[test]
    fn test_drop_oldest_keeps_newest() {
        let (mut reader, work_rx, _msgs, shared) = reader(2, OverflowPolicy::DropOldest);
        assert_eq!(reader.feed(b"a\nb\nc\n").unwrap(), 3);

        let queued: Vec<_> = work_rx.try_iter().map(|item| item.payload).collect();
        assert_eq!(queued, vec![b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(shared.stats.snapshot().queue_drops, 1);
        assert_eq!(shared.stats.snapshot().payloads_received, 3);
    }

    #[test]
    fn test_overflow_is_reported() {
        let (mut reader, _work, msgs, shared) = reader(4, OverflowPolicy::Block);
        let err = reader.feed(&[b'x'; 32]).unwrap_err();
        assert!(matches!(err, SerialVisError::BufferOverflow { size: 32, limit: 16 }));
        assert!(matches!(
            msgs.try_recv(),
            Ok(PipelineMessage::BufferOverflow { size: 32, limit: 16 })
        ));
        assert_eq!(shared.stats.snapshot().buffer_overflows, 1);

        // Still usable afterwards
        assert_eq!(reader.feed(b"ok\n").unwrap(), 1);
    }

    #[test]
    fn test_overflow_still_queues_completed_payloads() {
        let (mut reader, work_rx, msgs, shared) = reader(8, OverflowPolicy::Block);
        let err = reader.feed(b"a\nb\n0123456789abcdefgh").unwrap_err();
        assert!(matches!(err, SerialVisError::BufferOverflow { size: 18, limit: 16 }));

        let queued: Vec<_> = work_rx.try_iter().map(|item| item.payload).collect();
        assert_eq!(queued, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(shared.stats.snapshot().payloads_received, 2);
        assert!(matches!(
            msgs.try_recv(),
            Ok(PipelineMessage::BufferOverflow { size: 18, limit: 16 })
        ));
    }

    #[test]
    fn test_pending_config_flushes_partial_frame() {
        let (mut reader, work_rx, _msgs, shared) = reader(8, OverflowPolicy::Block);
        reader.feed(b"partial").unwrap();
        assert_eq!(reader.pending(), 7);

        let generation = shared
            .publish(DetectorConfig::end_delimited(";"))
            .unwrap();
        assert_eq!(reader.feed(b"1;").unwrap(), 1);

        let item = work_rx.try_recv().unwrap();
        assert_eq!(item.payload, b"1".to_vec());
        assert_eq!(item.generation, generation);
        assert_eq!(reader.detector_config().end, b";".to_vec());
    }
}
