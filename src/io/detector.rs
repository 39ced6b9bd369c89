//! Streaming frame detector
//!
//! Turns an arbitrarily chunked byte stream into complete frame payloads.
//! Incomplete tails are kept between [`FrameDetector::feed`] calls so that a
//! delimiter split across two reads is still found.
//!
//! # Strategies
//!
//! - [`FrameDetection::EndDelimiterOnly`]: each span before an end delimiter
//!   is a frame
//! - [`FrameDetection::StartAndEndDelimiter`]: the span between a start and the
//!   following end delimiter is a frame, bytes before a start delimiter are
//!   noise and dropped
//! - [`FrameDetection::NoDelimiters`]: every non-empty feed is one frame
//!
//! # Buffer Cap
//!
//! The retained tail is capped at [`DetectorConfig::max_buffer_size`]. When the
//! cap is exceeded the unterminated tail is discarded. Frames completed by the
//! same call are still returned; the overflow is reported afterwards through
//! [`FrameDetector::take_overflow`]. The detector stays usable.

use crate::config::{
    FrameDetection, OperationMode, ProjectFile, DEFAULT_FRAME_END, DEFAULT_FRAME_START,
    DEFAULT_MAX_BUFFER_SIZE,
};
use crate::error::{Result, SerialVisError};

/// Frame boundary settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    pub detection: FrameDetection,
    pub start: Vec<u8>,
    pub end: Vec<u8>,
    pub max_buffer_size: usize,
}

impl DetectorConfig {
    /// Frames terminated by `end`
    pub fn end_delimited(end: impl Into<Vec<u8>>) -> Self {
        Self {
            detection: FrameDetection::EndDelimiterOnly,
            start: Vec::new(),
            end: end.into(),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }

    /// Frames enclosed by `start` and `end`
    pub fn start_and_end(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            detection: FrameDetection::StartAndEndDelimiter,
            start: start.into(),
            end: end.into(),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }

    /// Every received chunk is a frame
    pub fn passthrough() -> Self {
        Self {
            detection: FrameDetection::NoDelimiters,
            start: Vec::new(),
            end: Vec::new(),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }

    /// Settings declared by a project file
    pub fn from_project(project: &ProjectFile) -> Self {
        Self {
            detection: project.frame_detection,
            start: project.start_delimiter(),
            end: project.end_delimiter(),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }

    /// Settings used by an operation mode
    ///
    /// Project mode follows the project (or project defaults when none is
    /// loaded), JSON mode expects `/*` ... `*/` and Quick Plot reads lines.
    pub fn for_mode(mode: OperationMode, project: Option<&ProjectFile>) -> Self {
        match mode {
            OperationMode::ProjectFile => match project {
                Some(project) => Self::from_project(project),
                None => Self::from_project(&ProjectFile::default()),
            },
            OperationMode::DeviceSendsJson => {
                Self::start_and_end(DEFAULT_FRAME_START, DEFAULT_FRAME_END)
            }
            OperationMode::QuickPlot => Self::end_delimited("\n"),
        }
    }

    /// Set the cap on retained bytes
    pub fn with_max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.max_buffer_size = max_buffer_size;
        self
    }

    /// Check that the delimiters required by the strategy are present
    pub fn validate(&self) -> Result<()> {
        match self.detection {
            FrameDetection::EndDelimiterOnly if self.end.is_empty() => Err(
                SerialVisError::Config("End delimiter must not be empty".to_string()),
            ),
            FrameDetection::StartAndEndDelimiter if self.start.is_empty() => Err(
                SerialVisError::Config("Start delimiter must not be empty".to_string()),
            ),
            FrameDetection::StartAndEndDelimiter if self.end.is_empty() => Err(
                SerialVisError::Config("End delimiter must not be empty".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// Byte-oriented frame boundary scanner
#[derive(Debug, Clone)]
pub struct FrameDetector {
    config: DetectorConfig,
    buffer: Vec<u8>,
    /// Size of the last discarded tail not yet reported
    overflow: Option<usize>,
}

impl FrameDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            buffer: Vec::new(),
            overflow: None,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Bytes retained while waiting for a boundary
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Discard any partially received frame
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Switch to a new configuration, discarding the pending buffer
    pub fn reconfigure(&mut self, config: DetectorConfig) -> Result<()> {
        config.validate()?;
        if !self.buffer.is_empty() {
            tracing::debug!(
                "Discarding {} pending bytes on detector reconfiguration",
                self.buffer.len()
            );
        }
        self.config = config;
        self.buffer.clear();
        Ok(())
    }

    /// Feed received bytes, returning the payloads completed by them
    ///
    /// Payloads extracted before the buffer cap was hit are always returned.
    /// Call [`take_overflow`](Self::take_overflow) afterwards to learn whether
    /// the remaining tail was discarded.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        if self.config.detection == FrameDetection::NoDelimiters {
            self.buffer.clear();
            return Ok(vec![bytes.to_vec()]);
        }

        self.buffer.extend_from_slice(bytes);
        let frames = match self.config.detection {
            FrameDetection::StartAndEndDelimiter => self.extract_start_and_end(),
            _ => self.extract_end_only(),
        };

        if self.buffer.len() > self.config.max_buffer_size {
            let size = self.buffer.len();
            self.buffer.clear();
            tracing::warn!(
                "Frame buffer overflow ({} > {} bytes), discarding pending data",
                size,
                self.config.max_buffer_size
            );
            self.overflow = Some(size);
        }

        Ok(frames)
    }

    /// Report and clear an overflow recorded by the last [`feed`](Self::feed)
    pub fn take_overflow(&mut self) -> Result<()> {
        match self.overflow.take() {
            Some(size) => Err(SerialVisError::BufferOverflow {
                size,
                limit: self.config.max_buffer_size,
            }),
            None => Ok(()),
        }
    }

    fn extract_end_only(&mut self) -> Vec<Vec<u8>> {
        let end = &self.config.end;
        let mut frames = Vec::new();
        let mut cursor = 0;

        while let Some(pos) = find(&self.buffer[cursor..], end) {
            frames.push(self.buffer[cursor..cursor + pos].to_vec());
            cursor += pos + end.len();
        }

        self.buffer.drain(..cursor);
        frames
    }

    fn extract_start_and_end(&mut self) -> Vec<Vec<u8>> {
        let start = &self.config.start;
        let end = &self.config.end;
        let mut frames = Vec::new();
        let mut cursor = 0;

        loop {
            let Some(offset) = find(&self.buffer[cursor..], start) else {
                // Keep only what could be the beginning of a split start delimiter
                let keep = start.len() - 1;
                cursor = cursor.max(self.buffer.len().saturating_sub(keep));
                break;
            };

            let frame_start = cursor + offset + start.len();
            let Some(len) = find(&self.buffer[frame_start..], end) else {
                cursor += offset;
                break;
            };

            frames.push(self.buffer[frame_start..frame_start + len].to_vec());
            cursor = frame_start + len + end.len();
        }

        self.buffer.drain(..cursor);
        frames
    }
}

/// Position of the first occurrence of `needle` in `haystack`
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(detector: &mut FrameDetector, chunks: &[&[u8]]) -> Vec<Vec<u8>> {
        chunks
            .iter()
            .flat_map(|chunk| detector.feed(chunk).unwrap())
            .collect()
    }

    #[test]
    fn test_end_delimited_frames() {
        let mut detector = FrameDetector::new(DetectorConfig::end_delimited("\n")).unwrap();
        let frames = collect(&mut detector, &[b"1,2\n3,4\n5"]);
        assert_eq!(frames, vec![b"1,2".to_vec(), b"3,4".to_vec()]);
        assert_eq!(detector.pending(), 1);

        let frames = collect(&mut detector, &[b",6\n"]);
        assert_eq!(frames, vec![b"5,6".to_vec()]);
        assert_eq!(detector.pending(), 0);
    }

    #[test]
    fn test_split_end_delimiter() {
        let mut detector = FrameDetector::new(DetectorConfig::end_delimited("*/")).unwrap();
        let frames = collect(&mut detector, &[b"abc*", b"/def*", b"/"]);
        assert_eq!(frames, vec![b"abc".to_vec(), b"def".to_vec()]);
    }

    #[test]
    fn test_empty_frames_are_forwarded() {
        let mut detector = FrameDetector::new(DetectorConfig::end_delimited(";")).unwrap();
        let frames = collect(&mut detector, &[b";;a;"]);
        assert_eq!(frames, vec![Vec::new(), Vec::new(), b"a".to_vec()]);
    }

    #[test]
    fn test_start_and_end_drops_noise() {
        let mut detector =
            FrameDetector::new(DetectorConfig::start_and_end("/*", "*/")).unwrap();
        let frames = collect(&mut detector, &[b"garbage/*1,2*/junk/*3", b",4*/tail"]);
        assert_eq!(frames, vec![b"1,2".to_vec(), b"3,4".to_vec()]);
        // "tail" has no start delimiter; only one byte could begin "/*"
        assert_eq!(detector.pending(), 1);
    }

    #[test]
    fn test_split_start_delimiter() {
        let mut detector =
            FrameDetector::new(DetectorConfig::start_and_end("$$", "\n")).unwrap();
        let frames = collect(&mut detector, &[b"noise$", b"$value\n"]);
        assert_eq!(frames, vec![b"value".to_vec()]);
    }

    #[test]
    fn test_passthrough_per_feed() {
        let mut detector = FrameDetector::new(DetectorConfig::passthrough()).unwrap();
        assert_eq!(detector.feed(b"abc").unwrap(), vec![b"abc".to_vec()]);
        assert_eq!(detector.feed(b"").unwrap(), Vec::<Vec<u8>>::new());
        assert_eq!(detector.feed(b"d\ne").unwrap(), vec![b"d\ne".to_vec()]);
        assert_eq!(detector.pending(), 0);
    }

    #[test]
    fn test_empty_delimiter_is_rejected() {
        assert!(FrameDetector::new(DetectorConfig::end_delimited("")).is_err());
        assert!(FrameDetector::new(DetectorConfig::start_and_end("", "*/")).is_err());
        assert!(FrameDetector::new(DetectorConfig::start_and_end("/*", "")).is_err());
        assert!(FrameDetector::new(DetectorConfig::passthrough()).is_ok());
    }

    #[test]
    fn test_buffer_overflow_discards_and_recovers() {
        let config = DetectorConfig::end_delimited("\n").with_max_buffer_size(8);
        let mut detector = FrameDetector::new(config).unwrap();

        assert!(detector.feed(b"0123456789").unwrap().is_empty());
        let err = detector.take_overflow().unwrap_err();
        assert!(matches!(
            err,
            SerialVisError::BufferOverflow { size: 10, limit: 8 }
        ));
        assert_eq!(detector.pending(), 0);
        assert!(detector.take_overflow().is_ok());

        assert_eq!(detector.feed(b"ok\n").unwrap(), vec![b"ok".to_vec()]);
    }

    #[test]
    fn test_overflow_keeps_completed_frames() {
        let config = DetectorConfig::end_delimited("\n").with_max_buffer_size(8);
        let mut detector = FrameDetector::new(config).unwrap();

        let frames = detector.feed(b"a\nb\n0123456789").unwrap();
        assert_eq!(frames, vec![b"a".to_vec(), b"b".to_vec()]);
        assert!(matches!(
            detector.take_overflow(),
            Err(SerialVisError::BufferOverflow { size: 10, limit: 8 })
        ));
        assert_eq!(detector.feed(b"c\n").unwrap(), vec![b"c".to_vec()]);
    }

    #[test]
    fn test_reconfigure_flushes_pending() {
        let mut detector = FrameDetector::new(DetectorConfig::end_delimited("\n")).unwrap();
        assert!(detector.feed(b"partial").unwrap().is_empty());

        detector
            .reconfigure(DetectorConfig::start_and_end("<", ">"))
            .unwrap();
        assert_eq!(detector.pending(), 0);
        assert_eq!(detector.feed(b"\n<x>").unwrap(), vec![b"x".to_vec()]);
    }

    #[test]
    fn test_invalid_reconfigure_keeps_old_config() {
        let mut detector = FrameDetector::new(DetectorConfig::end_delimited("\n")).unwrap();
        assert!(detector.reconfigure(DetectorConfig::end_delimited("")).is_err());
        assert_eq!(detector.config().end, b"\n".to_vec());
    }

    #[test]
    fn test_config_for_mode() {
        let quick = DetectorConfig::for_mode(OperationMode::QuickPlot, None);
        assert_eq!(quick.detection, FrameDetection::EndDelimiterOnly);
        assert_eq!(quick.end, b"\n".to_vec());

        let json = DetectorConfig::for_mode(OperationMode::DeviceSendsJson, None);
        assert_eq!(json.detection, FrameDetection::StartAndEndDelimiter);
        assert_eq!(json.start, b"/*".to_vec());

        let mut project = ProjectFile::new("p");
        project.frame_end = "\\r\\n".to_string();
        let config = DetectorConfig::for_mode(OperationMode::ProjectFile, Some(&project));
        assert_eq!(config.end, b"\r\n".to_vec());
    }
}
