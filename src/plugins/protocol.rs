//! Plugin wire format
//!
//! Every message is one line of compact JSON terminated by `\n`:
//!
//! ```text
//! {"frames":[{"data":{"title":"...","groups":[...]}},...]}
//! {"data":"<base64 of raw device bytes>"}
//! ```

use crate::types::Frame;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};

/// Batch of frames as one JSON line
pub fn encode_frames(frames: &[Frame]) -> String {
    let frames: Vec<Value> = frames
        .iter()
        .map(|frame| json!({ "data": frame.to_json() }))
        .collect();
    line(json!({ "frames": frames }))
}

/// Raw device bytes as one JSON line
pub fn encode_raw(bytes: &[u8]) -> String {
    line(json!({ "data": STANDARD.encode(bytes) }))
}

fn line(value: Value) -> String {
    let mut text = value.to_string();
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Dataset, Group};
    use chrono::Utc;

    fn frame(title: &str, value: &str) -> Frame {
        let mut group = Group::new("G\nline", "datagrid");
        let mut dataset = Dataset::new("X", 1);
        dataset.value = value.to_string();
        group.datasets.push(dataset);
        Frame {
            title: title.to_string(),
            groups: vec![group],
            fields: vec![value.to_string()],
            sequence: 0,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_frames_are_single_line() {
        let text = encode_frames(&[frame("a", "1"), frame("b", "2")]);
        assert!(text.ends_with('\n'));
        assert_eq!(text.matches('\n').count(), 1);

        let value: Value = serde_json::from_str(text.trim_end()).unwrap();
        let frames = value["frames"].as_array().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1]["data"]["title"], "b");
        assert_eq!(frames[0]["data"]["groups"][0]["datasets"][0]["value"], "1");
    }

    #[test]
    fn test_raw_is_base64() {
        let text = encode_raw(&[0x00, 0xff, b'\n']);
        assert_eq!(text, "{\"data\":\"AP8K\"}\n");
    }

    #[test]
    fn test_empty_batch() {
        assert_eq!(encode_frames(&[]), "{\"frames\":[]}\n");
    }
}
