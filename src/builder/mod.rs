//! Frame builder
//!
//! Turns one detected payload into a [`Frame`]. The operation mode decides how
//! the decoded text is interpreted:
//!
//! - **Project file**: fields from the active [`FieldParser`] are bound to the
//!   dataset templates of the project by their 1-based index
//! - **Device sends JSON**: the text is a complete frame description
//! - **Quick plot**: comma separated values, one channel per field
//!
//! A build either yields a frame with at least one group or an error; there is
//! no partially built frame.

use crate::config::{DecoderMethod, OperationMode, ProjectFile};
use crate::error::{Result, SerialVisError};
use crate::io::decode_bytes;
use crate::parser::{FieldParser, SeparatorParser};
use crate::types::{simplify_whitespace, Dataset, Frame, Group, GroupWidget};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

/// Group title used in quick plot mode
pub const QUICK_PLOT_TITLE: &str = "Quick Plot";

/// Builds frames for one session configuration
pub struct FrameBuilder {
    mode: OperationMode,
    project: Arc<ProjectFile>,
    parser: Box<dyn FieldParser>,
    decoder: DecoderMethod,
    sequence: u64,
}

impl FrameBuilder {
    pub fn new(
        mode: OperationMode,
        project: Arc<ProjectFile>,
        parser: Box<dyn FieldParser>,
        decoder: DecoderMethod,
    ) -> Self {
        Self {
            mode,
            project,
            parser,
            decoder,
            sequence: 0,
        }
    }

    /// Builder for a project, splitting fields on the project separator
    pub fn for_project(project: Arc<ProjectFile>) -> Self {
        let decoder = project.decoder;
        Self::new(
            OperationMode::ProjectFile,
            project,
            Box::new(SeparatorParser),
            decoder,
        )
    }

    /// Builder for the modes that need no project
    pub fn for_mode(mode: OperationMode, decoder: DecoderMethod) -> Self {
        Self::new(
            mode,
            Arc::new(ProjectFile::default()),
            Box::new(SeparatorParser),
            decoder,
        )
    }

    pub fn mode(&self) -> OperationMode {
        self.mode
    }

    pub fn project(&self) -> &ProjectFile {
        &self.project
    }

    pub fn decoder(&self) -> DecoderMethod {
        self.decoder
    }

    /// Sequence number the next emitted frame will carry
    pub fn next_sequence(&self) -> u64 {
        self.sequence
    }

    /// Replace the field parser used in project mode
    pub fn set_parser(&mut self, parser: Box<dyn FieldParser>) {
        self.parser = parser;
    }

    /// Build a frame from a detected payload
    pub fn build(&mut self, payload: &[u8]) -> Result<Frame> {
        let raw = decode_bytes(payload, self.decoder)?;
        let text = String::from_utf8_lossy(&raw);

        let (title, groups, fields) = match self.mode {
            OperationMode::ProjectFile => self.bind_project(&text)?,
            OperationMode::DeviceSendsJson => Self::read_json(&text)?,
            OperationMode::QuickPlot => Self::quick_plot(&text)?,
        };

        let frame = Frame {
            title,
            groups,
            fields,
            sequence: self.sequence,
            received_at: Utc::now(),
        };
        self.sequence += 1;

        tracing::trace!(
            "Built frame #{} ({} groups, {} datasets)",
            frame.sequence,
            frame.groups.len(),
            frame.dataset_count()
        );
        Ok(frame)
    }

    fn bind_project(&self, text: &str) -> Result<(String, Vec<Group>, Vec<String>)> {
        if self.project.groups.is_empty() {
            return Err(SerialVisError::Schema(
                "Project defines no groups".to_string(),
            ));
        }

        let fields = self.parser.parse(text, &self.project.separator)?;
        let groups = bind_fields(&self.project.groups, &fields);
        if groups.is_empty() {
            return Err(SerialVisError::Schema(format!(
                "No dataset index matched the {} received fields",
                fields.len()
            )));
        }

        Ok((self.project.title.clone(), groups, fields))
    }

    fn read_json(text: &str) -> Result<(String, Vec<Group>, Vec<String>)> {
        let value: Value = serde_json::from_str(text.trim())
            .map_err(|e| SerialVisError::Parse(format!("Invalid JSON frame: {}", e)))?;
        let object = value
            .as_object()
            .ok_or_else(|| SerialVisError::Parse("JSON frame must be an object".to_string()))?;

        let title = object
            .get("title")
            .or_else(|| object.get("t"))
            .and_then(Value::as_str)
            .map(simplify_whitespace)
            .unwrap_or_default();

        let entries = object
            .get("groups")
            .or_else(|| object.get("g"))
            .and_then(Value::as_array)
            .ok_or_else(|| SerialVisError::Parse("JSON frame has no groups".to_string()))?;

        let mut groups = Vec::with_capacity(entries.len());
        let mut fields = Vec::new();
        for entry in entries {
            let Some(mut group) = Group::from_json(entry, groups.len()) else {
                tracing::debug!("Skipping unreadable group in JSON frame '{}'", title);
                continue;
            };
            for dataset in &mut group.datasets {
                fields.push(dataset.value.clone());
                if dataset.index < 1 {
                    dataset.index = fields.len() as i64;
                }
            }
            groups.push(group);
        }

        if groups.is_empty() {
            return Err(SerialVisError::Schema(format!(
                "JSON frame '{}' contains no valid group",
                title
            )));
        }

        Ok((title, groups, fields))
    }

    fn quick_plot(text: &str) -> Result<(String, Vec<Group>, Vec<String>)> {
        let line = text.trim_end_matches(&['\r', '\n'][..]);
        if line.trim().is_empty() {
            return Err(SerialVisError::Parse("Empty quick plot line".to_string()));
        }

        let fields: Vec<String> = line.split(',').map(|f| f.trim().to_string()).collect();
        let widget = if fields.len() > 1 {
            GroupWidget::MultiPlot
        } else {
            GroupWidget::DataGrid
        };

        let mut group = Group::new(QUICK_PLOT_TITLE, widget.id());
        for (i, field) in fields.iter().enumerate() {
            let mut dataset = Dataset::new(format!("Channel {}", i + 1), i as i64 + 1);
            dataset.value = field.clone();
            dataset.graph = true;
            dataset.dataset_id = i;
            group.datasets.push(dataset);
        }

        Ok((QUICK_PLOT_TITLE.to_string(), vec![group], fields))
    }
}

impl std::fmt::Debug for FrameBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuilder")
            .field("mode", &self.mode)
            .field("project", &self.project.title)
            .field("parser", &self.parser.kind())
            .field("decoder", &self.decoder)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Bind parsed fields to the dataset templates of `templates`
///
/// Datasets whose index falls outside the field list are left out of this
/// frame; groups without any bound dataset are left out as well.
pub fn bind_fields(templates: &[Group], fields: &[String]) -> Vec<Group> {
    let mut groups = Vec::with_capacity(templates.len());

    for template in templates {
        let datasets: Vec<Dataset> = template
            .datasets
            .iter()
            .filter_map(|dataset| {
                let slot = usize::try_from(dataset.index).ok()?.checked_sub(1)?;
                let value = fields.get(slot)?;
                let mut bound = dataset.clone();
                bound.value = value.clone();
                Some(bound)
            })
            .collect();

        if datasets.is_empty() {
            continue;
        }

        let group_id = groups.len();
        groups.push(Group {
            group_id,
            title: template.title.clone(),
            widget: template.widget.clone(),
            datasets: datasets
                .into_iter()
                .map(|mut d| {
                    d.group_id = group_id;
                    d
                })
                .collect(),
        });
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{MockFieldParser, ParserKind};

    fn project() -> ProjectFile {
        let mut project = ProjectFile::new("Weather");
        let mut env = Group::new("Environment", "datagrid");
        env.datasets.push(Dataset::new("Temperature", 1));
        env.datasets.push(Dataset::new("Humidity", 2));
        let mut extra = Group::new("Extra", "");
        extra.datasets.push(Dataset::new("Pressure", 5));
        project.groups = vec![env, extra];
        project
    }

    #[test]
    fn test_project_binding_by_index() {
        let mut builder = FrameBuilder::for_project(Arc::new(project()));
        let frame = builder.build(b"21.5,40,1013").unwrap();

        assert_eq!(frame.title, "Weather");
        assert_eq!(frame.groups.len(), 1);
        let values: Vec<_> = frame.datasets().map(|d| d.value.as_str()).collect();
        assert_eq!(values, vec!["21.5", "40"]);
        assert_eq!(frame.fields, vec!["21.5", "40", "1013"]);
    }

    #[test]
    fn test_out_of_range_index_is_omitted() {
        let mut builder = FrameBuilder::for_project(Arc::new(project()));
        let frame = builder.build(b"1,2,3,4,5").unwrap();
        assert_eq!(frame.groups.len(), 2);
        assert_eq!(frame.groups[1].datasets[0].value, "5");
        assert_eq!(frame.groups[1].group_id, 1);

        let frame = builder.build(b"1").unwrap();
        assert_eq!(frame.dataset_count(), 1);
        assert_eq!(frame.groups[0].datasets[0].title, "Temperature");
    }

    #[test]
    fn test_project_without_groups_is_schema_error() {
        let mut builder = FrameBuilder::for_project(Arc::new(ProjectFile::new("empty")));
        assert!(matches!(
            builder.build(b"1,2"),
            Err(SerialVisError::Schema(_))
        ));
        assert_eq!(builder.next_sequence(), 0);
    }

    #[test]
    fn test_sequence_counts_emitted_frames_only() {
        let mut builder = FrameBuilder::for_project(Arc::new(project()));
        assert_eq!(builder.build(b"1,2").unwrap().sequence, 0);
        assert!(builder.build(b"").is_ok());
        assert_eq!(builder.build(b"3,4").unwrap().sequence, 2);

        let mut hex = builder.project().clone();
        hex.decoder = DecoderMethod::Hexadecimal;
        let mut builder = FrameBuilder::for_project(Arc::new(hex));
        assert!(matches!(builder.build(b"zz"), Err(SerialVisError::Decode(_))));
        assert_eq!(builder.build(b"312c32").unwrap().sequence, 0);
    }

    #[test]
    fn test_parser_receives_project_separator() {
        let mut parser = MockFieldParser::new();
        parser
            .expect_parse()
            .withf(|frame, separator| frame.to_string() == "a|b" && separator.to_string() == "|")
            .times(1)
            .returning(|_, _| Ok(vec!["x".to_string(), "y".to_string()]));
        parser.expect_kind().return_const(ParserKind::Script);

        let mut project = project();
        project.separator = "|".to_string();
        let mut builder = FrameBuilder::new(
            OperationMode::ProjectFile,
            Arc::new(project),
            Box::new(parser),
            DecoderMethod::PlainText,
        );

        let frame = builder.build(b"a|b").unwrap();
        assert_eq!(frame.groups[0].datasets[0].value, "x");
        assert_eq!(frame.groups[0].datasets[1].value, "y");
    }

    #[test]
    fn test_parser_error_drops_frame() {
        let mut parser = MockFieldParser::new();
        parser
            .expect_parse()
            .returning(|_, _| Err(SerialVisError::Script("checksum mismatch".to_string())));

        let mut builder = FrameBuilder::new(
            OperationMode::ProjectFile,
            Arc::new(project()),
            Box::new(parser),
            DecoderMethod::PlainText,
        );
        let err = builder.build(b"1,2").unwrap_err();
        assert!(err.is_frame_local());
    }

    #[test]
    fn test_json_frame() {
        let mut builder = FrameBuilder::for_mode(OperationMode::DeviceSendsJson, DecoderMethod::PlainText);
        let payload = br#"{"t":"  My   Device ","g":[{"t":"IMU","w":"accelerometer","d":[
            {"t":"X","v":"0.1"},{"t":"Y","v":"0.2","index":7},{"t":"Z","v":3}
        ]}]}"#;

        let frame = builder.build(payload).unwrap();
        assert_eq!(frame.title, "My Device");
        assert_eq!(frame.groups[0].widget_kind(), GroupWidget::Accelerometer);
        let indices: Vec<_> = frame.datasets().map(|d| d.index).collect();
        assert_eq!(indices, vec![1, 7, 3]);
        assert_eq!(frame.fields, vec!["0.1", "0.2", "3"]);
    }

    #[test]
    fn test_json_array_datasets_are_dropped() {
        let mut builder = FrameBuilder::for_mode(OperationMode::DeviceSendsJson, DecoderMethod::PlainText);
        let payload = br#"{"title":"x","groups":[{"title":"G","datasets":[[7,"junk"],{"title":"ok","value":"1"}]}]}"#;
        let frame = builder.build(payload).unwrap();
        assert_eq!(frame.dataset_count(), 1);
        assert_eq!(frame.groups[0].datasets[0].title, "ok");

        let only_arrays = br#"{"title":"x","groups":[{"title":"G","datasets":[[7,"junk"]]}]}"#;
        assert!(matches!(builder.build(only_arrays), Err(SerialVisError::Schema(_))));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let mut builder = FrameBuilder::for_mode(OperationMode::DeviceSendsJson, DecoderMethod::PlainText);
        assert!(matches!(builder.build(b"{\"title\":"), Err(SerialVisError::Parse(_))));
        assert!(matches!(builder.build(b"[1,2]"), Err(SerialVisError::Parse(_))));
        assert!(matches!(
            builder.build(br#"{"title":"x","groups":[{"title":"","datasets":[]}]}"#),
            Err(SerialVisError::Schema(_))
        ));
    }

    #[test]
    fn test_quick_plot() {
        let mut builder = FrameBuilder::for_mode(OperationMode::QuickPlot, DecoderMethod::PlainText);
        let frame = builder.build(b" 1.5, 2 ,3\r\n").unwrap();

        assert_eq!(frame.groups.len(), 1);
        let group = &frame.groups[0];
        assert_eq!(group.title, QUICK_PLOT_TITLE);
        assert_eq!(group.widget_kind(), GroupWidget::MultiPlot);
        assert_eq!(group.datasets[2].title, "Channel 3");
        assert_eq!(group.datasets[2].index, 3);
        assert_eq!(group.datasets[0].value, "1.5");
        assert!(group.datasets.iter().all(|d| d.graph));

        let single = builder.build(b"42").unwrap();
        assert_eq!(single.groups[0].widget_kind(), GroupWidget::DataGrid);

        assert!(builder.build(b"\r\n").is_err());
    }

    #[test]
    fn test_bind_fields_ignores_non_positive_index() {
        let mut group = Group::new("g", "");
        group.datasets.push(Dataset::new("zero", 0));
        group.datasets.push(Dataset::new("neg", -1));
        assert!(bind_fields(&[group], &["1".to_string()]).is_empty());
    }
}
