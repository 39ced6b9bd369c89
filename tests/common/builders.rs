//! Test data builders for creating projects

use serialvis_rs::config::{DecoderMethod, FrameDetection};
use serialvis_rs::{Dataset, Group, ProjectFile};

/// Builder for test datasets
pub struct DatasetBuilder {
    dataset: Dataset,
}

impl DatasetBuilder {
    pub fn new(title: &str, index: i64) -> Self {
        Self {
            dataset: Dataset::new(title, index),
        }
    }

    pub fn units(mut self, units: &str) -> Self {
        self.dataset.units = units.to_string();
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.dataset.min = min;
        self.dataset.max = max;
        self
    }

    pub fn graph(mut self) -> Self {
        self.dataset.graph = true;
        self
    }

    pub fn fft(mut self, samples: usize, sampling_rate: f64) -> Self {
        self.dataset.fft = true;
        self.dataset.fft_samples = samples;
        self.dataset.fft_sampling_rate = sampling_rate;
        self
    }

    pub fn build(self) -> Dataset {
        self.dataset
    }
}

/// Builder for test projects
pub struct ProjectBuilder {
    project: ProjectFile,
}

impl ProjectBuilder {
    pub fn new(title: &str) -> Self {
        Self {
            project: ProjectFile::new(title),
        }
    }

    pub fn end_delimited(mut self, end: &str) -> Self {
        self.project.frame_detection = FrameDetection::EndDelimiterOnly;
        self.project.frame_end = end.to_string();
        self
    }

    pub fn delimited(mut self, start: &str, end: &str) -> Self {
        self.project.frame_detection = FrameDetection::StartAndEndDelimiter;
        self.project.frame_start = start.to_string();
        self.project.frame_end = end.to_string();
        self
    }

    pub fn separator(mut self, separator: &str) -> Self {
        self.project.separator = separator.to_string();
        self
    }

    pub fn decoder(mut self, decoder: DecoderMethod) -> Self {
        self.project.decoder = decoder;
        self
    }

    pub fn script(mut self, code: &str) -> Self {
        self.project.frame_parser_code = Some(code.to_string());
        self
    }

    pub fn group(mut self, title: &str, widget: &str, datasets: Vec<Dataset>) -> Self {
        let mut group = Group::new(title, widget);
        group.group_id = self.project.groups.len();
        for (i, mut dataset) in datasets.into_iter().enumerate() {
            dataset.group_id = group.group_id;
            dataset.dataset_id = i;
            group.datasets.push(dataset);
        }
        self.project.groups.push(group);
        self
    }

    pub fn build(self) -> ProjectFile {
        self.project
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_builder() {
        let project = ProjectBuilder::new("test")
            .delimited("$", ";")
            .group("G", "datagrid", vec![DatasetBuilder::new("A", 1).build()])
            .build();

        assert_eq!(project.title, "test");
        assert_eq!(project.frame_detection, FrameDetection::StartAndEndDelimiter);
        assert_eq!(project.groups[0].datasets[0].index, 1);
    }
}
