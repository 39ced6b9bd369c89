//! Plot series assembled from successive frames
//!
//! - [`PlotSeries`] - the history of one plotted dataset
//! - [`MultiPlot`] - one curve per dataset of a multiplot group
//!
//! Both keep a ring buffer of the most recent numeric values. X is the sample
//! position within the buffer, Y the value. Non-numeric values are skipped.

use crate::analysis::axis::{auto_scale_range, fuzzy_eq, smart_interval};
use crate::types::{Dataset, Group};
use std::collections::VecDeque;

/// Push into a ring buffer capped at `capacity`
fn push_capped(buffer: &mut VecDeque<f64>, capacity: usize, value: f64) {
    while buffer.len() >= capacity.max(1) {
        buffer.pop_front();
    }
    buffer.push_back(value);
}

fn to_points(buffer: &VecDeque<f64>) -> Vec<[f64; 2]> {
    buffer
        .iter()
        .enumerate()
        .map(|(x, &y)| [x as f64, y])
        .collect()
}

/// History of a single plotted dataset
#[derive(Debug, Clone)]
pub struct PlotSeries {
    title: String,
    units: String,
    min: f64,
    max: f64,
    points: usize,
    values: VecDeque<f64>,
}

impl PlotSeries {
    pub fn new(dataset: &Dataset, points: usize) -> Self {
        Self {
            title: dataset.title.clone(),
            units: dataset.units.clone(),
            min: dataset.min,
            max: dataset.max,
            points,
            values: VecDeque::with_capacity(points),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    /// Append the dataset's value if it is numeric
    pub fn update(&mut self, dataset: &Dataset) -> bool {
        match dataset.numeric_value() {
            Some(value) => {
                push_capped(&mut self.values, self.points, value);
                true
            }
            None => false,
        }
    }

    /// (x, y) points, oldest first
    pub fn series(&self) -> Vec<[f64; 2]> {
        to_points(&self.values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Change the number of retained points, dropping the oldest excess
    pub fn set_points(&mut self, points: usize) {
        self.points = points.max(1);
        while self.values.len() > self.points {
            self.values.pop_front();
        }
    }

    /// Y range: the configured min/max when they differ, else auto-scaled
    pub fn y_range(&self) -> (f64, f64) {
        if !fuzzy_eq(self.min, self.max) {
            (self.min.min(self.max), self.min.max(self.max))
        } else {
            auto_scale_range(self.values.iter().copied())
        }
    }

    pub fn x_range(&self) -> (f64, f64) {
        (0.0, self.points as f64)
    }

    pub fn y_tick_interval(&self) -> f64 {
        let (min, max) = self.y_range();
        smart_interval(min, max)
    }
}

#[derive(Debug, Clone)]
struct Curve {
    title: String,
    min: f64,
    max: f64,
    values: VecDeque<f64>,
}

/// One curve per dataset of a group
#[derive(Debug, Clone)]
pub struct MultiPlot {
    title: String,
    points: usize,
    curves: Vec<Curve>,
    min_y: f64,
    max_y: f64,
}

impl MultiPlot {
    pub fn new(group: &Group, points: usize) -> Self {
        let curves = group
            .datasets
            .iter()
            .map(|d| Curve {
                title: d.title.clone(),
                min: d.min,
                max: d.max,
                values: VecDeque::with_capacity(points),
            })
            .collect();

        let mut plot = Self {
            title: group.title.clone(),
            points: points.max(1),
            curves,
            min_y: 0.0,
            max_y: 1.0,
        };
        plot.calculate_auto_scale_range();
        plot
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Number of curves
    pub fn count(&self) -> usize {
        self.curves.len()
    }

    pub fn curve_title(&self, index: usize) -> Option<&str> {
        self.curves.get(index).map(|c| c.title.as_str())
    }

    /// Append the numeric values of a frame's group, dataset by dataset
    pub fn update(&mut self, group: &Group) {
        for (curve, dataset) in self.curves.iter_mut().zip(&group.datasets) {
            if let Some(value) = dataset.numeric_value() {
                push_capped(&mut curve.values, self.points, value);
            }
        }
        self.calculate_auto_scale_range();
    }

    /// (x, y) points of curve `index`, oldest first
    pub fn series(&self, index: usize) -> Option<Vec<[f64; 2]>> {
        self.curves.get(index).map(|c| to_points(&c.values))
    }

    /// Change the number of retained points, dropping the oldest excess
    pub fn set_points(&mut self, points: usize) {
        self.points = points.max(1);
        for curve in &mut self.curves {
            while curve.values.len() > self.points {
                curve.values.pop_front();
            }
        }
        self.calculate_auto_scale_range();
    }

    /// Recompute the Y range
    ///
    /// When every dataset declares a usable min/max the union of those ranges
    /// is used. Otherwise the range is derived from the accumulated points.
    pub fn calculate_auto_scale_range(&mut self) -> (f64, f64) {
        let configured = !self.curves.is_empty()
            && self.curves.iter().all(|c| !fuzzy_eq(c.min, c.max));

        let (min, max) = if configured {
            self.curves.iter().fold((f64::MAX, f64::MIN), |(lo, hi), c| {
                (lo.min(c.min.min(c.max)), hi.max(c.min.max(c.max)))
            })
        } else {
            auto_scale_range(
                self.curves
                    .iter()
                    .flat_map(|c| c.values.iter().copied()),
            )
        };

        self.min_y = min;
        self.max_y = max;
        (min, max)
    }

    pub fn y_range(&self) -> (f64, f64) {
        (self.min_y, self.max_y)
    }

    pub fn x_range(&self) -> (f64, f64) {
        (0.0, self.points as f64)
    }

    pub fn x_tick_interval(&self) -> f64 {
        smart_interval(0.0, self.points as f64)
    }

    pub fn y_tick_interval(&self) -> f64 {
        smart_interval(self.min_y, self.max_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(values: &[&str], ranges: &[(f64, f64)]) -> Group {
        let mut group = Group::new("Signals", "multiplot");
        for (i, value) in values.iter().enumerate() {
            let (min, max) = ranges.get(i).copied().unwrap_or((0.0, 0.0));
            let mut dataset = Dataset::new(format!("Ch {}", i + 1), i as i64 + 1);
            dataset.value = value.to_string();
            dataset.min = min;
            dataset.max = max;
            group.datasets.push(dataset);
        }
        group
    }

    #[test]
    fn test_multiplot_series_are_indexed_by_sample() {
        let mut plot = MultiPlot::new(&group(&["", ""], &[]), 3);
        for v in ["1", "2", "3", "4"] {
            plot.update(&group(&[v, "x"], &[]));
        }
        assert_eq!(plot.count(), 2);
        assert_eq!(
            plot.series(0).unwrap(),
            vec![[0.0, 2.0], [1.0, 3.0], [2.0, 4.0]]
        );
        assert!(plot.series(1).unwrap().is_empty());
        assert!(plot.series(2).is_none());
    }

    #[test]
    fn test_multiplot_constant_zero_range() {
        let mut plot = MultiPlot::new(&group(&["0"], &[]), 10);
        for _ in 0..5 {
            plot.update(&group(&["0"], &[]));
        }
        assert_eq!(plot.y_range(), (-1.0, 1.0));
    }

    #[test]
    fn test_multiplot_constant_nonzero_range() {
        let mut plot = MultiPlot::new(&group(&["20", "20"], &[]), 10);
        plot.update(&group(&["20", "20"], &[]));
        let (min, max) = plot.y_range();
        assert!(min <= 18.0 && max >= 22.0);
    }

    #[test]
    fn test_multiplot_uses_configured_ranges() {
        let ranges = [(0.0, 10.0), (-5.0, 3.0)];
        let mut plot = MultiPlot::new(&group(&["1", "2"], &ranges), 10);
        plot.update(&group(&["100", "200"], &ranges));
        assert_eq!(plot.y_range(), (-5.0, 10.0));
    }

    #[test]
    fn test_multiplot_partial_configuration_falls_back_to_data() {
        let ranges = [(0.0, 10.0), (0.0, 0.0)];
        let mut plot = MultiPlot::new(&group(&["0", "10"], &ranges), 10);
        plot.update(&group(&["0", "10"], &ranges));
        assert_eq!(plot.y_range(), (-1.0, 11.0));
    }

    #[test]
    fn test_empty_multiplot_range() {
        let plot = MultiPlot::new(&Group::new("Empty", "multiplot"), 10);
        assert_eq!(plot.y_range(), (0.0, 1.0));
        assert_eq!(plot.x_range(), (0.0, 10.0));
    }

    #[test]
    fn test_plot_series() {
        let mut dataset = Dataset::new("Temp", 1);
        let mut series = PlotSeries::new(&dataset, 2);
        for v in ["1.5", "nan?", "2.5", "3.5"] {
            dataset.value = v.to_string();
            series.update(&dataset);
        }
        assert_eq!(series.series(), vec![[0.0, 2.5], [1.0, 3.5]]);
        series.set_points(1);
        assert_eq!(series.series(), vec![[0.0, 3.5]]);
        assert_eq!(series.y_range(), (3.0, 4.0));
    }
}
