//! Consumer-side owner of every derived series
//!
//! The [`Dashboard`] is fed each built frame in order. It lays out one series
//! per plot, FFT and multiplot widget the frame calls for and appends the
//! frame's numeric values to them. The layout is rebuilt, and history cleared,
//! whenever the group/dataset structure of incoming frames changes.

use crate::analysis::fft::FftPlot;
use crate::analysis::multiplot::{MultiPlot, PlotSeries};
use crate::config::DEFAULT_PLOT_POINTS;
use crate::types::{DashboardWidget, DatasetOptions, Frame, GroupWidget};
use std::collections::HashMap;

/// Location of a dataset inside a frame
type DatasetRef = (usize, usize);

/// Derived-series state for the current frame layout
#[derive(Debug)]
pub struct Dashboard {
    points: usize,
    last_frame: Option<Frame>,
    plots: Vec<(DatasetRef, PlotSeries)>,
    ffts: Vec<(DatasetRef, FftPlot)>,
    multiplots: Vec<(usize, MultiPlot)>,
    widget_counts: HashMap<DashboardWidget, usize>,
    frames_seen: u64,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new(DEFAULT_PLOT_POINTS)
    }
}

impl Dashboard {
    /// Create an empty dashboard keeping `points` samples per curve
    pub fn new(points: usize) -> Self {
        Self {
            points: points.max(1),
            last_frame: None,
            plots: Vec::new(),
            ffts: Vec::new(),
            multiplots: Vec::new(),
            widget_counts: HashMap::new(),
            frames_seen: 0,
        }
    }

    /// Feed a built frame
    pub fn update(&mut self, frame: &Frame) {
        let relayout = self
            .last_frame
            .as_ref()
            .map_or(true, |last| !last.same_structure(frame));
        if relayout {
            self.layout(frame);
        }

        for ((g, d), plot) in &mut self.plots {
            if let Some(dataset) = frame.groups.get(*g).and_then(|grp| grp.datasets.get(*d)) {
                plot.update(dataset);
            }
        }

        for ((g, d), fft) in &mut self.ffts {
            let value = frame
                .groups
                .get(*g)
                .and_then(|grp| grp.datasets.get(*d))
                .and_then(|dataset| dataset.numeric_value());
            if let Some(value) = value {
                fft.push(value);
            }
        }

        for (g, multiplot) in &mut self.multiplots {
            if let Some(group) = frame.groups.get(*g) {
                multiplot.update(group);
            }
        }

        self.frames_seen += 1;
        self.last_frame = Some(frame.clone());
    }

    fn layout(&mut self, frame: &Frame) {
        tracing::debug!(
            "Dashboard layout rebuilt for '{}' ({} groups)",
            frame.title,
            frame.groups.len()
        );

        self.plots.clear();
        self.ffts.clear();
        self.multiplots.clear();
        self.widget_counts.clear();

        for (g, group) in frame.groups.iter().enumerate() {
            let kind = group.widget_kind();
            if let Some(widget) = kind.dashboard_widget() {
                *self.widget_counts.entry(widget).or_default() += 1;
            }
            if kind == GroupWidget::MultiPlot {
                self.multiplots.push((g, MultiPlot::new(group, self.points)));
            }

            for (d, dataset) in group.datasets.iter().enumerate() {
                for widget in dataset.dashboard_widgets() {
                    *self.widget_counts.entry(widget).or_default() += 1;
                }

                let options = dataset.options();
                if options.contains(DatasetOptions::PLOT) {
                    self.plots.push(((g, d), PlotSeries::new(dataset, self.points)));
                }
                if options.contains(DatasetOptions::FFT) {
                    self.ffts.push(((g, d), FftPlot::from_dataset(dataset)));
                }
            }
        }
    }

    /// Drop all history and layout
    pub fn reset(&mut self) {
        self.last_frame = None;
        self.plots.clear();
        self.ffts.clear();
        self.multiplots.clear();
        self.widget_counts.clear();
        self.frames_seen = 0;
    }

    /// Most recently received frame
    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn points(&self) -> usize {
        self.points
    }

    /// Change the number of samples kept per curve
    pub fn set_points(&mut self, points: usize) {
        self.points = points.max(1);
        for (_, plot) in &mut self.plots {
            plot.set_points(self.points);
        }
        for (_, multiplot) in &mut self.multiplots {
            multiplot.set_points(self.points);
        }
    }

    /// Number of widgets of a kind in the current layout
    pub fn widget_count(&self, widget: DashboardWidget) -> usize {
        self.widget_counts.get(&widget).copied().unwrap_or(0)
    }

    pub fn plot_count(&self) -> usize {
        self.plots.len()
    }

    pub fn plot(&self, index: usize) -> Option<&PlotSeries> {
        self.plots.get(index).map(|(_, p)| p)
    }

    pub fn fft_count(&self) -> usize {
        self.ffts.len()
    }

    pub fn fft_plot(&self, index: usize) -> Option<&FftPlot> {
        self.ffts.get(index).map(|(_, p)| p)
    }

    /// Mutable access, needed to recompute a spectrum
    pub fn fft_plot_mut(&mut self, index: usize) -> Option<&mut FftPlot> {
        self.ffts.get_mut(index).map(|(_, p)| p)
    }

    pub fn multiplot_count(&self) -> usize {
        self.multiplots.len()
    }

    pub fn multiplot(&self, index: usize) -> Option<&MultiPlot> {
        self.multiplots.get(index).map(|(_, p)| p)
    }
}
