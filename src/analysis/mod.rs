//! Analysis module for derived series
//!
//! This module turns the stream of built frames into plot-ready data:
//! - FFT magnitude spectra for FFT-enabled datasets
//! - Single-dataset plot history and multi-curve group plots
//! - Axis auto-ranging and tick spacing
//! - The [`Dashboard`] that owns all of the above for one consumer

pub mod axis;
pub mod dashboard;
pub mod fft;
pub mod multiplot;

pub use axis::{auto_scale_range, smart_interval};
pub use dashboard::Dashboard;
pub use fft::{FftPlot, FftResult, WindowFunction};
pub use multiplot::{MultiPlot, PlotSeries};
