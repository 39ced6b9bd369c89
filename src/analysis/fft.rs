//! FFT (Fast Fourier Transform) analysis module
//!
//! Provides the rolling magnitude spectrum shown for FFT-enabled datasets:
//! - Ring buffer of the most recent samples, sized to a supported transform length
//! - Window functions applied before the transform (Hann by default)
//! - Magnitudes for the Nyquist-limited half of the spectrum, in dB relative
//!   to the strongest bin

use crate::analysis::axis::smart_interval;
use crate::types::Dataset;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::collections::VecDeque;
use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

/// Smallest supported transform length
pub const MIN_FFT_SIZE: usize = 8;

/// Largest supported transform length
pub const MAX_FFT_SIZE: usize = 1 << 16;

/// Level reported for bins with no energy
pub const FLOOR_DB: f64 = -100.0;

/// Round a requested sample count down to a supported transform length
///
/// Supported lengths are powers of two between [`MIN_FFT_SIZE`] and
/// [`MAX_FFT_SIZE`].
pub fn normalized_size(requested: usize) -> usize {
    let size = requested.clamp(MIN_FFT_SIZE, MAX_FFT_SIZE);
    1 << (usize::BITS - 1 - size.leading_zeros())
}

/// Window function type for FFT preprocessing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowFunction {
    /// Rectangular window (no windowing)
    Rectangular,
    /// Hann window (good general purpose)
    #[default]
    Hann,
    /// Hamming window (reduced side lobes)
    Hamming,
    /// Blackman window (very low side lobes)
    Blackman,
}

impl WindowFunction {
    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            WindowFunction::Rectangular => "Rectangular",
            WindowFunction::Hann => "Hann",
            WindowFunction::Hamming => "Hamming",
            WindowFunction::Blackman => "Blackman",
        }
    }

    /// Get all window functions
    pub fn all() -> &'static [WindowFunction] {
        &[
            WindowFunction::Rectangular,
            WindowFunction::Hann,
            WindowFunction::Hamming,
            WindowFunction::Blackman,
        ]
    }

    /// Compute window coefficient at position i out of n samples
    pub fn coefficient(&self, i: usize, n: usize) -> f64 {
        let n_f = n as f64;
        let i_f = i as f64;

        match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hann => 0.5 * (1.0 - (2.0 * PI * i_f / n_f).cos()),
            WindowFunction::Hamming => 0.54 - 0.46 * (2.0 * PI * i_f / n_f).cos(),
            WindowFunction::Blackman => {
                // Exactly 0 at the endpoints, clamp away the -eps rounding
                (0.42 - 0.5 * (2.0 * PI * i_f / n_f).cos() + 0.08 * (4.0 * PI * i_f / n_f).cos())
                    .max(0.0)
            }
        }
    }

    /// Generate window coefficients for n samples
    pub fn generate(&self, n: usize) -> Vec<f64> {
        (0..n).map(|i| self.coefficient(i, n)).collect()
    }
}

/// Magnitude spectrum of the current sample window
#[derive(Debug, Clone, Default)]
pub struct FftResult {
    /// Frequency of each bin (Hz)
    pub frequencies: Vec<f64>,
    /// Linear magnitude of each bin
    pub magnitudes: Vec<f64>,
    /// Magnitude relative to the strongest bin, floored at [`FLOOR_DB`]
    pub magnitudes_db: Vec<f64>,
    /// Sample rate used for computation
    pub sample_rate: f64,
    /// Frequency resolution (Hz per bin)
    pub frequency_resolution: f64,
}

impl FftResult {
    /// Index of the strongest bin
    pub fn peak_bin(&self) -> Option<usize> {
        self.magnitudes
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
    }

    /// Find the peak frequency and its magnitude
    pub fn peak(&self) -> Option<(f64, f64)> {
        let idx = self.peak_bin()?;
        Some((self.frequencies[idx], self.magnitudes[idx]))
    }

    /// Get (frequency, dB) pairs for plotting
    pub fn plot_points_db(&self) -> Vec<[f64; 2]> {
        self.frequencies
            .iter()
            .zip(self.magnitudes_db.iter())
            .map(|(&f, &db)| [f, db])
            .collect()
    }
}

/// Rolling FFT of a single dataset
pub struct FftPlot {
    fft: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
    window_function: WindowFunction,
    samples: VecDeque<f64>,
    buffer: Vec<Complex<f64>>,
    size: usize,
    sampling_rate: f64,
    result: FftResult,
}

impl FftPlot {
    /// Create a plot for `requested_size` samples at `sampling_rate` Hz
    pub fn new(requested_size: usize, sampling_rate: f64) -> Self {
        Self::with_window(requested_size, sampling_rate, WindowFunction::default())
    }

    /// Create a plot with a specific window function
    pub fn with_window(requested_size: usize, sampling_rate: f64, window: WindowFunction) -> Self {
        let size = normalized_size(requested_size);
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(size),
            window: window.generate(size),
            window_function: window,
            samples: VecDeque::with_capacity(size),
            buffer: vec![Complex::new(0.0, 0.0); size],
            size,
            sampling_rate,
            result: FftResult::default(),
        }
    }

    /// Create a plot sized from a dataset's FFT settings
    pub fn from_dataset(dataset: &Dataset) -> Self {
        Self::new(dataset.fft_samples, dataset.fft_sampling_rate)
    }

    /// Transform length
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn window_function(&self) -> WindowFunction {
        self.window_function
    }

    /// Append a sample, evicting the oldest once the window is full
    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.size {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Samples currently held, oldest first
    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.result = FftResult::default();
    }

    /// Recompute the spectrum from the current samples
    ///
    /// A window that is not yet full is zero-filled at the front.
    pub fn compute(&mut self) -> &FftResult {
        let padding = self.size - self.samples.len();
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = if i < padding {
                0.0
            } else {
                self.samples[i - padding]
            };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.buffer);

        let bins = self.size / 2;
        let resolution = self.sampling_rate / self.size as f64;
        let frequencies: Vec<f64> = (0..bins).map(|i| i as f64 * resolution).collect();
        let magnitudes: Vec<f64> = self
            .buffer
            .iter()
            .take(bins)
            .map(|c| (c.re * c.re + c.im * c.im).sqrt())
            .collect();

        let max = magnitudes.iter().copied().fold(0.0, f64::max);
        let magnitudes_db = magnitudes
            .iter()
            .map(|&m| {
                let ratio = if max > 0.0 { m / max } else { 0.0 };
                if ratio > 0.0 {
                    (20.0 * ratio.log10()).max(FLOOR_DB)
                } else {
                    FLOOR_DB
                }
            })
            .collect();

        self.result = FftResult {
            frequencies,
            magnitudes,
            magnitudes_db,
            sample_rate: self.sampling_rate,
            frequency_resolution: resolution,
        };
        &self.result
    }

    /// Last computed spectrum
    pub fn result(&self) -> &FftResult {
        &self.result
    }

    /// X axis range: `[0, fs/2]`
    pub fn x_range(&self) -> (f64, f64) {
        (0.0, self.sampling_rate / 2.0)
    }

    /// Y axis range: `[-100, 0]` dB
    pub fn y_range(&self) -> (f64, f64) {
        (FLOOR_DB, 0.0)
    }

    pub fn x_tick_interval(&self) -> f64 {
        let (min, max) = self.x_range();
        smart_interval(min, max)
    }

    pub fn y_tick_interval(&self) -> f64 {
        let (min, max) = self.y_range();
        smart_interval(min, max)
    }
}

impl fmt::Debug for FftPlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftPlot")
            .field("size", &self.size)
            .field("sampling_rate", &self.sampling_rate)
            .field("window", &self.window_function)
            .field("samples", &self.samples.len())
            .finish()
    }
}
