//! Pulse-pattern synthesizer.
//!
//! Converts a sinusoidal pulse specification (frequency, duty cycle) into
//! the chip's run-length waveform encoding: at most 16 segments, each a
//! signed level held for `length + 2` samples of the effective pattern
//! clock. When a waveform does not fit, the pattern clock is divided down
//! by successive powers of two until it does.

use crate::error::{self, ErrorKind};

use log::warn;

/// Hard segment budget of one pattern profile
pub const MAX_PATTERN_PERIODS: usize = 16;

/// Maximum value of the 5-bit encoded segment length; a segment covers
/// `length + 2` samples
pub const MAX_PATTERN_PERIOD_LENGTH: u8 = 30;

/// Highest supported clock-divider exponent (divider = 2^n)
pub const MAX_CLK_DIV_N: u8 = 5;

/// Duty cycle used when a pulse profile does not specify one
pub const DEFAULT_PATTERN_DUTY_CYCLE: f64 = 0.66;

/// Shortest run the chip can emit, in samples (encoded length 0)
const MIN_SEGMENT_SAMPLES: u32 = 2;

/// One synthesized pulse waveform in chip encoding.
///
/// `levels`/`lengths`/`clk_div_n` are the conformance surface; `t`/`y` are
/// the sampled waveform for analysis and plotting.
#[derive(Debug, Clone, PartialEq)]
pub struct PulsePattern {
    levels: Vec<i8>,
    lengths: Vec<u8>,
    clk_div_n: u8,
    t: Vec<f64>,
    y: Vec<i8>,
}

impl PulsePattern {
    /// Segment levels, each in {-1, 0, +1}
    pub fn levels(&self) -> &[i8] {
        &self.levels
    }

    /// Encoded segment lengths; segment `i` spans `lengths[i] + 2` samples
    pub fn lengths(&self) -> &[u8] {
        &self.lengths
    }

    /// Chosen clock-divider exponent (effective clock = `bf_clk / 2^n`)
    pub fn clk_div_n(&self) -> u8 {
        self.clk_div_n
    }

    pub fn num_periods(&self) -> usize {
        self.levels.len()
    }

    /// Sample times of the expanded waveform, in seconds
    pub fn t(&self) -> &[f64] {
        &self.t
    }

    /// Level of the expanded waveform at each sample time
    pub fn y(&self) -> &[i8] {
        &self.y
    }
}

/// Split one constant-level run of `samples` samples into encodable
/// segments. A segment holds at most 32 samples; a 33-sample remainder is
/// split 31 + 2 because a 1-sample residue has no encoding.
fn split_run(level: i8, mut samples: u32, levels: &mut Vec<i8>, lengths: &mut Vec<u8>) {
    let max_samples = u32::from(MAX_PATTERN_PERIOD_LENGTH) + MIN_SEGMENT_SAMPLES;
    while samples > 0 {
        if samples > max_samples {
            if samples == max_samples + 1 {
                lengths.push(MAX_PATTERN_PERIOD_LENGTH - 1);
                samples -= max_samples - 1;
            } else {
                lengths.push(MAX_PATTERN_PERIOD_LENGTH);
                samples -= max_samples;
            }
            levels.push(level);
        } else {
            lengths.push((samples - MIN_SEGMENT_SAMPLES) as u8);
            levels.push(level);
            samples = 0;
        }
    }
}

/// On/off sample split of one half-period.
///
/// The on-run carries at least 2 samples (shorter runs cannot be encoded);
/// a 1-sample off-run is folded back into the on-run for the same reason.
fn split_half_period(half_samples: u32, duty_cycle: f64) -> (u32, u32) {
    let mut on = (half_samples as f64 * duty_cycle) as u32;
    if on < MIN_SEGMENT_SAMPLES {
        warn!(
            "Duty cycle too short. Setting to minimum of {} samples",
            MIN_SEGMENT_SAMPLES
        );
        on = MIN_SEGMENT_SAMPLES;
    }
    let mut off = half_samples.saturating_sub(on);
    if off > 0 && off < MIN_SEGMENT_SAMPLES {
        off = 0;
        on = half_samples;
    }
    (on, off)
}

/// Synthesize the pattern for one cycle of a pulse.
///
/// Tries clock dividers `2^0 .. 2^5` in order and returns the first
/// encoding that fits the 16-segment budget.
pub fn calc_pulse_pattern(
    frequency: f64,
    duty_cycle: f64,
    bf_clk: f64,
) -> error::Result<PulsePattern> {
    let mut num_periods = 0;
    for clk_div_n in 0..=MAX_CLK_DIV_N {
        let clk_n = bf_clk / f64::from(1u32 << clk_div_n);
        let period_samples = (clk_n / frequency) as u32;
        let first_half_samples = period_samples / 2;
        let second_half_samples = period_samples - first_half_samples;

        let (first_on, first_off) = split_half_period(first_half_samples, duty_cycle);
        let (second_on, second_off) = split_half_period(second_half_samples, duty_cycle);

        let mut levels = Vec::new();
        let mut lengths = Vec::new();
        for (level, samples) in [
            (1, first_on),
            (0, first_off),
            (-1, second_on),
            (0, second_off),
        ] {
            split_run(level, samples, &mut levels, &mut lengths);
        }

        num_periods = levels.len();
        if num_periods <= MAX_PATTERN_PERIODS {
            let (t, y) = sample_waveform(&levels, &lengths, clk_n);
            return Ok(PulsePattern {
                levels,
                lengths,
                clk_div_n,
                t,
                y,
            });
        }
    }
    Err(ErrorKind::PatternOverflow(format!(
        "pattern requires too many periods ({} > {})",
        num_periods, MAX_PATTERN_PERIODS
    )))?
}

/// Expand the run-length encoding into per-sample (time, level) series at
/// the effective pattern clock
fn sample_waveform(levels: &[i8], lengths: &[u8], clk_n: f64) -> (Vec<f64>, Vec<i8>) {
    let total: usize = lengths
        .iter()
        .map(|&n| n as usize + MIN_SEGMENT_SAMPLES as usize)
        .sum();
    let t = (0..total).map(|i| i as f64 / clk_n).collect();
    let mut y = Vec::with_capacity(total);
    for (&level, &length) in levels.iter().zip(lengths.iter()) {
        for _ in 0..(length as usize + MIN_SEGMENT_SAMPLES as usize) {
            y.push(level);
        }
    }
    (t, y)
}
