//! Oversampled soft clipper
//!
//! A table-driven odd cubic curve applied at 4x the sample rate:
//! - Windowed-sinc polyphase interpolation up to 4x
//! - Curve lookup with linear interpolation, inputs beyond ±1 clamp to the ends
//! - Same FIR as anti-alias filter before decimation

use std::f32::consts::PI;

use super::Effect;

/// Points in the shaping table
const CURVE_LEN: usize = 44100;

/// Curve hardness; larger is closer to linear inside ±1
const CURVE_K: f32 = 50.0;

const OVERSAMPLING_FACTOR: usize = 4;

/// Taps per polyphase branch
const PHASE_TAPS: usize = 16;

const FIR_LEN: usize = OVERSAMPLING_FACTOR * PHASE_TAPS;

/// Normalised cubic soft-clip curve, maps ±1 onto ±1
fn curve_value(x: f32) -> f32 {
    (3.0 * CURVE_K * x - x * x * x) / (3.0 * CURVE_K - 1.0)
}

/// Blackman-windowed sinc low-pass at the original Nyquist
fn design_fir() -> [f32; FIR_LEN] {
    let mut fir = [0.0f32; FIR_LEN];
    let center = (FIR_LEN - 1) as f32 / 2.0;
    for (n, tap) in fir.iter_mut().enumerate() {
        let t = (n as f32 - center) / OVERSAMPLING_FACTOR as f32;
        let sinc = if t.abs() < 1e-6 {
            1.0
        } else {
            (PI * t).sin() / (PI * t)
        };
        let x = n as f32 / (FIR_LEN - 1) as f32;
        let window = 0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos();
        *tap = sinc * window;
    }
    fir
}

/// Per-channel filter history
#[derive(Clone)]
struct ChannelState {
    /// Input history at the base rate
    input: [f32; PHASE_TAPS],
    input_pos: usize,
    /// Shaped history at the oversampled rate
    shaped: [f32; FIR_LEN],
    shaped_pos: usize,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            input: [0.0; PHASE_TAPS],
            input_pos: 0,
            shaped: [0.0; FIR_LEN],
            shaped_pos: 0,
        }
    }
}

/// Soft clipper with a click-free enable envelope
pub struct SoftClipper {
    curve: Vec<f32>,
    /// Interpolation branches, each normalised to unity DC gain
    phases: [[f32; PHASE_TAPS]; OVERSAMPLING_FACTOR],
    /// Decimation filter, normalised to unity DC gain
    decimator: [f32; FIR_LEN],
    channels: Vec<ChannelState>,
    enabled: bool,
    wet_target: f32,
    wet_current: f32,
}

impl SoftClipper {
    /// Wet envelope smoothing coefficient (~10ms at 48kHz)
    const WET_SMOOTH_COEFF: f32 = 0.9995;

    pub fn new(channels: usize) -> Self {
        let last = (CURVE_LEN - 1) as f32;
        let curve = (0..CURVE_LEN)
            .map(|i| curve_value(i as f32 * 2.0 / last - 1.0))
            .collect();

        let fir = design_fir();
        let mut phases = [[0.0f32; PHASE_TAPS]; OVERSAMPLING_FACTOR];
        for (phase, branch) in phases.iter_mut().enumerate() {
            for (k, tap) in branch.iter_mut().enumerate() {
                *tap = fir[phase + OVERSAMPLING_FACTOR * k];
            }
            let sum: f32 = branch.iter().sum();
            if sum.abs() > f32::EPSILON {
                branch.iter_mut().for_each(|t| *t /= sum);
            }
        }
        let mut decimator = fir;
        let sum: f32 = decimator.iter().sum();
        decimator.iter_mut().for_each(|t| *t /= sum);

        Self {
            curve,
            phases,
            decimator,
            channels: vec![ChannelState::new(); channels.max(1)],
            enabled: true,
            wet_target: 1.0,
            wet_current: 1.0,
        }
    }

    /// Shape a single value through the table (no oversampling)
    pub fn shape(&self, x: f32) -> f32 {
        let last = CURVE_LEN - 1;
        let v = (x + 1.0) * 0.5 * last as f32;
        if v <= 0.0 {
            return self.curve[0];
        }
        if v >= last as f32 {
            return self.curve[last];
        }
        let idx = v as usize;
        let frac = v - idx as f32;
        self.curve[idx] + (self.curve[idx + 1] - self.curve[idx]) * frac
    }

    #[inline]
    fn process_channel(&mut self, ch: usize, input: f32) -> f32 {
        let mut upsampled = [0.0f32; OVERSAMPLING_FACTOR];
        {
            let state = &mut self.channels[ch];
            state.input[state.input_pos] = input;
            for (phase, out) in upsampled.iter_mut().enumerate() {
                let mut sum = 0.0;
                for (k, &coeff) in self.phases[phase].iter().enumerate() {
                    let idx = (state.input_pos + PHASE_TAPS - k) % PHASE_TAPS;
                    sum += state.input[idx] * coeff;
                }
                *out = sum;
            }
            state.input_pos = (state.input_pos + 1) % PHASE_TAPS;
        }

        for value in upsampled.iter_mut() {
            *value = self.shape(*value);
        }

        let state = &mut self.channels[ch];
        for value in upsampled {
            state.shaped[state.shaped_pos] = value;
            state.shaped_pos = (state.shaped_pos + 1) % FIR_LEN;
        }

        // Decimate: one filtered output per base-rate sample
        let newest = (state.shaped_pos + FIR_LEN - 1) % FIR_LEN;
        let mut out = 0.0;
        for (j, &coeff) in self.decimator.iter().enumerate() {
            out += state.shaped[(newest + FIR_LEN - j) % FIR_LEN] * coeff;
        }
        out
    }
}

impl Effect for SoftClipper {
    fn process(&mut self, samples: &mut [f32]) {
        // Skip processing only if fully disabled and envelope has settled
        if !self.enabled && self.wet_current < 0.0001 {
            return;
        }

        let channels = self.channels.len();
        for frame in samples.chunks_exact_mut(channels) {
            self.wet_current = Self::WET_SMOOTH_COEFF * self.wet_current
                + (1.0 - Self::WET_SMOOTH_COEFF) * self.wet_target;

            for (ch, sample) in frame.iter_mut().enumerate() {
                let wet = self.process_channel(ch, *sample);
                *sample = *sample * (1.0 - self.wet_current) + wet * self.wet_current;
            }
        }
    }

    fn reset(&mut self) {
        for state in &mut self.channels {
            *state = ChannelState::new();
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.wet_target = if enabled { 1.0 } else { 0.0 };
    }

    fn name(&self) -> &'static str {
        "SoftClipper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(clipper: &mut SoftClipper, value: f32) -> f32 {
        let mut samples = vec![value; 512];
        clipper.process(&mut samples);
        samples[511]
    }

    #[test]
    fn test_curve_is_odd_and_bounded() {
        let clipper = SoftClipper::new(1);
        assert!(clipper.shape(0.0).abs() < 1e-4);
        assert!((clipper.shape(0.5) + clipper.shape(-0.5)).abs() < 1e-4);
        assert!((clipper.shape(1.0) - 1.0).abs() < 1e-4);
        assert!((clipper.shape(3.0) - 1.0).abs() < 1e-4);
        assert!((clipper.shape(-3.0) + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_moderate_levels_nearly_linear() {
        let mut clipper = SoftClipper::new(1);
        let out = settle(&mut clipper, 0.5);
        assert!((out - curve_value(0.5)).abs() < 1e-3, "out = {}", out);
    }

    #[test]
    fn test_overload_is_clamped() {
        let mut clipper = SoftClipper::new(2);
        let out = settle(&mut clipper, 2.0);
        assert!((out - 1.0).abs() < 1e-3, "out = {}", out);
    }

    #[test]
    fn test_disabled_settles_to_passthrough() {
        let mut clipper = SoftClipper::new(1);
        clipper.set_enabled(false);
        let mut samples = vec![2.0f32; 48000];
        clipper.process(&mut samples);
        assert!((samples[47999] - 2.0).abs() < 1e-3);
    }
}
