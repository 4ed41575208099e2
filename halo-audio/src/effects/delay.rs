//! Stereo delay line with click-free delay-time changes

/// Longest supported delay in seconds (surround width tops out at 100 ms)
const MAX_DELAY_SECS: f32 = 0.1;

/// Stereo delay line read with linear interpolation
pub struct DelayLine {
    sample_rate: f32,
    /// Delay buffer (stereo interleaved: L,R,L,R,...)
    buffer: Vec<f32>,
    /// Buffer length in stereo frames
    buffer_frames: usize,
    /// Write position (in frames, not samples)
    write_pos: usize,
    /// Delay time in fractional samples
    delay_samples: f32,
    /// Target delay (for smoothing)
    target_delay: f32,
    /// Delay smoothing coefficient
    delay_smooth: f32,
}

impl DelayLine {
    /// Create a delay line starting at `delay_ms`
    pub fn new(sample_rate: f32, delay_ms: f32) -> Self {
        // Headroom for interpolation past the maximum delay
        let buffer_frames = (sample_rate * MAX_DELAY_SECS) as usize + 4;
        let mut line = Self {
            sample_rate,
            buffer: vec![0.0; buffer_frames * 2],
            buffer_frames,
            write_pos: 0,
            delay_samples: 0.0,
            target_delay: 0.0,
            delay_smooth: 0.9995,
        };
        line.set_delay_ms(delay_ms);
        line.delay_samples = line.target_delay;
        line
    }

    /// Set delay time in milliseconds (0 - 100)
    pub fn set_delay_ms(&mut self, ms: f32) {
        if !ms.is_finite() {
            return;
        }
        let clamped_ms = ms.clamp(0.0, MAX_DELAY_SECS * 1000.0);
        self.target_delay = (clamped_ms / 1000.0) * self.sample_rate;
    }

    /// Get current delay time in milliseconds
    pub fn delay_ms(&self) -> f32 {
        (self.delay_samples / self.sample_rate) * 1000.0
    }

    /// Get target delay time in milliseconds
    pub fn target_delay_ms(&self) -> f32 {
        (self.target_delay / self.sample_rate) * 1000.0
    }

    /// Push one stereo frame and return the delayed frame
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        self.delay_samples =
            self.delay_smooth * self.delay_samples + (1.0 - self.delay_smooth) * self.target_delay;
        if (self.delay_samples - self.target_delay).abs() < 0.001 {
            self.delay_samples = self.target_delay;
        }

        let idx = self.write_pos * 2;
        self.buffer[idx] = left;
        self.buffer[idx + 1] = right;

        let out = self.read_interpolated(self.delay_samples);
        self.write_pos = (self.write_pos + 1) % self.buffer_frames;
        out
    }

    /// Read from delay line with linear interpolation
    #[inline]
    fn read_interpolated(&self, delay_frames: f32) -> (f32, f32) {
        let int_delay = (delay_frames as usize).min(self.buffer_frames - 2);
        let frac = delay_frames - int_delay as f32;

        // Calculate read position (circular buffer)
        let pos = if self.write_pos >= int_delay {
            self.write_pos - int_delay
        } else {
            self.buffer_frames - (int_delay - self.write_pos)
        };
        let older = if pos == 0 {
            self.buffer_frames - 1
        } else {
            pos - 1
        };

        let (idx0, idx1) = (pos * 2, older * 2);
        let l = self.buffer[idx0] * (1.0 - frac) + self.buffer[idx1] * frac;
        let r = self.buffer[idx0 + 1] * (1.0 - frac) + self.buffer[idx1 + 1] * frac;
        (l, r)
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.delay_samples = self.target_delay;
    }
}
