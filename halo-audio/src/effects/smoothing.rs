//! Exponential parameter ramps

/// Default ramp time constant for user-driven parameter changes (seconds)
pub const FADE_TIME: f32 = 0.025;

/// Values closer than this to the target snap onto it
const SNAP_EPSILON: f32 = 0.0001;

/// A parameter that approaches its target exponentially, one sample at a time.
///
/// The step coefficient is `1 - exp(-1 / (sample_rate * time_constant))`, so
/// after `time_constant` seconds about 63% of the distance has been covered.
#[derive(Debug, Clone, Copy)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    coeff: f32,
    sample_rate: f32,
}

impl SmoothedParam {
    pub fn new(value: f32, sample_rate: f32, time_constant: f32) -> Self {
        Self {
            current: value,
            target: value,
            coeff: Self::coeff_for(sample_rate, time_constant),
            sample_rate,
        }
    }

    fn coeff_for(sample_rate: f32, time_constant: f32) -> f32 {
        if time_constant <= 0.0 || sample_rate <= 0.0 {
            1.0
        } else {
            1.0 - (-1.0 / (sample_rate * time_constant)).exp()
        }
    }

    /// Ramp toward `target` with the current time constant
    pub fn set_target(&mut self, target: f32) {
        if target.is_finite() {
            self.target = target;
        }
    }

    /// Ramp toward `target` with a new time constant
    pub fn set_target_with(&mut self, target: f32, time_constant: f32) {
        self.coeff = Self::coeff_for(self.sample_rate, time_constant);
        self.set_target(target);
    }

    /// Jump to `value` without ramping
    pub fn set_immediate(&mut self, value: f32) {
        if value.is_finite() {
            self.current = value;
            self.target = value;
        }
    }

    /// Advance one sample and return the new value
    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.current != self.target {
            let next = self.current + (self.target - self.current) * self.coeff;
            // A step below f32 resolution would leave the ramp stuck short of the target
            if next == self.current || (self.target - next).abs() < SNAP_EPSILON {
                self.current = self.target;
            } else {
                self.current = next;
            }
        }
        self.current
    }

    /// Advance `samples` samples
    pub fn advance(&mut self, samples: usize) {
        for _ in 0..samples {
            if self.is_settled() {
                break;
            }
            self.next();
        }
    }

    pub fn value(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }
}
