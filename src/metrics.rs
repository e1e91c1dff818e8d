//! Physical metrics derived from acoustic propagation time.

use chrono::{DateTime, Local};

/// Sound velocity in seawater (m/s) by the Mackenzie (1981) equation.
///
/// `temperature` in °C, `salinity` in PSU, `depth` in meters.
pub fn sound_velocity(temperature: f64, salinity: f64, depth: f64) -> f64 {
    let t = temperature;
    let s = salinity - 35.0;
    let d = depth;

    1448.96 + 4.591 * t - 5.304e-2 * t.powi(2) + 2.374e-4 * t.powi(3)
        + 1.340 * s
        + 1.630e-2 * d
        + 1.675e-7 * d.powi(2)
        - 1.025e-2 * t * s
        - 7.139e-13 * t * d.powi(3)
}

/// One-way distance (m) from a round-trip propagation time (s)
pub fn slant_range(propagation_time: f64, sound_velocity: f64) -> f64 {
    propagation_time.abs() * sound_velocity / 2.0
}

/// Horizontal distance (m) for a given vertical separation.
///
/// Returns 0 when the separation is not smaller than the slant range; that
/// geometry cannot come from a real measurement.
pub fn horizontal_distance(slant_range: f64, depth_difference: f64) -> f64 {
    if depth_difference.abs() >= slant_range {
        return 0.0;
    }
    (slant_range.powi(2) - depth_difference.powi(2)).sqrt()
}

/// Last observed slant range and when it was seen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeHistory {
    pub range: f64,
    pub time: DateTime<Local>,
}

/// Stateful metric calculator.
///
/// Holds the salinity and depth used for sound velocity and the range
/// history used for velocity. Not meant to be shared between callers.
#[derive(Debug, Clone)]
pub struct MetricsEngine {
    salinity: f64,
    depth: f64,
    depth_difference: f64,
    history: Option<RangeHistory>,
}

impl MetricsEngine {
    pub fn new(salinity: f64, depth: f64, depth_difference: f64) -> Self {
        Self {
            salinity,
            depth,
            depth_difference,
            history: None,
        }
    }

    pub fn salinity(&self) -> f64 {
        self.salinity
    }

    pub fn set_salinity(&mut self, salinity: f64) {
        self.salinity = salinity;
    }

    pub fn depth(&self) -> f64 {
        self.depth
    }

    pub fn set_depth(&mut self, depth: f64) {
        self.depth = depth;
    }

    pub fn depth_difference(&self) -> f64 {
        self.depth_difference
    }

    pub fn set_depth_difference(&mut self, depth_difference: f64) {
        self.depth_difference = depth_difference;
    }

    pub fn history(&self) -> Option<RangeHistory> {
        self.history
    }

    /// Forget the last range; the next velocity call seeds a fresh history
    pub fn reset_history(&mut self) {
        self.history = None;
    }

    /// Sound velocity at the configured salinity and depth
    pub fn sound_velocity(&self, temperature: f64) -> f64 {
        sound_velocity(temperature, self.salinity, self.depth)
    }

    /// Horizontal distance at the configured depth separation
    pub fn horizontal_distance(&self, slant_range: f64) -> f64 {
        horizontal_distance(slant_range, self.depth_difference)
    }

    /// Rate of change of range (m/s), positive when the remote moves away.
    ///
    /// The first observation after a reset seeds the history and yields 0.
    /// A timestamp that is not after the saved one yields 0 and leaves the
    /// history untouched.
    pub fn velocity(&mut self, current_range: f64, current_time: DateTime<Local>) -> f64 {
        let Some(last) = self.history else {
            self.history = Some(RangeHistory {
                range: current_range,
                time: current_time,
            });
            return 0.0;
        };

        let elapsed = seconds_between(last.time, current_time);
        if elapsed <= 0.0 {
            return 0.0;
        }

        let velocity = (current_range - last.range) / elapsed;
        self.history = Some(RangeHistory {
            range: current_range,
            time: current_time,
        });
        velocity
    }
}

impl Default for MetricsEngine {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_SALINITY, crate::constants::DEFAULT_DEPTH, 0.0)
    }
}

fn seconds_between(from: DateTime<Local>, to: DateTime<Local>) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(micros) => micros as f64 / 1e6,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}
