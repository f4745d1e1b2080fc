//! A single FM operator: phase accumulator, sine generator, envelope and key scaling.

use std::f64::consts::TAU;

use crate::{
    patch::{LfoParams, OperatorParams, ScalingCurve},
    synth::envelope::Envelope,
};

// -------------------------------------------------------------------------------------------------

/// Keyboard level scaling factor for a note, piecewise around the operator's break point.
///
/// Notes below the break point use the left depth/curve, notes above use the right pair.
/// The result is clamped to [0, 2], so scaling can at most double an operator's level.
pub fn key_level_scaling(note: u8, params: &OperatorParams) -> f64 {
    let scale = if note < params.break_point {
        let distance = (params.break_point - note) as f64 / 127.0;
        let depth = params.left_depth as f64 / 99.0;
        curve_scale(params.left_curve, distance, depth)
    } else if note > params.break_point {
        let distance = (note - params.break_point) as f64 / 127.0;
        let depth = params.right_depth as f64 / 99.0;
        curve_scale(params.right_curve, distance, depth)
    } else {
        1.0
    };
    scale.clamp(0.0, 2.0)
}

fn curve_scale(curve: ScalingCurve, distance: f64, depth: f64) -> f64 {
    match curve {
        ScalingCurve::LinearDown => 1.0 - distance * depth,
        ScalingCurve::ExpDown => 1.0 - depth * (1.0 - (-distance * 3.0).exp()),
        ScalingCurve::ExpUp => 1.0 + depth * (1.0 - (-distance * 3.0).exp()),
        ScalingCurve::LinearUp => 1.0 + distance * depth,
    }
}

/// Frequency multiplier for a detune step in -7..=7, roughly ±0.7% at the extremes.
fn detune_factor(detune: i8) -> f64 {
    2.0_f64.powf((detune as f64 / 7.0) * 0.01)
}

// -------------------------------------------------------------------------------------------------

/// Runtime state of one FM operator within a voice.
///
/// The operator emits its raw sine and its current total level separately: the
/// algorithm router needs both to scale modulation depths independently from
/// carrier output.
#[derive(Debug, Default, Clone)]
pub struct Operator {
    /// Normalized oscillator phase in [0, 1).
    phase: f64,
    /// Current oscillator frequency in Hz, after ratio, detune and pitch bend.
    freq: f64,
    /// Last emitted level-scaled sample, kept around as the feedback source.
    output: f64,
    env: Envelope,
    /// Keyboard level scaling factor, fixed at note-on.
    level_scale: f64,
    /// Signed keyboard rate scaling factor, fixed at note-on.
    rate_scale: f64,
}

impl Operator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn phase(&self) -> f64 {
        self.phase
    }

    #[inline(always)]
    pub fn freq(&self) -> f64 {
        self.freq
    }

    /// The last level-scaled output sample.
    #[inline(always)]
    pub fn output(&self) -> f64 {
        self.output
    }

    #[inline(always)]
    pub fn env(&self) -> &Envelope {
        &self.env
    }

    /// Start a new note: reset the phase, derive frequency and keyboard scaling from
    /// the note, and restart the envelope.
    pub fn note_on(&mut self, params: &OperatorParams, note: u8, base_freq: f64, sample_rate: f64) {
        self.phase = 0.0;
        self.freq = base_freq * params.freq_ratio * detune_factor(params.detune);
        self.output = 0.0;
        self.level_scale = key_level_scaling(note, params);
        self.rate_scale = (note as f64 - 60.0) / 12.0 * (params.key_rate_scaling as f64 / 7.0);
        self.env.note_on(params, self.rate_scale, sample_rate);
    }

    /// Send the envelope into its release stage.
    pub fn release(&mut self, params: &OperatorParams, sample_rate: f64) {
        self.env.release(params, self.rate_scale, sample_rate);
    }

    /// Re-derive the oscillator frequency from a new base frequency. Called every
    /// sample to bake the current pitch bend into the phase increment.
    #[inline]
    pub fn set_base_freq(&mut self, params: &OperatorParams, base_freq: f64) {
        self.freq = base_freq * params.freq_ratio * detune_factor(params.detune);
    }

    /// Advance the operator by one sample.
    ///
    /// Returns the raw (pre-level) sine and the total level. `velocity` is normalized
    /// to [0, 1], `lfo_value` is the voice LFO's current bipolar output.
    #[inline]
    pub fn run(
        &mut self,
        params: &OperatorParams,
        lfo: &LfoParams,
        velocity: f64,
        lfo_value: f64,
        sample_rate: f64,
    ) -> (f64, f64) {
        let env_level = self.env.run(params, self.rate_scale, sample_rate);

        let vel_factor = 1.0 - (1.0 - velocity) * (params.key_vel_sens as f64 / 7.0);
        let mut total =
            params.output_level as f64 / 99.0 * env_level * vel_factor * self.level_scale;
        total *= 1.0 + lfo_value * lfo.amp_depth as f64 / 99.0 * 0.5;

        let sine = (TAU * self.phase).sin();

        let mut freq = self.freq;
        if lfo.pitch_depth > 0 {
            let pitch_mod = lfo_value * lfo.pitch_depth as f64 / 99.0
                * (lfo.pitch_mod_sens as f64 / 7.0)
                * 0.1;
            freq *= 2.0_f64.powf(pitch_mod);
        }
        self.phase += freq / sample_rate;
        if self.phase >= 1.0 {
            self.phase = self.phase.fract();
        }

        self.output = sine * total;
        (sine, total)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f64 = 48000.0;

    fn carrier_params() -> OperatorParams {
        OperatorParams {
            output_level: 99,
            env_rates: [99, 99, 99, 99],
            env_levels: [99, 99, 99, 0],
            ..Default::default()
        }
    }

    #[test]
    fn scaling_is_neutral_at_break_point() {
        let params = OperatorParams {
            break_point: 60,
            left_depth: 99,
            right_depth: 99,
            ..Default::default()
        };
        assert_eq!(key_level_scaling(60, &params), 1.0);
    }

    #[test]
    fn linear_scaling_falls_off_with_distance() {
        let params = OperatorParams {
            break_point: 60,
            left_depth: 99,
            right_depth: 99,
            left_curve: ScalingCurve::LinearDown,
            right_curve: ScalingCurve::LinearDown,
            ..Default::default()
        };
        let near = key_level_scaling(58, &params);
        let far = key_level_scaling(30, &params);
        assert!(near < 1.0);
        assert!(far < near);
        // zero depth disables scaling entirely
        let flat = OperatorParams::default();
        assert_eq!(key_level_scaling(30, &flat), 1.0);
        assert_eq!(key_level_scaling(90, &flat), 1.0);
    }

    #[test]
    fn rising_curves_boost_and_clamp() {
        let params = OperatorParams {
            break_point: 64,
            left_depth: 99,
            right_depth: 99,
            left_curve: ScalingCurve::LinearUp,
            right_curve: ScalingCurve::ExpUp,
            ..Default::default()
        };
        assert!(key_level_scaling(40, &params) > 1.0);
        assert!(key_level_scaling(90, &params) > 1.0);
        // never more than doubled
        assert!(key_level_scaling(0, &params) <= 2.0);
        assert!(key_level_scaling(127, &params) <= 2.0);
    }

    #[test]
    fn exponential_scaling_saturates() {
        let params = OperatorParams {
            break_point: 120,
            left_depth: 99,
            left_curve: ScalingCurve::ExpDown,
            ..Default::default()
        };
        // the exponential curve levels off with distance instead of growing linearly
        let mid = key_level_scaling(80, &params);
        let far = key_level_scaling(0, &params);
        assert!(mid < 1.0);
        assert!(far < mid);
        assert!(far > 0.0);
    }

    #[test]
    fn detune_shifts_frequency() {
        let mut up = Operator::new();
        let mut center = Operator::new();
        let mut params = carrier_params();
        params.detune = 7;
        up.note_on(&params, 69, 440.0, SAMPLE_RATE);
        params.detune = 0;
        center.note_on(&params, 69, 440.0, SAMPLE_RATE);
        assert_eq!(center.freq(), 440.0);
        assert!(up.freq() > 440.0);
        assert!((up.freq() / 440.0 - 2.0_f64.powf(0.01)).abs() < 1e-9);
    }

    #[test]
    fn velocity_sensitivity() {
        let lfo = LfoParams::default();
        let mut params = carrier_params();

        // sensitivity 0: velocity has no effect on the level
        params.key_vel_sens = 0;
        let mut op = Operator::new();
        op.note_on(&params, 60, 261.6, SAMPLE_RATE);
        let (_, level_soft) = op.run(&params, &lfo, 0.2, 0.0, SAMPLE_RATE);
        let mut op = Operator::new();
        op.note_on(&params, 60, 261.6, SAMPLE_RATE);
        let (_, level_hard) = op.run(&params, &lfo, 1.0, 0.0, SAMPLE_RATE);
        assert_eq!(level_soft, level_hard);

        // full sensitivity: the level tracks the velocity
        params.key_vel_sens = 7;
        let mut op = Operator::new();
        op.note_on(&params, 60, 261.6, SAMPLE_RATE);
        let (_, level_soft) = op.run(&params, &lfo, 0.2, 0.0, SAMPLE_RATE);
        assert!((level_soft - 0.2).abs() < 1e-9);
    }

    #[test]
    fn phase_stays_normalized() {
        let params = carrier_params();
        let lfo = LfoParams::default();
        let mut op = Operator::new();
        // extreme ratio on a high note pushes the phase increment past 1.0
        let mut params_extreme = params.clone();
        params_extreme.freq_ratio = 31.99;
        op.note_on(&params_extreme, 127, 12543.85, SAMPLE_RATE);
        for _ in 0..1000 {
            op.run(&params_extreme, &lfo, 1.0, 0.0, SAMPLE_RATE);
            assert!((0.0..1.0).contains(&op.phase()));
        }
    }

    #[test]
    fn emits_a_sine_at_the_note_frequency() {
        let params = carrier_params();
        let lfo = LfoParams::default();
        let mut op = Operator::new();
        op.note_on(&params, 69, 440.0, SAMPLE_RATE);
        // one full cycle at 440 Hz spans ~109 samples; count rising zero crossings
        let mut crossings = 0;
        let mut previous = 0.0;
        for index in 0..SAMPLE_RATE as usize {
            let (sine, _) = op.run(&params, &lfo, 1.0, 0.0, SAMPLE_RATE);
            if index > 0 && previous < 0.0 && sine >= 0.0 {
                crossings += 1;
            }
            previous = sine;
        }
        assert!((crossings as i32 - 440).abs() <= 1);
    }
}
