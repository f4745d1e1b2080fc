//! Four-stage piecewise-linear amplitude envelope with rate tables and key-rate scaling.

use crate::patch::OperatorParams;

// -------------------------------------------------------------------------------------------------

/// Nominal full-scale stage times in seconds for rate values 0..=99.
///
/// Monotonically decreasing from 30 s at rate 0 down to 0.4 ms at rate 99.
#[rustfmt::skip]
pub const RATE_TABLE: [f64; 100] = [
    // rates 0-9: very slow
    30.0, 25.0, 20.0, 18.0, 16.0, 14.0, 12.0, 10.0, 8.0, 6.0,
    // rates 10-19: slow
    5.5, 5.0, 4.5, 4.0, 3.5, 3.0, 2.8, 2.6, 2.4, 2.2,
    // rates 20-29: medium-slow
    2.0, 1.8, 1.6, 1.4, 1.2, 1.0, 0.95, 0.90, 0.85, 0.80,
    // rates 30-39: medium
    0.75, 0.70, 0.65, 0.60, 0.55, 0.50, 0.47, 0.44, 0.41, 0.38,
    // rates 40-49: medium-fast
    0.35, 0.32, 0.29, 0.26, 0.23, 0.20, 0.19, 0.18, 0.17, 0.16,
    // rates 50-59: fast
    0.15, 0.14, 0.13, 0.12, 0.11, 0.10, 0.095, 0.090, 0.085, 0.080,
    // rates 60-69: very fast
    0.075, 0.070, 0.065, 0.060, 0.055, 0.050, 0.047, 0.044, 0.041, 0.038,
    // rates 70-79: extremely fast
    0.035, 0.032, 0.029, 0.026, 0.023, 0.020, 0.018, 0.016, 0.014, 0.012,
    // rates 80-89: lightning fast
    0.010, 0.009, 0.008, 0.007, 0.006, 0.005, 0.0045, 0.004, 0.0035, 0.003,
    // rates 90-99: instant
    0.0025, 0.002, 0.0018, 0.0016, 0.0014, 0.0012, 0.001, 0.0008, 0.0006, 0.0004,
];

/// Map a stage rate and the stage's level jump to a stage time in seconds.
///
/// Larger level jumps take proportionally longer, with a 10% floor so tiny jumps
/// still take a useful fraction of the nominal time.
pub fn rate_to_time(rate: u8, level_diff: i32) -> f64 {
    if rate == 0 {
        return 30.0;
    }
    if rate >= 99 {
        return 0.0004;
    }
    let scale = (level_diff.abs() as f64 / 99.0).max(0.1);
    RATE_TABLE[rate as usize] * scale
}

// -------------------------------------------------------------------------------------------------

/// Envelope stage indices, in playback order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    #[default]
    Attack,
    Decay1,
    /// The sustain stage: keeps drifting toward its target, never advances by itself.
    Decay2,
    Release,
}

impl EnvelopeStage {
    #[inline(always)]
    fn index(self) -> usize {
        match self {
            Self::Attack => 0,
            Self::Decay1 => 1,
            Self::Decay2 => 2,
            Self::Release => 3,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Runtime state of one operator's amplitude envelope.
///
/// Stage rates are converted to per-sample level deltas at each stage transition, so
/// the per-sample work is a single addition plus the transition checks.
#[derive(Debug, Default, Clone)]
pub struct Envelope {
    stage: EnvelopeStage,
    level: f64,
    rate: f64,
    target: f64,
    samples_in_stage: u64,
}

impl Envelope {
    /// Rate marker for an attack that completes within a single sample.
    const INSTANT_RATE: f64 = 99.0;
    /// Levels below this count as silent when deciding whether a voice has decayed away.
    const SILENCE: f64 = 0.001;

    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    #[inline(always)]
    pub fn level(&self) -> f64 {
        self.level
    }

    /// Samples spent in the current stage. Diagnostic only.
    #[inline(always)]
    pub fn samples_in_stage(&self) -> u64 {
        self.samples_in_stage
    }

    /// True once the level has decayed below the audible threshold.
    #[inline(always)]
    pub fn is_silent(&self) -> bool {
        self.level < Self::SILENCE
    }

    /// Restart the envelope from silence into the attack stage.
    pub fn note_on(&mut self, params: &OperatorParams, rate_scale: f64, sample_rate: f64) {
        self.stage = EnvelopeStage::Attack;
        self.level = 0.0;
        self.samples_in_stage = 0;

        let attack_level = params.env_levels[0] as i32;
        let attack_time = scaled_stage_time(params, EnvelopeStage::Attack, attack_level, rate_scale);
        self.rate = if attack_time > 0.0 {
            params.env_levels[0] as f64 / (99.0 * attack_time * sample_rate)
        } else {
            Self::INSTANT_RATE
        };
        self.target = params.env_levels[0] as f64 / 99.0;
    }

    /// Jump to the release stage, heading from the current level to the release level.
    ///
    /// With a zero level difference the nominal rate would be zero, so a fixed fallback
    /// of -0.1 per sample drains the envelope instead.
    pub fn release(&mut self, params: &OperatorParams, rate_scale: f64, sample_rate: f64) {
        self.stage = EnvelopeStage::Release;
        self.samples_in_stage = 0;

        let level_diff = (self.level * 99.0) as i32 - params.env_levels[3] as i32;
        let release_time = scaled_stage_time(params, EnvelopeStage::Release, level_diff, rate_scale);
        self.rate = if release_time > 0.0 && level_diff != 0 {
            -(level_diff as f64) / (99.0 * release_time * sample_rate)
        } else {
            -0.1
        };
        self.target = params.env_levels[3] as f64 / 99.0;
    }

    /// Advance the envelope by one sample and return the new level.
    pub fn run(&mut self, params: &OperatorParams, rate_scale: f64, sample_rate: f64) -> f64 {
        self.samples_in_stage += 1;

        match self.stage {
            EnvelopeStage::Attack => {
                if self.level >= self.target || params.env_rates[0] >= 99 {
                    self.enter_decay(EnvelopeStage::Decay1, params, rate_scale, sample_rate);
                } else {
                    self.level += self.rate;
                    if self.level > self.target {
                        self.level = self.target;
                    }
                }
            }
            EnvelopeStage::Decay1 => {
                if self.level <= self.target || params.env_rates[1] >= 99 {
                    self.enter_decay(EnvelopeStage::Decay2, params, rate_scale, sample_rate);
                } else {
                    self.level += self.rate;
                    if self.level < self.target {
                        self.level = self.target;
                    }
                }
            }
            EnvelopeStage::Decay2 => {
                // sustain: keep drifting down toward the target, never advance
                if self.level > self.target {
                    self.level += self.rate;
                    if self.level < self.target {
                        self.level = self.target;
                    }
                }
            }
            EnvelopeStage::Release => {
                self.level += self.rate;
            }
        }

        self.level = self.level.clamp(0.0, 1.0);
        self.level
    }

    /// Snap to the previous stage's target and set up the rate for a decay stage.
    fn enter_decay(
        &mut self,
        stage: EnvelopeStage,
        params: &OperatorParams,
        rate_scale: f64,
        sample_rate: f64,
    ) {
        let index = stage.index();
        self.level = self.target;
        self.stage = stage;
        self.samples_in_stage = 0;

        let level_diff = params.env_levels[index - 1] as i32 - params.env_levels[index] as i32;
        let time = scaled_stage_time(params, stage, level_diff, rate_scale);
        self.rate = if level_diff == 0 {
            0.0
        } else if time > 0.0 {
            -(level_diff as f64) / (99.0 * time * sample_rate)
        } else {
            // instantaneous stage: cross the whole level range in one sample
            -(level_diff.signum() as f64)
        };
        self.target = params.env_levels[index] as f64 / 99.0;
    }
}

// -------------------------------------------------------------------------------------------------

/// Stage time after keyboard rate scaling.
///
/// `rate_scale` is signed (negative below middle C), so the scaling divisor can reach
/// zero or below for deep notes with maximal rate scaling. Such stages are treated as
/// instantaneous by returning a zero time.
fn scaled_stage_time(
    params: &OperatorParams,
    stage: EnvelopeStage,
    level_diff: i32,
    rate_scale: f64,
) -> f64 {
    let time = rate_to_time(params.env_rates[stage.index()], level_diff);
    let divisor = 1.0 + rate_scale * (params.key_rate_scaling as f64 / 7.0);
    if divisor <= 0.0 {
        0.0
    } else {
        time / divisor
    }
}

// -------------------------------------------------------------------------------------------------
