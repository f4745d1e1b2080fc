//! In-memory patch model: the complete, playback-immutable parameter set of a voice.

use std::path::Path;

use crate::{synth::lfo::LfoWaveform, Error};

// -------------------------------------------------------------------------------------------------

pub mod file;
pub mod sysex;

// -------------------------------------------------------------------------------------------------

/// Number of FM operators per voice.
pub const OPERATOR_COUNT: usize = 6;

/// Number of amplitude envelope stages (attack, decay 1, decay 2, release).
pub const ENVELOPE_STAGE_COUNT: usize = 4;

/// Number of selectable FM routing topologies.
pub const ALGORITHM_COUNT: u8 = 32;

// -------------------------------------------------------------------------------------------------

/// Keyboard level scaling curve shapes, selectable per side of the break point.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, strum::Display, strum::EnumString, strum::VariantNames,
)]
pub enum ScalingCurve {
    /// Level falls off linearly with distance from the break point.
    #[default]
    #[strum(serialize = "Linear Down")]
    LinearDown,
    /// Level falls off exponentially.
    #[strum(serialize = "Exp Down")]
    ExpDown,
    /// Level rises exponentially.
    #[strum(serialize = "Exp Up")]
    ExpUp,
    /// Level rises linearly.
    #[strum(serialize = "Linear Up")]
    LinearUp,
}

impl ScalingCurve {
    /// Curve for a raw patch value 0..=3. Out-of-range values fall back to linear-down.
    pub fn from_index(index: u8) -> Self {
        match index {
            1 => Self::ExpDown,
            2 => Self::ExpUp,
            3 => Self::LinearUp,
            _ => Self::LinearDown,
        }
    }

    /// The raw patch value of this curve.
    pub fn to_index(self) -> u8 {
        match self {
            Self::LinearDown => 0,
            Self::ExpDown => 1,
            Self::ExpUp => 2,
            Self::LinearUp => 3,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// All playback-immutable parameters of a single FM operator.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorParams {
    /// Frequency as a multiple of the voice base frequency, 0.5..=31.99.
    pub freq_ratio: f64,
    /// Fine detune in -7..=7 steps, shifting the frequency by up to ±0.7%.
    pub detune: i8,
    /// Envelope stage rates 0..=99 (attack, decay 1, decay 2, release).
    pub env_rates: [u8; ENVELOPE_STAGE_COUNT],
    /// Envelope stage target levels 0..=99.
    pub env_levels: [u8; ENVELOPE_STAGE_COUNT],
    /// Output level 0..=99.
    pub output_level: u8,
    /// Velocity sensitivity 0..=7. At 0 velocity has no effect on this operator.
    pub key_vel_sens: u8,
    /// Keyboard level scaling break point as a MIDI note number.
    pub break_point: u8,
    /// Scaling depth 0..=99 below the break point.
    pub left_depth: u8,
    /// Scaling depth 0..=99 above the break point.
    pub right_depth: u8,
    pub left_curve: ScalingCurve,
    pub right_curve: ScalingCurve,
    /// Keyboard rate scaling 0..=7: how strongly envelope rates speed up with pitch.
    pub key_rate_scaling: u8,
    /// Oscillator key sync flag. Carried for patch compatibility, phases are always
    /// reset at note-on.
    pub osc_sync: bool,
}

impl Default for OperatorParams {
    fn default() -> Self {
        Self {
            freq_ratio: 1.0,
            detune: 0,
            env_rates: [99, 99, 99, 99],
            env_levels: [99, 99, 99, 0],
            output_level: 0,
            key_vel_sens: 0,
            break_point: 60,
            left_depth: 0,
            right_depth: 0,
            left_curve: ScalingCurve::LinearDown,
            right_curve: ScalingCurve::LinearDown,
            key_rate_scaling: 0,
            osc_sync: false,
        }
    }
}

impl OperatorParams {
    /// Validate all parameters. Returns Error::ParameterError on errors.
    pub fn validate(&self) -> Result<(), Error> {
        if !(0.5..=31.99).contains(&self.freq_ratio) || self.freq_ratio.is_nan() {
            return Err(Error::ParameterError(format!(
                "operator 'freq_ratio' value is '{}' (expecting 0.5..=31.99)",
                self.freq_ratio
            )));
        }
        if !(-7..=7).contains(&self.detune) {
            return Err(Error::ParameterError(format!(
                "operator 'detune' value is '{}' (expecting -7..=7)",
                self.detune
            )));
        }
        for (name, values) in [("env_rates", &self.env_rates), ("env_levels", &self.env_levels)] {
            if values.iter().any(|v| *v > 99) {
                return Err(Error::ParameterError(format!(
                    "operator '{name}' values are '{values:?}' (expecting 0..=99)"
                )));
            }
        }
        for (name, value, max) in [
            ("output_level", self.output_level, 99),
            ("key_vel_sens", self.key_vel_sens, 7),
            ("break_point", self.break_point, 127),
            ("left_depth", self.left_depth, 99),
            ("right_depth", self.right_depth, 99),
            ("key_rate_scaling", self.key_rate_scaling, 7),
        ] {
            if value > max {
                return Err(Error::ParameterError(format!(
                    "operator '{name}' value is '{value}' (expecting 0..={max})"
                )));
            }
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Per-voice low frequency oscillator parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LfoParams {
    /// Speed 0..=99, mapping to roughly 0..=6 Hz.
    pub speed: u8,
    /// Onset delay 0..=99. Carried for patch compatibility, not evaluated yet.
    pub delay: u8,
    /// Pitch modulation depth 0..=99.
    pub pitch_depth: u8,
    /// Amplitude modulation depth 0..=99.
    pub amp_depth: u8,
    /// When set, the LFO phase restarts at every note-on.
    pub key_sync: bool,
    pub waveform: LfoWaveform,
    /// Pitch modulation sensitivity 0..=7.
    pub pitch_mod_sens: u8,
}

impl Default for LfoParams {
    fn default() -> Self {
        Self {
            speed: 35,
            delay: 0,
            pitch_depth: 0,
            amp_depth: 0,
            key_sync: true,
            waveform: LfoWaveform::Sine,
            pitch_mod_sens: 0,
        }
    }
}

impl LfoParams {
    /// Validate all parameters. Returns Error::ParameterError on errors.
    pub fn validate(&self) -> Result<(), Error> {
        for (name, value, max) in [
            ("lfo speed", self.speed, 99),
            ("lfo delay", self.delay, 99),
            ("lfo pitch_depth", self.pitch_depth, 99),
            ("lfo amp_depth", self.amp_depth, 99),
            ("lfo pitch_mod_sens", self.pitch_mod_sens, 7),
        ] {
            if value > max {
                return Err(Error::ParameterError(format!(
                    "'{name}' value is '{value}' (expecting 0..={max})"
                )));
            }
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// A complete six-operator FM patch.
///
/// Patches are immutable while an engine plays them: every mutable runtime quantity
/// lives in the voices, never here.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    /// Display name. SysEx transfers carry the first 10 characters only.
    pub name: String,
    pub operators: [OperatorParams; OPERATOR_COUNT],
    /// Routing topology 1..=32.
    pub algorithm: u8,
    /// Operator 1 self-modulation depth 0..=7.
    pub feedback: u8,
    pub lfo: LfoParams,
    /// Pitch envelope rates 0..=99. Carried for patch compatibility, not evaluated yet.
    pub pitch_env_rates: [u8; ENVELOPE_STAGE_COUNT],
    /// Pitch envelope levels 0..=50. Carried for patch compatibility, not evaluated yet.
    pub pitch_env_levels: [u8; ENVELOPE_STAGE_COUNT],
    /// Transpose in semitones, -24..=24.
    pub transpose: i8,
}

impl Default for Patch {
    /// A simple "INIT VOICE": operator 1 as the only audible carrier at ratio 1.0
    /// with an organ-like instant envelope.
    fn default() -> Self {
        let mut operators: [OperatorParams; OPERATOR_COUNT] = Default::default();
        operators[0].output_level = 99;
        Self {
            name: "INIT VOICE".to_string(),
            operators,
            algorithm: 1,
            feedback: 0,
            lfo: LfoParams::default(),
            pitch_env_rates: [99; ENVELOPE_STAGE_COUNT],
            pitch_env_levels: [50; ENVELOPE_STAGE_COUNT],
            transpose: 0,
        }
    }
}

impl Patch {
    /// Parse a patch from the plain-text `KEY = VALUE` format.
    pub fn parse(text: &str) -> Result<Self, Error> {
        file::parse_patch(text)
    }

    /// Load a patch from a plain-text `KEY = VALUE` patch file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        file::load_patch(path.as_ref())
    }

    /// Decode a patch from a 163-byte SysEx voice frame.
    pub fn from_sysex(frame: &[u8]) -> Result<Self, Error> {
        sysex::decode(frame)
    }

    /// Encode this patch into a 163-byte SysEx voice frame for the given
    /// 0-based MIDI channel.
    pub fn to_sysex(&self, channel: u8) -> Result<[u8; sysex::FRAME_LEN], Error> {
        sysex::encode(self, channel)
    }

    /// Validate all parameters. Returns Error::ParameterError on errors.
    pub fn validate(&self) -> Result<(), Error> {
        if !(1..=ALGORITHM_COUNT).contains(&self.algorithm) {
            return Err(Error::ParameterError(format!(
                "patch 'algorithm' value is '{}' (expecting 1..=32)",
                self.algorithm
            )));
        }
        if self.feedback > 7 {
            return Err(Error::ParameterError(format!(
                "patch 'feedback' value is '{}' (expecting 0..=7)",
                self.feedback
            )));
        }
        if !(-24..=24).contains(&self.transpose) {
            return Err(Error::ParameterError(format!(
                "patch 'transpose' value is '{}' (expecting -24..=24)",
                self.transpose
            )));
        }
        if self.pitch_env_rates.iter().any(|r| *r > 99) {
            return Err(Error::ParameterError(format!(
                "patch 'pitch_env_rates' values are '{:?}' (expecting 0..=99)",
                self.pitch_env_rates
            )));
        }
        if self.pitch_env_levels.iter().any(|l| *l > 50) {
            return Err(Error::ParameterError(format!(
                "patch 'pitch_env_levels' values are '{:?}' (expecting 0..=50)",
                self.pitch_env_levels
            )));
        }
        self.lfo.validate()?;
        for operator in &self.operators {
            operator.validate()?;
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_patch_is_valid() {
        let patch = Patch::default();
        assert!(patch.validate().is_ok());
        assert_eq!(patch.operators[0].output_level, 99);
        assert_eq!(patch.operators[1].output_level, 0);
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut patch = Patch::default();
        patch.algorithm = 0;
        assert!(patch.validate().is_err());

        let mut patch = Patch::default();
        patch.algorithm = 33;
        assert!(patch.validate().is_err());

        let mut patch = Patch::default();
        patch.feedback = 8;
        assert!(patch.validate().is_err());

        let mut patch = Patch::default();
        patch.transpose = 25;
        assert!(patch.validate().is_err());

        let mut patch = Patch::default();
        patch.operators[3].freq_ratio = 0.2;
        assert!(patch.validate().is_err());

        let mut patch = Patch::default();
        patch.operators[5].detune = -8;
        assert!(patch.validate().is_err());

        let mut patch = Patch::default();
        patch.operators[2].env_rates[1] = 100;
        assert!(patch.validate().is_err());

        let mut patch = Patch::default();
        patch.lfo.speed = 100;
        assert!(patch.validate().is_err());
    }

    #[test]
    fn scaling_curve_index_round_trip() {
        for index in 0..4 {
            assert_eq!(ScalingCurve::from_index(index).to_index(), index);
        }
        // out of range values fall back to linear-down
        assert_eq!(ScalingCurve::from_index(7), ScalingCurve::LinearDown);
    }

    #[test]
    fn scaling_curve_names() {
        assert_eq!(ScalingCurve::ExpUp.to_string(), "Exp Up");
        use std::str::FromStr;
        assert_eq!(
            ScalingCurve::from_str("Linear Up").unwrap(),
            ScalingCurve::LinearUp
        );
    }
}
