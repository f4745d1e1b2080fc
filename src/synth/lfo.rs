//! Per-voice low frequency oscillator for amplitude and pitch modulation.

use std::f64::consts::TAU;

use rand::{rngs::SmallRng, Rng, SeedableRng};

// -------------------------------------------------------------------------------------------------

/// Waveform types for the voice LFO, in patch storage order.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, strum::Display, strum::EnumString, strum::VariantNames,
)]
pub enum LfoWaveform {
    #[default]
    Sine,
    Triangle,
    #[strum(serialize = "Saw Up")]
    SawUp,
    #[strum(serialize = "Saw Down")]
    SawDown,
    Square,
    #[strum(serialize = "Sample & Hold")]
    SampleHold,
}

impl LfoWaveform {
    /// Waveform for a raw patch value 0..=5. Out-of-range values fall back to sine.
    pub fn from_index(index: u8) -> Self {
        match index {
            1 => Self::Triangle,
            2 => Self::SawUp,
            3 => Self::SawDown,
            4 => Self::Square,
            5 => Self::SampleHold,
            _ => Self::Sine,
        }
    }

    /// The raw patch value of this waveform.
    pub fn to_index(self) -> u8 {
        match self {
            Self::Sine => 0,
            Self::Triangle => 1,
            Self::SawUp => 2,
            Self::SawDown => 3,
            Self::Square => 4,
            Self::SampleHold => 5,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Simple non bandlimited oscillator, advanced once per sample at audio rate.
///
/// Output is bipolar in [-1, 1] for all waveforms.
#[derive(Debug, Clone)]
pub struct Lfo {
    phase: f64,
    phase_inc: f64,
    waveform: LfoWaveform,
    sample_hold_value: f64,
    rng: SmallRng,
}

impl Default for Lfo {
    fn default() -> Self {
        Self::new(44100.0, 1.0, LfoWaveform::Sine)
    }
}

impl Lfo {
    pub fn new(sample_rate: f64, rate_hz: f64, waveform: LfoWaveform) -> Self {
        let mut rng = SmallRng::from_os_rng();
        let sample_hold_value = rng.random::<f64>() * 2.0 - 1.0;
        Self {
            phase: 0.0,
            phase_inc: rate_hz / sample_rate,
            waveform,
            sample_hold_value,
            rng,
        }
    }

    /// Current normalized phase in [0, 1).
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Set a new rate in Hz with the given sample rate.
    pub fn set_rate(&mut self, sample_rate: f64, rate_hz: f64) {
        self.phase_inc = rate_hz / sample_rate;
    }

    /// Set or reset the LFO's phase (normalized [0, 1]).
    pub fn set_phase(&mut self, phase: f64) {
        self.phase = phase.rem_euclid(1.0);
    }

    /// Set the waveform type.
    pub fn set_waveform(&mut self, waveform: LfoWaveform) {
        self.waveform = waveform;
    }

    /// Advances phase and returns the new value.
    pub fn run(&mut self) -> f64 {
        let value = match self.waveform {
            LfoWaveform::Sine => (TAU * self.phase).sin(),
            LfoWaveform::Triangle => {
                if self.phase < 0.25 {
                    self.phase * 4.0
                } else if self.phase < 0.75 {
                    2.0 - self.phase * 4.0
                } else {
                    self.phase * 4.0 - 4.0
                }
            }
            LfoWaveform::SawUp => self.phase * 2.0 - 1.0,
            LfoWaveform::SawDown => 1.0 - self.phase * 2.0,
            LfoWaveform::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            LfoWaveform::SampleHold => self.sample_hold_value,
        };

        self.phase += self.phase_inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
            // pick the next held value on phase wrap
            self.sample_hold_value = self.rng.random::<f64>() * 2.0 - 1.0;
        }

        value
    }
}

// -------------------------------------------------------------------------------------------------
