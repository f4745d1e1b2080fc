//! One polyphonic note in flight: six operator states, an LFO and a base frequency.

use crate::{
    patch::{Patch, OPERATOR_COUNT},
    synth::{
        algorithm::{self, FeedbackMode},
        lfo::Lfo,
        operator::Operator,
    },
    utils::{midi_note_to_hz, midi_note_to_hz_with_bend, transposed_note},
};

// -------------------------------------------------------------------------------------------------

/// A single voice of the polyphonic pool.
///
/// All mutable runtime state of a sounding note lives here. The audio thread owns every
/// field after allocation: it advances phases and envelopes and eventually deactivates
/// the voice once all envelopes have decayed away.
#[derive(Debug, Clone)]
pub struct Voice {
    active: bool,
    midi_note: u8,
    velocity: u8,
    channel: u8,
    /// Allocation sequence number, used as the LRU key for voice stealing.
    note_on_order: u64,
    /// Set when a note-off arrived while the sustain pedal was down. The release is
    /// deferred until the pedal comes back up.
    sustain_held: bool,
    operators: [Operator; OPERATOR_COUNT],
    lfo: Lfo,
    base_freq: f64,
    sample_rate: f64,
}

impl Voice {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            active: false,
            midi_note: 0,
            velocity: 0,
            channel: 0,
            note_on_order: 0,
            sustain_held: false,
            operators: Default::default(),
            lfo: Lfo::new(sample_rate, 1.0, Default::default()),
            base_freq: 440.0,
            sample_rate,
        }
    }

    #[inline(always)]
    pub fn active(&self) -> bool {
        self.active
    }

    #[inline(always)]
    pub fn midi_note(&self) -> u8 {
        self.midi_note
    }

    #[inline(always)]
    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    #[inline(always)]
    pub fn channel(&self) -> u8 {
        self.channel
    }

    #[inline(always)]
    pub fn note_on_order(&self) -> u64 {
        self.note_on_order
    }

    #[inline(always)]
    pub fn sustain_held(&self) -> bool {
        self.sustain_held
    }

    #[inline(always)]
    pub fn base_freq(&self) -> f64 {
        self.base_freq
    }

    /// Start a new note on this voice, stealing it if it was still sounding.
    ///
    /// `order` is a monotonically increasing allocation counter: the pool steals the
    /// voice with the smallest order when it runs out of free voices.
    pub fn note_on(&mut self, patch: &Patch, note: u8, velocity: u8, channel: u8, order: u64) {
        self.active = true;
        self.midi_note = note;
        self.velocity = velocity;
        self.channel = channel;
        self.note_on_order = order;
        self.sustain_held = false;

        let sounding_note = transposed_note(note, patch.transpose);
        self.base_freq = midi_note_to_hz(sounding_note);
        self.lfo.set_waveform(patch.lfo.waveform);
        if patch.lfo.key_sync {
            self.lfo.set_phase(0.0);
        }
        for (operator, params) in self.operators.iter_mut().zip(&patch.operators) {
            operator.note_on(params, sounding_note, self.base_freq, self.sample_rate);
        }
    }

    /// Handle a note-off: defer the release while the sustain pedal is held, else
    /// release right away.
    pub fn note_off(&mut self, patch: &Patch, sustain_pedal: bool) {
        if sustain_pedal {
            self.sustain_held = true;
        } else {
            self.release(patch);
        }
    }

    /// Send all six operator envelopes into their release stage.
    pub fn release(&mut self, patch: &Patch) {
        self.sustain_held = false;
        for (operator, params) in self.operators.iter_mut().zip(&patch.operators) {
            operator.release(params, self.sample_rate);
        }
    }

    /// Immediately silence and free the voice.
    pub fn kill(&mut self) {
        self.active = false;
        self.sustain_held = false;
    }

    /// True once every operator envelope has decayed below audibility, at which point
    /// the voice can be deactivated.
    pub fn is_finished(&self) -> bool {
        self.operators.iter().all(|op| op.env().is_silent())
    }

    /// Re-derive all operator frequencies from the current pitch bend. Called once per
    /// sample from the render path, so bends take effect immediately.
    #[inline]
    pub fn apply_pitch_bend(&mut self, patch: &Patch, bend: f64) {
        let sounding_note = transposed_note(self.midi_note, patch.transpose);
        self.base_freq = midi_note_to_hz_with_bend(sounding_note, bend);
        for (operator, params) in self.operators.iter_mut().zip(&patch.operators) {
            operator.set_base_freq(params, self.base_freq);
        }
    }

    /// Advance the voice by one sample and return its mono output.
    ///
    /// `lfo_rate_scale` scales the patch LFO speed (the engine derives it from the mod
    /// wheel; pass 1.0 for the patch's nominal speed).
    #[inline]
    pub fn process(&mut self, patch: &Patch, lfo_rate_scale: f64, feedback_mode: FeedbackMode) -> f64 {
        let lfo_hz = patch.lfo.speed as f64 / 99.0 * 6.0 * lfo_rate_scale;
        self.lfo.set_rate(self.sample_rate, lfo_hz);
        let lfo_value = self.lfo.run();

        let velocity = self.velocity as f64 / 127.0;

        // classic feedback needs last sample's output before the operators overwrite it
        let previous_output = self.operators[0].output();

        let mut sines = [0.0; OPERATOR_COUNT];
        let mut levels = [0.0; OPERATOR_COUNT];
        for (index, (operator, params)) in
            self.operators.iter_mut().zip(&patch.operators).enumerate()
        {
            let (sine, level) =
                operator.run(params, &patch.lfo, velocity, lfo_value, self.sample_rate);
            sines[index] = sine;
            levels[index] = level;
        }

        let feedback_source = match feedback_mode {
            FeedbackMode::Scaled => self.operators[0].output(),
            FeedbackMode::Classic => previous_output,
        };
        let feedback_phase = feedback_source * patch.feedback as f64 / 7.0 * 0.1;

        algorithm::process(patch.algorithm, &sines, &levels, feedback_phase)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f64 = 48000.0;

    fn render(voice: &mut Voice, patch: &Patch, samples: usize) -> Vec<f64> {
        (0..samples)
            .map(|_| voice.process(patch, 1.0, FeedbackMode::Scaled))
            .collect()
    }

    fn rms(samples: &[f64]) -> f64 {
        (samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64).sqrt()
    }

    #[test]
    fn note_on_initializes_voice_state() {
        let patch = Patch::default();
        let mut voice = Voice::new(SAMPLE_RATE);
        assert!(!voice.active());
        voice.note_on(&patch, 69, 100, 0, 7);
        assert!(voice.active());
        assert_eq!(voice.midi_note(), 69);
        assert_eq!(voice.velocity(), 100);
        assert_eq!(voice.note_on_order(), 7);
        assert!(!voice.sustain_held());
        assert!((voice.base_freq() - 440.0).abs() < 1e-9);
    }

    #[test]
    fn transpose_shifts_base_frequency() {
        let mut patch = Patch::default();
        patch.transpose = 12;
        let mut voice = Voice::new(SAMPLE_RATE);
        voice.note_on(&patch, 69, 100, 0, 0);
        assert!((voice.base_freq() - 880.0).abs() < 1e-9);
    }

    #[test]
    fn carrier_patch_produces_audio() {
        let patch = Patch::default();
        let mut voice = Voice::new(SAMPLE_RATE);
        voice.note_on(&patch, 60, 100, 0, 0);
        let samples = render(&mut voice, &patch, 1024);
        assert!(rms(&samples) > 0.05);
        assert!(samples.iter().all(|s| s.abs() <= 2.0));
    }

    #[test]
    fn release_decays_to_silence() {
        let patch = Patch::default();
        let mut voice = Voice::new(SAMPLE_RATE);
        voice.note_on(&patch, 60, 100, 0, 0);
        render(&mut voice, &patch, 1024);
        assert!(!voice.is_finished());
        voice.release(&patch);
        // instant release rates decay within a few hundred samples
        render(&mut voice, &patch, 4096);
        assert!(voice.is_finished());
    }

    #[test]
    fn note_off_with_sustain_defers_release() {
        let patch = Patch::default();
        let mut voice = Voice::new(SAMPLE_RATE);
        voice.note_on(&patch, 60, 100, 0, 0);
        render(&mut voice, &patch, 256);
        voice.note_off(&patch, true);
        assert!(voice.sustain_held());
        render(&mut voice, &patch, 1024);
        assert!(!voice.is_finished());
        // pedal up: the deferred release finally runs
        voice.release(&patch);
        assert!(!voice.sustain_held());
        render(&mut voice, &patch, 4096);
        assert!(voice.is_finished());
    }

    #[test]
    fn pitch_bend_raises_the_pitch() {
        let patch = Patch::default();

        let mut measure = |bend: f64| {
            let mut voice = Voice::new(SAMPLE_RATE);
            voice.note_on(&patch, 69, 100, 0, 0);
            let mut crossings = 0;
            let mut previous = 0.0;
            for index in 0..SAMPLE_RATE as usize {
                voice.apply_pitch_bend(&patch, bend);
                let sample = voice.process(&patch, 1.0, FeedbackMode::Scaled);
                if index > 0 && previous < 0.0 && sample >= 0.0 {
                    crossings += 1;
                }
                previous = sample;
            }
            crossings as f64
        };

        let centered = measure(0.0);
        let bent = measure(1.0);
        assert!((centered - 440.0).abs() <= 1.0);
        // +2 semitones: 440 Hz -> ~493.9 Hz
        assert!((bent - 493.88).abs() <= 2.0);
    }

    #[test]
    fn feedback_modes_differ_audibly() {
        let mut patch = Patch::default();
        patch.feedback = 7;

        let mut scaled_voice = Voice::new(SAMPLE_RATE);
        scaled_voice.note_on(&patch, 60, 100, 0, 0);
        let mut classic_voice = Voice::new(SAMPLE_RATE);
        classic_voice.note_on(&patch, 60, 100, 0, 0);

        let mut max_difference: f64 = 0.0;
        for _ in 0..2048 {
            let scaled = scaled_voice.process(&patch, 1.0, FeedbackMode::Scaled);
            let classic = classic_voice.process(&patch, 1.0, FeedbackMode::Classic);
            max_difference = max_difference.max((scaled - classic).abs());
        }
        assert!(max_difference > 1e-6);
    }

    #[test]
    fn kill_frees_the_voice() {
        let patch = Patch::default();
        let mut voice = Voice::new(SAMPLE_RATE);
        voice.note_on(&patch, 60, 100, 0, 0);
        voice.note_off(&patch, true);
        voice.kill();
        assert!(!voice.active());
        assert!(!voice.sustain_held());
    }
}
