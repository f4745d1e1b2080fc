//! Shared MIDI controller state, readable from the audio thread without locks.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::utils::{midi_to_bipolar, midi_to_unipolar};

// -------------------------------------------------------------------------------------------------

/// An `f32` stored in an `AtomicU32` via its bit pattern, so every controller field
/// can be read and written from different threads without torn values.
#[derive(Debug)]
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline(always)]
    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline(always)]
    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

// -------------------------------------------------------------------------------------------------

/// Current values of all continuous and switch controllers on the engine's MIDI channel.
///
/// The MIDI ingress thread is the only writer, the audio thread reads single fields per
/// sample with relaxed atomics. There is no cross-field consistency guarantee, which is
/// fine: each field is an independent control signal.
#[derive(Debug)]
pub struct Controllers {
    /// Normalized pitch bend in [-1, 1], mapped to ±2 semitones by the voices.
    pitch_bend: AtomicF32,
    mod_wheel: AtomicF32,
    breath: AtomicF32,
    foot: AtomicF32,
    volume: AtomicF32,
    expression: AtomicF32,
    /// Pan position in [-1, 1]. Recognized but inert: the engine output is mono.
    pan: AtomicF32,
    sustain_pedal: AtomicBool,
    /// Portamento switch. Recognized but inert in this version.
    portamento: AtomicBool,
    /// Last received program change. Recorded only.
    program: AtomicU8,
    /// Last received channel pressure, normalized. Recorded only.
    channel_pressure: AtomicF32,
    /// Raw normalized values for all 128 control change numbers.
    raw: [AtomicF32; 128],
}

impl Controllers {
    pub fn new() -> Self {
        let controllers = Self {
            pitch_bend: AtomicF32::new(0.0),
            mod_wheel: AtomicF32::new(0.0),
            breath: AtomicF32::new(0.0),
            foot: AtomicF32::new(0.0),
            volume: AtomicF32::new(1.0),
            expression: AtomicF32::new(1.0),
            pan: AtomicF32::new(0.0),
            sustain_pedal: AtomicBool::new(false),
            portamento: AtomicBool::new(false),
            program: AtomicU8::new(0),
            channel_pressure: AtomicF32::new(0.0),
            raw: std::array::from_fn(|_| AtomicF32::new(0.0)),
        };
        controllers.raw[crate::midi::cc::VOLUME as usize].store(1.0);
        controllers.raw[crate::midi::cc::EXPRESSION as usize].store(1.0);
        controllers
    }

    /// Reset everything to power-on defaults, keeping volume and expression at full.
    pub fn reset(&self) {
        self.pitch_bend.store(0.0);
        self.mod_wheel.store(0.0);
        self.breath.store(0.0);
        self.foot.store(0.0);
        self.volume.store(1.0);
        self.expression.store(1.0);
        self.pan.store(0.0);
        self.sustain_pedal.store(false, Ordering::Relaxed);
        self.portamento.store(false, Ordering::Relaxed);
        self.channel_pressure.store(0.0);
        for (index, value) in self.raw.iter().enumerate() {
            let default = match index as u8 {
                crate::midi::cc::VOLUME | crate::midi::cc::EXPRESSION => 1.0,
                _ => 0.0,
            };
            value.store(default);
        }
    }

    // ---------------------------------------------------------------------------------------------

    pub fn pitch_bend(&self) -> f32 {
        self.pitch_bend.load()
    }
    /// Set pitch bend from a raw 14-bit MIDI value (0..=16383, center 8192).
    pub fn set_pitch_bend_14bit(&self, value: u16) {
        self.pitch_bend.store((value as f32 - 8192.0) / 8192.0);
    }

    pub fn mod_wheel(&self) -> f32 {
        self.mod_wheel.load()
    }
    pub fn set_mod_wheel(&self, value: u8) {
        self.mod_wheel.store(midi_to_unipolar(value));
    }

    pub fn breath(&self) -> f32 {
        self.breath.load()
    }
    pub fn set_breath(&self, value: u8) {
        self.breath.store(midi_to_unipolar(value));
    }

    pub fn foot(&self) -> f32 {
        self.foot.load()
    }
    pub fn set_foot(&self, value: u8) {
        self.foot.store(midi_to_unipolar(value));
    }

    pub fn volume(&self) -> f32 {
        self.volume.load()
    }
    pub fn set_volume(&self, value: u8) {
        self.volume.store(midi_to_unipolar(value));
    }

    pub fn expression(&self) -> f32 {
        self.expression.load()
    }
    pub fn set_expression(&self, value: u8) {
        self.expression.store(midi_to_unipolar(value));
    }

    pub fn pan(&self) -> f32 {
        self.pan.load()
    }
    pub fn set_pan(&self, value: u8) {
        self.pan.store(midi_to_bipolar(value));
    }

    pub fn sustain_pedal(&self) -> bool {
        self.sustain_pedal.load(Ordering::Relaxed)
    }
    pub fn set_sustain_pedal(&self, pressed: bool) {
        self.sustain_pedal.store(pressed, Ordering::Relaxed);
    }

    pub fn portamento(&self) -> bool {
        self.portamento.load(Ordering::Relaxed)
    }
    pub fn set_portamento(&self, on: bool) {
        self.portamento.store(on, Ordering::Relaxed);
    }

    pub fn program(&self) -> u8 {
        self.program.load(Ordering::Relaxed)
    }
    pub fn set_program(&self, program: u8) {
        self.program.store(program, Ordering::Relaxed);
    }

    pub fn channel_pressure(&self) -> f32 {
        self.channel_pressure.load()
    }
    pub fn set_channel_pressure(&self, value: u8) {
        self.channel_pressure.store(midi_to_unipolar(value));
    }

    /// Raw normalized value of any control change number.
    pub fn raw(&self, controller: u8) -> f32 {
        self.raw[(controller & 0x7F) as usize].load()
    }
    pub fn set_raw(&self, controller: u8, value: u8) {
        self.raw[(controller & 0x7F) as usize].store(midi_to_unipolar(value));
    }
}

impl Default for Controllers {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------

/// A plain copy of the semantic controller fields, for statistics and debugging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSnapshot {
    pub pitch_bend: f32,
    pub mod_wheel: f32,
    pub breath: f32,
    pub foot: f32,
    pub volume: f32,
    pub expression: f32,
    pub pan: f32,
    pub sustain_pedal: bool,
    pub portamento: bool,
    pub program: u8,
    pub channel_pressure: f32,
}

impl Controllers {
    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            pitch_bend: self.pitch_bend(),
            mod_wheel: self.mod_wheel(),
            breath: self.breath(),
            foot: self.foot(),
            volume: self.volume(),
            expression: self.expression(),
            pan: self.pan(),
            sustain_pedal: self.sustain_pedal(),
            portamento: self.portamento(),
            program: self.program(),
            channel_pressure: self.channel_pressure(),
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let controllers = Controllers::new();
        assert_eq!(controllers.volume(), 1.0);
        assert_eq!(controllers.expression(), 1.0);
        assert_eq!(controllers.pitch_bend(), 0.0);
        assert_eq!(controllers.mod_wheel(), 0.0);
        assert!(!controllers.sustain_pedal());
        assert_eq!(controllers.raw(crate::midi::cc::VOLUME), 1.0);
        assert_eq!(controllers.raw(crate::midi::cc::EXPRESSION), 1.0);
        assert_eq!(controllers.raw(crate::midi::cc::MOD_WHEEL), 0.0);
    }

    #[test]
    fn pitch_bend_mapping() {
        let controllers = Controllers::new();
        controllers.set_pitch_bend_14bit(8192);
        assert_eq!(controllers.pitch_bend(), 0.0);
        controllers.set_pitch_bend_14bit(0);
        assert_eq!(controllers.pitch_bend(), -1.0);
        controllers.set_pitch_bend_14bit(16383);
        assert!((controllers.pitch_bend() - 1.0).abs() < 0.001);
    }

    #[test]
    fn reset_keeps_volume_and_expression() {
        let controllers = Controllers::new();
        controllers.set_mod_wheel(127);
        controllers.set_volume(20);
        controllers.set_sustain_pedal(true);
        controllers.set_raw(33, 127);
        controllers.reset();
        assert_eq!(controllers.mod_wheel(), 0.0);
        assert_eq!(controllers.volume(), 1.0);
        assert_eq!(controllers.expression(), 1.0);
        assert!(!controllers.sustain_pedal());
        assert_eq!(controllers.raw(33), 0.0);
        assert_eq!(controllers.raw(crate::midi::cc::VOLUME), 1.0);
    }

    #[test]
    fn snapshot_reflects_state() {
        let controllers = Controllers::new();
        controllers.set_mod_wheel(127);
        controllers.set_pan(127);
        let snapshot = controllers.snapshot();
        assert_eq!(snapshot.mod_wheel, 1.0);
        assert_eq!(snapshot.pan, 1.0);
        assert_eq!(snapshot.volume, 1.0);
    }
}
