#![allow(dead_code)]

// -------------------------------------------------------------------------------------------------

/// Convert a MIDI note number to a frequency in Hz with A4 (note 69) at 440 Hz.
pub fn midi_note_to_hz(note: u8) -> f64 {
    440.0 * 2.0_f64.powf((note as f64 - 69.0) / 12.0)
}

// -------------------------------------------------------------------------------------------------

/// Convert a MIDI note number to a frequency in Hz, applying a normalized pitch bend
/// value in range [-1, 1] which maps to ±2 semitones.
pub fn midi_note_to_hz_with_bend(note: u8, bend: f64) -> f64 {
    midi_note_to_hz(note) * 2.0_f64.powf(bend * 2.0 / 12.0)
}

// -------------------------------------------------------------------------------------------------

/// Convert a 7-bit MIDI value (0-127) to a unipolar float in range [0, 1].
pub fn midi_to_unipolar(value: u8) -> f32 {
    value as f32 / 127.0
}

/// Convert a 7-bit MIDI value (0-127) to a bipolar float in range [-1, 1].
pub fn midi_to_bipolar(value: u8) -> f32 {
    (value as f32 / 127.0) * 2.0 - 1.0
}

// -------------------------------------------------------------------------------------------------

/// Softly limit a sample to the [-1, 1] range with a tanh shaper.
///
/// Below roughly half scale the curve is nearly linear, so signals that already fit
/// pass through mostly untouched.
pub fn soft_clip(sample: f32) -> f32 {
    sample.tanh()
}

// -------------------------------------------------------------------------------------------------

/// Add an offset into a MIDI note number, clamping the result to the valid 0-127 range.
pub fn transposed_note(note: u8, transpose: i8) -> u8 {
    (note as i16 + transpose as i16).clamp(0, 127) as u8
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_to_hz() {
        assert!((midi_note_to_hz(69) - 440.0).abs() < 1e-9);
        assert!((midi_note_to_hz(81) - 880.0).abs() < 1e-9);
        assert!((midi_note_to_hz(57) - 220.0).abs() < 1e-9);
        // middle C
        assert!((midi_note_to_hz(60) - 261.6255653005986).abs() < 1e-6);
    }

    #[test]
    fn note_to_hz_with_bend() {
        // center: no bend
        assert!((midi_note_to_hz_with_bend(69, 0.0) - 440.0).abs() < 1e-9);
        // full bend up: two semitones
        let expected = 440.0 * 2.0_f64.powf(2.0 / 12.0);
        assert!((midi_note_to_hz_with_bend(69, 1.0) - expected).abs() < 1e-6);
        // full bend down: two semitones
        let expected = 440.0 * 2.0_f64.powf(-2.0 / 12.0);
        assert!((midi_note_to_hz_with_bend(69, -1.0) - expected).abs() < 1e-6);
    }

    #[test]
    fn midi_value_conversion() {
        assert_eq!(midi_to_unipolar(0), 0.0);
        assert_eq!(midi_to_unipolar(127), 1.0);
        assert_eq!(midi_to_bipolar(0), -1.0);
        assert_eq!(midi_to_bipolar(127), 1.0);
        assert!(midi_to_bipolar(64).abs() < 0.01);
    }

    #[test]
    fn soft_clip_limits() {
        assert!(soft_clip(10.0) <= 1.0);
        assert!(soft_clip(-10.0) >= -1.0);
        // nearly linear at low levels
        assert!((soft_clip(0.1) - 0.1).abs() < 0.001);
    }

    #[test]
    fn transpose_clamps() {
        assert_eq!(transposed_note(60, 12), 72);
        assert_eq!(transposed_note(60, -24), 36);
        assert_eq!(transposed_note(120, 24), 127);
        assert_eq!(transposed_note(10, -24), 0);
    }
}
