//! Bidirectional codec between a [`Patch`] and the packed 155-byte SysEx voice format.

use crate::{
    patch::{Patch, ScalingCurve, ENVELOPE_STAGE_COUNT},
    synth::lfo::LfoWaveform,
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Total size of a single-voice SysEx frame, including the F0/F7 framing bytes.
pub const FRAME_LEN: usize = 163;
/// Size of the packed voice data payload inside the frame.
pub const VOICE_DATA_LEN: usize = 155;

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;
const MANUFACTURER_ID: u8 = 0x43;
const FORMAT_SINGLE_VOICE: u8 = 0x00;
const BYTE_COUNT_MSB: u8 = 0x01;
const BYTE_COUNT_LSB: u8 = 0x1B;

/// Packed bytes per operator in the payload.
const OPERATOR_STRIDE: usize = 21;
/// Payload offset of the global (non-operator) parameter block.
const GLOBAL_OFFSET: usize = 126;
/// Characters of the patch name carried on the wire.
const NAME_LEN: usize = 10;

// -------------------------------------------------------------------------------------------------

/// Two's-complement 7-bit checksum over the voice data payload.
///
/// The sum of all payload bytes plus the checksum is 0 modulo 128.
pub fn checksum(payload: &[u8]) -> u8 {
    let sum: u32 = payload.iter().map(|b| *b as u32).sum();
    (128 - (sum & 0x7F) as u8) & 0x7F
}

// -------------------------------------------------------------------------------------------------

/// Split a frequency ratio into the wire's coarse (0..=31) and fine (0..=99) parts.
///
/// Ratios below 1.0 all collapse to coarse 0, the wire's 0.5 sub-harmonic marker, so
/// the conversion is lossy but stable under repeated round trips.
fn ratio_to_coarse_fine(ratio: f64) -> (u8, u8) {
    if ratio < 1.0 {
        (0, 0)
    } else {
        let coarse = (ratio as u32).min(31) as u8;
        // round, don't truncate: keeps decode(encode(..)) stable under repeated trips
        let fine = (((ratio - coarse as f64) * 99.0).round() as u8).min(99);
        (coarse, fine)
    }
}

/// Rebuild a frequency ratio from its wire parts. Coarse 0 means ratio 0.5.
fn coarse_fine_to_ratio(coarse: u8, fine: u8) -> f64 {
    if coarse == 0 {
        0.5
    } else {
        coarse as f64 + fine as f64 / 99.0
    }
}

// -------------------------------------------------------------------------------------------------

/// Encode a patch into a complete single-voice SysEx frame for the given 0-based
/// MIDI channel.
pub fn encode(patch: &Patch, channel: u8) -> Result<[u8; FRAME_LEN], Error> {
    if channel > 15 {
        return Err(Error::ParameterError(format!(
            "sysex 'channel' value is '{channel}' (expecting 0..=15)"
        )));
    }
    patch.validate()?;

    let mut frame = [0u8; FRAME_LEN];
    frame[0] = SYSEX_START;
    frame[1] = MANUFACTURER_ID;
    frame[2] = channel;
    frame[3] = FORMAT_SINGLE_VOICE;
    frame[4] = BYTE_COUNT_MSB;
    frame[5] = BYTE_COUNT_LSB;

    {
        let payload = &mut frame[6..6 + VOICE_DATA_LEN];

        // operators are stored in reverse order (6..1)
        for (slot, operator) in patch.operators.iter().rev().enumerate() {
            let base = slot * OPERATOR_STRIDE;
            payload[base..base + ENVELOPE_STAGE_COUNT].copy_from_slice(&operator.env_rates);
            payload[base + 4..base + 4 + ENVELOPE_STAGE_COUNT].copy_from_slice(&operator.env_levels);
            payload[base + 8] = operator.break_point;
            payload[base + 9] = operator.left_depth;
            payload[base + 10] = operator.right_depth;
            payload[base + 11] = operator.left_curve.to_index() & 0x03;
            payload[base + 12] =
                (operator.right_curve.to_index() & 0x03) | ((operator.key_rate_scaling & 0x07) << 2);
            payload[base + 13] = (operator.key_vel_sens & 0x07) << 2;
            payload[base + 14] = operator.output_level;
            let (coarse, fine) = ratio_to_coarse_fine(operator.freq_ratio);
            payload[base + 15] = (operator.osc_sync as u8) | ((coarse & 0x1F) << 1);
            payload[base + 16] = fine;
            let detune = (operator.detune + 7) as u8;
            payload[base + 17] = (operator.osc_sync as u8) | ((detune & 0x0F) << 1);
            // bytes 18..=20 stay reserved as zeros
        }

        payload[GLOBAL_OFFSET..GLOBAL_OFFSET + 4].copy_from_slice(&patch.pitch_env_rates);
        payload[GLOBAL_OFFSET + 4..GLOBAL_OFFSET + 8].copy_from_slice(&patch.pitch_env_levels);
        payload[134] = (patch.algorithm - 1) & 0x1F;
        payload[135] = patch.feedback & 0x07;
        payload[136] = patch.lfo.speed;
        payload[137] = patch.lfo.delay;
        payload[138] = patch.lfo.pitch_depth;
        payload[139] = patch.lfo.amp_depth;
        payload[140] = (patch.lfo.key_sync as u8)
            | ((patch.lfo.waveform.to_index() & 0x07) << 1)
            | ((patch.lfo.pitch_mod_sens & 0x07) << 4);
        payload[141] = (patch.transpose + 24) as u8 & 0x3F;
        for (index, byte) in payload[142..142 + NAME_LEN].iter_mut().enumerate() {
            *byte = *patch.name.as_bytes().get(index).unwrap_or(&b' ') & 0x7F;
        }
        // operator enable mask: all six on
        payload[152] = 0x3F;
        // bytes 153..=154 stay reserved as zeros
    }

    frame[6 + VOICE_DATA_LEN] = checksum(&frame[6..6 + VOICE_DATA_LEN]);
    frame[FRAME_LEN - 1] = SYSEX_END;
    Ok(frame)
}

// -------------------------------------------------------------------------------------------------

/// Decode a complete single-voice SysEx frame back into a patch.
///
/// Fails without touching any patch state when the header constants or the checksum
/// don't match.
pub fn decode(frame: &[u8]) -> Result<Patch, Error> {
    if frame.len() != FRAME_LEN {
        return Err(Error::SysexError(format!(
            "unexpected frame length {} (expecting {FRAME_LEN})",
            frame.len()
        )));
    }
    if frame[0] != SYSEX_START || frame[FRAME_LEN - 1] != SYSEX_END {
        return Err(Error::SysexError("missing F0/F7 framing".to_string()));
    }
    if frame[1] != MANUFACTURER_ID {
        return Err(Error::SysexError(format!(
            "unexpected manufacturer id {:#04x}",
            frame[1]
        )));
    }
    if frame[3] != FORMAT_SINGLE_VOICE || frame[4] != BYTE_COUNT_MSB || frame[5] != BYTE_COUNT_LSB {
        return Err(Error::SysexError("not a single voice dump".to_string()));
    }

    let payload = &frame[6..6 + VOICE_DATA_LEN];
    let expected = checksum(payload);
    let received = frame[6 + VOICE_DATA_LEN];
    if expected != received {
        return Err(Error::SysexError(format!(
            "checksum mismatch (expecting {expected:#04x}, got {received:#04x})"
        )));
    }

    let mut patch = Patch::default();

    for (slot, operator) in patch.operators.iter_mut().rev().enumerate() {
        let base = slot * OPERATOR_STRIDE;
        for stage in 0..ENVELOPE_STAGE_COUNT {
            operator.env_rates[stage] = payload[base + stage].min(99);
            operator.env_levels[stage] = payload[base + 4 + stage].min(99);
        }
        operator.break_point = payload[base + 8].min(127);
        operator.left_depth = payload[base + 9].min(99);
        operator.right_depth = payload[base + 10].min(99);
        operator.left_curve = ScalingCurve::from_index(payload[base + 11] & 0x03);
        operator.right_curve = ScalingCurve::from_index(payload[base + 12] & 0x03);
        operator.key_rate_scaling = (payload[base + 12] >> 2) & 0x07;
        operator.key_vel_sens = (payload[base + 13] >> 2) & 0x07;
        operator.output_level = payload[base + 14].min(99);
        let coarse = (payload[base + 15] >> 1) & 0x1F;
        let fine = payload[base + 16].min(99);
        operator.freq_ratio = coarse_fine_to_ratio(coarse, fine);
        operator.osc_sync = payload[base + 15] & 0x01 != 0;
        operator.detune = (((payload[base + 17] >> 1) & 0x0F) as i8 - 7).clamp(-7, 7);
    }

    for stage in 0..ENVELOPE_STAGE_COUNT {
        patch.pitch_env_rates[stage] = payload[GLOBAL_OFFSET + stage].min(99);
        patch.pitch_env_levels[stage] = payload[GLOBAL_OFFSET + 4 + stage].min(50);
    }
    patch.algorithm = (payload[134] & 0x1F) + 1;
    patch.feedback = payload[135] & 0x07;
    patch.lfo.speed = payload[136].min(99);
    patch.lfo.delay = payload[137].min(99);
    patch.lfo.pitch_depth = payload[138].min(99);
    patch.lfo.amp_depth = payload[139].min(99);
    patch.lfo.key_sync = payload[140] & 0x01 != 0;
    patch.lfo.waveform = LfoWaveform::from_index((payload[140] >> 1) & 0x07);
    patch.lfo.pitch_mod_sens = (payload[140] >> 4) & 0x07;
    patch.transpose = ((payload[141] & 0x3F) as i8 - 24).clamp(-24, 24);

    let name: String = payload[142..142 + NAME_LEN]
        .iter()
        .map(|b| char::from(*b))
        .collect();
    patch.name = name.trim_end_matches(' ').to_string();

    Ok(patch)
}

// -------------------------------------------------------------------------------------------------
