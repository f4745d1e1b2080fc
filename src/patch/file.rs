//! Plain-text `KEY = VALUE` patch file format.
//!
//! The format is line based: `#` starts a comment, `OP1`..`OP6` lines open an operator
//! section, and everything else is a `KEY = VALUE` pair applied to either the global
//! patch or the currently open operator section. Unknown keys are ignored so patch
//! files can carry annotations for other tools.

use std::{fs, path::Path};

use crate::{
    patch::{Patch, ScalingCurve, OPERATOR_COUNT},
    synth::lfo::LfoWaveform,
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Load a patch from a plain-text patch file.
pub fn load_patch(path: &Path) -> Result<Patch, Error> {
    parse_patch(&fs::read_to_string(path)?)
}

/// Parse a patch from plain text. Values not present in the text keep the
/// "INIT VOICE" defaults of [`Patch::default`].
pub fn parse_patch(text: &str) -> Result<Patch, Error> {
    let mut patch = Patch::default();
    let mut current_operator: Option<usize> = None;

    for (line_number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // operator section header
        if let Some(op_number) = line.strip_prefix("OP") {
            if let Ok(index) = op_number.trim().parse::<usize>() {
                if (1..=OPERATOR_COUNT).contains(&index) {
                    current_operator = Some(index - 1);
                    continue;
                }
            }
            return Err(line_error(line_number, "invalid operator section header"));
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(line_error(line_number, "expecting 'KEY = VALUE'"));
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "NAME" => patch.name = value.to_string(),
            "ALGORITHM" => patch.algorithm = parse_number(line_number, value)?,
            "FEEDBACK" => patch.feedback = parse_number(line_number, value)?,
            "LFO_SPEED" => patch.lfo.speed = parse_number(line_number, value)?,
            "LFO_DELAY" => patch.lfo.delay = parse_number(line_number, value)?,
            "LFO_PMD" => patch.lfo.pitch_depth = parse_number(line_number, value)?,
            "LFO_AMD" => patch.lfo.amp_depth = parse_number(line_number, value)?,
            "LFO_SYNC" => patch.lfo.key_sync = parse_number::<u8>(line_number, value)? != 0,
            "LFO_WAVE" => {
                patch.lfo.waveform = LfoWaveform::from_index(parse_number(line_number, value)?)
            }
            "LFO_PITCH_MOD_SENS" => patch.lfo.pitch_mod_sens = parse_number(line_number, value)?,
            "TRANSPOSE" => patch.transpose = parse_number(line_number, value)?,
            _ => {
                if let Some(op_index) = current_operator {
                    parse_operator_key(&mut patch, op_index, key, value, line_number)?;
                }
                // unknown global keys are ignored
            }
        }
    }

    patch.validate()?;
    Ok(patch)
}

// -------------------------------------------------------------------------------------------------

fn parse_operator_key(
    patch: &mut Patch,
    op_index: usize,
    key: &str,
    value: &str,
    line_number: usize,
) -> Result<(), Error> {
    let operator = &mut patch.operators[op_index];
    match key {
        "FREQ_RATIO" => operator.freq_ratio = parse_number(line_number, value)?,
        "DETUNE" => operator.detune = parse_number(line_number, value)?,
        "OUTPUT_LEVEL" => operator.output_level = parse_number(line_number, value)?,
        "KEY_VEL_SENS" => operator.key_vel_sens = parse_number(line_number, value)?,
        "ENV_ATTACK" => operator.env_rates[0] = parse_number(line_number, value)?,
        "ENV_DECAY1" => operator.env_rates[1] = parse_number(line_number, value)?,
        "ENV_DECAY2" => operator.env_rates[2] = parse_number(line_number, value)?,
        "ENV_RELEASE" => operator.env_rates[3] = parse_number(line_number, value)?,
        "ENV_LEVEL1" => operator.env_levels[0] = parse_number(line_number, value)?,
        "ENV_LEVEL2" => operator.env_levels[1] = parse_number(line_number, value)?,
        "ENV_LEVEL3" => operator.env_levels[2] = parse_number(line_number, value)?,
        "ENV_LEVEL4" => operator.env_levels[3] = parse_number(line_number, value)?,
        "KEY_LEVEL_SCALE_BREAK_POINT" => operator.break_point = parse_number(line_number, value)?,
        "KEY_LEVEL_SCALE_LEFT_DEPTH" => operator.left_depth = parse_number(line_number, value)?,
        "KEY_LEVEL_SCALE_RIGHT_DEPTH" => operator.right_depth = parse_number(line_number, value)?,
        "KEY_LEVEL_SCALE_LEFT_CURVE" => {
            operator.left_curve = ScalingCurve::from_index(parse_number(line_number, value)?)
        }
        "KEY_LEVEL_SCALE_RIGHT_CURVE" => {
            operator.right_curve = ScalingCurve::from_index(parse_number(line_number, value)?)
        }
        "KEY_RATE_SCALING" => operator.key_rate_scaling = parse_number(line_number, value)?,
        "OSC_SYNC" => operator.osc_sync = parse_number::<u8>(line_number, value)? != 0,
        _ => {
            // unknown operator keys are ignored
        }
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(line_number: usize, value: &str) -> Result<T, Error> {
    value
        .parse()
        .map_err(|_| line_error(line_number, &format!("invalid number '{value}'")))
}

fn line_error(line_number: usize, message: &str) -> Error {
    Error::PatchFormatError(format!("line {}: {message}", line_number + 1))
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
# A simple two operator electric piano
NAME = E.PIANO 1
ALGORITHM = 5
FEEDBACK = 6
LFO_SPEED = 34
LFO_AMD = 10
LFO_WAVE = 0
TRANSPOSE = 0

OP1
FREQ_RATIO = 1.0
OUTPUT_LEVEL = 99
ENV_ATTACK = 95
ENV_DECAY1 = 70
ENV_DECAY2 = 40
ENV_RELEASE = 60
ENV_LEVEL1 = 99
ENV_LEVEL2 = 90
ENV_LEVEL3 = 0
ENV_LEVEL4 = 0
KEY_VEL_SENS = 4

OP2
FREQ_RATIO = 14.0
DETUNE = 3
OUTPUT_LEVEL = 58
ENV_ATTACK = 95
ENV_DECAY1 = 50
ENV_DECAY2 = 30
ENV_RELEASE = 70
ENV_LEVEL1 = 99
ENV_LEVEL2 = 80
ENV_LEVEL3 = 0
ENV_LEVEL4 = 0
KEY_LEVEL_SCALE_BREAK_POINT = 60
KEY_LEVEL_SCALE_RIGHT_DEPTH = 20
KEY_LEVEL_SCALE_RIGHT_CURVE = 1
"#;

    #[test]
    fn parses_example_patch() {
        let patch = parse_patch(EXAMPLE).unwrap();
        assert_eq!(patch.name, "E.PIANO 1");
        assert_eq!(patch.algorithm, 5);
        assert_eq!(patch.feedback, 6);
        assert_eq!(patch.lfo.speed, 34);
        assert_eq!(patch.lfo.amp_depth, 10);
        assert_eq!(patch.operators[0].freq_ratio, 1.0);
        assert_eq!(patch.operators[0].env_rates, [95, 70, 40, 60]);
        assert_eq!(patch.operators[0].env_levels, [99, 90, 0, 0]);
        assert_eq!(patch.operators[0].key_vel_sens, 4);
        assert_eq!(patch.operators[1].freq_ratio, 14.0);
        assert_eq!(patch.operators[1].detune, 3);
        assert_eq!(patch.operators[1].right_depth, 20);
        assert_eq!(patch.operators[1].right_curve, ScalingCurve::ExpDown);
        // untouched operators keep their defaults
        assert_eq!(patch.operators[2].output_level, 0);
    }

    #[test]
    fn ignores_comments_and_unknown_keys() {
        let patch = parse_patch("# comment only\nSOME_FUTURE_KEY = 42\nALGORITHM = 3\n").unwrap();
        assert_eq!(patch.algorithm, 3);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_patch("ALGORITHM 5").is_err());
        assert!(parse_patch("ALGORITHM = five").is_err());
        assert!(parse_patch("OPX").is_err());
        assert!(parse_patch("OP7").is_err());
    }

    #[test]
    fn rejects_out_of_range_values() {
        // parses fine, fails patch validation
        assert!(parse_patch("ALGORITHM = 60").is_err());
        assert!(parse_patch("FEEDBACK = 9").is_err());
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join("hexop_test_patch.patch");
        fs::write(&path, EXAMPLE).unwrap();
        let patch = load_patch(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(patch.name, "E.PIANO 1");
    }

    #[test]
    fn missing_file_reports_io_error() {
        let result = load_patch(Path::new("/nonexistent/missing.patch"));
        assert!(matches!(result, Err(Error::IoError(_))));
    }
}
