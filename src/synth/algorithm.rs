//! The 32 fixed FM routing topologies and the per-sample algorithm router.

use std::f64::consts::TAU;

use crate::patch::OPERATOR_COUNT;

// -------------------------------------------------------------------------------------------------

/// How operator 1 feeds back into itself when the patch feedback depth is non-zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackMode {
    /// Apply a sine to operator 1's already-scaled output of the current sample.
    /// This is the engine's documented default behavior.
    #[default]
    Scaled,
    /// Use operator 1's previous-sample output as a phase offset, like the
    /// original hardware.
    Classic,
}

// -------------------------------------------------------------------------------------------------

/// One FM routing topology: which operators sum into the output and which modulate which.
///
/// Operator indices are 0-based. Modulation routes are applied in order, and a route
/// overwrites its carrier's slot, so parallel modulators onto the same carrier don't
/// accumulate.
#[derive(Debug)]
pub struct Topology {
    /// Operators summed into the final voice output.
    pub carriers: &'static [usize],
    /// (modulator, carrier) routes in application order.
    pub routes: &'static [(usize, usize)],
}

/// The 32 topologies, indexed by `algorithm - 1`.
#[rustfmt::skip]
const TOPOLOGIES: [Topology; 32] = [
    // 1: 6→5→4→3→2, 1 out
    Topology { carriers: &[0], routes: &[(2, 1), (3, 2), (4, 3), (5, 4)] },
    // 2: two chains onto 1 and 2
    Topology { carriers: &[0, 1], routes: &[(2, 2), (3, 3), (4, 4)] },
    // 3: 6→5→4, 2→1
    Topology { carriers: &[0, 2], routes: &[(1, 0), (4, 3), (5, 4)] },
    // 4: 6→5, 3→2→1
    Topology { carriers: &[0, 3], routes: &[(1, 0), (2, 1), (5, 4)] },
    // 5: 4→3→2→1
    Topology { carriers: &[0, 4], routes: &[(1, 0), (2, 1), (3, 2)] },
    // 6: 3→2, 4→3
    Topology { carriers: &[0, 1, 4], routes: &[(2, 1), (3, 2)] },
    // 7: 2→1
    Topology { carriers: &[0, 2, 4], routes: &[(1, 0)] },
    // 8: four plain outputs
    Topology { carriers: &[0, 1, 2, 4], routes: &[] },
    // 9: 2→1, 3→2
    Topology { carriers: &[0, 3, 4], routes: &[(1, 0), (2, 1)] },
    // 10: 3→2
    Topology { carriers: &[0, 1, 3, 4], routes: &[(2, 1)] },
    // 11: 2→1
    Topology { carriers: &[0, 2, 3, 4], routes: &[(1, 0)] },
    // 12: five plain outputs
    Topology { carriers: &[0, 1, 2, 3, 4], routes: &[] },
    // 13: 5→4→3→2→1, 6 out
    Topology { carriers: &[0, 5], routes: &[(1, 0), (2, 1), (3, 2), (4, 3)] },
    // 14: 5→4→3→2
    Topology { carriers: &[0, 1, 5], routes: &[(2, 1), (3, 2), (4, 3)] },
    // 15: 2→1, 5→4
    Topology { carriers: &[0, 2, 5], routes: &[(1, 0), (4, 3)] },
    // 16: 2→1, 3→2
    Topology { carriers: &[0, 3, 5], routes: &[(1, 0), (2, 1)] },
    // 17: 3→2
    Topology { carriers: &[0, 1, 3, 5], routes: &[(2, 1)] },
    // 18: 2→1
    Topology { carriers: &[0, 2, 3, 5], routes: &[(1, 0)] },
    // 19: 4→3→2→1
    Topology { carriers: &[0, 4, 5], routes: &[(1, 0), (2, 1), (3, 2)] },
    // 20: 3→2, 4→3
    Topology { carriers: &[0, 1, 4, 5], routes: &[(2, 1), (3, 2)] },
    // 21: 2→1
    Topology { carriers: &[0, 2, 4, 5], routes: &[(1, 0)] },
    // 22: 2→1, 3→2
    Topology { carriers: &[0, 3, 4, 5], routes: &[(1, 0), (2, 1)] },
    // 23: 3→2
    Topology { carriers: &[0, 1, 3, 4, 5], routes: &[(2, 1)] },
    // 24: 2→1
    Topology { carriers: &[0, 2, 3, 4, 5], routes: &[(1, 0)] },
    // 25: all six plain outputs (additive)
    Topology { carriers: &[0, 1, 2, 3, 4, 5], routes: &[] },
    // 26: (6+5)→4→3→2→1, parallel modulators overwrite
    Topology { carriers: &[0], routes: &[(1, 0), (2, 1), (3, 2), (4, 3), (5, 3)] },
    // 27: (6+5)→4→3→2
    Topology { carriers: &[0, 1], routes: &[(2, 1), (3, 2), (4, 3), (5, 3)] },
    // 28: 2→1, (6+5)→4
    Topology { carriers: &[0, 2], routes: &[(1, 0), (3, 3), (4, 3), (5, 3)] },
    // 29: 2→1, 3→2, (6)→5
    Topology { carriers: &[0, 3], routes: &[(1, 0), (2, 1), (4, 4), (5, 4)] },
    // 30: 3→2, (6+5)→4
    Topology { carriers: &[0, 1, 3], routes: &[(2, 1), (4, 3), (5, 3)] },
    // 31: 2→1, (6+5)→4
    Topology { carriers: &[0, 2, 3], routes: &[(1, 0), (4, 3), (5, 3)] },
    // 32: (6+5)→(4+3+2+1)
    Topology {
        carriers: &[0, 1, 2, 3],
        routes: &[(4, 0), (4, 1), (4, 2), (4, 3), (5, 0), (5, 1), (5, 2), (5, 3)],
    },
];

/// The topology for an algorithm number in 1..=32. Out-of-range numbers fall back
/// to algorithm 1.
pub fn topology(algorithm: u8) -> &'static Topology {
    let index = if (1..=32).contains(&algorithm) {
        algorithm as usize - 1
    } else {
        0
    };
    &TOPOLOGIES[index]
}

// -------------------------------------------------------------------------------------------------

/// Mix one sample through an algorithm.
///
/// `sines` are the operators' raw pre-level outputs, `levels` their current total
/// levels. `feedback_phase` is the phase offset applied to operator 1's slot before
/// any routing (zero disables feedback entirely).
///
/// The carrier sum is normalized by the square root of the carrier count, so
/// carrier-heavy algorithms don't get proportionally louder.
pub fn process(
    algorithm: u8,
    sines: &[f64; OPERATOR_COUNT],
    levels: &[f64; OPERATOR_COUNT],
    feedback_phase: f64,
) -> f64 {
    let topology = topology(algorithm);

    let mut slots = [0.0; OPERATOR_COUNT];
    for (slot, (sine, level)) in slots.iter_mut().zip(sines.iter().zip(levels.iter())) {
        *slot = sine * level;
    }

    if feedback_phase != 0.0 {
        slots[0] = (TAU * slots[0] + feedback_phase).sin();
    }

    for (modulator, carrier) in topology.routes {
        let depth = levels[*modulator] * 2.0;
        slots[*carrier] = (TAU + slots[*modulator] * depth).sin();
    }

    let sum: f64 = topology.carriers.iter().map(|c| slots[*c]).sum();
    sum / (topology.carriers.len() as f64).sqrt()
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_algorithm_has_carriers() {
        for algorithm in 1..=32 {
            let topology = topology(algorithm);
            assert!(!topology.carriers.is_empty(), "algorithm {algorithm}");
            assert!(topology.carriers.len() <= OPERATOR_COUNT);
            assert!(topology.carriers.iter().all(|c| *c < OPERATOR_COUNT));
            assert!(topology
                .routes
                .iter()
                .all(|(m, c)| *m < OPERATOR_COUNT && *c < OPERATOR_COUNT));
        }
    }

    #[test]
    fn known_carrier_counts() {
        // chain algorithm: a single carrier
        assert_eq!(topology(1).carriers, &[0]);
        // additive algorithm: all six operators are carriers
        assert_eq!(topology(25).carriers.len(), OPERATOR_COUNT);
        assert!(topology(25).routes.is_empty());
        // two stacked modulator pairs into four carriers
        assert_eq!(topology(32).carriers.len(), 4);
        assert_eq!(topology(32).routes.len(), 8);
    }

    #[test]
    fn out_of_range_algorithms_fall_back() {
        assert!(std::ptr::eq(topology(0), topology(1)));
        assert!(std::ptr::eq(topology(77), topology(1)));
    }

    #[test]
    fn additive_mix_is_normalized_carrier_sum() {
        let sines = [0.5; OPERATOR_COUNT];
        let levels = [1.0; OPERATOR_COUNT];
        let output = process(25, &sines, &levels, 0.0);
        let expected = 0.5 * 6.0 / 6.0_f64.sqrt();
        assert!((output - expected).abs() < 1e-12);
    }

    #[test]
    fn silent_operators_stay_silent() {
        let sines = [0.0; OPERATOR_COUNT];
        let levels = [0.0; OPERATOR_COUNT];
        for algorithm in 1..=32 {
            let output = process(algorithm, &sines, &levels, 0.0);
            // modulated carriers emit sin(2π) which is zero up to rounding
            assert!(output.abs() < 1e-12, "algorithm {algorithm}");
        }
    }

    #[test]
    fn modulation_routes_shape_the_carrier() {
        let mut sines = [0.0; OPERATOR_COUNT];
        let levels = [1.0; OPERATOR_COUNT];
        // in algorithm 7 operator 2 modulates operator 1
        sines[1] = 0.3;
        let modulated = process(7, &sines, &levels, 0.0);
        sines[1] = 0.0;
        let unmodulated = process(7, &sines, &levels, 0.0);
        assert!((modulated - unmodulated).abs() > 1e-6);
    }

    #[test]
    fn chain_matches_manual_computation() {
        let sines = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let levels = [1.0, 0.9, 0.8, 0.7, 0.6, 0.5];
        let output = process(1, &sines, &levels, 0.0);

        let mut slots = [0.0; OPERATOR_COUNT];
        for i in 0..OPERATOR_COUNT {
            slots[i] = sines[i] * levels[i];
        }
        // routes apply in order, each reading the current slot state
        slots[1] = (TAU + slots[2] * levels[2] * 2.0).sin();
        slots[2] = (TAU + slots[3] * levels[3] * 2.0).sin();
        slots[3] = (TAU + slots[4] * levels[4] * 2.0).sin();
        slots[4] = (TAU + slots[5] * levels[5] * 2.0).sin();
        assert!((output - slots[0]).abs() < 1e-12);
    }

    #[test]
    fn feedback_changes_the_output() {
        let sines = [0.4; OPERATOR_COUNT];
        let levels = [1.0; OPERATOR_COUNT];
        let clean = process(1, &sines, &levels, 0.0);
        let fed_back = process(1, &sines, &levels, 0.4 * 0.1);
        assert!((clean - fed_back).abs() > 1e-9);
    }
}
