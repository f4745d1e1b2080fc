//! Per-voice FM synthesis: envelopes, operators, routing algorithms, LFO and voices.

// -------------------------------------------------------------------------------------------------

pub mod algorithm;
pub mod envelope;
pub mod lfo;
pub mod operator;
pub mod voice;
