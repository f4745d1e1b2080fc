//! **hexop** is a real-time six-operator FM synthesis engine in the spirit of classic
//! 80s hardware synths. It turns a patch description plus a live MIDI byte stream into
//! mono audio samples, and leaves audio and MIDI I/O entirely to the host.
//!
//! ### Overview
//!
//! - **[`Patch`]** is the immutable parameter set of a sound: six operators with
//!   envelopes and keyboard scaling, one of 32 routing algorithms, feedback, LFO and
//!   pitch envelope settings. Patches load from plain-text `KEY = VALUE` files via
//!   [`Patch::load`] or from 163-byte SysEx voice dumps via [`Patch::from_sysex`].
//!
//! - **[`Engine`]** is the control and MIDI-ingress handle. It owns the byte-level
//!   MIDI parser, tracks controllers (pitch bend, mod wheel, volume, sustain, ...)
//!   and queues note events for the audio side. All of its work is small and bounded,
//!   so [`Engine::feed_midi`] can be called straight from platform MIDI callbacks.
//!
//! - **[`EngineRenderer`]** is the audio-thread handle, created together with the
//!   engine and moved into the host's render callback. [`EngineRenderer::render_block`]
//!   applies queued note events, mixes the voice pool and soft-clips the result. It
//!   never allocates, locks or logs.
//!
//! - **Voices** are allocated from a fixed pool with oldest-first stealing. Each voice
//!   runs six sine operators through the patch's algorithm with per-operator
//!   four-stage envelopes, velocity sensitivity and keyboard level/rate scaling.
//!
//! ### Getting Started
//!
//! ```rust,no_run
//! use hexop::{Engine, EngineOptions, Error, Patch};
//!
//! fn main() -> Result<(), Error> {
//!     // Load a patch and create an engine listening on MIDI channel 1.
//!     let patch = Patch::load("patches/epiano.patch")?;
//!     let options = EngineOptions::default().sample_rate(48000).channel(1);
//!     let (mut engine, mut renderer) = Engine::new(patch, options)?;
//!
//!     // Enable the render path.
//!     engine.start();
//!
//!     // MIDI transport thread: feed raw bytes as they arrive.
//!     engine.feed_midi(&[0x90, 60, 100]);
//!
//!     // Audio host thread: fill each callback buffer with mono samples.
//!     let mut buffer = [0.0f32; 512];
//!     renderer.render_block(&mut buffer);
//!
//!     // Inspect runtime statistics from anywhere.
//!     println!("{}", engine.stats());
//!
//!     engine.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! The engine is strictly two-threaded: one MIDI ingress thread and one audio render
//! thread, connected by a lock-free command queue and per-field atomic controllers.
//! See the `engine` module docs for the exact ownership rules.

// -------------------------------------------------------------------------------------------------

// private mods (partly re-exported)

mod controllers;
mod engine;
mod error;
mod patch;
mod utils;

// public, flat re-exports (common types)

pub use error::Error;

pub use controllers::{ControllerSnapshot, Controllers};
pub use engine::{
    Engine, EngineOptions, EngineRenderer, EngineStats, DEFAULT_VOICE_COUNT, MAX_VOICE_COUNT,
};
pub use patch::{
    LfoParams, OperatorParams, Patch, ScalingCurve, ALGORITHM_COUNT, ENVELOPE_STAGE_COUNT,
    OPERATOR_COUNT,
};
pub use synth::{algorithm::FeedbackMode, lfo::LfoWaveform};

// -------------------------------------------------------------------------------------------------

// public mods

pub mod midi;
pub mod synth;

pub mod sysex {
    //! Bidirectional codec between a [`Patch`](crate::Patch) and the packed
    //! 155-byte SysEx voice format.

    pub use super::patch::sysex::{checksum, decode, encode, FRAME_LEN, VOICE_DATA_LEN};
}
