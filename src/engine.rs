//! The polyphonic engine: MIDI ingress on one side, an audio renderer on the other.
//!
//! [`Engine::new`] returns two handles. The [`Engine`] stays with the host's control
//! and MIDI threads: it parses incoming bytes, updates the shared [`Controllers`]
//! block and queues voice commands. The [`EngineRenderer`] is moved into the audio
//! callback: it drains the command queue at the head of every block and renders all
//! active voices. The queue is the only ordered channel between the two sides, which
//! keeps note-on/note-off sequences intact without any lock on the audio path.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crossbeam_queue::ArrayQueue;

use crate::{
    controllers::{ControllerSnapshot, Controllers},
    midi::{cc, MidiEvent, MidiMessage, MidiParser},
    patch::Patch,
    synth::{algorithm::FeedbackMode, voice::Voice},
    utils::soft_clip,
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Default polyphony of a freshly configured engine.
pub const DEFAULT_VOICE_COUNT: usize = 16;

/// Upper polyphony bound accepted by [`EngineOptions`].
pub const MAX_VOICE_COUNT: usize = 64;

/// Command queue capacity. Sized far beyond any realistic event burst between two
/// render blocks; a full queue drops the event and counts a MIDI error.
const COMMAND_QUEUE_SIZE: usize = 1024;

// -------------------------------------------------------------------------------------------------

/// Options for creating an [`Engine`].
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// By default 48000. Output sample rate in Hz, fixed for the engine's lifetime.
    pub sample_rate: u32,

    /// By default 1. The 1-based MIDI channel the engine listens on; messages on all
    /// other channels are ignored.
    pub channel: u8,

    /// By default [`DEFAULT_VOICE_COUNT`]. Size of the preallocated voice pool.
    pub voices: usize,

    /// By default [`FeedbackMode::Scaled`]. How operator 1 self-modulation is applied.
    pub feedback_mode: FeedbackMode,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channel: 1,
            voices: DEFAULT_VOICE_COUNT,
            feedback_mode: FeedbackMode::default(),
        }
    }
}

impl EngineOptions {
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    pub fn voices(mut self, voices: usize) -> Self {
        self.voices = voices;
        self
    }

    pub fn feedback_mode(mut self, mode: FeedbackMode) -> Self {
        self.feedback_mode = mode;
        self
    }

    /// Validate all parameters. Returns Error::ParameterError on errors.
    pub fn validate(&self) -> Result<(), Error> {
        if !(8000..=192_000).contains(&self.sample_rate) {
            return Err(Error::ParameterError(format!(
                "engine options 'sample_rate' value is '{}' (expecting 8000..=192000)",
                self.sample_rate
            )));
        }
        if !(1..=16).contains(&self.channel) {
            return Err(Error::ParameterError(format!(
                "engine options 'channel' value is '{}' (expecting 1..=16)",
                self.channel
            )));
        }
        if !(1..=MAX_VOICE_COUNT).contains(&self.voices) {
            return Err(Error::ParameterError(format!(
                "engine options 'voices' value is '{}' (expecting 1..={MAX_VOICE_COUNT})",
                self.voices
            )));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Voice lifecycle events, queued by the ingress side and applied by the renderer at
/// the head of each block.
#[derive(Debug, Clone, Copy)]
enum VoiceCommand {
    NoteOn { note: u8, velocity: u8, channel: u8 },
    NoteOff { note: u8, channel: u8 },
    SustainPedal { pressed: bool },
    ReleaseAll,
}

// -------------------------------------------------------------------------------------------------

/// Counters and flags shared between the two engine handles. Every field has exactly
/// one writer.
#[derive(Debug, Default)]
struct SharedState {
    running: AtomicBool,
    // ingress side
    notes_played: AtomicU64,
    midi_errors: AtomicU64,
    // renderer side
    voice_steals: AtomicU64,
    active_voices: AtomicUsize,
    peak_render_nanos: AtomicU64,
}

// -------------------------------------------------------------------------------------------------

/// A snapshot of the engine's runtime statistics.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub active_voices: usize,
    pub notes_played: u64,
    pub voice_steals: u64,
    pub midi_errors: u64,
    /// Longest observed wall-clock time of a single render block.
    pub peak_render_time: Duration,
    pub controllers: ControllerSnapshot,
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "active voices: {}", self.active_voices)?;
        writeln!(f, "notes played:  {}", self.notes_played)?;
        writeln!(f, "voice steals:  {}", self.voice_steals)?;
        writeln!(f, "midi errors:   {}", self.midi_errors)?;
        writeln!(f, "peak render:   {:?}", self.peak_render_time)?;
        writeln!(f, "pitch bend:    {:.3}", self.controllers.pitch_bend)?;
        writeln!(f, "mod wheel:     {:.3}", self.controllers.mod_wheel)?;
        writeln!(f, "volume:        {:.3}", self.controllers.volume)?;
        write!(
            f,
            "sustain:       {}",
            if self.controllers.sustain_pedal { "ON" } else { "OFF" }
        )
    }
}

// -------------------------------------------------------------------------------------------------

/// Control and MIDI-ingress handle of a six-operator FM engine.
///
/// `feed_midi` may be called from any thread, including platform MIDI callbacks: it
/// only performs small bounded work and never blocks on the audio thread.
pub struct Engine {
    parser: MidiParser,
    /// 0-based MIDI channel filter.
    channel: u8,
    patch: Arc<Patch>,
    controllers: Arc<Controllers>,
    commands: Arc<ArrayQueue<VoiceCommand>>,
    shared: Arc<SharedState>,
}

impl Engine {
    /// Create an engine for the given patch, returning the ingress handle and the
    /// audio renderer.
    ///
    /// The entire voice pool is allocated here; the render path never allocates.
    pub fn new(patch: Patch, options: EngineOptions) -> Result<(Engine, EngineRenderer), Error> {
        options.validate()?;
        patch.validate()?;

        let patch = Arc::new(patch);
        let controllers = Arc::new(Controllers::new());
        let commands = Arc::new(ArrayQueue::new(COMMAND_QUEUE_SIZE));
        let shared = Arc::new(SharedState::default());

        let voices = (0..options.voices)
            .map(|_| Voice::new(options.sample_rate as f64))
            .collect();

        let engine = Engine {
            parser: MidiParser::new(),
            channel: options.channel - 1,
            patch: Arc::clone(&patch),
            controllers: Arc::clone(&controllers),
            commands: Arc::clone(&commands),
            shared: Arc::clone(&shared),
        };
        let renderer = EngineRenderer {
            patch,
            voices,
            controllers,
            commands,
            shared,
            sample_rate: options.sample_rate,
            feedback_mode: options.feedback_mode,
            sustain_pedal: false,
            allocation_counter: 0,
        };
        Ok((engine, renderer))
    }

    /// Enable the render path. Until started, incoming MIDI bytes are dropped and the
    /// renderer produces silence.
    pub fn start(&self) {
        self.shared.running.store(true, Ordering::Relaxed);
    }

    /// Disable the render path again.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    /// Cooperative shutdown: stop the render path first, then queue a release of all
    /// voices for whenever the renderer runs next. Ingress calls afterwards no-op.
    pub fn shutdown(&mut self) {
        self.stop();
        // force push: releasing everything supersedes whatever event it displaces
        let _ = self.commands.force_push(VoiceCommand::ReleaseAll);
    }

    /// The patch this engine was created with.
    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    /// The shared controller block.
    pub fn controllers(&self) -> &Controllers {
        &self.controllers
    }

    /// Feed raw MIDI bytes from the transport into the engine.
    pub fn feed_midi(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.feed_midi_byte(*byte);
        }
    }

    /// Feed a single raw MIDI byte into the engine.
    pub fn feed_midi_byte(&mut self, byte: u8) {
        if !self.is_running() {
            return;
        }
        match self.parser.parse(byte) {
            Some(MidiEvent::Message(message)) => self.handle_message(message),
            Some(MidiEvent::SysEx) => {
                // patches are immutable while playing; a full SysEx voice dump can be
                // decoded by the host via Patch::from_sysex and a fresh engine
                log::debug!(
                    "Ignoring SysEx message ({} bytes payload)",
                    self.parser.sysex_data().len()
                );
            }
            Some(MidiEvent::Error(error)) => {
                self.shared.midi_errors.fetch_add(1, Ordering::Relaxed);
                log::debug!("Transient MIDI parse error: {error:?}");
            }
            None => (),
        }
    }

    /// Gather a statistics snapshot.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            active_voices: self.shared.active_voices.load(Ordering::Relaxed),
            notes_played: self.shared.notes_played.load(Ordering::Relaxed),
            voice_steals: self.shared.voice_steals.load(Ordering::Relaxed),
            midi_errors: self.shared.midi_errors.load(Ordering::Relaxed),
            peak_render_time: Duration::from_nanos(
                self.shared.peak_render_nanos.load(Ordering::Relaxed),
            ),
            controllers: self.controllers.snapshot(),
        }
    }

    fn handle_message(&mut self, message: MidiMessage) {
        if message.channel() != self.channel {
            return;
        }
        match message {
            MidiMessage::NoteOn { note, velocity, channel } => {
                self.shared.notes_played.fetch_add(1, Ordering::Relaxed);
                self.push_command(VoiceCommand::NoteOn { note, velocity, channel });
            }
            MidiMessage::NoteOff { note, channel, .. } => {
                self.push_command(VoiceCommand::NoteOff { note, channel });
            }
            MidiMessage::ControlChange { controller, value, .. } => {
                self.handle_control_change(controller, value);
            }
            MidiMessage::PitchBend { value, .. } => {
                self.controllers.set_pitch_bend_14bit(value);
            }
            MidiMessage::ProgramChange { program, .. } => {
                // recognized but inert: recorded for hosts that want to react
                self.controllers.set_program(program);
                log::debug!("Program change {program} recorded (no patch bank attached)");
            }
            MidiMessage::ChannelPressure { pressure, .. } => {
                // recognized but inert
                self.controllers.set_channel_pressure(pressure);
            }
            MidiMessage::PolyPressure { .. } => {
                log::debug!("Ignoring polyphonic pressure message");
            }
        }
    }

    fn handle_control_change(&mut self, controller: u8, value: u8) {
        self.controllers.set_raw(controller, value);
        match controller {
            cc::MOD_WHEEL => self.controllers.set_mod_wheel(value),
            cc::BREATH => self.controllers.set_breath(value),
            cc::FOOT => self.controllers.set_foot(value),
            cc::VOLUME => self.controllers.set_volume(value),
            cc::EXPRESSION => self.controllers.set_expression(value),
            cc::PAN => self.controllers.set_pan(value),
            cc::SUSTAIN_PEDAL => {
                let pressed = value >= 64;
                self.controllers.set_sustain_pedal(pressed);
                self.push_command(VoiceCommand::SustainPedal { pressed });
            }
            cc::PORTAMENTO => self.controllers.set_portamento(value >= 64),
            cc::ALL_SOUND_OFF | cc::ALL_NOTES_OFF => {
                self.push_command(VoiceCommand::ReleaseAll);
            }
            cc::ALL_CONTROLLERS_OFF => self.controllers.reset(),
            _ => log::debug!("Ignoring CC {controller} = {value}"),
        }
    }

    fn push_command(&mut self, command: VoiceCommand) {
        if self.commands.push(command).is_err() {
            self.shared.midi_errors.fetch_add(1, Ordering::Relaxed);
            log::warn!("Engine command queue is full, dropping a voice event.");
            log::warn!("Is the audio renderer still being driven?");
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Audio-thread handle of the engine.
///
/// `render_block` performs no allocation, takes no locks and never logs: all per-block
/// work is bounded by the preallocated voice pool and the command queue capacity.
pub struct EngineRenderer {
    patch: Arc<Patch>,
    voices: Vec<Voice>,
    controllers: Arc<Controllers>,
    commands: Arc<ArrayQueue<VoiceCommand>>,
    shared: Arc<SharedState>,
    sample_rate: u32,
    feedback_mode: FeedbackMode,
    /// The renderer's own view of the sustain pedal. Updated through the command queue
    /// so pedal changes stay ordered with the note events around them.
    sustain_pedal: bool,
    /// Monotonic allocation counter, the LRU key for voice stealing.
    allocation_counter: u64,
}

impl EngineRenderer {
    /// The output sample rate the engine was created with.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// MIDI notes of all currently sounding voices. Diagnostic helper for hosts and
    /// tests; not meant to be called from the render path.
    pub fn active_notes(&self) -> Vec<u8> {
        self.voices
            .iter()
            .filter(|voice| voice.active())
            .map(|voice| voice.midi_note())
            .collect()
    }

    /// Render one block of mono samples into `output`.
    ///
    /// Queued voice commands are applied first, then all active voices are mixed.
    /// The mix is scaled by 0.5 and soft-clipped to ±1. While the engine is stopped
    /// the output is silence, but commands are still drained so no stale events fire
    /// on a later start.
    pub fn render_block(&mut self, output: &mut [f32]) {
        let start = Instant::now();

        output.fill(0.0);
        self.apply_commands();

        if self.shared.running.load(Ordering::Relaxed) {
            let patch = &self.patch;
            let controllers = &self.controllers;
            for voice in &mut self.voices {
                if !voice.active() {
                    continue;
                }
                let velocity_scale = voice.velocity() as f64 / 127.0;
                for out in output.iter_mut() {
                    // bake the live controller values into this very sample
                    voice.apply_pitch_bend(patch, controllers.pitch_bend() as f64);
                    let lfo_rate_scale = 0.1 + controllers.mod_wheel() as f64 * 2.9;
                    let mut sample = voice.process(patch, lfo_rate_scale, self.feedback_mode);
                    sample *= velocity_scale
                        * controllers.volume() as f64
                        * controllers.expression() as f64;
                    *out += sample as f32;
                }
                if voice.is_finished() {
                    voice.kill();
                }
            }
            for sample in output.iter_mut() {
                *sample = soft_clip(*sample * 0.5);
            }
        }

        let active = self.voices.iter().filter(|voice| voice.active()).count();
        self.shared.active_voices.store(active, Ordering::Relaxed);
        self.shared
            .peak_render_nanos
            .fetch_max(start.elapsed().as_nanos() as u64, Ordering::Relaxed);
    }

    fn apply_commands(&mut self) {
        while let Some(command) = self.commands.pop() {
            match command {
                VoiceCommand::NoteOn { note, velocity, channel } => {
                    self.allocate_voice(note, velocity, channel);
                }
                VoiceCommand::NoteOff { note, channel } => {
                    let sustain = self.sustain_pedal;
                    if let Some(voice) = self
                        .voices
                        .iter_mut()
                        .find(|v| v.active() && v.midi_note() == note && v.channel() == channel)
                    {
                        voice.note_off(&self.patch, sustain);
                    }
                    // note-off without a matching voice is a plain no-op
                }
                VoiceCommand::SustainPedal { pressed } => {
                    self.sustain_pedal = pressed;
                    if !pressed {
                        // the pedal came up: run all deferred releases exactly once
                        for voice in &mut self.voices {
                            if voice.active() && voice.sustain_held() {
                                voice.release(&self.patch);
                            }
                        }
                    }
                }
                VoiceCommand::ReleaseAll => {
                    for voice in &mut self.voices {
                        voice.kill();
                    }
                }
            }
        }
    }

    fn allocate_voice(&mut self, note: u8, velocity: u8, channel: u8) {
        self.allocation_counter += 1;
        let order = self.allocation_counter;

        // free voice first, else steal the oldest one
        let index = match self.voices.iter().position(|voice| !voice.active()) {
            Some(index) => index,
            None => {
                self.shared.voice_steals.fetch_add(1, Ordering::Relaxed);
                self.voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, voice)| voice.note_on_order())
                    .map(|(index, _)| index)
                    .unwrap_or(0)
            }
        };
        self.voices[index].note_on(&self.patch, note, velocity, channel, order);
    }
}

// -------------------------------------------------------------------------------------------------
