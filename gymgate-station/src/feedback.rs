//! Audible feedback cues
//!
//! One cue per classified scan. Granted is a short rising sine chirp,
//! denied a lower sawtooth+square buzz.

use std::sync::Mutex;
use tracing::{debug, info};

/// Oscillator shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
}

/// One oscillator of a cue, sweeping from `start_hz` to `end_hz`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voice {
    pub waveform: Waveform,
    pub start_hz: f32,
    pub end_hz: f32,
}

/// Full cue description handed to an audio backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CueSpec {
    pub voices: &'static [Voice],
    pub duration_ms: u32,
    /// Initial gain, decays exponentially to 0.01 over the duration
    pub gain: f32,
}

const GRANTED_VOICES: &[Voice] = &[Voice {
    waveform: Waveform::Sine,
    start_hz: 880.0,
    end_hz: 1320.0,
}];

const DENIED_VOICES: &[Voice] = &[
    Voice {
        waveform: Waveform::Sawtooth,
        start_hz: 220.0,
        end_hz: 220.0,
    },
    Voice {
        waveform: Waveform::Square,
        start_hz: 110.0,
        end_hz: 110.0,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Granted,
    Denied,
}

impl Cue {
    pub fn spec(&self) -> CueSpec {
        match self {
            Cue::Granted => CueSpec {
                voices: GRANTED_VOICES,
                duration_ms: 200,
                gain: 0.1,
            },
            Cue::Denied => CueSpec {
                voices: DENIED_VOICES,
                duration_ms: 300,
                gain: 0.1,
            },
        }
    }
}

/// Plays cues; must not block
pub trait FeedbackSink: Send + Sync {
    fn play(&self, cue: Cue);
}

/// Sink that only logs the cue, for headless stations
#[derive(Debug, Default)]
pub struct LogFeedback;

impl FeedbackSink for LogFeedback {
    fn play(&self, cue: Cue) {
        let spec = cue.spec();
        debug!("Cue {:?}: {} voices, {}ms", cue, spec.voices.len(), spec.duration_ms);
        info!("[{}]", if cue == Cue::Granted { "ACCESS GRANTED" } else { "ACCESS DENIED" });
    }
}

/// Sink that remembers every cue, for tests and diagnostics
#[derive(Debug, Default)]
pub struct RecordingFeedback {
    played: Mutex<Vec<Cue>>,
}

impl RecordingFeedback {
    pub fn played(&self) -> Vec<Cue> {
        self.played.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl FeedbackSink for RecordingFeedback {
    fn play(&self, cue: Cue) {
        if let Ok(mut played) = self.played.lock() {
            played.push(cue);
        }
    }
}
