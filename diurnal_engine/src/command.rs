// Commands the engine sends to the host runtime.
//
// The engine never touches an instrument directly. Every stage returns a list
// of `HostCommand`s (instrument name + `HostAction`) and the session hands
// them to an `InstrumentHost` only after the tick's state was committed. The
// host is whatever plays the instruments: a live runtime, the MIDI recorder
// in `midi.rs`, or `RecordingHost` in tests.
//
// Actions:
// - `NoteOn` / `NoteOff`: sustained notes. Note-offs carry velocity 0.
// - `Flush`: drop every sounding note of the instrument.
// - `ClearBuffer`: erase a time/pitch region of the instrument's clip buffer.
// - `ScheduleNotes`: write notes into the clip buffer.
// - `Fire` / `Stop`: start or stop clip playback.
//
// Commands are applied in list order.

use crate::types::{InstrumentId, Pitch};
use serde::{Deserialize, Serialize};

/// A note written into a clip buffer. Times are in beats.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduledNote {
    pub pitch: Pitch,
    pub onset: f64,
    pub duration: f64,
    pub velocity: u8,
    pub channel: u8,
}

/// A rectangular region of a clip buffer: beats `start..end`, pitches
/// `low..=high`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClearRange {
    pub start: f64,
    pub end: f64,
    pub low: u8,
    pub high: u8,
}

impl ClearRange {
    /// The first `beats` beats over the full MIDI pitch range.
    pub fn beats(beats: f64) -> Self {
        Self {
            start: 0.0,
            end: beats,
            low: 0,
            high: 127,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HostAction {
    NoteOn { pitch: Pitch, velocity: u8 },
    NoteOff { pitch: Pitch },
    Flush,
    ClearBuffer(ClearRange),
    ScheduleNotes(Vec<ScheduledNote>),
    Fire,
    Stop,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostCommand {
    pub instrument: InstrumentId,
    pub action: HostAction,
}

impl HostCommand {
    pub fn new(instrument: &InstrumentId, action: HostAction) -> Self {
        Self {
            instrument: instrument.clone(),
            action,
        }
    }

    pub fn note_on(instrument: &InstrumentId, pitch: Pitch, velocity: u8) -> Self {
        Self::new(instrument, HostAction::NoteOn { pitch, velocity })
    }

    pub fn note_off(instrument: &InstrumentId, pitch: Pitch) -> Self {
        Self::new(instrument, HostAction::NoteOff { pitch })
    }
}

/// The host runtime's capabilities, as far as the engine needs them.
pub trait InstrumentHost {
    fn apply(&mut self, command: &HostCommand);
}

/// Apply `commands` to `host` in order.
pub fn dispatch(host: &mut impl InstrumentHost, commands: &[HostCommand]) {
    for command in commands {
        host.apply(command);
    }
}

/// A host that records every command it receives.
#[derive(Clone, Debug, Default)]
pub struct RecordingHost {
    pub commands: Vec<HostCommand>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded commands addressed to `instrument`.
    pub fn for_instrument<'a>(&'a self, instrument: &'a str) -> impl Iterator<Item = &'a HostAction> {
        self.commands
            .iter()
            .filter(move |c| c.instrument.as_str() == instrument)
            .map(|c| &c.action)
    }
}

impl InstrumentHost for RecordingHost {
    fn apply(&mut self, command: &HostCommand) {
        self.commands.push(command.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_preserves_order() {
        let pad = InstrumentId::new("synth_pad");
        let bell = InstrumentId::new("church_bell");
        let commands = vec![
            HostCommand::note_off(&pad, 44),
            HostCommand::note_on(&pad, 47, 100),
            HostCommand::new(&bell, HostAction::Fire),
        ];
        let mut host = RecordingHost::new();
        dispatch(&mut host, &commands);
        assert_eq!(host.commands, commands);
        let pad_actions: Vec<_> = host.for_instrument("synth_pad").cloned().collect();
        assert_eq!(
            pad_actions,
            vec![
                HostAction::NoteOff { pitch: 44 },
                HostAction::NoteOn { pitch: 47, velocity: 100 }
            ]
        );
    }

    #[test]
    fn clear_range_spans_all_pitches() {
        let range = ClearRange::beats(8.0);
        assert_eq!((range.start, range.end, range.low, range.high), (0.0, 8.0, 0, 127));
    }
}
