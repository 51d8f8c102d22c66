// MIDI recording host.
//
// `MidiRecorder` plays the part of the host runtime offline: it applies
// `HostCommand`s against a beat clock and writes what it heard to a Standard
// MIDI File. Each instrument gets its own track in first-seen order and the
// next melodic channel, skipping channel 9 (General MIDI percussion). Past 15
// instruments the channels wrap, so later instruments share a channel with
// earlier ones. Sustained notes start and stop at the current beat; clip notes are
// kept per instrument until `Fire` renders them relative to the current beat.
// `Flush` releases everything the instrument is sounding, `Stop` releases its
// clip notes that are still ringing.
//
// Uses the `midly` crate for writing. Output is SMF Format 1 (multi-track)
// with a tempo track first.

use crate::command::{HostAction, HostCommand, InstrumentHost, ScheduledNote};
use crate::error::Result;
use crate::types::{InstrumentId, Pitch};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::collections::BTreeSet;
use std::path::Path;

/// Ticks per quarter note (one beat) in MIDI output.
const TICKS_PER_BEAT: u32 = 480;

/// Channels handed out to instruments, in order. Channel 9 is GM drums.
const MELODIC_CHANNELS: [u8; 15] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 13, 14, 15];

/// Channel for the instrument on track `index` (0-based, tempo track excluded).
fn channel_for(index: usize) -> u4 {
    u4::new(MELODIC_CHANNELS[index % MELODIC_CHANNELS.len()])
}

/// One recorded event at an absolute MIDI tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Recorded {
    tick: u32,
    /// Insertion order, to keep same-tick events stable.
    seq: u64,
    on: bool,
    pitch: u8,
    velocity: u8,
}

#[derive(Clone, Debug, Default)]
struct InstrumentTrack {
    events: Vec<Recorded>,
    /// Pitches with an outstanding sustained note-on.
    sounding: BTreeSet<u8>,
    /// Notes written to the clip buffer, not yet fired.
    clip: Vec<ScheduledNote>,
    /// Fired clip notes as (pitch, end tick), to cut on `Stop`.
    ringing: Vec<(u8, u32)>,
}

#[derive(Clone, Debug)]
pub struct MidiRecorder {
    tempo_bpm: u32,
    beat: f64,
    seq: u64,
    names: Vec<InstrumentId>,
    tracks: Vec<InstrumentTrack>,
}

fn midi_pitch(pitch: Pitch) -> u8 {
    pitch.clamp(0, 127) as u8
}

fn beats_to_ticks(beats: f64) -> u32 {
    (beats.max(0.0) * TICKS_PER_BEAT as f64).round() as u32
}

impl MidiRecorder {
    pub fn new(tempo_bpm: u32) -> Self {
        Self {
            tempo_bpm: tempo_bpm.max(1),
            beat: 0.0,
            seq: 0,
            names: Vec::new(),
            tracks: Vec::new(),
        }
    }

    /// Move the clock forward.
    pub fn advance(&mut self, beats: f64) {
        self.beat += beats.max(0.0);
    }

    pub fn beat(&self) -> f64 {
        self.beat
    }

    /// Number of note events recorded for `instrument`.
    pub fn event_count(&self, instrument: &str) -> usize {
        self.names
            .iter()
            .position(|n| n.as_str() == instrument)
            .map_or(0, |i| self.tracks[i].events.len())
    }

    pub fn instruments(&self) -> &[InstrumentId] {
        &self.names
    }

    fn track_index(&mut self, instrument: &InstrumentId) -> usize {
        match self.names.iter().position(|n| n == instrument) {
            Some(i) => i,
            None => {
                self.names.push(instrument.clone());
                self.tracks.push(InstrumentTrack::default());
                self.names.len() - 1
            }
        }
    }

    fn push(&mut self, track: usize, tick: u32, on: bool, pitch: u8, velocity: u8) {
        self.seq += 1;
        self.tracks[track].events.push(Recorded {
            tick,
            seq: self.seq,
            on,
            pitch,
            velocity,
        });
    }

    /// Build the SMF in memory.
    fn to_smf(&self) -> Smf<'_> {
        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(TICKS_PER_BEAT as u16)),
        ));

        let tempo_microseconds = 60_000_000 / self.tempo_bpm;
        smf.tracks.push(vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
            },
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            },
        ]);

        for (i, (name, data)) in self.names.iter().zip(&self.tracks).enumerate() {
            let channel = channel_for(i);
            let mut track: Track<'_> = vec![TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::TrackName(name.as_str().as_bytes())),
            }];
            let mut events = data.events.clone();
            events.sort_by_key(|e| (e.tick, e.seq));
            let mut last_tick = 0;
            for e in events {
                let message = if e.on {
                    MidiMessage::NoteOn {
                        key: u7::new(e.pitch),
                        vel: u7::new(e.velocity.min(127)),
                    }
                } else {
                    MidiMessage::NoteOff {
                        key: u7::new(e.pitch),
                        vel: u7::new(0),
                    }
                };
                track.push(TrackEvent {
                    delta: u28::new(e.tick - last_tick),
                    kind: TrackEventKind::Midi { channel, message },
                });
                last_tick = e.tick;
            }
            track.push(TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            });
            smf.tracks.push(track);
        }
        smf
    }

    /// Write everything recorded so far to `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        self.to_smf().save(path)?;
        Ok(())
    }
}

impl InstrumentHost for MidiRecorder {
    fn apply(&mut self, command: &HostCommand) {
        let track = self.track_index(&command.instrument);
        let now = beats_to_ticks(self.beat);
        match &command.action {
            HostAction::NoteOn { pitch, velocity } => {
                let pitch = midi_pitch(*pitch);
                self.tracks[track].sounding.insert(pitch);
                self.push(track, now, true, pitch, *velocity);
            }
            HostAction::NoteOff { pitch } => {
                let pitch = midi_pitch(*pitch);
                self.tracks[track].sounding.remove(&pitch);
                self.push(track, now, false, pitch, 0);
            }
            HostAction::Flush => {
                let sounding = std::mem::take(&mut self.tracks[track].sounding);
                for pitch in sounding {
                    self.push(track, now, false, pitch, 0);
                }
            }
            HostAction::ClearBuffer(range) => {
                let low = range.low as Pitch;
                let high = range.high as Pitch;
                self.tracks[track].clip.retain(|n| {
                    !(n.onset >= range.start && n.onset < range.end && n.pitch >= low && n.pitch <= high)
                });
            }
            HostAction::ScheduleNotes(notes) => {
                self.tracks[track].clip.extend(notes.iter().cloned());
            }
            HostAction::Fire => {
                let clip = self.tracks[track].clip.clone();
                for note in clip {
                    let pitch = midi_pitch(note.pitch);
                    let start = now + beats_to_ticks(note.onset);
                    let end = start + beats_to_ticks(note.duration).max(1);
                    self.push(track, start, true, pitch, note.velocity);
                    self.push(track, end, false, pitch, 0);
                    self.tracks[track].ringing.push((pitch, end));
                }
            }
            HostAction::Stop => {
                let ringing = std::mem::take(&mut self.tracks[track].ringing);
                for (pitch, end) in ringing {
                    if end > now {
                        self.push(track, now, false, pitch, 0);
                    }
                }
            }
        }
    }
}
