// A running session: the engine wired to a state store, a host and a PRNG.
//
// Each trigger edge runs load → step → commit → dispatch:
//
// - the song state is loaded from the store (missing keys fall back to the
//   seeded default);
// - the engine steps an owned copy of it;
// - on success the new state is committed to the store, then the commands
//   are dispatched to the host, then a history row is appended;
// - on error nothing is committed and nothing is dispatched, so the store
//   and the host still agree with each other.
//
// Ticks and bell strikes have separate edge triggers. Panic and full reset
// go through the same commit-then-dispatch path; a full reset also empties
// the harmony history. The history keeps at most `history_limit` rows.

use crate::command::{HostCommand, InstrumentHost, dispatch};
use crate::error::Result;
use crate::event::{HarmonyHistory, HarmonyRecord};
use crate::harmony::TransitionKind;
use crate::scene::{full_reset, panic_all};
use crate::state::SongState;
use crate::store::StateStore;
use crate::telemetry::TelemetryFrame;
use crate::tick::{EdgeTrigger, Engine, TickInput};
use crate::types::TimeOfDay;
use diurnal_prng::RandomSource;

/// What a committed tick did.
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub transition: TransitionKind,
    pub record: HarmonyRecord,
    pub commands: usize,
    pub advanced_to: Option<TimeOfDay>,
}

pub struct Session<S: StateStore, H: InstrumentHost, R: RandomSource> {
    engine: Engine,
    store: S,
    host: H,
    rng: R,
    history: HarmonyHistory,
    tick_trigger: EdgeTrigger,
    bell_trigger: EdgeTrigger,
    ticks: u64,
}

impl<S: StateStore, H: InstrumentHost, R: RandomSource> Session<S, H, R> {
    pub fn new(engine: Engine, store: S, host: H, rng: R) -> Self {
        let history = HarmonyHistory::bounded(engine.config.history_limit);
        Self {
            engine,
            store,
            host,
            rng,
            history,
            tick_trigger: EdgeTrigger::new(),
            bell_trigger: EdgeTrigger::new(),
            ticks: 0,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// The host, e.g. to move a recorder's clock between ticks.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn history(&self) -> &HarmonyHistory {
        &self.history
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Give back the store and host, e.g. to finish a MIDI recording.
    pub fn into_parts(self) -> (S, H, HarmonyHistory) {
        (self.store, self.host, self.history)
    }

    /// The state as the store currently holds it.
    pub fn load_state(&self) -> Result<SongState> {
        SongState::load_from(&self.store, self.engine.seed_state()?)
    }

    /// Feed one sample of the tick control. Runs a tick on a rising edge.
    pub fn on_tick_signal(&mut self, level: bool, input: &TickInput) -> Result<Option<TickReport>> {
        if !self.tick_trigger.update(level) {
            return Ok(None);
        }
        self.run_tick(input).map(Some)
    }

    /// Feed one sample of the bell control. Returns whether bells were struck,
    /// or `None` when the sample was not a rising edge.
    pub fn on_bell_signal(&mut self, level: bool) -> Result<Option<bool>> {
        if !self.bell_trigger.update(level) {
            return Ok(None);
        }
        self.run_bell().map(Some)
    }

    pub fn run_tick(&mut self, input: &TickInput) -> Result<TickReport> {
        let state = self.load_state()?;
        let outcome = match self.engine.tick(&state, input, &mut self.rng) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("tick {} rejected: {e}", self.ticks + 1);
                return Err(e);
            }
        };
        self.commit(&outcome.state, &outcome.commands)?;
        self.ticks += 1;

        let record = HarmonyRecord::from_state(self.ticks, outcome.transition, &outcome.state);
        log::info!(
            "tick {}: {} -> {} {} / {} ({}) in {}",
            self.ticks,
            outcome.transition,
            record.key,
            record.scale_mode,
            record.chord,
            record.chord_variation,
            outcome.state.current_scene
        );
        self.history.push(record.clone());
        Ok(TickReport {
            tick: self.ticks,
            transition: outcome.transition,
            record,
            commands: outcome.commands.len(),
            advanced_to: outcome.advanced_to,
        })
    }

    pub fn run_bell(&mut self) -> Result<bool> {
        let state = self.load_state()?;
        let outcome = match self.engine.bell(&state, &mut self.rng) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("bell rejected: {e}");
                return Err(e);
            }
        };
        self.commit(&outcome.state, &outcome.commands)?;
        Ok(outcome.rang)
    }

    /// Silence every instrument in every scene.
    pub fn panic(&mut self) -> Result<()> {
        let mut state = self.load_state()?;
        let (instruments, commands) = panic_all(&state.instruments, &self.engine.config);
        state.instruments = instruments;
        log::info!("panic: {} commands", commands.len());
        self.commit(&state, &commands)
    }

    /// Silence everything, reseed the state in the reset scene and forget
    /// the harmony history.
    pub fn reset(&mut self) -> Result<()> {
        let state = self.load_state()?;
        let (fresh, commands) = full_reset(&state, &self.engine.config, &self.engine.tables)?;
        log::info!("reset to {}, dropping {} history rows", fresh.current_scene, self.history.len());
        self.commit(&fresh, &commands)?;
        self.history.clear();
        Ok(())
    }

    pub fn telemetry(&self) -> Result<TelemetryFrame> {
        TelemetryFrame::capture(&self.load_state()?)
    }

    fn commit(&mut self, state: &SongState, commands: &[HostCommand]) -> Result<()> {
        state.commit_to(&mut self.store)?;
        dispatch(&mut self.host, commands);
        Ok(())
    }
}
