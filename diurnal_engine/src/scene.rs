// Scene lifecycle: which scenes may sound, and silencing the rest.
//
// The timeline runs Morning → Day → Evening → Night → Morning (successors come
// from the config). One scene is current and its successor is the crossfade
// target; the host reports every scene's volume each tick.
//
// - `advance_scene`: once the current scene has faded to silence while its
//   successor is audible, the successor becomes current.
// - `kill_instruments`: every scene that is neither current, next nor still
//   above the audibility threshold is silenced. Silencing depends on the role:
//   melody clears its clip buffer and stops, sfx stops, everything else is
//   flushed and has its buffer cleared. Voices are emptied. Running it twice
//   leaves the state unchanged the second time.
// - `panic_all`: silence every instrument in every scene.
// - `reset_scene` / `full_reset`: jump the timeline, or reseed everything.

use crate::command::{ClearRange, HostAction, HostCommand};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::state::{Instrument, InstrumentRegistry, SongState};
use crate::tables::Tables;
use crate::types::{InstrumentId, InstrumentRole, TimeOfDay};
use std::collections::BTreeMap;

/// Host-reported volume per scene, in [0, 1]. A scene missing from the map is
/// silent.
pub type SceneVolumes = BTreeMap<TimeOfDay, f32>;

pub fn volume_of(volumes: &SceneVolumes, scene: TimeOfDay) -> f32 {
    volumes.get(&scene).copied().unwrap_or(0.0)
}

/// The successor of `current` if the crossfade into it has completed.
pub fn advance_scene(
    current: TimeOfDay,
    volumes: &SceneVolumes,
    config: &EngineConfig,
) -> Result<Option<TimeOfDay>> {
    let next = config.next_scene(current)?;
    if volume_of(volumes, current) <= 0.0 && volume_of(volumes, next) > 0.0 {
        Ok(Some(next))
    } else {
        Ok(None)
    }
}

/// Commands silencing one instrument, and its snapshot with no voices.
pub fn silence_instrument(
    name: &InstrumentId,
    inst: &Instrument,
    config: &EngineConfig,
) -> (Instrument, Vec<HostCommand>) {
    let clear = HostAction::ClearBuffer(ClearRange::beats(config.silence_clear_window));
    let actions = match inst.role {
        InstrumentRole::Melody => vec![clear, HostAction::Stop],
        InstrumentRole::Sfx => vec![HostAction::Stop],
        InstrumentRole::Bass
        | InstrumentRole::Chords
        | InstrumentRole::Effects
        | InstrumentRole::Percussion
        | InstrumentRole::Event => vec![HostAction::Flush, clear],
    };
    let commands = actions.into_iter().map(|a| HostCommand::new(name, a)).collect();
    (inst.with_playing_notes(Vec::new()), commands)
}

fn silence_scenes(
    instruments: &InstrumentRegistry,
    config: &EngineConfig,
    silence: impl Fn(TimeOfDay) -> bool,
) -> (InstrumentRegistry, Vec<HostCommand>) {
    let mut commands = Vec::new();
    let mut updated = InstrumentRegistry::new();
    for (&scene, scene_instruments) in instruments {
        if !silence(scene) {
            updated.insert(scene, scene_instruments.clone());
            continue;
        }
        let silenced = scene_instruments
            .iter()
            .map(|(name, inst)| {
                let (inst, cmds) = silence_instrument(name, inst, config);
                commands.extend(cmds);
                (name.clone(), inst)
            })
            .collect();
        updated.insert(scene, silenced);
    }
    (updated, commands)
}

/// Silence every scene that is not current, not next and not audible.
pub fn kill_instruments(
    instruments: &InstrumentRegistry,
    current: TimeOfDay,
    next: TimeOfDay,
    volumes: &SceneVolumes,
    config: &EngineConfig,
) -> (InstrumentRegistry, Vec<HostCommand>) {
    silence_scenes(instruments, config, |scene| {
        scene != current
            && scene != next
            && volume_of(volumes, scene) <= config.audible_volume_threshold
    })
}

/// Silence every instrument in every scene.
pub fn panic_all(
    instruments: &InstrumentRegistry,
    config: &EngineConfig,
) -> (InstrumentRegistry, Vec<HostCommand>) {
    silence_scenes(instruments, config, |_| true)
}

/// Make `scene` current without touching anything else.
pub fn reset_scene(state: SongState, scene: TimeOfDay) -> SongState {
    SongState {
        current_scene: scene,
        ..state
    }
}

/// Silence everything and start over from a freshly seeded state in the
/// configured reset scene.
pub fn full_reset(
    state: &SongState,
    config: &EngineConfig,
    tables: &Tables,
) -> Result<(SongState, Vec<HostCommand>)> {
    let (_, commands) = panic_all(&state.instruments, config);
    let fresh = SongState::seeded(config, tables)?;
    Ok((reset_scene(fresh, config.reset_scene), commands))
}
