// Lookup tables: keys, scale modes, chords and chord variations.
//
// The installation's tables are authored as spreadsheet-style rows where
// pitch lists are comma-separated integers ("0,4,7") and transition lists are
// comma-separated names ("IV,V,vi"). `TableData` mirrors that raw format for
// serde; `Tables::index()` parses every row once, builds name → row maps and
// cross-validates every reference (transition targets, key-change targets,
// the "<quality> triad" variation for each chord quality, the tonic reset
// targets). An unknown name is therefore a load-time error; at tick time a
// miss can only come from persisted state naming something the tables do not
// have, and surfaces as `EngineError::LookupMiss`.
//
// The default data is embedded from `data/tables.json` via `include_str!`
// (see `Tables::builtin()`).
//
// Tables are consumed, never mutated, by the engine.

use crate::error::{EngineError, Result, TableKind};
use crate::pitch::PitchClassSet;
use crate::types::Pitch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Chord the key-change transition resets to.
pub const TONIC_CHORD: &str = "I";

/// Variation the key-change transition resets to.
pub const TONIC_VARIATION: &str = "major triad";

// ---------------------------------------------------------------------------
// Raw row format
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyRow {
    pub name: String,
    pub offset: Pitch,
    pub common_key_changes: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScaleModeRow {
    pub name: String,
    pub notes: String,
    pub mood: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChordRow {
    pub name: String,
    pub notes_above_root: String,
    pub quality: String,
    pub common_transitions: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChordVariationRow {
    pub name: String,
    pub notes_above_root: String,
    pub kind: VariationKind,
    pub tension: Tension,
    pub possible_transitions: String,
    /// Offsets (relative to the chord root) the scale correction must leave
    /// alone, e.g. "10" for a deliberately flat seventh.
    #[serde(default)]
    pub ignore: String,
}

/// The full table set in its authored form.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableData {
    pub keys: Vec<KeyRow>,
    pub scale_modes: Vec<ScaleModeRow>,
    pub chords: Vec<ChordRow>,
    pub chord_variations: Vec<ChordVariationRow>,
}

// ---------------------------------------------------------------------------
// Parsed rows
// ---------------------------------------------------------------------------

/// Harmonic family of a chord variation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariationKind {
    Major,
    Minor,
    Diminished,
    Augmented,
    Suspended,
    Dominant,
}

impl VariationKind {
    /// Variations of these kinds are always corrected against the scale mode.
    pub fn follows_scale(self) -> bool {
        matches!(
            self,
            VariationKind::Major | VariationKind::Suspended | VariationKind::Dominant
        )
    }
}

/// Whether a variation wants to resolve. Chord changes wait while the current
/// variation is a tension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tension {
    Tension,
    Resolution,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Key {
    pub name: String,
    pub offset: Pitch,
    pub targets: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScaleMode {
    pub name: String,
    /// Scale-degree offsets, degree 1 first.
    pub degrees: Vec<Pitch>,
    pub mood: String,
    pub pitch_classes: PitchClassSet,
}

impl ScaleMode {
    /// Pitch of a zero-based scale degree. Degrees past the last (or below
    /// zero) wrap into the neighbouring octave.
    pub fn degree_pitch(&self, degree: i32) -> Pitch {
        let len = self.degrees.len() as i32;
        self.degrees[degree.rem_euclid(len) as usize] + 12 * degree.div_euclid(len)
    }

    /// Degrees 1, 3 and 5: the tonic triad of the mode.
    pub fn tonic_triad(&self) -> Vec<Pitch> {
        vec![self.degrees[0], self.degrees[2], self.degrees[4]]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Chord {
    pub name: String,
    /// Ascending offsets above the tonic; the first is the root.
    pub notes: Vec<Pitch>,
    pub quality: String,
    pub transitions: Vec<String>,
}

impl Chord {
    /// Lowest note above the tonic, the offset variations are built on.
    pub fn root(&self) -> Pitch {
        self.notes.iter().copied().min().unwrap_or(0)
    }

    /// Name of the plain triad matching this chord's quality.
    pub fn triad_name(&self) -> String {
        format!("{} triad", self.quality)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChordVariation {
    pub name: String,
    pub notes: Vec<Pitch>,
    pub kind: VariationKind,
    pub tension: Tension,
    pub transitions: Vec<String>,
    pub ignore: Vec<Pitch>,
}

// ---------------------------------------------------------------------------
// Indexed tables
// ---------------------------------------------------------------------------

/// All lookup tables, indexed by name.
#[derive(Clone, Debug)]
pub struct Tables {
    keys: BTreeMap<String, Key>,
    scale_modes: BTreeMap<String, ScaleMode>,
    chords: BTreeMap<String, Chord>,
    variations: BTreeMap<String, ChordVariation>,
    /// Variation names in authored order, for uniform draws over the table.
    variation_order: Vec<String>,
    /// Scale mode names in authored order, for mood draws.
    scale_mode_order: Vec<String>,
}

impl Tables {
    /// The embedded default tables.
    pub fn builtin() -> Self {
        let json = include_str!("../data/tables.json");
        Tables::from_json(json).expect("embedded tables.json is malformed")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let data: TableData = serde_json::from_str(json)?;
        Tables::index(data)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Tables::from_json(&json)
    }

    /// Parse and cross-validate raw rows.
    pub fn index(data: TableData) -> Result<Self> {
        let mut keys = BTreeMap::new();
        for row in data.keys {
            let key = Key {
                targets: parse_names(&row.common_key_changes),
                offset: row.offset,
                name: row.name,
            };
            insert_unique(&mut keys, key.name.clone(), key, TableKind::Key)?;
        }

        let mut scale_modes = BTreeMap::new();
        let mut scale_mode_order = Vec::new();
        for row in data.scale_modes {
            let degrees = parse_pitches(&row.notes, &row.name)?;
            if degrees.len() < 7 {
                return Err(EngineError::InvalidTable(format!(
                    "scale mode '{}' has {} degrees, need at least 7",
                    row.name,
                    degrees.len()
                )));
            }
            let mode = ScaleMode {
                pitch_classes: PitchClassSet::from_pitches(&degrees),
                degrees,
                mood: row.mood,
                name: row.name,
            };
            scale_mode_order.push(mode.name.clone());
            insert_unique(&mut scale_modes, mode.name.clone(), mode, TableKind::ScaleMode)?;
        }

        let mut chords = BTreeMap::new();
        for row in data.chords {
            let chord = Chord {
                notes: parse_pitches(&row.notes_above_root, &row.name)?,
                transitions: parse_names(&row.common_transitions),
                quality: row.quality,
                name: row.name,
            };
            insert_unique(&mut chords, chord.name.clone(), chord, TableKind::Chord)?;
        }

        let mut variations = BTreeMap::new();
        let mut variation_order = Vec::new();
        for row in data.chord_variations {
            let variation = ChordVariation {
                notes: parse_pitches(&row.notes_above_root, &row.name)?,
                ignore: parse_pitches(&row.ignore, &row.name)?,
                kind: row.kind,
                tension: row.tension,
                transitions: parse_names(&row.possible_transitions),
                name: row.name,
            };
            variation_order.push(variation.name.clone());
            insert_unique(
                &mut variations,
                variation.name.clone(),
                variation,
                TableKind::ChordVariation,
            )?;
        }

        let tables = Tables {
            keys,
            scale_modes,
            chords,
            variations,
            variation_order,
            scale_mode_order,
        };
        tables.validate()?;
        Ok(tables)
    }

    /// Every name a row refers to must exist, and every transition list must
    /// offer at least one choice.
    fn validate(&self) -> Result<()> {
        for key in self.keys.values() {
            check_targets(&key.name, &key.targets, |n| self.keys.contains_key(n), "key")?;
        }
        for chord in self.chords.values() {
            check_targets(&chord.name, &chord.transitions, |n| self.chords.contains_key(n), "chord")?;
            if chord.notes.is_empty() {
                return Err(EngineError::InvalidTable(format!("chord '{}' has no notes", chord.name)));
            }
            let triad = chord.triad_name();
            if !self.variations.contains_key(&triad) {
                return Err(EngineError::InvalidTable(format!(
                    "chord '{}' has quality '{}' but no '{}' variation",
                    chord.name, chord.quality, triad
                )));
            }
        }
        for variation in self.variations.values() {
            check_targets(
                &variation.name,
                &variation.transitions,
                |n| self.variations.contains_key(n),
                "chord variation",
            )?;
            if variation.notes.is_empty() {
                return Err(EngineError::InvalidTable(format!(
                    "chord variation '{}' has no notes",
                    variation.name
                )));
            }
        }
        if !self.chords.contains_key(TONIC_CHORD) {
            return Err(EngineError::InvalidTable(format!("missing tonic chord '{TONIC_CHORD}'")));
        }
        if !self.variations.contains_key(TONIC_VARIATION) {
            return Err(EngineError::InvalidTable(format!(
                "missing tonic variation '{TONIC_VARIATION}'"
            )));
        }
        Ok(())
    }

    pub fn key(&self, name: &str) -> Result<&Key> {
        self.keys
            .get(name)
            .ok_or_else(|| EngineError::lookup_miss(TableKind::Key, name))
    }

    pub fn scale_mode(&self, name: &str) -> Result<&ScaleMode> {
        self.scale_modes
            .get(name)
            .ok_or_else(|| EngineError::lookup_miss(TableKind::ScaleMode, name))
    }

    pub fn chord(&self, name: &str) -> Result<&Chord> {
        self.chords
            .get(name)
            .ok_or_else(|| EngineError::lookup_miss(TableKind::Chord, name))
    }

    pub fn variation(&self, name: &str) -> Result<&ChordVariation> {
        self.variations
            .get(name)
            .ok_or_else(|| EngineError::lookup_miss(TableKind::ChordVariation, name))
    }

    /// Every variation name, in authored order.
    pub fn variation_names(&self) -> &[String] {
        &self.variation_order
    }

    /// Scale modes tagged with `mood`, in authored order.
    pub fn scale_modes_with_mood(&self, mood: &str) -> Vec<&ScaleMode> {
        self.scale_mode_order
            .iter()
            .filter_map(|name| self.scale_modes.get(name))
            .filter(|mode| mode.mood == mood)
            .collect()
    }

    pub fn has_scale_mode(&self, name: &str) -> bool {
        self.scale_modes.contains_key(name)
    }
}

fn insert_unique<T>(
    map: &mut BTreeMap<String, T>,
    name: String,
    row: T,
    table: TableKind,
) -> Result<()> {
    if map.contains_key(&name) {
        return Err(EngineError::InvalidTable(format!("duplicate '{name}' in {table}")));
    }
    map.insert(name, row);
    Ok(())
}

fn check_targets(
    owner: &str,
    targets: &[String],
    exists: impl Fn(&str) -> bool,
    what: &str,
) -> Result<()> {
    if targets.is_empty() {
        return Err(EngineError::InvalidTable(format!("{what} '{owner}' has no transitions")));
    }
    for target in targets {
        if !exists(target) {
            return Err(EngineError::InvalidTable(format!(
                "{what} '{owner}' transitions to unknown '{target}'"
            )));
        }
    }
    Ok(())
}

/// "IV, V,vi" -> ["IV", "V", "vi"]
fn parse_names(field: &str) -> Vec<String> {
    field
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// "0,4,7" -> [0, 4, 7]
fn parse_pitches(field: &str, owner: &str) -> Result<Vec<Pitch>> {
    field
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Pitch>().map_err(|_| {
                EngineError::InvalidTable(format!("'{owner}' has non-integer pitch '{s}'"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_data() -> TableData {
        TableData {
            keys: vec![
                KeyRow { name: "C".into(), offset: 0, common_key_changes: "G".into() },
                KeyRow { name: "G".into(), offset: 7, common_key_changes: "C".into() },
            ],
            scale_modes: vec![ScaleModeRow {
                name: "ionian".into(),
                notes: "0,2,4,5,7,9,11".into(),
                mood: "bright".into(),
            }],
            chords: vec![ChordRow {
                name: "I".into(),
                notes_above_root: "0,4,7".into(),
                quality: "major".into(),
                common_transitions: "I".into(),
            }],
            chord_variations: vec![ChordVariationRow {
                name: "major triad".into(),
                notes_above_root: "0,4,7".into(),
                kind: VariationKind::Major,
                tension: Tension::Resolution,
                possible_transitions: "major triad".into(),
                ignore: String::new(),
            }],
        }
    }

    #[test]
    fn builtin_tables_index() {
        let tables = Tables::builtin();
        assert_eq!(tables.key("C").unwrap().offset, 0);
        assert_eq!(tables.key("A").unwrap().offset, 9);
        assert_eq!(tables.chord("IV").unwrap().root(), 5);
        assert_eq!(tables.variation_names().len(), 12);
        let dom7 = tables.variation("dominant 7").unwrap();
        assert_eq!(dom7.ignore, vec![10]);
        assert_eq!(dom7.tension, Tension::Tension);
    }

    #[test]
    fn unknown_name_is_lookup_miss() {
        let tables = Tables::builtin();
        match tables.chord("IX") {
            Err(EngineError::LookupMiss { table: TableKind::Chord, name }) => assert_eq!(name, "IX"),
            other => panic!("expected LookupMiss, got {other:?}"),
        }
    }

    #[test]
    fn dangling_transition_fails_to_index() {
        let mut data = tiny_data();
        data.chords[0].common_transitions = "I,V".into();
        let err = Tables::index(data).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTable(_)), "{err}");
    }

    #[test]
    fn missing_quality_triad_fails_to_index() {
        let mut data = tiny_data();
        data.chords[0].quality = "minor".into();
        assert!(Tables::index(data).is_err());
    }

    #[test]
    fn short_scale_mode_fails_to_index() {
        let mut data = tiny_data();
        data.scale_modes[0].notes = "0,2,4".into();
        assert!(Tables::index(data).is_err());
    }

    #[test]
    fn duplicate_rows_fail_to_index() {
        let mut data = tiny_data();
        let dup = data.keys[0].clone();
        data.keys.push(dup);
        assert!(Tables::index(data).is_err());
    }

    #[test]
    fn pitch_fields_parse_with_whitespace() {
        assert_eq!(parse_pitches(" 0, 4 ,7", "x").unwrap(), vec![0, 4, 7]);
        assert!(parse_pitches("", "x").unwrap().is_empty());
        assert!(parse_pitches("0,four", "x").is_err());
        assert_eq!(parse_names("IV, V,vi"), vec!["IV", "V", "vi"]);
    }

    #[test]
    fn degree_pitch_wraps_octaves() {
        let tables = Tables::builtin();
        let ionian = tables.scale_mode("ionian").unwrap();
        assert_eq!(ionian.degree_pitch(0), 0);
        assert_eq!(ionian.degree_pitch(4), 7);
        assert_eq!(ionian.degree_pitch(7), 12);
        assert_eq!(ionian.degree_pitch(-1), -1);
        assert_eq!(ionian.tonic_triad(), vec![0, 4, 7]);
    }

    #[test]
    fn mood_lookup() {
        let tables = Tables::builtin();
        let bright: Vec<_> = tables.scale_modes_with_mood("bright").iter().map(|m| m.name.clone()).collect();
        assert_eq!(bright, vec!["lydian", "ionian"]);
        assert!(tables.scale_modes_with_mood("sombre").is_empty());
    }
}
