// Harmony history: one row per committed transition.
//
// The installation logs every harmonic move (scale mode, key, chord, chord
// variation) so the lighting and visuals side can follow the music and so a
// session can be replayed. Rows are appended only for committed ticks; a
// rejected tick leaves no trace here.
//
// `HarmonyHistory` optionally keeps only the most recent rows.

use crate::harmony::TransitionKind;
use crate::state::SongState;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarmonyRecord {
    /// Session tick the transition was committed on.
    pub tick: u64,
    pub kind: TransitionKind,
    pub scale_mode: String,
    pub key: String,
    pub chord: String,
    pub chord_variation: String,
}

impl HarmonyRecord {
    pub fn from_state(tick: u64, kind: TransitionKind, state: &SongState) -> Self {
        Self {
            tick,
            kind,
            scale_mode: state.scale_mode.clone(),
            key: state.key.clone(),
            chord: state.chord.clone(),
            chord_variation: state.chord_variation.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HarmonyHistory {
    records: VecDeque<HarmonyRecord>,
    /// Keep at most this many rows, dropping the oldest. `None` keeps all.
    limit: Option<usize>,
}

impl HarmonyHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self::bounded(Some(limit))
    }

    /// Unbounded for `None`.
    pub fn bounded(limit: Option<usize>) -> Self {
        Self {
            records: VecDeque::new(),
            limit,
        }
    }

    /// Drop every row, keeping the limit.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn push(&mut self, record: HarmonyRecord) {
        self.records.push_back(record);
        if let Some(limit) = self.limit {
            while self.records.len() > limit {
                self.records.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&HarmonyRecord> {
        self.records.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HarmonyRecord> {
        self.records.iter()
    }

    /// Count of rows per transition kind, as (key changes, chord changes,
    /// variation shifts).
    pub fn kind_counts(&self) -> (usize, usize, usize) {
        self.records.iter().fold((0, 0, 0), |(k, c, v), r| match r.kind {
            TransitionKind::KeyChange => (k + 1, c, v),
            TransitionKind::ChordChange => (k, c + 1, v),
            TransitionKind::VariationShift => (k, c, v + 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tick: u64, kind: TransitionKind) -> HarmonyRecord {
        HarmonyRecord {
            tick,
            kind,
            scale_mode: "ionian".into(),
            key: "C".into(),
            chord: "I".into(),
            chord_variation: "major triad".into(),
        }
    }

    #[test]
    fn limited_history_drops_oldest() {
        let mut history = HarmonyHistory::with_limit(2);
        history.push(record(1, TransitionKind::KeyChange));
        history.push(record(2, TransitionKind::ChordChange));
        history.push(record(3, TransitionKind::VariationShift));
        assert_eq!(history.len(), 2);
        let ticks: Vec<_> = history.iter().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![2, 3]);
        assert_eq!(history.kind_counts(), (0, 1, 1));
    }

    #[test]
    fn clear_keeps_the_limit() {
        let mut history = HarmonyHistory::with_limit(2);
        history.push(record(1, TransitionKind::KeyChange));
        history.push(record(2, TransitionKind::ChordChange));
        history.clear();
        assert!(history.is_empty());
        assert!(history.last().is_none());
        for tick in 3..6 {
            history.push(record(tick, TransitionKind::VariationShift));
        }
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn unbounded_history_keeps_every_row() {
        let mut history = HarmonyHistory::bounded(None);
        for tick in 0..100 {
            history.push(record(tick, TransitionKind::VariationShift));
        }
        assert_eq!(history.len(), 100);
    }

    #[test]
    fn record_serializes_kind_in_snake_case() {
        let json = serde_json::to_string(&record(7, TransitionKind::VariationShift)).unwrap();
        assert!(json.contains("\"variation_shift\""), "{json}");
    }
}
