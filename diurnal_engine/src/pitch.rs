// Pitch utilities: pitch-class folding, closest-pitch search, octave folding,
// scale/chord pitch correction and the melody octave floor.
//
// Every other engine stage builds on these. They are pure functions over
// `Pitch` (`i32` semitone offsets) and `PitchClassSet` (a 12-slot membership
// mask, the same representation the scale tables use).
//
// The chromatic correction in `adjust_to_permitted` is deliberately a single
// downward semitone step. A corrected pitch may still be outside the permitted
// set; it is not corrected again.

use crate::types::{Pitch, PitchClass};
use serde::{Deserialize, Serialize};

/// Fold any pitch into 0..=11.
pub fn normalize(pitch: Pitch) -> PitchClass {
    pitch.rem_euclid(12) as PitchClass
}

/// Fold a list of pitches into pitch classes, keeping order and duplicates.
pub fn normalize_notes(pitches: &[Pitch]) -> Vec<Pitch> {
    pitches.iter().map(|&p| normalize(p) as Pitch).collect()
}

/// Membership mask over the 12 pitch classes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchClassSet([bool; 12]);

impl PitchClassSet {
    pub fn from_pitches(pitches: &[Pitch]) -> Self {
        let mut mask = [false; 12];
        for &p in pitches {
            mask[normalize(p) as usize] = true;
        }
        Self(mask)
    }

    /// Same set moved up by `semitones`.
    pub fn transposed(&self, semitones: Pitch) -> Self {
        let mut mask = [false; 12];
        for (pc, &on) in self.0.iter().enumerate() {
            if on {
                mask[normalize(pc as Pitch + semitones) as usize] = true;
            }
        }
        Self(mask)
    }

    pub fn contains(&self, pitch: Pitch) -> bool {
        self.0[normalize(pitch) as usize]
    }

    pub fn len(&self) -> usize {
        self.0.iter().filter(|on| **on).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Closest candidate to `note` among every target at its given position and
/// one octave below.
///
/// Returns `(candidate, original_target)`. Candidates are considered in the
/// order "all targets as given, then all targets minus 12"; on equal distance
/// the first one wins. `None` for an empty target list.
pub fn find_closest(note: Pitch, targets: &[Pitch]) -> Option<(Pitch, Pitch)> {
    let candidates = targets
        .iter()
        .map(|&t| (t, t))
        .chain(targets.iter().map(|&t| (t - 12, t)));
    let mut best: Option<(Pitch, Pitch)> = None;
    for (candidate, original) in candidates {
        let better = match best {
            None => true,
            Some((b, _)) => (candidate - note).abs() < (b - note).abs(),
        };
        if better {
            best = Some((candidate, original));
        }
    }
    best
}

/// Move `note` by octaves into `[reference, reference + 12)`.
pub fn fold_into_octave(note: Pitch, reference: Pitch) -> Pitch {
    reference + (note - reference).rem_euclid(12)
}

/// Which candidates the chromatic correction leaves alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Exemption {
    /// Correct everything.
    #[default]
    None,
    /// Leave candidates whose pitch class is listed alone. This is the
    /// canonical rule for both chord and melody rendering.
    PitchClasses(PitchClassSet),
    /// Leave the candidate at this list position alone. Legacy chord rule
    /// (index 4 of the variation's note list); kept for older tables, new
    /// configuration should use `PitchClasses`.
    Index(usize),
}

impl Exemption {
    fn exempts(&self, index: usize, pitch: Pitch) -> bool {
        match self {
            Exemption::None => false,
            Exemption::PitchClasses(set) => set.contains(pitch),
            Exemption::Index(i) => *i == index,
        }
    }
}

/// Single-step chromatic correction into a permitted pitch-class set.
///
/// Each pitch whose class is not permitted (and is not exempt) is lowered by
/// one semitone. The result is not re-checked.
pub fn adjust_to_permitted(
    pitches: &[Pitch],
    permitted: &PitchClassSet,
    exemption: &Exemption,
) -> Vec<Pitch> {
    pitches
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            if permitted.contains(p) || exemption.exempts(i, p) {
                p
            } else {
                p - 1
            }
        })
        .collect()
}

/// Transpose a phrase up by whole octaves until its lowest pitch is at or
/// above `floor`. Never transposes down.
pub fn raise_to_floor(pitches: &[Pitch], floor: Pitch) -> Vec<Pitch> {
    let Some(&lowest) = pitches.iter().min() else {
        return Vec::new();
    };
    let mut shift = 0;
    while lowest + shift < floor {
        shift += 12;
    }
    pitches.iter().map(|p| p + shift).collect()
}
