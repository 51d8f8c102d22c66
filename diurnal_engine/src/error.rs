// Error taxonomy for the engine.
//
// Only genuine failures are errors. A voice shortfall (fewer chord tones than
// an instrument has voices) drops voices, and a store fetch with no value
// falls back to the seeded default; neither reaches this enum.
//
// A `LookupMiss` during a tick rejects the whole tick: the staged state is
// discarded, nothing is committed to the store and no command reaches the
// host (see `session.rs`).

use std::fmt;
use thiserror::Error;

/// Which lookup table a name was resolved against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableKind {
    Key,
    ScaleMode,
    Chord,
    ChordVariation,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TableKind::Key => "keys",
            TableKind::ScaleMode => "scale modes",
            TableKind::Chord => "chords",
            TableKind::ChordVariation => "chord variations",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// A symbolic name was not present in its table.
    #[error("unknown name '{name}' in {table}")]
    LookupMiss { table: TableKind, name: String },

    /// Table data failed cross-validation while being indexed.
    #[error("invalid table data: {0}")]
    InvalidTable(String),

    /// A value has no code in the telemetry enumeration tables.
    #[error("no telemetry code for {field} '{value}'")]
    TelemetryCode { field: &'static str, value: String },

    /// Configuration is internally inconsistent.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("store serialization error: {0}")]
    Store(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn lookup_miss(table: TableKind, name: &str) -> Self {
        EngineError::LookupMiss {
            table,
            name: name.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
