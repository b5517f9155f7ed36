//! # dgl-ls (Labeling Service)
//!
//! Client side of collaborative labeling:
//! - `session`: focused-image label state with debounced writes and a
//!   document listener as source of truth
//! - `reviewed_map`: corpus-wide reviewed flags from a collection listener
//! - `export`: admin bulk export to JSON and JSON Lines
//! - `console`: command parsing and navigation for the annotator console

pub mod console;
pub mod debounce;
pub mod export;
pub mod reviewed_map;
pub mod session;

pub use export::{build_export, render_json, render_jsonl, ExportReport};
pub use reviewed_map::ReviewedMap;
pub use session::{LabelSession, SaveState};
