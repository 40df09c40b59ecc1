//! Board documents: a plain-text kanban format with lanes, checkbox cards and
//! inline metadata, parsed into a [`Board`] model and written back with
//! unchanged spans reproduced byte-for-byte.

pub mod card;
pub mod config;
pub mod dates;
pub mod diff;
pub mod edit;
pub mod extract;
pub mod ids;
pub mod parser;
pub mod recurrence;
pub mod segment;
pub mod storage;
pub mod types;

pub use config::ParseOptions;
pub use edit::{CardLocation, EditError};
pub use ids::{HashedIds, IdAllocator, SequentialIds};
pub use parser::{parse, parse_with, serialize, FormatError};
pub use recurrence::{Frequency, RecurrenceEnd, RecurrencePattern};
pub use types::{Board, BoardSettings, Card, Lane, MetadataValue, Subtask};
