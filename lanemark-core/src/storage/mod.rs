pub mod local;

use serde::Serialize;

use crate::edit::EditError;
use crate::parser::FormatError;
use crate::types::Board;

/// Summary of one lane for board listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneSummary {
    pub id: String,
    pub title: String,
    pub card_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardInfo {
    pub id: String,
    pub file_path: String,
    /// Seconds since the Unix epoch.
    pub last_modified: u64,
    pub lanes: Vec<LaneSummary>,
}

/// Abstract storage trait for board backends.
/// Implementations: LocalStorage (filesystem).
pub trait BoardStorage: Send + Sync {
    /// List all tracked boards with summary info.
    fn list_boards(&self) -> Vec<BoardInfo>;

    /// Parsed board by its ID.
    fn read_board(&self, board_id: &str) -> Option<Board>;

    /// Serialize a full board back to storage.
    fn write_board(&self, board_id: &str, board: &Board) -> Result<(), StorageError>;

    /// Append a card to a lane. Returns the new card's identifier.
    fn add_card(&self, board_id: &str, lane_id: &str, title: &str) -> Result<String, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Board not found: {0}")]
    BoardNotFound(String),

    #[error("Lane not found: {0}")]
    LaneNotFound(String),

    #[error("Card not found: {0}")]
    CardNotFound(String),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EditError> for StorageError {
    fn from(e: EditError) -> Self {
        match e {
            EditError::LaneNotFound(id) => StorageError::LaneNotFound(id),
            EditError::CardNotFound(id) => StorageError::CardNotFound(id),
        }
    }
}
