/// Local filesystem storage backend.
///
/// Manages board files on disk with:
/// - SHA-256 board ID hashing (first 12 hex chars of file path)
/// - Atomic writes (write to .tmp, fsync, rename)
/// - Content hashes to notice edits made behind our back
/// - Mutex-guarded writes to prevent concurrent modification
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::SystemTime;

use sha2::{Digest, Sha256};

use super::{BoardInfo, BoardStorage, LaneSummary, StorageError};
use crate::config::ParseOptions;
use crate::edit::EditError;
use crate::ids::HashedIds;
use crate::parser;
use crate::types::{Board, Card};

/// State for a single tracked board.
#[derive(Debug, Clone)]
pub struct BoardState {
    pub file_path: PathBuf,
    pub board: Board,
    pub last_modified: SystemTime,
    /// SHA-256 of the last read/written content
    pub content_hash: String,
    /// Monotonic version counter, incremented on every change
    pub version: u64,
}

/// Local filesystem board storage.
pub struct LocalStorage {
    /// board_id -> BoardState
    boards: RwLock<HashMap<String, BoardState>>,
    /// Per-file write mutex to prevent concurrent modification
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Global version counter (monotonic, shared across all boards)
    next_version: AtomicU64,
    options: ParseOptions,
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStorage {
    pub fn new() -> Self {
        Self::with_options(ParseOptions::default())
    }

    pub fn with_options(options: ParseOptions) -> Self {
        Self {
            boards: RwLock::new(HashMap::new()),
            write_locks: Mutex::new(HashMap::new()),
            next_version: AtomicU64::new(1),
            options,
        }
    }

    fn next_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed)
    }

    /// SHA-256 of content with line endings normalized.
    pub fn content_hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.replace("\r\n", "\n").as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Deterministic board ID from file path: SHA-256 first 12 hex chars.
    pub fn board_id_from_path(file_path: &Path) -> String {
        let mut hasher = Sha256::new();
        hasher.update(file_path.to_string_lossy().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..6])
    }

    fn parse(&self, content: &str) -> Board {
        parser::parse_with(content, &self.options, &mut HashedIds)
    }

    fn state_for(&self, file_path: PathBuf, board: Board, content: &str) -> Result<BoardState, StorageError> {
        let last_modified = fs::metadata(&file_path)?
            .modified()
            .unwrap_or_else(|_| SystemTime::now());
        Ok(BoardState {
            file_path,
            board,
            last_modified,
            content_hash: Self::content_hash(content),
            version: self.next_version(),
        })
    }

    /// Add a board file to tracking. Reads and parses it immediately.
    pub fn add_board(&self, file_path: &Path) -> Result<String, StorageError> {
        let file_path = fs::canonicalize(file_path).unwrap_or_else(|_| file_path.to_path_buf());
        let board_id = Self::board_id_from_path(&file_path);

        let content = fs::read_to_string(&file_path)?;
        let board = self.parse(&content);
        log::info!(
            "[lanemark.storage] Tracking board {} ({} lanes) at {}",
            board_id,
            board.lanes.len(),
            file_path.display()
        );

        let state = self.state_for(file_path, board, &content)?;
        self.boards
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(board_id.clone(), state);
        Ok(board_id)
    }

    /// Reload a board from disk after an outside edit.
    pub fn reload_board(&self, board_id: &str) -> Result<(), StorageError> {
        let file_path = self
            .get_board_path(board_id)
            .ok_or_else(|| StorageError::BoardNotFound(board_id.to_string()))?;

        let content = fs::read_to_string(&file_path)?;
        let board = self.parse(&content);
        let state = self.state_for(file_path, board, &content)?;
        self.boards
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(board_id.to_string(), state);
        log::info!("[lanemark.storage] Reloaded board {}", board_id);
        Ok(())
    }

    /// Get the file path for a board ID.
    pub fn get_board_path(&self, board_id: &str) -> Option<PathBuf> {
        self.boards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(board_id)
            .map(|s| s.file_path.clone())
    }

    /// Get the version number for a board (for ETag support).
    pub fn get_board_version(&self, board_id: &str) -> Option<u64> {
        self.boards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(board_id)
            .map(|s| s.version)
    }

    /// Get the content hash for a board (for conflict detection).
    pub fn get_board_content_hash(&self, board_id: &str) -> Option<String> {
        self.boards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(board_id)
            .map(|s| s.content_hash.clone())
    }

    /// Apply `edit` to the board and write it back. The tracked board is
    /// edited unless the file changed on disk since it was read, in which
    /// case the file is parsed again first.
    pub fn update_board<T>(
        &self,
        board_id: &str,
        edit: impl FnOnce(&mut Board) -> Result<T, EditError>,
    ) -> Result<T, StorageError> {
        let lock = self.get_write_lock(board_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (file_path, tracked, tracked_hash) = self
            .boards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(board_id)
            .map(|s| (s.file_path.clone(), s.board.clone(), s.content_hash.clone()))
            .ok_or_else(|| StorageError::BoardNotFound(board_id.to_string()))?;

        let content = fs::read_to_string(&file_path)?;
        let mut board = if Self::content_hash(&content) == tracked_hash {
            tracked
        } else {
            log::info!(
                "[lanemark.storage] Board {} changed on disk, re-reading before edit",
                board_id
            );
            self.parse(&content)
        };
        let value = edit(&mut board)?;
        self.store(board_id, file_path, board)?;
        Ok(value)
    }

    /// Serialize, write atomically and record the new state. Caller holds
    /// the board's write lock.
    fn store(&self, board_id: &str, file_path: PathBuf, board: Board) -> Result<(), StorageError> {
        let text = parser::serialize(&board)?;
        Self::atomic_write(&file_path, &text)?;
        log::info!(
            "[lanemark.storage] Wrote board {} ({} bytes)",
            board_id,
            text.len()
        );
        let state = self.state_for(file_path, board, &text)?;
        self.boards
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(board_id.to_string(), state);
        Ok(())
    }

    /// Get a write lock for a specific board.
    fn get_write_lock(&self, board_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(board_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Atomic write with fsync: write to .tmp, fsync, rename, fsync directory.
    /// Refuses to write empty content over a non-empty file.
    fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
        if content.trim().is_empty() {
            if let Ok(existing) = fs::read_to_string(path) {
                if !existing.trim().is_empty() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "Refusing to overwrite non-empty file with empty content",
                    ));
                }
            }
        }

        let tmp_path = path.with_extension("lanemark.tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;

        if let Some(dir) = path.parent() {
            if let Ok(d) = fs::File::open(dir) {
                let _ = d.sync_all();
            }
        }
        Ok(())
    }
}

impl BoardStorage for LocalStorage {
    fn list_boards(&self) -> Vec<BoardInfo> {
        let boards = self.boards.read().unwrap_or_else(PoisonError::into_inner);
        let mut infos: Vec<BoardInfo> = boards
            .iter()
            .map(|(id, state)| BoardInfo {
                id: id.clone(),
                file_path: state.file_path.to_string_lossy().to_string(),
                last_modified: state
                    .last_modified
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs(),
                lanes: state
                    .board
                    .lanes
                    .iter()
                    .map(|lane| LaneSummary {
                        id: lane.id.clone(),
                        title: lane.title.clone(),
                        card_count: lane.cards.len(),
                    })
                    .collect(),
            })
            .collect();
        infos.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        infos
    }

    fn read_board(&self, board_id: &str) -> Option<Board> {
        self.boards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(board_id)
            .map(|s| s.board.clone())
    }

    fn write_board(&self, board_id: &str, board: &Board) -> Result<(), StorageError> {
        let lock = self.get_write_lock(board_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let file_path = self
            .get_board_path(board_id)
            .ok_or_else(|| StorageError::BoardNotFound(board_id.to_string()))?;

        let stored_hash = self.get_board_content_hash(board_id).unwrap_or_default();
        if let Ok(disk_content) = fs::read_to_string(&file_path) {
            if Self::content_hash(&disk_content) != stored_hash {
                log::warn!(
                    "[lanemark.storage] Board {} changed on disk since last read, overwriting",
                    board_id
                );
            }
        }

        self.store(board_id, file_path, board.clone())
    }

    fn add_card(&self, board_id: &str, lane_id: &str, title: &str) -> Result<String, StorageError> {
        self.update_board(board_id, |board| {
            board.add_card(lane_id, Card::new("", title.trim()), &mut HashedIds)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const TEST_BOARD: &str = "\
---
kanban-plugin: basic
---

## Todo ^todo

- [ ] Buy groceries ^c1
- [ ] Walk the dog ^c2

## Done ^done

- [x] Laundry ^c3
";

    fn board_file() -> NamedTempFile {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, "{}", TEST_BOARD).unwrap();
        tmp
    }

    #[test]
    fn test_board_id_deterministic() {
        let p = Path::new("/tmp/test.md");
        let id1 = LocalStorage::board_id_from_path(p);
        let id2 = LocalStorage::board_id_from_path(p);
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 12);
    }

    #[test]
    fn test_add_and_list_boards() {
        let tmp = board_file();
        let storage = LocalStorage::new();
        let id = storage.add_board(tmp.path()).unwrap();

        let boards = storage.list_boards();
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].id, id);
        assert_eq!(boards[0].lanes.len(), 2);
        assert_eq!(boards[0].lanes[0].card_count, 2);
    }

    #[test]
    fn test_read_board() {
        let tmp = board_file();
        let storage = LocalStorage::new();
        let id = storage.add_board(tmp.path()).unwrap();

        let board = storage.read_board(&id).unwrap();
        assert_eq!(board.lanes.len(), 2);
        assert_eq!(board.lanes[1].cards[0].id, "c3");
    }

    #[test]
    fn test_unchanged_write_is_byte_identical() {
        let tmp = board_file();
        let storage = LocalStorage::new();
        let id = storage.add_board(tmp.path()).unwrap();
        let hash = storage.get_board_content_hash(&id).unwrap();
        let version = storage.get_board_version(&id).unwrap();

        let board = storage.read_board(&id).unwrap();
        storage.write_board(&id, &board).unwrap();

        assert_eq!(fs::read_to_string(tmp.path()).unwrap(), TEST_BOARD);
        assert_eq!(storage.get_board_content_hash(&id).unwrap(), hash);
        assert!(storage.get_board_version(&id).unwrap() > version);
    }

    #[test]
    fn test_add_card() {
        let tmp = board_file();
        let storage = LocalStorage::new();
        let id = storage.add_board(tmp.path()).unwrap();

        let card_id = storage.add_card(&id, "todo", "New task").unwrap();

        let board = storage.read_board(&id).unwrap();
        let cards = &board.lane("todo").unwrap().cards;
        assert_eq!(cards.len(), 3);
        assert_eq!(cards[2].title, "New task");
        assert_eq!(cards[2].id, card_id);

        let on_disk = fs::read_to_string(tmp.path()).unwrap();
        assert!(on_disk.contains(&format!("- [ ] New task ^{}\n", card_id)));
        assert!(on_disk.contains("- [ ] Walk the dog ^c2\n"));
    }

    #[test]
    fn test_add_card_invalid_lane() {
        let tmp = board_file();
        let storage = LocalStorage::new();
        let id = storage.add_board(tmp.path()).unwrap();

        let result = storage.add_card(&id, "missing", "Bad card");
        assert!(matches!(result, Err(StorageError::LaneNotFound(_))));
        assert_eq!(fs::read_to_string(tmp.path()).unwrap(), TEST_BOARD);
    }

    #[test]
    fn test_update_board_moves_card() {
        let tmp = board_file();
        let storage = LocalStorage::new();
        let id = storage.add_board(tmp.path()).unwrap();

        storage
            .update_board(&id, |board| board.move_card("c1", "done", 1))
            .unwrap();
        let on_disk = fs::read_to_string(tmp.path()).unwrap();
        assert!(on_disk.ends_with("- [x] Laundry ^c3\n- [ ] Buy groceries ^c1\n"));

        let missing = storage.update_board(&id, |board| board.toggle_card("nope"));
        assert!(matches!(missing, Err(StorageError::CardNotFound(_))));
    }

    #[test]
    fn test_generated_lane_id_usable_for_edits() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, "## Todo\n\n- [ ] Buy groceries\n").unwrap();
        let storage = LocalStorage::new();
        let id = storage.add_board(tmp.path()).unwrap();

        let lane_id = storage.list_boards()[0].lanes[0].id.clone();
        let existing = storage.read_board(&id).unwrap().lanes[0].cards[0].id.clone();
        let card_id = storage.add_card(&id, &lane_id, "Walk the dog").unwrap();

        let on_disk = fs::read_to_string(tmp.path()).unwrap();
        assert!(on_disk.contains(&format!("## Todo ^{}\n", lane_id)));
        assert!(on_disk.contains(&format!("- [ ] Buy groceries ^{}\n", existing)));
        assert!(on_disk.contains(&format!("- [ ] Walk the dog ^{}\n", card_id)));

        storage.reload_board(&id).unwrap();
        assert_eq!(storage.list_boards()[0].lanes[0].id, lane_id);
        assert!(storage.update_board(&id, |board| board.toggle_card(&existing)).unwrap());
    }

    #[test]
    fn test_update_board_rereads_outside_edit() {
        let tmp = board_file();
        let storage = LocalStorage::new();
        let id = storage.add_board(tmp.path()).unwrap();

        fs::write(tmp.path(), TEST_BOARD.replace("Laundry ^c3", "Laundry ^c3\n- [ ] Dishes ^c4")).unwrap();
        storage
            .update_board(&id, |board| board.move_card("c4", "todo", 0))
            .unwrap();
        let board = storage.read_board(&id).unwrap();
        assert_eq!(board.lane("todo").unwrap().cards[0].id, "c4");
    }

    #[test]
    fn test_unknown_board() {
        let storage = LocalStorage::new();
        assert!(storage.read_board("nope").is_none());
        assert!(matches!(
            storage.write_board("nope", &Board::default()),
            Err(StorageError::BoardNotFound(_))
        ));
    }

    #[test]
    fn test_refuses_empty_overwrite() {
        let tmp = board_file();
        let err = LocalStorage::atomic_write(tmp.path(), "  \n").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        assert_eq!(fs::read_to_string(tmp.path()).unwrap(), TEST_BOARD);
    }
}
