/// Card-level diff between two board versions.
///
/// Cards are matched by stable identifier, lanes by lane identifier, so a
/// renamed lane does not show up as every card moving.
use std::collections::{HashMap, HashSet};

use crate::types::{Board, Card};

/// Lane identifier used for archived cards.
pub const ARCHIVE_LANE: &str = "archive";

/// A single card change between two board versions.
#[derive(Debug, Clone, PartialEq)]
pub enum CardChange {
    Added {
        id: String,
        lane_id: String,
        card: Card,
    },
    Removed {
        id: String,
        lane_id: String,
    },
    Modified {
        id: String,
        lane_id: String,
        old_title: String,
        new_title: String,
        old_completed: bool,
        new_completed: bool,
    },
    Moved {
        id: String,
        old_lane: String,
        new_lane: String,
    },
}

/// Snapshot of a card's state for comparison.
#[derive(Debug, Clone)]
pub struct CardSnapshot<'a> {
    pub lane_id: &'a str,
    pub card: &'a Card,
    pub position: usize,
}

/// Cards in board order, archive last, each with its lane.
pub fn snapshot_board(board: &Board) -> Vec<CardSnapshot<'_>> {
    let lanes = board
        .lanes
        .iter()
        .map(|lane| (lane.id.as_str(), &lane.cards))
        .chain(std::iter::once((ARCHIVE_LANE, &board.archive)));
    let mut snapshot = Vec::new();
    for (lane_id, cards) in lanes {
        for (position, card) in cards.iter().enumerate() {
            if card.id.is_empty() {
                continue;
            }
            snapshot.push(CardSnapshot {
                lane_id,
                card,
                position,
            });
        }
    }
    snapshot
}

/// Compute changes between two board versions, in old-board order
/// followed by additions in new-board order.
pub fn diff_boards(old_board: &Board, new_board: &Board) -> Vec<CardChange> {
    let old_snap = snapshot_board(old_board);
    let new_snap = snapshot_board(new_board);
    let new_by_id: HashMap<&str, &CardSnapshot<'_>> =
        new_snap.iter().map(|s| (s.card.id.as_str(), s)).collect();
    let old_ids: HashSet<&str> = old_snap.iter().map(|s| s.card.id.as_str()).collect();
    let mut changes = Vec::new();

    for old in &old_snap {
        let id = old.card.id.clone();
        let Some(new) = new_by_id.get(old.card.id.as_str()) else {
            changes.push(CardChange::Removed {
                id,
                lane_id: old.lane_id.to_string(),
            });
            continue;
        };
        if old.lane_id != new.lane_id {
            changes.push(CardChange::Moved {
                id: id.clone(),
                old_lane: old.lane_id.to_string(),
                new_lane: new.lane_id.to_string(),
            });
        }
        if old.card.title != new.card.title || old.card.completed != new.card.completed {
            changes.push(CardChange::Modified {
                id,
                lane_id: new.lane_id.to_string(),
                old_title: old.card.title.clone(),
                new_title: new.card.title.clone(),
                old_completed: old.card.completed,
                new_completed: new.card.completed,
            });
        }
    }

    for new in &new_snap {
        if !old_ids.contains(new.card.id.as_str()) {
            changes.push(CardChange::Added {
                id: new.card.id.clone(),
                lane_id: new.lane_id.to_string(),
                card: new.card.clone(),
            });
        }
    }

    changes
}
