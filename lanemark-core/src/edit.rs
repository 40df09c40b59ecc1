/// In-memory board edits addressed by stable identifier.
///
/// Boards are small, so every lookup is a linear scan. Edits only touch the
/// model; retained source text stays attached to the cards and lanes it was
/// read with and `serialize` decides what can be reused.
use crate::ids::IdAllocator;
use crate::types::{Board, Card, Lane};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("Lane not found: {0}")]
    LaneNotFound(String),

    #[error("Card not found: {0}")]
    CardNotFound(String),
}

/// Where a card currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardLocation {
    Lane { lane: usize, index: usize },
    Archive { index: usize },
}

impl Board {
    pub fn lane(&self, lane_id: &str) -> Option<&Lane> {
        self.lanes.iter().find(|l| l.id == lane_id)
    }

    pub fn lane_mut(&mut self, lane_id: &str) -> Option<&mut Lane> {
        self.lanes.iter_mut().find(|l| l.id == lane_id)
    }

    fn lane_index(&self, lane_id: &str) -> Result<usize, EditError> {
        self.lanes
            .iter()
            .position(|l| l.id == lane_id)
            .ok_or_else(|| EditError::LaneNotFound(lane_id.to_string()))
    }

    /// Append a new lane and return its identifier.
    pub fn add_lane(&mut self, title: &str, ids: &mut dyn IdAllocator) -> String {
        let id = ids.allocate();
        self.lanes.push(Lane::new(id.clone(), title.trim()));
        id
    }

    pub fn remove_lane(&mut self, lane_id: &str) -> Result<Lane, EditError> {
        let index = self.lane_index(lane_id)?;
        Ok(self.lanes.remove(index))
    }

    pub fn rename_lane(&mut self, lane_id: &str, title: &str) -> Result<(), EditError> {
        let index = self.lane_index(lane_id)?;
        self.lanes[index].title = title.trim().to_string();
        Ok(())
    }

    pub fn locate_card(&self, card_id: &str) -> Option<CardLocation> {
        for (lane, l) in self.lanes.iter().enumerate() {
            if let Some(index) = l.cards.iter().position(|c| c.id == card_id) {
                return Some(CardLocation::Lane { lane, index });
            }
        }
        self.archive
            .iter()
            .position(|c| c.id == card_id)
            .map(|index| CardLocation::Archive { index })
    }

    /// Searches lanes first, then the archive.
    pub fn find_card(&self, card_id: &str) -> Option<&Card> {
        match self.locate_card(card_id)? {
            CardLocation::Lane { lane, index } => self.lanes[lane].cards.get(index),
            CardLocation::Archive { index } => self.archive.get(index),
        }
    }

    pub fn find_card_mut(&mut self, card_id: &str) -> Option<&mut Card> {
        match self.locate_card(card_id)? {
            CardLocation::Lane { lane, index } => self.lanes[lane].cards.get_mut(index),
            CardLocation::Archive { index } => self.archive.get_mut(index),
        }
    }

    /// Append `card` to a lane, allocating an identifier if it has none.
    /// Returns the card's identifier.
    pub fn add_card(
        &mut self,
        lane_id: &str,
        mut card: Card,
        ids: &mut dyn IdAllocator,
    ) -> Result<String, EditError> {
        let index = self.lane_index(lane_id)?;
        if card.id.trim().is_empty() {
            card.id = ids.allocate();
        }
        let id = card.id.clone();
        self.lanes[index].cards.push(card);
        Ok(id)
    }

    /// Remove a card from whichever lane (or the archive) holds it.
    pub fn remove_card(&mut self, card_id: &str) -> Result<Card, EditError> {
        match self.locate_card(card_id) {
            Some(CardLocation::Lane { lane, index }) => Ok(self.lanes[lane].cards.remove(index)),
            Some(CardLocation::Archive { index }) => Ok(self.archive.remove(index)),
            None => Err(EditError::CardNotFound(card_id.to_string())),
        }
    }

    /// Move a card into `to_lane` at `position` (clamped to the lane length).
    pub fn move_card(
        &mut self,
        card_id: &str,
        to_lane: &str,
        position: usize,
    ) -> Result<(), EditError> {
        let target = self.lane_index(to_lane)?;
        let card = self.remove_card(card_id)?;
        let cards = &mut self.lanes[target].cards;
        let position = position.min(cards.len());
        cards.insert(position, card);
        Ok(())
    }

    /// Flip the checkbox; returns the new state.
    pub fn toggle_card(&mut self, card_id: &str) -> Result<bool, EditError> {
        let card = self
            .find_card_mut(card_id)
            .ok_or_else(|| EditError::CardNotFound(card_id.to_string()))?;
        card.completed = !card.completed;
        Ok(card.completed)
    }

    /// Move a lane card to the end of the archive.
    pub fn archive_card(&mut self, card_id: &str) -> Result<(), EditError> {
        match self.locate_card(card_id) {
            Some(CardLocation::Lane { lane, index }) => {
                let card = self.lanes[lane].cards.remove(index);
                self.archive.push(card);
                Ok(())
            }
            Some(CardLocation::Archive { .. }) => Ok(()),
            None => Err(EditError::CardNotFound(card_id.to_string())),
        }
    }
}
