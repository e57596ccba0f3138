//! Drawer rotation within and across rounds.

use std::collections::HashSet;

use scribble_protocol::PlayerId;

use crate::GameError;
use crate::player::Player;

/// What [`Round::next_drawer`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Another player of the same round draws next.
    Next,
    /// Everyone drew; a new round started.
    NewRound,
    /// The last round is over.
    Finished,
}

/// Round counter and drawer cursor.
///
/// The roster itself belongs to the session; every method that needs it
/// takes it as a slice, so the cursor always refers to the slice it was
/// last moved on.
#[derive(Debug, Clone)]
pub struct Round {
    count: u32,
    drawer_idx: usize,
    /// Players who finished their turn this round.
    drawn: HashSet<PlayerId>,
    finished: bool,
}

impl Default for Round {
    fn default() -> Self {
        Self::new()
    }
}

impl Round {
    /// Round 1, cursor on the first roster slot.
    pub fn new() -> Self {
        Self {
            count: 1,
            drawer_idx: 0,
            drawn: HashSet::new(),
            finished: false,
        }
    }

    /// 1-based round number.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Roster index of the current drawer.
    pub fn drawer_idx(&self) -> usize {
        self.drawer_idx
    }

    pub fn drawn(&self) -> &HashSet<PlayerId> {
        &self.drawn
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Marks the player at the cursor as the drawer of the first turn.
    pub fn begin(&mut self, roster: &mut [Player]) -> Result<(), GameError> {
        for p in roster.iter_mut() {
            p.is_drawing = false;
        }
        let drawer = roster.first_mut().ok_or(GameError::EmptyRoster)?;
        drawer.is_drawing = true;
        self.drawer_idx = 0;
        Ok(())
    }

    /// Records `finished` as done drawing and moves the cursor to the
    /// next player who has not drawn this round.
    ///
    /// When every roster player has drawn, the round advances and the
    /// cursor keeps rotating from where it was. Once the last round is
    /// done the result is [`Advance::Finished`], and every later call
    /// returns it again without touching the roster.
    ///
    /// # Errors
    /// [`GameError::EmptyRoster`] if there is nobody to pick.
    pub fn next_drawer(
        &mut self,
        roster: &mut [Player],
        finished: Option<&PlayerId>,
        max_rounds: u32,
    ) -> Result<Advance, GameError> {
        if self.finished {
            return Ok(Advance::Finished);
        }
        if roster.is_empty() {
            return Err(GameError::EmptyRoster);
        }

        if let Some(id) = finished {
            if roster.iter().any(|p| &p.id == id) {
                self.drawn.insert(id.clone());
            }
        }
        for p in roster.iter_mut() {
            p.is_drawing = false;
        }

        let n = roster.len();
        for step in 1..=n {
            let idx = (self.drawer_idx + step) % n;
            if !self.drawn.contains(&roster[idx].id) {
                self.drawer_idx = idx;
                roster[idx].is_drawing = true;
                return Ok(Advance::Next);
            }
        }

        if self.count >= max_rounds {
            self.finished = true;
            tracing::debug!(rounds = self.count, "last round complete");
            return Ok(Advance::Finished);
        }

        self.count += 1;
        self.drawn.clear();
        for p in roster.iter_mut() {
            p.has_drawn = false;
        }
        self.drawer_idx = (self.drawer_idx + 1) % n;
        roster[self.drawer_idx].is_drawing = true;
        Ok(Advance::NewRound)
    }

    /// Keeps the cursor consistent after `roster.remove(idx)`.
    ///
    /// Removing the drawer parks the cursor on the previous slot, so the
    /// next call to [`next_drawer`](Self::next_drawer) lands on whoever
    /// moved into the freed slot.
    pub fn on_player_removed(&mut self, idx: usize, id: &PlayerId, remaining: usize) {
        self.drawn.remove(id);
        if remaining == 0 {
            self.drawer_idx = 0;
        } else if idx < self.drawer_idx {
            self.drawer_idx -= 1;
        } else if idx == self.drawer_idx {
            self.drawer_idx = if idx == 0 { remaining - 1 } else { idx - 1 };
        }
    }

    /// Keeps the cursor consistent after `roster.insert(idx, ..)`.
    /// `has_drawn` restores the player's place in the drawn-set.
    pub fn on_player_inserted(&mut self, idx: usize, id: &PlayerId, has_drawn: bool, len_before: usize) {
        if len_before > 0 && idx <= self.drawer_idx {
            self.drawer_idx += 1;
        }
        if has_drawn {
            self.drawn.insert(id.clone());
        }
    }
}
