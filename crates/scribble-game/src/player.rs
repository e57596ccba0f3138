//! Players and colour assignment.

use scribble_protocol::{PlayerId, PlayerView};
use scribble_timer::CountdownTimer;

/// Display colours handed out in order. A colour is never shared by two
/// players of one session, including players waiting to reconnect.
pub const PALETTE: [&str; 8] = [
    "#FF5733", "#33FF57", "#3357FF", "#FF33A6", "#FFFF33", "#33FFF5", "#A633FF", "#FF8C33",
];

/// A participant in one session.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,
    pub is_leader: bool,
    pub is_drawing: bool,
    pub has_drawn: bool,
    pub has_guessed_correctly: bool,
    pub score: i32,
    pub color: String,
    /// Running while the player is disconnected.
    pub(crate) grace: Option<CountdownTimer>,
}

impl Player {
    pub fn new(id: PlayerId, username: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            is_leader: false,
            is_drawing: false,
            has_drawn: false,
            has_guessed_correctly: false,
            score: 0,
            color: color.into(),
            grace: None,
        }
    }

    /// Fields broadcast to clients.
    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id.clone(),
            username: self.username.clone(),
            is_leader: self.is_leader,
            is_drawing: self.is_drawing,
            has_guessed_correctly: self.has_guessed_correctly,
            score: self.score,
            color: self.color.clone(),
        }
    }
}

/// First palette colour not in `taken`. Falls back to cycling the palette
/// when every colour is in use.
pub fn pick_color<'a>(taken: impl IntoIterator<Item = &'a str>) -> &'static str {
    let taken: Vec<&str> = taken.into_iter().collect();
    PALETTE
        .iter()
        .copied()
        .find(|c| !taken.contains(c))
        .unwrap_or(PALETTE[taken.len() % PALETTE.len()])
}
