use doudizhu_core::{Card, GameStatus, Role};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    CreateGame { room_id: String },
    JoinGame { room_id: String },
    Bid { score: u8 },
    Play { cards: String },
    Pass,
    Cancel,
    Hand,
    Status,
    Ping,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    Welcome {
        user_id: String,
        user_name: String,
    },
    Status(GameStatus),
    Hand(HandView),
    BottomCards {
        cards: Vec<String>,
    },
    Rejected {
        reason: String,
    },
    GameOver {
        room_id: String,
        winner_id: String,
        side: Role,
        multiplier: u32,
    },
    Cancelled {
        room_id: String,
    },
    Error {
        message: String,
    },
    Pong,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HandView {
    pub role: Role,
    pub cards: Vec<String>,
}

impl HandView {
    pub fn new(cards: &[Card], role: Role) -> Self {
        HandView {
            role,
            cards: card_labels(cards),
        }
    }
}

pub fn card_labels(cards: &[Card]) -> Vec<String> {
    cards.iter().map(|card| card.to_string()).collect()
}
