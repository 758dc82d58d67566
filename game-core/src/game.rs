use crate::card::{deal, Card, DECK_SIZE};
use crate::pattern::{classify, Pattern, PatternKind};
use crate::player::{Player, Role};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

pub const SEATS: usize = 3;
pub const MAX_BID: u8 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum GameState {
    Waiting,
    Bidding,
    Playing,
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BidOutcome {
    /// Bidding moves on to `next_bidder`.
    Continue { next_bidder: usize },
    /// `landlord` holds the bottom cards and leads first.
    LandlordDecided { landlord: usize, multiplier: u32 },
    /// Everybody passed; the hand was dealt again and bidding restarts.
    NoOneBid { next_bidder: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum BidError {
    #[error("it is not your turn to bid")]
    NotYourTurn,
    #[error("bids must be between 0 and 3")]
    InvalidScore,
    #[error("bid must be higher than the current highest bid")]
    ScoreTooLow,
    #[error("the game is not in the bidding phase")]
    InvalidState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayOutcome {
    Success { pattern: Pattern, next_turn: usize },
    Win {
        pattern: Pattern,
        winner: usize,
        side: Role,
        multiplier: u32,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassOutcome {
    pub next_turn: usize,
    /// The two other seats passed in a row and the next player leads freely.
    pub trick_cleared: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PlayError {
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("you do not hold those cards")]
    CardsNotFound,
    #[error("those cards do not form a valid pattern")]
    InvalidPattern,
    #[error("that play does not beat the cards on the table")]
    CannotBeat,
    #[error("you must play a card")]
    MustPlay,
    #[error("the game is not in the playing phase")]
    InvalidState,
}

#[derive(Clone, Debug, Default)]
struct Bidding {
    current: usize,
    highest_bid: u8,
    highest_bidder: Option<usize>,
    acted: [bool; SEATS],
    passes: u8,
}

/// One Doudizhu table: three seats moving through dealing, bidding and play.
#[derive(Clone, Debug)]
pub struct Game {
    id: String,
    room_id: String,
    created_at: Instant,
    state: GameState,
    players: Vec<Player>,
    landlord: Option<usize>,
    turn: usize,
    bidding: Bidding,
    bottom: Vec<Card>,
    last_pattern: Option<Pattern>,
    last_player: Option<usize>,
    consecutive_passes: u8,
    multiplier: u32,
    winner: Option<usize>,
    rng: StdRng,
}

impl Game {
    pub fn new(id: impl Into<String>, room_id: impl Into<String>, seed: u64) -> Self {
        Game {
            id: id.into(),
            room_id: room_id.into(),
            created_at: Instant::now(),
            state: GameState::Waiting,
            players: Vec::with_capacity(SEATS),
            landlord: None,
            turn: 0,
            bidding: Bidding::default(),
            bottom: Vec::with_capacity(3),
            last_pattern: None,
            last_player: None,
            consecutive_passes: 0,
            multiplier: 1,
            winner: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn landlord(&self) -> Option<usize> {
        self.landlord
    }

    /// Seat expected to act next, bidding or playing.
    pub fn turn(&self) -> usize {
        match self.state {
            GameState::Bidding => self.bidding.current,
            _ => self.turn,
        }
    }

    pub fn highest_bid(&self) -> Option<(u8, usize)> {
        self.bidding
            .highest_bidder
            .map(|seat| (self.bidding.highest_bid, seat))
    }

    pub fn last_pattern(&self) -> Option<&Pattern> {
        self.last_pattern.as_ref()
    }

    pub fn last_player(&self) -> Option<usize> {
        self.last_player
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    pub fn winner(&self) -> Option<usize> {
        self.winner
    }

    /// The three bottom cards, visible once a landlord has taken them.
    pub fn bottom_cards(&self) -> Option<&[Card]> {
        self.landlord.map(|_| self.bottom.as_slice())
    }

    pub fn player_index(&self, player_id: &str) -> Option<usize> {
        self.players.iter().position(|p| p.id == player_id)
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= SEATS
    }

    /// Seats a player while waiting. Returns `false` when the table is full,
    /// already dealt, or the player is already seated.
    pub fn join(&mut self, player_id: &str, name: &str) -> bool {
        if self.state != GameState::Waiting || self.is_full() {
            return false;
        }
        if self.player_index(player_id).is_some() {
            return false;
        }
        self.players.push(Player::new(player_id, name));
        true
    }

    pub fn can_start(&self) -> bool {
        self.state == GameState::Waiting && self.players.len() == SEATS
    }

    /// Deals a fresh hand and opens bidding with a random first bidder.
    pub fn start(&mut self) -> bool {
        if !self.can_start() {
            return false;
        }
        self.deal_hand();
        info!(game = %self.id, room = %self.room_id, first_bidder = self.bidding.current, "game started");
        true
    }

    fn deal_hand(&mut self) {
        for player in self.players.iter_mut() {
            player.clear_hand();
        }
        let (hands, bottom) = deal(&mut self.rng);
        for (player, hand) in self.players.iter_mut().zip(hands) {
            player.take_cards(hand);
        }
        self.bottom = bottom;
        self.landlord = None;
        self.last_pattern = None;
        self.last_player = None;
        self.consecutive_passes = 0;
        self.multiplier = 1;
        let first = self.rng.gen_range(0..SEATS);
        self.bidding = Bidding {
            current: first,
            ..Bidding::default()
        };
        self.turn = first;
        self.state = GameState::Bidding;
        debug_assert_eq!(self.cards_in_play(), DECK_SIZE);
    }

    fn cards_in_play(&self) -> usize {
        self.players.iter().map(|p| p.hand().len()).sum::<usize>()
            + if self.landlord.is_some() { 0 } else { self.bottom.len() }
    }

    /// Submits a bid of 0 (pass) to 3 for the current bidder.
    pub fn bid(&mut self, player_id: &str, score: u8) -> Result<BidOutcome, BidError> {
        if self.state != GameState::Bidding {
            return Err(BidError::InvalidState);
        }
        let seat = self.player_index(player_id).ok_or(BidError::NotYourTurn)?;
        if seat != self.bidding.current {
            return Err(BidError::NotYourTurn);
        }
        if score > MAX_BID {
            return Err(BidError::InvalidScore);
        }
        if score > 0 && score <= self.bidding.highest_bid {
            return Err(BidError::ScoreTooLow);
        }

        self.bidding.acted[seat] = true;
        if score == 0 {
            self.bidding.passes += 1;
        } else {
            self.bidding.highest_bid = score;
            self.bidding.highest_bidder = Some(seat);
            self.bidding.passes = 0;
        }
        debug!(game = %self.id, seat, score, "bid");

        let everyone_acted = self.bidding.acted.iter().all(|acted| *acted);
        if score == MAX_BID || everyone_acted {
            return Ok(match self.bidding.highest_bidder {
                Some(landlord) => self.finalize_landlord(landlord),
                None => {
                    debug_assert_eq!(usize::from(self.bidding.passes), SEATS);
                    debug!(game = %self.id, "no one bid, dealing again");
                    self.deal_hand();
                    BidOutcome::NoOneBid {
                        next_bidder: self.bidding.current,
                    }
                }
            });
        }

        self.bidding.current = (self.bidding.current + 1) % SEATS;
        Ok(BidOutcome::Continue {
            next_bidder: self.bidding.current,
        })
    }

    fn finalize_landlord(&mut self, landlord: usize) -> BidOutcome {
        self.landlord = Some(landlord);
        self.multiplier = u32::from(self.bidding.highest_bid);
        let bottom = self.bottom.clone();
        for (seat, player) in self.players.iter_mut().enumerate() {
            player.set_landlord(seat == landlord);
        }
        self.players[landlord].take_cards(bottom);
        self.turn = landlord;
        self.state = GameState::Playing;
        info!(
            game = %self.id,
            landlord = %self.players[landlord].id,
            multiplier = self.multiplier,
            "landlord decided"
        );
        BidOutcome::LandlordDecided {
            landlord,
            multiplier: self.multiplier,
        }
    }

    fn playing_seat(&self, player_id: &str) -> Result<usize, PlayError> {
        if self.state != GameState::Playing {
            return Err(PlayError::InvalidState);
        }
        let seat = self.player_index(player_id).ok_or(PlayError::NotYourTurn)?;
        if seat != self.turn {
            return Err(PlayError::NotYourTurn);
        }
        Ok(seat)
    }

    /// `seat` leads a new trick: the table is open or it owns the table pattern.
    fn leads(&self, seat: usize) -> bool {
        self.last_pattern.is_none() || self.last_player == Some(seat)
    }

    /// Plays `cards` for the seat whose turn it is.
    pub fn play(&mut self, player_id: &str, cards: &[Card]) -> Result<PlayOutcome, PlayError> {
        let seat = self.playing_seat(player_id)?;
        if cards.is_empty() || !self.players[seat].has_cards(cards) {
            return Err(PlayError::CardsNotFound);
        }
        let pattern = classify(cards).ok_or(PlayError::InvalidPattern)?;
        if !self.leads(seat) && !pattern.can_beat(self.last_pattern.as_ref()) {
            return Err(PlayError::CannotBeat);
        }

        self.players[seat].remove_cards(cards);
        self.last_pattern = Some(pattern.clone());
        self.last_player = Some(seat);
        self.consecutive_passes = 0;
        if pattern.kind().is_bomb() {
            self.multiplier = self.multiplier.saturating_mul(2);
        }
        debug!(game = %self.id, seat, kind = pattern.kind().name(), cards = pattern.len(), "play");

        if self.players[seat].hand().is_empty() {
            self.state = GameState::Finished;
            self.winner = Some(seat);
            let side = self.players[seat].role();
            info!(game = %self.id, winner = %self.players[seat].id, ?side, multiplier = self.multiplier, "game won");
            return Ok(PlayOutcome::Win {
                pattern,
                winner: seat,
                side,
                multiplier: self.multiplier,
            });
        }

        self.turn = (seat + 1) % SEATS;
        Ok(PlayOutcome::Success {
            pattern,
            next_turn: self.turn,
        })
    }

    /// Resolves selection shorthand against the player's hand and plays it.
    pub fn play_text(&mut self, player_id: &str, input: &str) -> Result<PlayOutcome, PlayError> {
        let seat = self.playing_seat(player_id)?;
        let cards = self.players[seat]
            .parse_cards(input)
            .ok_or(PlayError::CardsNotFound)?;
        self.play(player_id, &cards)
    }

    pub fn pass(&mut self, player_id: &str) -> Result<PassOutcome, PlayError> {
        let seat = self.playing_seat(player_id)?;
        if self.leads(seat) {
            return Err(PlayError::MustPlay);
        }
        self.consecutive_passes += 1;
        self.turn = (seat + 1) % SEATS;
        let trick_cleared = self.consecutive_passes >= 2;
        if trick_cleared {
            self.last_pattern = None;
            self.last_player = None;
            self.consecutive_passes = 0;
        }
        debug!(game = %self.id, seat, trick_cleared, "pass");
        Ok(PassOutcome {
            next_turn: self.turn,
            trick_cleared,
        })
    }

    pub fn status(&self) -> GameStatus {
        GameStatus {
            game_id: self.id.clone(),
            room_id: self.room_id.clone(),
            state: self.state,
            seats: self
                .players
                .iter()
                .map(|p| SeatView {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    cards_left: p.hand().len(),
                    role: self.landlord.map(|_| p.role()),
                })
                .collect(),
            turn: match self.state {
                GameState::Bidding | GameState::Playing => Some(self.turn()),
                _ => None,
            },
            highest_bid: self.highest_bid().map(|(bid, seat)| BidView { bid, seat }),
            landlord: self.landlord,
            multiplier: self.multiplier,
            table: self.last_pattern.as_ref().map(|pattern| TableView {
                kind: pattern.kind(),
                cards: pattern.cards().to_vec(),
                seat: self.last_player.unwrap_or(self.turn),
            }),
            winner: self.winner.map(|seat| WinnerView {
                seat,
                side: self.players[seat].role(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeatView {
    pub id: String,
    pub name: String,
    pub cards_left: usize,
    pub role: Option<Role>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BidView {
    pub bid: u8,
    pub seat: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableView {
    pub kind: PatternKind,
    pub cards: Vec<Card>,
    pub seat: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct WinnerView {
    pub seat: usize,
    pub side: Role,
}

/// Read-only summary of a table for reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GameStatus {
    pub game_id: String,
    pub room_id: String,
    pub state: GameState,
    pub seats: Vec<SeatView>,
    pub turn: Option<usize>,
    pub highest_bid: Option<BidView>,
    pub landlord: Option<usize>,
    pub multiplier: u32,
    pub table: Option<TableView>,
    pub winner: Option<WinnerView>,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |seat: usize| self.seats.get(seat).map(|s| s.name.as_str()).unwrap_or("?");
        writeln!(f, "Doudizhu {} in {}", self.game_id, self.room_id)?;
        match self.state {
            GameState::Waiting => {
                writeln!(f, "Waiting for players ({}/{})", self.seats.len(), SEATS)?;
                for seat in self.seats.iter() {
                    writeln!(f, "- {}", seat.name)?;
                }
            }
            GameState::Bidding => {
                if let Some(turn) = self.turn {
                    writeln!(f, "Bidding, {} to bid", name(turn))?;
                }
                if let Some(high) = self.highest_bid {
                    writeln!(f, "Highest bid: {} by {}", high.bid, name(high.seat))?;
                }
            }
            GameState::Playing => {
                if let Some(landlord) = self.landlord {
                    writeln!(f, "Landlord: {}", name(landlord))?;
                }
                writeln!(f, "Multiplier: {}x", self.multiplier)?;
                if let Some(turn) = self.turn {
                    writeln!(f, "Turn: {}", name(turn))?;
                }
                match &self.table {
                    Some(table) => {
                        let cards: Vec<String> = table.cards.iter().map(|c| c.to_string()).collect();
                        writeln!(f, "Table: {} {} ({})", table.kind.name(), cards.join(" "), name(table.seat))?;
                    }
                    None => writeln!(f, "Table is open")?,
                }
                for seat in self.seats.iter() {
                    let role = match seat.role {
                        Some(Role::Landlord) => "landlord",
                        _ => "farmer",
                    };
                    writeln!(f, "{} ({}): {} cards", seat.name, role, seat.cards_left)?;
                }
            }
            GameState::Finished => {
                if let Some(winner) = self.winner {
                    let team = match winner.side {
                        Role::Landlord => "Landlord",
                        Role::Farmer => "Farmers",
                    };
                    writeln!(f, "{} win! Last card played by {}", team, name(winner.seat))?;
                    writeln!(f, "Multiplier: {}x", self.multiplier)?;
                }
            }
        }
        Ok(())
    }
}
