//! Fight-the-Landlord (Doudizhu) rules engine: the 54-card deck, play-pattern
//! recognition and comparison, and the three-seat bidding/playing state
//! machine.

pub mod card;
pub mod game;
pub mod pattern;
pub mod player;

pub use card::{deal, parse_ranks, shuffled_deck, sort_hand, standard_deck, Card, Rank, Suit, DECK_SIZE};
pub use game::{
    BidError, BidOutcome, BidView, Game, GameState, GameStatus, PassOutcome, PlayError,
    PlayOutcome, SeatView, TableView, WinnerView, MAX_BID, SEATS,
};
pub use pattern::{classify, Pattern, PatternKind};
pub use player::{Player, Role};
