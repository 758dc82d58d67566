use doudizhu_core::{
    BidError, BidOutcome, Card, Game, GameState, GameStatus, PassOutcome, PlayError, PlayOutcome,
    Role,
};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

const GAME_ID_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Games older than this are removed by [`GameRegistry::reap_idle`].
    pub idle_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            idle_timeout: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum CreateError {
    #[error("this room already has a game")]
    AlreadyExists,
    #[error("you are already seated in another game")]
    AlreadyInGame,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Seated; the table is still waiting for `seats_left` more players.
    Success { seats_left: usize },
    /// Seated in the last chair; cards are dealt and bidding has begun.
    GameStarted { first_bidder: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("there is no game in this room")]
    NoGame,
    #[error("the game has already started")]
    AlreadyStarted,
    #[error("the game is full")]
    GameFull,
    #[error("you are already seated in a game")]
    AlreadyInGame,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum CancelError {
    #[error("there is no game in this room")]
    NoGame,
    #[error("you are not playing in this game")]
    NotParticipant,
}

/// Result of an accepted move together with the table as it stood right after
/// the move, taken under the same lock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Applied<T> {
    pub outcome: T,
    pub status: GameStatus,
}

struct Slot {
    game: Game,
    retired: bool,
}

type GameHandle = Arc<tokio::sync::Mutex<Slot>>;

#[derive(Default)]
struct Tables {
    rooms: HashMap<String, GameHandle>,
    seats: HashMap<String, String>,
}

/// Owns every live game, keyed by room, plus the room each player sits in.
///
/// Each game sits behind its own async mutex, so moves on one table are
/// serialised while other tables proceed independently. The room and seat
/// maps live behind a short synchronous lock that is never held across an
/// `.await`; when both are needed the game lock is taken first.
pub struct GameRegistry {
    tables: Mutex<Tables>,
    rng: Mutex<StdRng>,
    config: RegistryConfig,
}

impl GameRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_seed(config, rand::random())
    }

    pub fn with_seed(config: RegistryConfig, seed: u64) -> Self {
        GameRegistry {
            tables: Mutex::new(Tables::default()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            config,
        }
    }

    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, room_id: &str) -> Option<GameHandle> {
        self.tables().rooms.get(room_id).cloned()
    }

    /// Draws a game id and a deck seed.
    fn next_game(&self) -> (String, u64) {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let id = (0..GAME_ID_LEN)
            .map(|_| rng.sample(Alphanumeric) as char)
            .collect::<String>()
            .to_uppercase();
        (id, rng.gen())
    }

    /// Drops the room and every seat that still points at it. Callers hold
    /// the game's lock.
    fn detach(&self, room_id: &str, handle: &GameHandle, slot: &mut Slot) {
        slot.retired = true;
        let mut tables = self.tables();
        if tables
            .rooms
            .get(room_id)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
        {
            tables.rooms.remove(room_id);
        }
        for player in slot.game.players() {
            if tables.seats.get(&player.id).map(String::as_str) == Some(room_id) {
                tables.seats.remove(&player.id);
            }
        }
    }

    fn release_seat(&self, player_id: &str, room_id: &str) {
        let mut tables = self.tables();
        if tables.seats.get(player_id).map(String::as_str) == Some(room_id) {
            tables.seats.remove(player_id);
        }
    }

    /// Opens a game in `room_id` with the creator in the first seat.
    pub fn create_game(
        &self,
        room_id: &str,
        creator_id: &str,
        creator_name: &str,
    ) -> Result<GameStatus, CreateError> {
        let (game_id, seed) = self.next_game();
        let mut tables = self.tables();
        if tables.rooms.contains_key(room_id) {
            return Err(CreateError::AlreadyExists);
        }
        if tables.seats.contains_key(creator_id) {
            return Err(CreateError::AlreadyInGame);
        }
        let mut game = Game::new(game_id, room_id, seed);
        game.join(creator_id, creator_name);
        let status = game.status();
        tables.rooms.insert(
            room_id.to_string(),
            Arc::new(tokio::sync::Mutex::new(Slot {
                game,
                retired: false,
            })),
        );
        tables
            .seats
            .insert(creator_id.to_string(), room_id.to_string());
        info!(game = %status.game_id, room = room_id, creator = creator_id, "game created");
        Ok(status)
    }

    /// Seats a player. Filling the third seat deals the cards and opens
    /// bidding.
    pub async fn join_game(
        &self,
        room_id: &str,
        player_id: &str,
        player_name: &str,
    ) -> Result<Applied<JoinOutcome>, JoinError> {
        // Reserve the seat mapping first so concurrent joins by one player
        // cannot land in two rooms.
        let handle = {
            let mut tables = self.tables();
            let handle = tables.rooms.get(room_id).cloned().ok_or(JoinError::NoGame)?;
            if tables.seats.contains_key(player_id) {
                return Err(JoinError::AlreadyInGame);
            }
            tables
                .seats
                .insert(player_id.to_string(), room_id.to_string());
            handle
        };

        let mut slot = handle.lock().await;
        let rejected = if slot.retired {
            Some(JoinError::NoGame)
        } else if slot.game.state() != GameState::Waiting {
            Some(JoinError::AlreadyStarted)
        } else if !slot.game.join(player_id, player_name) {
            Some(JoinError::GameFull)
        } else {
            None
        };
        if let Some(err) = rejected {
            self.release_seat(player_id, room_id);
            return Err(err);
        }

        let outcome = if slot.game.start() {
            info!(game = %slot.game.id(), room = room_id, "table full, bidding opened");
            JoinOutcome::GameStarted {
                first_bidder: slot.game.turn(),
            }
        } else {
            JoinOutcome::Success {
                seats_left: doudizhu_core::SEATS - slot.game.players().len(),
            }
        };
        debug!(room = room_id, player = player_id, ?outcome, "player joined");
        Ok(Applied {
            outcome,
            status: slot.game.status(),
        })
    }

    pub async fn bid(
        &self,
        room_id: &str,
        player_id: &str,
        score: u8,
    ) -> Result<Applied<BidOutcome>, BidError> {
        let handle = self.handle(room_id).ok_or(BidError::InvalidState)?;
        let mut slot = handle.lock().await;
        if slot.retired {
            return Err(BidError::InvalidState);
        }
        let outcome = slot.game.bid(player_id, score)?;
        Ok(Applied {
            outcome,
            status: slot.game.status(),
        })
    }

    /// Plays the cards named by `cards` (selection shorthand). A winning play
    /// ends the game and frees every seat.
    pub async fn play(
        &self,
        room_id: &str,
        player_id: &str,
        cards: &str,
    ) -> Result<Applied<PlayOutcome>, PlayError> {
        let handle = self.handle(room_id).ok_or(PlayError::InvalidState)?;
        let mut slot = handle.lock().await;
        if slot.retired {
            return Err(PlayError::InvalidState);
        }
        let outcome = slot.game.play_text(player_id, cards)?;
        let status = slot.game.status();
        if matches!(outcome, PlayOutcome::Win { .. }) {
            self.detach(room_id, &handle, &mut slot);
            info!(game = %status.game_id, room = room_id, "game finished");
        }
        Ok(Applied { outcome, status })
    }

    pub async fn pass(
        &self,
        room_id: &str,
        player_id: &str,
    ) -> Result<Applied<PassOutcome>, PlayError> {
        let handle = self.handle(room_id).ok_or(PlayError::InvalidState)?;
        let mut slot = handle.lock().await;
        if slot.retired {
            return Err(PlayError::InvalidState);
        }
        let outcome = slot.game.pass(player_id)?;
        Ok(Applied {
            outcome,
            status: slot.game.status(),
        })
    }

    /// Ends a game on behalf of one of its seated players.
    pub async fn cancel(&self, room_id: &str, player_id: &str) -> Result<GameStatus, CancelError> {
        let handle = self.handle(room_id).ok_or(CancelError::NoGame)?;
        let mut slot = handle.lock().await;
        if slot.retired {
            return Err(CancelError::NoGame);
        }
        if slot.game.player_index(player_id).is_none() {
            return Err(CancelError::NotParticipant);
        }
        let status = slot.game.status();
        self.detach(room_id, &handle, &mut slot);
        info!(game = %status.game_id, room = room_id, by = player_id, "game cancelled");
        Ok(status)
    }

    /// Removes the game in `room_id`, if any, releasing its seats.
    pub async fn end_game(&self, room_id: &str) -> Option<GameStatus> {
        let handle = self.handle(room_id)?;
        let mut slot = handle.lock().await;
        if slot.retired {
            return None;
        }
        let status = slot.game.status();
        self.detach(room_id, &handle, &mut slot);
        info!(game = %status.game_id, room = room_id, "game ended");
        Some(status)
    }

    /// Removes every game created more than the idle timeout before now.
    pub async fn reap_idle(&self) -> Vec<GameStatus> {
        self.reap_idle_at(Instant::now()).await
    }

    pub async fn reap_idle_at(&self, now: Instant) -> Vec<GameStatus> {
        let handles: Vec<(String, GameHandle)> = self
            .tables()
            .rooms
            .iter()
            .map(|(room, handle)| (room.clone(), handle.clone()))
            .collect();

        let mut reaped = Vec::new();
        for (room_id, handle) in handles {
            let mut slot = handle.lock().await;
            if slot.retired {
                continue;
            }
            let age = now.saturating_duration_since(slot.game.created_at());
            if age > self.config.idle_timeout {
                let status = slot.game.status();
                self.detach(&room_id, &handle, &mut slot);
                info!(game = %status.game_id, room = %room_id, age_secs = age.as_secs(), "reaped idle game");
                reaped.push(status);
            }
        }
        reaped
    }

    pub async fn status(&self, room_id: &str) -> Option<GameStatus> {
        let handle = self.handle(room_id)?;
        let slot = handle.lock().await;
        (!slot.retired).then(|| slot.game.status())
    }

    /// The player's hand with their role, once they hold cards.
    pub async fn hand(&self, room_id: &str, player_id: &str) -> Option<(Vec<Card>, Role)> {
        let handle = self.handle(room_id)?;
        let slot = handle.lock().await;
        if slot.retired {
            return None;
        }
        slot.game
            .player(player_id)
            .map(|player| (player.hand().to_vec(), player.role()))
    }

    /// The bottom cards, available once a landlord has been decided.
    pub async fn bottom_cards(&self, room_id: &str) -> Option<Vec<Card>> {
        let handle = self.handle(room_id)?;
        let slot = handle.lock().await;
        if slot.retired {
            return None;
        }
        slot.game.bottom_cards().map(|cards| cards.to_vec())
    }

    /// Room the player is currently seated in.
    pub fn room_of(&self, player_id: &str) -> Option<String> {
        self.tables().seats.get(player_id).cloned()
    }

    pub fn room_ids(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.tables().rooms.keys().cloned().collect();
        rooms.sort();
        rooms
    }

    pub fn len(&self) -> usize {
        self.tables().rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
