use doudizhu_core::{
    standard_deck, BidError, BidOutcome, Card, GameState, PlayError, PlayOutcome, Role,
};
use doudizhu_server::registry::{
    CancelError, CreateError, GameRegistry, JoinError, JoinOutcome, RegistryConfig,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

const ROOM: &str = "R1";

fn registry(seed: u64) -> GameRegistry {
    GameRegistry::with_seed(RegistryConfig::default(), seed)
}

async fn seat_three(registry: &GameRegistry, room: &str) -> [String; 3] {
    let ids = [
        format!("{room}-p1"),
        format!("{room}-p2"),
        format!("{room}-p3"),
    ];
    registry.create_game(room, &ids[0], "one").unwrap();
    registry.join_game(room, &ids[1], "two").await.unwrap();
    let applied = registry.join_game(room, &ids[2], "three").await.unwrap();
    assert!(matches!(applied.outcome, JoinOutcome::GameStarted { .. }));
    ids
}

async fn hands(registry: &GameRegistry, room: &str, ids: &[String; 3]) -> Vec<Vec<Card>> {
    let mut all = Vec::new();
    for id in ids {
        all.push(registry.hand(room, id).await.unwrap().0);
    }
    all
}

/// Everyone ahead of `seat` passes, then `seat` bids `score`.
async fn bid_as(registry: &GameRegistry, room: &str, seat: usize, score: u8) -> BidOutcome {
    loop {
        let status = registry.status(room).await.unwrap();
        let turn = status.turn.unwrap();
        let id = status.seats[turn].id.clone();
        if turn == seat {
            return registry.bid(room, &id, score).await.unwrap().outcome;
        }
        registry.bid(room, &id, 0).await.unwrap();
    }
}

/// Plays singles until somebody runs out of cards.
async fn play_out(registry: &GameRegistry, room: &str) -> (String, PlayOutcome) {
    for _ in 0..2000 {
        let status = registry.status(room).await.expect("game is still live");
        let turn = status.turn.unwrap();
        let player = status.seats[turn].id.clone();
        let (hand, _) = registry.hand(room, &player).await.unwrap();
        let choice = match status.table.as_ref() {
            Some(table) if table.seat != turn => {
                let to_beat = table.cards[0].rank();
                hand.iter().rev().find(|c| c.rank() > to_beat).copied()
            }
            _ => hand.last().copied(),
        };
        match choice {
            Some(card) => {
                let applied = registry
                    .play(room, &player, card.rank().label())
                    .await
                    .unwrap();
                if matches!(applied.outcome, PlayOutcome::Win { .. }) {
                    assert_eq!(applied.status.state, GameState::Finished);
                    return (player, applied.outcome);
                }
            }
            None => {
                registry.pass(room, &player).await.unwrap();
            }
        }
    }
    panic!("game did not finish within the step limit");
}

#[tokio::test]
async fn create_game_seats_creator() {
    let registry = registry(1);
    let status = registry.create_game(ROOM, "a", "Alice").unwrap();
    assert_eq!(status.state, GameState::Waiting);
    assert_eq!(status.seats.len(), 1);
    assert_eq!(status.game_id.len(), 8);
    assert_eq!(registry.room_of("a").as_deref(), Some(ROOM));
    assert_eq!(registry.room_ids(), vec![ROOM.to_string()]);
}

#[tokio::test]
async fn create_game_rejects_busy_room_and_seated_creator() {
    let registry = registry(2);
    registry.create_game(ROOM, "a", "Alice").unwrap();
    assert_eq!(
        registry.create_game(ROOM, "b", "Bob"),
        Err(CreateError::AlreadyExists)
    );
    assert_eq!(
        registry.create_game("R2", "a", "Alice"),
        Err(CreateError::AlreadyInGame)
    );
}

#[tokio::test]
async fn join_rejections() {
    let registry = registry(3);
    assert_eq!(
        registry.join_game("nowhere", "x", "X").await.err(),
        Some(JoinError::NoGame)
    );
    registry.create_game("R2", "elsewhere", "E").unwrap();
    let ids = seat_three(&registry, ROOM).await;
    assert_eq!(
        registry.join_game("R2", &ids[0], "one").await.err(),
        Some(JoinError::AlreadyInGame)
    );
    assert_eq!(
        registry.join_game(ROOM, "late", "Late").await.err(),
        Some(JoinError::AlreadyStarted)
    );
    // A rejected join leaves no seat behind.
    assert_eq!(registry.room_of("late"), None);
}

#[tokio::test]
async fn third_join_deals_cards() {
    let registry = registry(4);
    registry.create_game(ROOM, "a", "Alice").unwrap();
    let applied = registry.join_game(ROOM, "b", "Bob").await.unwrap();
    assert_eq!(applied.outcome, JoinOutcome::Success { seats_left: 1 });
    assert!(registry.hand(ROOM, "a").await.unwrap().0.is_empty());

    let applied = registry.join_game(ROOM, "c", "Carol").await.unwrap();
    let JoinOutcome::GameStarted { first_bidder } = applied.outcome else {
        panic!("third join should start the game");
    };
    assert_eq!(applied.status.state, GameState::Bidding);
    assert_eq!(applied.status.turn, Some(first_bidder));
    assert!(applied.status.seats.iter().all(|s| s.cards_left == 17));
    assert!(registry.bottom_cards(ROOM).await.is_none());

    let ids = ["a".to_string(), "b".to_string(), "c".to_string()];
    let dealt: Vec<Card> = hands(&registry, ROOM, &ids).await.concat();
    let unique: HashSet<Card> = dealt.iter().copied().collect();
    assert_eq!(dealt.len(), 51);
    assert_eq!(unique.len(), 51);
}

#[tokio::test]
async fn second_player_bidding_three_becomes_landlord() {
    let registry = registry(5);
    let ids = seat_three(&registry, ROOM).await;
    let before = registry.hand(ROOM, &ids[1]).await.unwrap().0.len();

    let outcome = bid_as(&registry, ROOM, 1, 3).await;
    assert_eq!(
        outcome,
        BidOutcome::LandlordDecided {
            landlord: 1,
            multiplier: 3
        }
    );

    let status = registry.status(ROOM).await.unwrap();
    assert_eq!(status.state, GameState::Playing);
    assert_eq!(status.multiplier, 3);
    assert_eq!(status.turn, Some(1));
    assert_eq!(status.landlord, Some(1));
    let (hand, role) = registry.hand(ROOM, &ids[1]).await.unwrap();
    assert_eq!(hand.len(), before + 3);
    assert_eq!(role, Role::Landlord);

    let bottom = registry.bottom_cards(ROOM).await.unwrap();
    assert_eq!(bottom.len(), 3);
    let mut all: Vec<Card> = hands(&registry, ROOM, &ids).await.concat();
    assert_eq!(all.len(), 54);
    all.sort_by_key(|c| c.sort_key());
    let mut deck = standard_deck();
    deck.sort_by_key(|c| c.sort_key());
    assert_eq!(all, deck);
}

#[tokio::test]
async fn everyone_passing_deals_again() {
    let registry = registry(6);
    let ids = seat_three(&registry, ROOM).await;
    let before = hands(&registry, ROOM, &ids).await;

    let mut last = None;
    for _ in 0..3 {
        let status = registry.status(ROOM).await.unwrap();
        let id = status.seats[status.turn.unwrap()].id.clone();
        last = Some(registry.bid(ROOM, &id, 0).await.unwrap().outcome);
    }
    assert!(matches!(last, Some(BidOutcome::NoOneBid { .. })));

    let status = registry.status(ROOM).await.unwrap();
    assert_eq!(status.state, GameState::Bidding);
    assert!(status.highest_bid.is_none());
    let after = hands(&registry, ROOM, &ids).await;
    assert_ne!(before, after);
    assert!(after.iter().all(|h| h.len() == 17));
}

#[tokio::test]
async fn bid_rejections() {
    let registry = registry(7);
    assert_eq!(
        registry.bid("nowhere", "x", 1).await.err(),
        Some(BidError::InvalidState)
    );
    let _ids = seat_three(&registry, ROOM).await;
    let status = registry.status(ROOM).await.unwrap();
    let turn = status.turn.unwrap();
    let current = status.seats[turn].id.clone();
    let other = status.seats[(turn + 1) % 3].id.clone();
    assert_eq!(
        registry.bid(ROOM, &other, 1).await.err(),
        Some(BidError::NotYourTurn)
    );
    assert_eq!(
        registry.bid(ROOM, &current, 5).await.err(),
        Some(BidError::InvalidScore)
    );
    registry.bid(ROOM, &current, 2).await.unwrap();
    assert_eq!(
        registry.bid(ROOM, &other, 1).await.err(),
        Some(BidError::ScoreTooLow)
    );
}

#[tokio::test]
async fn play_rejections() {
    let registry = registry(8);
    assert_eq!(
        registry.play("nowhere", "x", "3").await.err(),
        Some(PlayError::InvalidState)
    );
    let ids = seat_three(&registry, ROOM).await;
    let status = registry.status(ROOM).await.unwrap();
    let bidder = status.seats[status.turn.unwrap()].id.clone();
    assert_eq!(
        registry.play(ROOM, &bidder, "3").await.err(),
        Some(PlayError::InvalidState)
    );

    bid_as(&registry, ROOM, 0, 3).await;
    assert_eq!(
        registry.pass(ROOM, &ids[0]).await.err(),
        Some(PlayError::MustPlay)
    );
    assert_eq!(
        registry.play(ROOM, &ids[1], "3").await.err(),
        Some(PlayError::NotYourTurn)
    );
    assert_eq!(
        registry.play(ROOM, &ids[0], "33333").await.err(),
        Some(PlayError::CardsNotFound)
    );
    assert_eq!(
        registry.play(ROOM, &ids[0], "hello").await.err(),
        Some(PlayError::CardsNotFound)
    );

    let (hand, _) = registry.hand(ROOM, &ids[0]).await.unwrap();
    let lowest = hand.last().unwrap().rank();
    registry
        .play(ROOM, &ids[0], lowest.label())
        .await
        .unwrap();
    assert_eq!(
        registry.pass(ROOM, &ids[0]).await.err(),
        Some(PlayError::NotYourTurn)
    );
    registry.pass(ROOM, &ids[1]).await.unwrap();
    let applied = registry.pass(ROOM, &ids[2]).await.unwrap();
    assert!(applied.outcome.trick_cleared);
    assert!(applied.status.table.is_none());
    assert_eq!(
        registry.pass(ROOM, &ids[0]).await.err(),
        Some(PlayError::MustPlay)
    );
}

#[tokio::test]
async fn full_game_ends_with_a_win_and_frees_seats() {
    let registry = registry(9);
    let ids = seat_three(&registry, ROOM).await;
    bid_as(&registry, ROOM, 2, 3).await;

    let (winner, outcome) = play_out(&registry, ROOM).await;
    let PlayOutcome::Win { side, winner: seat, .. } = outcome else {
        unreachable!();
    };
    assert_eq!(ids[seat], winner);
    let expected = if seat == 2 { Role::Landlord } else { Role::Farmer };
    assert_eq!(side, expected);

    assert!(registry.status(ROOM).await.is_none());
    assert!(registry.is_empty());
    for id in ids.iter() {
        assert_eq!(registry.room_of(id), None);
    }
    assert_eq!(
        registry.play(ROOM, &winner, "3").await.err(),
        Some(PlayError::InvalidState)
    );
    registry.create_game(ROOM, &ids[0], "again").unwrap();
}

#[tokio::test]
async fn cancel_requires_participant() {
    let registry = registry(10);
    assert_eq!(
        registry.cancel(ROOM, "a").await.err(),
        Some(CancelError::NoGame)
    );
    let ids = seat_three(&registry, ROOM).await;
    assert_eq!(
        registry.cancel(ROOM, "outsider").await.err(),
        Some(CancelError::NotParticipant)
    );
    let status = registry.cancel(ROOM, &ids[2]).await.unwrap();
    assert_eq!(status.seats.len(), 3);
    assert!(registry.status(ROOM).await.is_none());
    assert!(ids.iter().all(|id| registry.room_of(id).is_none()));
}

#[tokio::test]
async fn end_game_releases_seats() {
    let registry = registry(11);
    registry.create_game(ROOM, "a", "Alice").unwrap();
    registry.join_game(ROOM, "b", "Bob").await.unwrap();
    assert!(registry.end_game(ROOM).await.is_some());
    assert!(registry.end_game(ROOM).await.is_none());
    assert_eq!(registry.room_of("a"), None);
    assert_eq!(registry.room_of("b"), None);
}

#[tokio::test]
async fn reaper_removes_only_expired_games() {
    let registry = GameRegistry::with_seed(
        RegistryConfig {
            idle_timeout: Duration::from_secs(60),
        },
        12,
    );
    registry.create_game(ROOM, "a", "Alice").unwrap();
    assert!(registry.reap_idle().await.is_empty());
    assert_eq!(registry.len(), 1);

    let later = Instant::now() + Duration::from_secs(61);
    let reaped = registry.reap_idle_at(later).await;
    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].room_id, ROOM);
    assert!(registry.is_empty());
    assert_eq!(registry.room_of("a"), None);
}

#[test]
fn default_idle_timeout_is_thirty_minutes() {
    assert_eq!(
        RegistryConfig::default().idle_timeout,
        Duration::from_secs(1800)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_fill_exactly_three_seats() {
    let registry = Arc::new(registry(13));
    registry.create_game(ROOM, "host", "Host").unwrap();

    let mut tasks = Vec::new();
    for i in 0..10 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            registry
                .join_game(ROOM, &format!("guest{i}"), "Guest")
                .await
        }));
    }
    let mut joined = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => joined += 1,
            Err(err) => assert!(matches!(
                err,
                JoinError::AlreadyStarted | JoinError::GameFull
            )),
        }
    }
    assert_eq!(joined, 2);
    let status = registry.status(ROOM).await.unwrap();
    assert_eq!(status.seats.len(), 3);
    assert_eq!(status.state, GameState::Bidding);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_player_cannot_join_two_rooms_at_once() {
    let registry = Arc::new(registry(14));
    registry.create_game("R1", "a", "Alice").unwrap();
    registry.create_game("R2", "b", "Bob").unwrap();

    let first = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.join_game("R1", "x", "X").await })
    };
    let second = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.join_game("R2", "x", "X").await })
    };
    let results = [first.await.unwrap(), second.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| r.as_ref().err() == Some(&JoinError::AlreadyInGame)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_bids_are_applied_one_at_a_time() {
    let registry = Arc::new(registry(15));
    let ids = seat_three(&registry, ROOM).await;
    let bidder = registry.status(ROOM).await.unwrap().turn.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..4 {
        for id in ids.iter() {
            let registry = registry.clone();
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                let result = registry.bid(ROOM, &id, 3).await;
                (id, result)
            }));
        }
    }
    let mut winners = Vec::new();
    for task in tasks {
        let (id, result) = task.await.unwrap();
        match result {
            Ok(applied) => {
                assert!(matches!(
                    applied.outcome,
                    BidOutcome::LandlordDecided { multiplier: 3, .. }
                ));
                winners.push(id);
            }
            Err(err) => assert!(matches!(
                err,
                BidError::NotYourTurn | BidError::InvalidState
            )),
        }
    }
    assert_eq!(winners, vec![ids[bidder].clone()]);
    let status = registry.status(ROOM).await.unwrap();
    assert_eq!(status.state, GameState::Playing);
    assert_eq!(status.turn, Some(bidder));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_plays_only_move_the_turn_once() {
    let registry = Arc::new(registry(16));
    let ids = seat_three(&registry, ROOM).await;
    let BidOutcome::LandlordDecided { landlord, .. } = bid_as(&registry, ROOM, 1, 3).await else {
        panic!("a bid of 3 decides the landlord");
    };
    assert_eq!(landlord, 1);
    let (hand, _) = registry.hand(ROOM, &ids[landlord]).await.unwrap();
    let lowest = hand.last().copied().unwrap();
    let bystander = ids[(landlord + 2) % 3].clone();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let table = registry.clone();
        let id = ids[landlord].clone();
        tasks.push(tokio::spawn(async move {
            table
                .play(ROOM, &id, lowest.rank().label())
                .await
                .map(|applied| applied.status.turn)
        }));
        let table = registry.clone();
        let id = bystander.clone();
        tasks.push(tokio::spawn(async move {
            table
                .pass(ROOM, &id)
                .await
                .map(|applied| applied.status.turn)
        }));
    }
    let mut applied = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(turn) => applied.push(turn),
            Err(err) => assert_eq!(err, PlayError::NotYourTurn),
        }
    }
    assert_eq!(applied, vec![Some((landlord + 1) % 3)]);
    let (after, _) = registry.hand(ROOM, &ids[landlord]).await.unwrap();
    assert_eq!(after.len(), hand.len() - 1);
}
