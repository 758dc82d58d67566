use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use doudizhu_core::{GameStatus, PlayOutcome};
use doudizhu_server::config::Config;
use doudizhu_server::protocol::{card_labels, ClientMessage, HandView, ServerMessage};
use doudizhu_server::registry::GameRegistry;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type Outbox = mpsc::UnboundedSender<ServerMessage>;

#[derive(Clone)]
struct AppState {
    registry: Arc<GameRegistry>,
    sessions: Arc<Mutex<HashMap<String, Outbox>>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log)?)
        .init();

    let state = AppState {
        registry: Arc::new(GameRegistry::new(config.registry())),
        sessions: Arc::new(Mutex::new(HashMap::new())),
    };

    tokio::spawn(reap_loop(state.clone(), config.reap_interval()));

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any));

    info!(addr = %config.bind, "listening");
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn reap_loop(state: AppState, period: std::time::Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        for status in state.registry.reap_idle().await {
            notify_seats(&state, &status, |_| ServerMessage::Cancelled {
                room_id: status.room_id.clone(),
            })
            .await;
        }
    }
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let user_id = format!("{:016x}", rand::thread_rng().gen::<u64>());
    let user_name = display_name_for_user(&user_id);
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    });

    state
        .sessions
        .lock()
        .await
        .insert(user_id.clone(), tx.clone());
    let _ = tx.send(ServerMessage::Welcome {
        user_id: user_id.clone(),
        user_name: user_name.clone(),
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        if let Message::Text(text) = msg {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client) => handle_client_message(&state, &user_id, &user_name, &tx, client).await,
                Err(err) => {
                    warn!(user = %user_id, %err, "unreadable client message");
                    let _ = tx.send(ServerMessage::Error {
                        message: "invalid message".to_string(),
                    });
                }
            }
        }
    }

    state.sessions.lock().await.remove(&user_id);
}

fn reject(tx: &Outbox, reason: impl ToString) {
    let _ = tx.send(ServerMessage::Rejected {
        reason: reason.to_string(),
    });
}

async fn handle_client_message(
    state: &AppState,
    user_id: &str,
    user_name: &str,
    tx: &Outbox,
    client: ClientMessage,
) {
    let registry = &state.registry;
    let current_room = registry.room_of(user_id);
    match client {
        ClientMessage::Ping => {
            let _ = tx.send(ServerMessage::Pong);
        }
        ClientMessage::CreateGame { room_id } => {
            match registry.create_game(room_id.trim(), user_id, user_name) {
                Ok(status) => {
                    let _ = tx.send(ServerMessage::Status(status));
                }
                Err(err) => reject(tx, err),
            }
        }
        ClientMessage::JoinGame { room_id } => {
            match registry.join_game(room_id.trim(), user_id, user_name).await {
                Ok(applied) => broadcast(state, &applied.status).await,
                Err(err) => reject(tx, err),
            }
        }
        ClientMessage::Status => match current_room {
            Some(room_id) => match registry.status(&room_id).await {
                Some(status) => {
                    let _ = tx.send(ServerMessage::Status(status));
                }
                None => reject(tx, "no game in progress"),
            },
            None => reject(tx, "you are not in a game"),
        },
        ClientMessage::Hand => match current_room {
            Some(room_id) => {
                if let Some((cards, role)) = registry.hand(&room_id, user_id).await {
                    let _ = tx.send(ServerMessage::Hand(HandView::new(&cards, role)));
                }
                if let Some(bottom) = registry.bottom_cards(&room_id).await {
                    let _ = tx.send(ServerMessage::BottomCards {
                        cards: card_labels(&bottom),
                    });
                }
            }
            None => reject(tx, "you are not in a game"),
        },
        ClientMessage::Bid { score } => {
            let Some(room_id) = current_room else {
                return reject(tx, "you are not in a game");
            };
            match registry.bid(&room_id, user_id, score).await {
                Ok(applied) => broadcast(state, &applied.status).await,
                Err(err) => reject(tx, err),
            }
        }
        ClientMessage::Play { cards } => {
            let Some(room_id) = current_room else {
                return reject(tx, "you are not in a game");
            };
            match registry.play(&room_id, user_id, &cards).await {
                Ok(applied) => {
                    broadcast(state, &applied.status).await;
                    if let PlayOutcome::Win {
                        winner,
                        side,
                        multiplier,
                        ..
                    } = applied.outcome
                    {
                        let winner_id = applied.status.seats[winner].id.clone();
                        notify_seats(state, &applied.status, |_| ServerMessage::GameOver {
                            room_id: room_id.clone(),
                            winner_id: winner_id.clone(),
                            side,
                            multiplier,
                        })
                        .await;
                    }
                }
                Err(err) => reject(tx, err),
            }
        }
        ClientMessage::Pass => {
            let Some(room_id) = current_room else {
                return reject(tx, "you are not in a game");
            };
            match registry.pass(&room_id, user_id).await {
                Ok(applied) => broadcast(state, &applied.status).await,
                Err(err) => reject(tx, err),
            }
        }
        ClientMessage::Cancel => {
            let Some(room_id) = current_room else {
                return reject(tx, "you are not in a game");
            };
            match registry.cancel(&room_id, user_id).await {
                Ok(status) => {
                    notify_seats(state, &status, |_| ServerMessage::Cancelled {
                        room_id: room_id.clone(),
                    })
                    .await
                }
                Err(err) => reject(tx, err),
            }
        }
    }
}

/// Sends the table status to every seat, followed by each seat's own hand.
async fn broadcast(state: &AppState, status: &GameStatus) {
    notify_seats(state, status, |_| ServerMessage::Status(status.clone())).await;
    // Hands wait on the game lock, so the session map is released first.
    let outboxes = {
        let sessions = state.sessions.lock().await;
        seat_outboxes(&sessions, status.seats.iter().map(|seat| seat.id.as_str()))
    };
    for (seat_id, tx) in outboxes {
        if let Some((cards, role)) = state.registry.hand(&status.room_id, &seat_id).await {
            let _ = tx.send(ServerMessage::Hand(HandView::new(&cards, role)));
        }
    }
}

/// Connected outboxes for the given seats, in seat order.
fn seat_outboxes<'a>(
    sessions: &HashMap<String, Outbox>,
    seat_ids: impl IntoIterator<Item = &'a str>,
) -> Vec<(String, Outbox)> {
    seat_ids
        .into_iter()
        .filter_map(|id| sessions.get(id).map(|tx| (id.to_string(), tx.clone())))
        .collect()
}

async fn notify_seats<F>(state: &AppState, status: &GameStatus, message: F)
where
    F: Fn(&str) -> ServerMessage,
{
    let sessions = state.sessions.lock().await;
    for seat in status.seats.iter() {
        if let Some(tx) = sessions.get(&seat.id) {
            let _ = tx.send(message(&seat.id));
        }
    }
}

fn display_name_for_user(user_id: &str) -> String {
    const ADJECTIVES: &[&str] = &[
        "Brave", "Calm", "Swift", "Mighty", "Lucky", "Clever", "Silent", "Fierce", "Nimble",
        "Bold",
    ];
    const NOUNS: &[&str] = &[
        "Panda", "Tiger", "Falcon", "Wolf", "Dragon", "Fox", "Crane", "Otter", "Hawk", "Bear",
    ];
    let hash = user_id
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
    let adjective = ADJECTIVES[(hash as usize) % ADJECTIVES.len()];
    let noun = NOUNS[(hash.rotate_left(17) as usize) % NOUNS.len()];
    format!("{}_{}", adjective, noun)
}
