//! Rock-paper-scissors on top of the gossip transport. Every node runs the same game logic on
//!  the same stream of payloads, so there is no coordinator: each node resolves every round
//!  on its own.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::game::game_config::GameConfig;
use crate::game::game_logic::Game;
use crate::game::payload::{Choice, Payload};
use crate::messaging::delegate::Delegate;
use crate::messaging::MessageSender;

pub mod game_config;
pub mod game_events;
pub mod game_logic;
pub mod game_round;
pub mod payload;


/// Everything that drives the game, funneled through a single channel so the game state has
///  exactly one owner
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum GameInput {
    /// message content delivered by the transport
    Message(Bytes),
    PeerNotResponding(String),
    /// the local player's choice for the current round
    Play(Choice),
    Chat(String),
}


/// Connects the transport's upcalls to the game loop. The upcalls only enqueue, so they never
///  block the transport.
pub struct GameDelegate {
    inputs: mpsc::UnboundedSender<GameInput>,
}
impl GameDelegate {
    pub fn new(inputs: mpsc::UnboundedSender<GameInput>) -> GameDelegate {
        GameDelegate { inputs }
    }

    fn enqueue(&self, input: GameInput) {
        if self.inputs.send(input).is_err() {
            debug!("game loop is not running - dropping input");
        }
    }
}

impl Delegate for GameDelegate {
    fn on_new_message(&self, content: Bytes) {
        self.enqueue(GameInput::Message(content));
    }

    fn peer_not_responding(&self, unique_name: &str) {
        self.enqueue(GameInput::PeerNotResponding(unique_name.to_string()));
    }
}


/// Announces the local player and then processes inputs until all senders are dropped.
///  `NewRound` is emitted [GameConfig::wait_before_next_round] after each completed round.
pub async fn run_game<M: MessageSender>(config: Arc<GameConfig>, mut game: Game, messaging: Arc<M>, mut inputs: mpsc::UnboundedReceiver<GameInput>) {
    info!("starting game as {:?} ({})", game.myself(), config.display_name);
    send(messaging.as_ref(), game.own_player_info());

    let mut new_rounds_due: VecDeque<Instant> = VecDeque::new();

    loop {
        let next_new_round = new_rounds_due.front().copied();

        select! {
            input = inputs.recv() => {
                let Some(input) = input else {
                    debug!("all game input senders were dropped - stopping game loop");
                    break;
                };
                let outcome = match input {
                    GameInput::Message(content) => game.on_message(&content, messaging.as_ref()),
                    GameInput::PeerNotResponding(unique_name) => game.on_peer_not_responding(&unique_name),
                    GameInput::Play(choice) => {
                        send(messaging.as_ref(), game.own_play_command(choice));
                        None
                    }
                    GameInput::Chat(text) => {
                        send(messaging.as_ref(), Payload::ChatMessage(text));
                        None
                    }
                };
                if outcome.is_some() {
                    new_rounds_due.push_back(Instant::now() + config.wait_before_next_round);
                }
            }
            _ = sleep_until(next_new_round.unwrap_or_else(Instant::now)), if next_new_round.is_some() => {
                new_rounds_due.pop_front();
                game.on_new_round_due();
            }
        }
    }
}

fn send<M: MessageSender>(messaging: &M, payload: Payload) {
    if let Err(e) = messaging.send_message(payload.to_bytes()) {
        warn!("error sending {:?}: {}", payload, e);
    }
}
