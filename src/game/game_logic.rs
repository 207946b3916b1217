use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::game::game_config::GameConfig;
use crate::game::game_events::{GameEvent, GameEventNotifier};
use crate::game::game_round::{GameRound, RoundOutcome};
use crate::game::payload::{Choice, Payload};
use crate::messaging::MessageSender;
use crate::messaging::peer::Peer;


#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Player {
    pub peer: Peer,
    pub display_name: String,
}


/// The game's state as seen from one node. All nodes see the same payloads (though not
///  necessarily in the same order), so they arrive at the same round results independently.
///
/// The local player is not known initially: it joins when its own [Payload::PlayerInfo]
///  comes back through the transport, like every other player.
pub struct Game {
    config: Arc<GameConfig>,
    myself: Peer,
    players: Vec<Player>,
    round: Option<GameRound>,
    total_score: u32,
    event_notifier: Arc<GameEventNotifier>,
}

impl Game {
    pub fn new(config: Arc<GameConfig>, myself: Peer, event_notifier: Arc<GameEventNotifier>) -> Game {
        Game {
            config,
            myself,
            players: Default::default(),
            round: None,
            total_score: 0,
            event_notifier,
        }
    }

    pub fn myself(&self) -> &Peer {
        &self.myself
    }

    pub fn total_score(&self) -> u32 {
        self.total_score
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn has_active_round(&self) -> bool {
        self.round.is_some()
    }

    pub fn own_player_info(&self) -> Payload {
        Payload::PlayerInfo {
            player: self.myself.clone(),
            display_name: self.config.display_name.clone(),
        }
    }

    pub fn own_play_command(&self, choice: Choice) -> Payload {
        Payload::PlayCommand {
            player: self.myself.clone(),
            choice,
        }
    }

    /// Handles raw message content from the transport. Content that can not be decoded is
    ///  logged and ignored.
    pub fn on_message<M: MessageSender>(&mut self, raw: &[u8], messaging: &M) -> Option<RoundOutcome> {
        match Payload::try_deser(raw) {
            Ok(payload) => self.on_payload(payload, messaging),
            Err(e) => {
                warn!("received malformed payload - ignoring: {}", e);
                None
            }
        }
    }

    /// Returns the round's outcome if this payload completed the active round
    pub fn on_payload<M: MessageSender>(&mut self, payload: Payload, messaging: &M) -> Option<RoundOutcome> {
        match payload {
            Payload::PlayerInfo { player, display_name } => {
                self.on_player_info(player, display_name, messaging);
                None
            }
            Payload::PlayCommand { player, choice } => {
                self.on_play_command(&player, choice)
            }
            Payload::ChatMessage(text) => {
                self.event_notifier.send_event(GameEvent::Chat(text));
                None
            }
        }
    }

    fn on_player_info<M: MessageSender>(&mut self, player: Peer, display_name: String, messaging: &M) {
        if self.players.iter().any(|p| p.peer == player) {
            trace!("player info for known player {:?}", player);
            return;
        }

        info!("player {:?} joined as {}", player, display_name);
        let is_myself = player == self.myself;
        self.players.push(Player { peer: player, display_name: display_name.clone() });

        self.event_notifier.send_event(GameEvent::PlayerJoined { display_name });
        self.event_notifier.send_event(GameEvent::AllPlayers(self.display_names()));

        // answer a newcomer so it learns about us even if it joined after our announcement
        if !is_myself {
            if let Err(e) = messaging.send_message(self.own_player_info().to_bytes()) {
                warn!("error sending player info: {}", e);
            }
        }
    }

    fn on_play_command(&mut self, player: &Peer, choice: Choice) -> Option<RoundOutcome> {
        debug!("{:?} plays {}", player, choice);

        if self.round.is_none() {
            let participants = self.players.iter()
                .map(|p| p.peer.clone())
                .collect::<Vec<_>>();
            if participants.is_empty() {
                warn!("{:?} played before any player was known - ignoring", player);
                return None;
            }
            self.round = Some(GameRound::new(participants));
        }

        let outcome = self.round.as_mut()?
            .play(player, choice)?;
        Some(self.round_completed(outcome))
    }

    /// Removes a player that stopped responding. This may complete the active round, and its
    ///  outcome is returned in that case.
    pub fn on_peer_not_responding(&mut self, unique_name: &str) -> Option<RoundOutcome> {
        let peer = Peer::new(unique_name);
        let Some(idx) = self.players.iter().position(|p| p.peer == peer) else {
            debug!("unresponsive peer {:?} is not a known player - ignoring", peer);
            return None;
        };
        let left = self.players.remove(idx);
        info!("player {:?} ({}) left", left.peer, left.display_name);

        let outcome = match &mut self.round {
            Some(round) => round.remove_player(&peer),
            None => None,
        };
        if self.round.as_ref().is_some_and(|r| !r.has_participants()) {
            debug!("discarding round without participants");
            self.round = None;
        }
        let outcome = outcome.map(|o| self.round_completed(o));

        self.event_notifier.send_event(GameEvent::PlayerLeft { display_name: left.display_name });
        self.event_notifier.send_event(GameEvent::AllPlayers(self.display_names()));

        outcome
    }

    /// To be called [GameConfig::wait_before_next_round] after a round was completed
    pub fn on_new_round_due(&self) {
        self.event_notifier.send_event(GameEvent::NewRound { total_score: self.total_score });
    }

    fn round_completed(&mut self, outcome: RoundOutcome) -> RoundOutcome {
        self.round = None;

        match &outcome {
            RoundOutcome::Draw => {
                info!("round completed: draw");
                self.event_notifier.send_event(GameEvent::Draw);
            }
            RoundOutcome::Decided { score_for_winner, .. } if outcome.is_won_by(&self.myself) => {
                self.total_score += *score_for_winner;
                info!("round completed: won {} points, {} in total", score_for_winner, self.total_score);
                self.event_notifier.send_event(GameEvent::Victory {
                    round_score: *score_for_winner,
                    total_score: self.total_score,
                });
            }
            RoundOutcome::Decided { winning_choice, .. } => {
                info!("round completed: lost against {}", winning_choice);
                self.event_notifier.send_event(GameEvent::Loss);
            }
        }
        outcome
    }

    fn display_names(&self) -> Vec<String> {
        self.players.iter()
            .map(|p| p.display_name.clone())
            .collect()
    }
}
