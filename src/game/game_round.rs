use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::game::payload::Choice;
use crate::messaging::peer::Peer;


#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RoundOutcome {
    Draw,
    Decided {
        winning_choice: Choice,
        winners: Vec<Peer>,
        /// the number of losers, which is what every single winner scores
        score_for_winner: u32,
    },
}
impl RoundOutcome {
    pub fn is_won_by(&self, player: &Peer) -> bool {
        match self {
            RoundOutcome::Draw => false,
            RoundOutcome::Decided { winners, .. } => winners.contains(player),
        }
    }
}


/// A single round of rock-paper-scissors, bound to the participants known when it started.
///  Participants that leave are removed from the round; players joining later do not take part.
///
/// The outcome depends only on the set of `(player, choice)` pairs, not on the order in which
///  the choices arrived.
#[derive(Debug)]
pub struct GameRound {
    participants: Vec<Peer>,
    choices: BTreeMap<Peer, Choice>,
}

impl GameRound {
    pub fn new(participants: Vec<Peer>) -> GameRound {
        debug!("new round with participants {:?}", participants);
        GameRound {
            participants,
            choices: Default::default(),
        }
    }

    pub fn participants(&self) -> &[Peer] {
        &self.participants
    }

    pub fn has_participants(&self) -> bool {
        !self.participants.is_empty()
    }

    /// Records a player's choice, returning the outcome if this completed the round. A player's
    ///  first choice counts, and choices of players that are not participants are ignored.
    pub fn play(&mut self, player: &Peer, choice: Choice) -> Option<RoundOutcome> {
        if !self.participants.contains(player) {
            warn!("{:?} is not a participant of the current round - ignoring their choice", player);
            return None;
        }
        if let Some(previous) = self.choices.get(player) {
            warn!("{:?} already chose {} in this round - ignoring {}", player, previous, choice);
            return None;
        }

        self.choices.insert(player.clone(), choice);
        self.outcome_if_complete()
    }

    /// Removes a participant (and their choice, if any), returning the outcome if the remaining
    ///  participants have all made their choice.
    pub fn remove_player(&mut self, player: &Peer) -> Option<RoundOutcome> {
        let len_before = self.participants.len();
        self.participants.retain(|p| p != player);
        if self.participants.len() == len_before {
            return None;
        }
        self.choices.remove(player);
        self.outcome_if_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.has_participants() && self.participants.iter()
            .all(|p| self.choices.contains_key(p))
    }

    fn outcome_if_complete(&self) -> Option<RoundOutcome> {
        if self.is_complete() {
            Some(self.outcome())
        }
        else {
            None
        }
    }

    fn outcome(&self) -> RoundOutcome {
        let present = Choice::ALL.iter()
            .copied()
            .filter(|c| self.choices.values().any(|chosen| chosen == c))
            .collect::<Vec<_>>();

        // exactly two different choices: one of them beats the other
        let winning_choice = match present.as_slice() {
            &[a, b] => if a.beats(b) { a } else { b },
            _ => return RoundOutcome::Draw,
        };

        let (winners, losers): (Vec<_>, Vec<_>) = self.choices.iter()
            .partition(|(_, c)| **c == winning_choice);

        RoundOutcome::Decided {
            winning_choice,
            winners: winners.into_iter().map(|(p, _)| p.clone()).collect(),
            score_for_winner: losers.len() as u32,
        }
    }
}
