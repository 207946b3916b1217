use tokio::sync::broadcast;
use tracing::trace;

/// Events the game reports to its user interface
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GameEvent {
    PlayerJoined { display_name: String },
    PlayerLeft { display_name: String },
    /// the display names of all known players (including the local one) in join order, sent
    ///  redundantly after every change to the roster
    AllPlayers(Vec<String>),
    Draw,
    Victory { round_score: u32, total_score: u32 },
    Loss,
    NewRound { total_score: u32 },
    Chat(String),
}


pub struct GameEventNotifier {
    sender: broadcast::Sender<GameEvent>,
}
impl GameEventNotifier {
    pub fn new() -> GameEventNotifier {
        let (sender, _) = broadcast::channel(128);

        GameEventNotifier {
            sender
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.sender.subscribe()
    }

    pub fn send_event(&self, event: GameEvent) {
        trace!("event: {:?}", event);
        let _ = self.sender.send(event);
    }
}
impl Default for GameEventNotifier {
    fn default() -> Self {
        GameEventNotifier::new()
    }
}


#[cfg(test)]
mod test {
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    #[test]
    fn test_send_without_subscribers() {
        let notifier = GameEventNotifier::new();
        notifier.send_event(GameEvent::Draw);
    }

    #[test]
    fn test_subscribers_receive_events_in_order() {
        let notifier = GameEventNotifier::new();
        let mut first = notifier.subscribe();
        notifier.send_event(GameEvent::Chat("a".to_string()));
        let mut second = notifier.subscribe();
        notifier.send_event(GameEvent::Loss);

        assert_eq!(first.try_recv().unwrap(), GameEvent::Chat("a".to_string()));
        assert_eq!(first.try_recv().unwrap(), GameEvent::Loss);
        assert_eq!(first.try_recv(), Err(TryRecvError::Empty));

        assert_eq!(second.try_recv().unwrap(), GameEvent::Loss);
        assert_eq!(second.try_recv(), Err(TryRecvError::Empty));
    }
}
