use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GameConfig {
    /// the name under which the local player is shown to others; it need not be unique
    pub display_name: String,
    /// pause between the resolution of a round and the `NewRound` event
    pub wait_before_next_round: Duration,
}

impl GameConfig {
    pub fn new(display_name: impl Into<String>) -> GameConfig {
        GameConfig {
            display_name: display_name.into(),
            wait_before_next_round: Duration::from_millis(3000),
        }
    }
}
