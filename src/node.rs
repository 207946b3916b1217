use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::game::game_config::GameConfig;
use crate::game::game_events::{GameEvent, GameEventNotifier};
use crate::game::game_logic::Game;
use crate::game::payload::Choice;
use crate::game::{run_game, GameDelegate, GameInput};
use crate::messaging::net_config::NetConfig;
use crate::messaging::net_handler::NetHandler;
use crate::messaging::peer::Peer;

/// This is the public API of a game node: the transport and the game wired together.
///
/// Subscribe to events before calling [GameNode::start] to see the local player joining.
pub struct GameNode {
    net: Arc<NetHandler>,
    game_config: Arc<GameConfig>,
    event_notifier: Arc<GameEventNotifier>,
    inputs: mpsc::UnboundedSender<GameInput>,
    inputs_receiver: Mutex<Option<mpsc::UnboundedReceiver<GameInput>>>,
    game_task: Mutex<Option<JoinHandle<()>>>,
}

impl GameNode {
    pub fn new(net_config: NetConfig, game_config: GameConfig) -> GameNode {
        let (inputs, inputs_receiver) = mpsc::unbounded_channel();
        GameNode {
            net: Arc::new(NetHandler::new(net_config)),
            game_config: Arc::new(game_config),
            event_notifier: Arc::new(GameEventNotifier::new()),
            inputs,
            inputs_receiver: Mutex::new(Some(inputs_receiver)),
            game_task: Default::default(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.event_notifier.subscribe()
    }

    pub fn net(&self) -> &Arc<NetHandler> {
        &self.net
    }

    /// Binds the listening socket, generates a unique name unless one is configured, connects to
    ///  the seed node (if any), and starts the transport and the game loop. Failure to reach the
    ///  seed node is logged, the node keeps running and waits for others to connect to it.
    pub async fn start(&self, seed_node: Option<(&str, u16)>) -> anyhow::Result<SocketAddr> {
        if self.is_started()? {
            bail!("the node was started before");
        }

        let local_addr = self.net.create_server_socket(self.net.config().listen_port).await?;
        if self.net.myself().is_err() {
            let generated = Peer::generate(&local_addr.ip().to_string(), local_addr.port());
            self.net.set_unique_name(generated.unique_name())?;
        }
        let myself = self.net.myself()?.clone();

        self.net.set_delegate(Arc::new(GameDelegate::new(self.inputs.clone())))?;

        if let Some((host, port)) = seed_node {
            if let Err(e) = self.net.connect_to(host, port).await {
                warn!("could not connect to seed node - waiting for others to connect: {:#}", e);
            }
        }
        self.net.start()?;

        // taken last, so a start that failed to bind can be retried
        let inputs_receiver = self.inputs_receiver.lock()
            .map_err(|_| anyhow!("poisoned lock"))?
            .take()
            .ok_or_else(|| anyhow!("the node was started before"))?;

        info!("starting game node {:?} on {}", myself, local_addr);
        let game = Game::new(self.game_config.clone(), myself, self.event_notifier.clone());
        let game_task = tokio::spawn(run_game(self.game_config.clone(), game, self.net.clone(), inputs_receiver));
        *self.game_task.lock()
            .map_err(|_| anyhow!("poisoned lock"))? = Some(game_task);

        Ok(local_addr)
    }

    fn is_started(&self) -> anyhow::Result<bool> {
        Ok(self.inputs_receiver.lock()
            .map_err(|_| anyhow!("poisoned lock"))?
            .is_none())
    }

    pub fn play(&self, choice: Choice) -> anyhow::Result<()> {
        self.inputs.send(GameInput::Play(choice))
            .map_err(|_| anyhow!("the game is not running"))
    }

    pub fn chat(&self, text: impl Into<String>) -> anyhow::Result<()> {
        self.inputs.send(GameInput::Chat(text.into()))
            .map_err(|_| anyhow!("the game is not running"))
    }

    /// Shuts down the transport, then stops the game loop
    pub fn shutdown(&self) {
        self.net.shutdown();
        if let Ok(mut game_task) = self.game_task.lock() {
            if let Some(game_task) = game_task.take() {
                game_task.abort();
            }
        }
    }
}
