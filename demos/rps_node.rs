use clap::Parser;
use clap_derive::Parser;
use rps_gossip::game::game_config::GameConfig;
use rps_gossip::game::game_events::GameEvent;
use rps_gossip::game::payload::Choice;
use rps_gossip::messaging::net_config::NetConfig;
use rps_gossip::node::GameNode;
use anyhow::{anyhow, Context};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::select;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn, Level};

#[derive(Parser)]
struct Args {
    #[clap(long)]
    port: u16,

    /// host:port of a node that is already part of the game
    #[clap(long)]
    connect: Option<String>,

    #[clap(long)]
    name: String,

    #[clap(long)]
    unique_name: Option<String>,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let seed_node = match &args.connect {
        Some(s) => {
            let (host, port) = s.rsplit_once(':')
                .ok_or_else(|| anyhow!("expected host:port, was {:?}", s))?;
            let port: u16 = port.parse()
                .with_context(|| format!("invalid port in {:?}", s))?;
            Some((host.to_string(), port))
        }
        None => None,
    };

    let mut net_config = NetConfig::new(args.port);
    net_config.unique_name = args.unique_name;

    let node = GameNode::new(net_config, GameConfig::new(args.name));
    let events = node.subscribe();
    let local_addr = node.start(seed_node.as_ref().map(|(host, port)| (host.as_str(), *port))).await?;
    info!("listening on {} - type rock, paper or scissors to play, 'say <text>' to chat", local_addr);

    let result = select! {
        result = read_commands(&node) => result,
        _ = print_events(events) => Ok(()),
    };
    node.shutdown();
    result
}

async fn read_commands(node: &GameNode) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(text) = line.strip_prefix("say ") {
            node.chat(text)?;
            continue;
        }
        match line.parse::<Choice>() {
            Ok(choice) => node.play(choice)?,
            Err(e) => warn!("{}", e),
        }
    }
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<GameEvent>) {
    loop {
        match events.recv().await {
            Ok(GameEvent::PlayerJoined { display_name }) => println!("{} joined the game", display_name),
            Ok(GameEvent::PlayerLeft { display_name }) => println!("{} left the game", display_name),
            Ok(GameEvent::AllPlayers(names)) => println!("players: {}", names.join(", ")),
            Ok(GameEvent::Draw) => println!("draw"),
            Ok(GameEvent::Victory { round_score, total_score }) => println!("you won {} points - {} in total", round_score, total_score),
            Ok(GameEvent::Loss) => println!("you lost"),
            Ok(GameEvent::NewRound { total_score }) => println!("new round - your score is {}", total_score),
            Ok(GameEvent::Chat(text)) => println!("> {}", text),
            Err(RecvError::Lagged(n)) => warn!("skipped {} events", n),
            Err(RecvError::Closed) => break,
        }
    }
}
