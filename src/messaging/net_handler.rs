use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use bytes::Bytes;
use rustc_hash::FxHashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::messaging::connection::{encode_frame, Connection, ConnectionHandler, ConnectionId, SendOutcome};
use crate::messaging::delegate::Delegate;
use crate::messaging::net_config::NetConfig;
use crate::messaging::net_message::{NetMessage, NetMessageType};
use crate::messaging::peer::Peer;
use crate::messaging::peer_table::PeerTable;
use crate::messaging::MessageSender;


/// The local node's vertex in the gossip mesh.
///
/// Every message - originated locally or received from any connection - goes through the same
///  pipeline: it is dropped unless it is new for its
///  sender, then it is marked as seen, forwarded to every open connection and dispatched locally.
///  Forwarding everything to everyone makes the mesh a flood; the per-sender number filter is what
///  makes the flood terminate.
///
/// Membership is driven by heartbeats alone: each node floods a heartbeat periodically, and a peer
///  whose heartbeats stop arriving is evicted by the liveness sweep and reported to the
///  [Delegate]. Connections coming and going do not affect membership directly.
///
/// A node's lifecycle: [NetHandler::new], [NetHandler::set_unique_name] (unless configured),
///  [NetHandler::set_delegate], [NetHandler::create_server_socket], optionally
///  [NetHandler::connect_to], [NetHandler::start]. Sending is possible as soon as the unique name
///  is set.
pub struct NetHandler {
    config: NetConfig,
    myself: OnceLock<Peer>,
    delegate: OnceLock<Arc<dyn Delegate>>,

    send_counter: AtomicU64,
    peer_table: Mutex<PeerTable>,

    connections: Mutex<FxHashMap<ConnectionId, Connection>>,
    next_connection_id: AtomicU64,

    server_socket: Mutex<Option<TcpListener>>,
    local_addr: OnceLock<SocketAddr>,
    periodic_tasks: Mutex<Vec<JoinHandle<()>>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl NetHandler {
    pub fn new(config: NetConfig) -> NetHandler {
        let myself = OnceLock::new();
        if let Some(unique_name) = &config.unique_name {
            let _ = myself.set(Peer::new(unique_name.as_str()));
        }

        NetHandler {
            config,
            myself,
            delegate: OnceLock::new(),
            send_counter: AtomicU64::new(0),
            peer_table: Default::default(),
            connections: Default::default(),
            next_connection_id: AtomicU64::new(1),
            server_socket: Default::default(),
            local_addr: OnceLock::new(),
            periodic_tasks: Default::default(),
            accept_task: Default::default(),
        }
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub fn set_unique_name(&self, unique_name: &str) -> anyhow::Result<()> {
        self.myself.set(Peer::new(unique_name))
            .map_err(|_| anyhow!("the unique name was already set to {:?}", self.myself.get()))
    }

    pub fn myself(&self) -> anyhow::Result<&Peer> {
        self.myself.get()
            .ok_or_else(|| anyhow!("no unique name was set"))
    }

    pub fn set_delegate(&self, delegate: Arc<dyn Delegate>) -> anyhow::Result<()> {
        self.delegate.set(delegate)
            .map_err(|_| anyhow!("a delegate was already registered"))
    }

    /// Binds the listening socket. Returns the actual local address, which differs from the
    ///  configured one for port 0.
    pub async fn create_server_socket(&self, port: u16) -> anyhow::Result<SocketAddr> {
        let listener = TcpListener::bind((self.config.listen_host.as_str(), port)).await
            .with_context(|| format!("cannot listen on {}:{}", self.config.listen_host, port))?;
        let local_addr = listener.local_addr()?;

        let mut server_socket = lock(&self.server_socket);
        if server_socket.is_some() || self.local_addr.get().is_some() {
            bail!("server socket was already created");
        }
        *server_socket = Some(listener);
        let _ = self.local_addr.set(local_addr);

        info!("listening on {}", local_addr);
        Ok(local_addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Opens a single outbound connection. Failure is returned to the caller, it does not
    ///  affect the rest of the node.
    pub async fn connect_to(self: &Arc<Self>, host: &str, port: u16) -> anyhow::Result<ConnectionId> {
        info!("connecting to {}:{}", host, port);
        let stream = TcpStream::connect((host, port)).await
            .with_context(|| format!("cannot connect to {}:{}", host, port))?;
        self.add_connection(stream)
    }

    fn add_connection(self: &Arc<Self>, stream: TcpStream) -> anyhow::Result<ConnectionId> {
        let id = ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed));
        let handler: Arc<dyn ConnectionHandler> = self.clone();

        // registering while holding the lock, so a connection that dies immediately is
        //  removed only after it was added
        let mut connections = lock(&self.connections);
        let connection = Connection::spawn(id, stream, self.config.max_frame_len, self.config.connection_send_queue_len, handler)?;
        connections.insert(id, connection);
        debug!("{} open connections", connections.len());
        Ok(id)
    }

    /// Idempotent: removing a connection that is not (or no longer) registered is a no-op
    pub fn remove_connection(&self, id: ConnectionId) {
        let removed = lock(&self.connections).remove(&id);
        if let Some(connection) = removed {
            connection.close();
            info!("removed connection {:?}", connection);
        }
    }

    pub fn connection_count(&self) -> usize {
        lock(&self.connections).len()
    }

    /// Starts accepting connections and the periodic heartbeat and liveness tasks.
    pub fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        let myself = self.myself()?.clone();
        if self.delegate.get().is_none() {
            bail!("no delegate was registered");
        }
        let listener = lock(&self.server_socket).take()
            .ok_or_else(|| anyhow!("no server socket - either it was not created, or the node was started before"))?;

        info!("starting node {:?}", myself);

        *lock(&self.accept_task) = Some(tokio::spawn(self.clone().accept_loop(listener)));

        let mut periodic_tasks = lock(&self.periodic_tasks);
        periodic_tasks.push(tokio::spawn(self.clone().heartbeat_loop()));
        periodic_tasks.push(tokio::spawn(self.clone().liveness_loop()));
        Ok(())
    }

    /// Stops the periodic tasks, closes all connections and finally the listening socket.
    pub fn shutdown(&self) {
        info!("shutting down");
        for task in lock(&self.periodic_tasks).drain(..) {
            task.abort();
        }

        let connections = lock(&self.connections).drain()
            .map(|(_, c)| c)
            .collect::<Vec<_>>();
        for connection in connections {
            connection.close();
        }

        if let Some(accept_task) = lock(&self.accept_task).take() {
            accept_task.abort();
        }
        lock(&self.server_socket).take();
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("accepted connection from {}", addr);
                    if let Err(e) = self.add_connection(stream) {
                        warn!("could not set up connection from {}: {}", addr, e);
                    }
                }
                Err(e) => {
                    // typically a transient resource problem (e.g. out of file handles)
                    error!("error accepting connection: {}", e);
                    time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut ticks = time::interval(self.config.heartbeat_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            if let Err(e) = self.send_heartbeat() {
                error!("failed to send heartbeat: {}", e);
            }
        }
    }

    async fn liveness_loop(self: Arc<Self>) {
        let mut ticks = time::interval(self.config.liveness_sweep_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            self.check_liveness(Instant::now());
        }
    }

    pub fn send_heartbeat(&self) -> anyhow::Result<()> {
        let msg = NetMessage::heartbeat(self.myself()?.clone(), self.next_number());
        let frame = encode_frame(&msg, self.config.max_frame_len)?;
        self.process_message(msg, Some(frame));
        Ok(())
    }

    /// Wraps application content in a MESSAGE, stamps it with the next local message number
    ///  and sends it through the same pipeline as received messages, i.e. it is delivered to the
    ///  local delegate as well.
    ///
    /// Content that does not fit into a frame is rejected up front: it is neither delivered
    ///  locally nor sent.
    pub fn send_message(&self, content: Bytes) -> anyhow::Result<()> {
        let msg = NetMessage::message(self.myself()?.clone(), self.next_number(), content);
        let frame = encode_frame(&msg, self.config.max_frame_len)
            .context("cannot send message")?;
        trace!("sending {:?}", msg);
        self.process_message(msg, Some(frame));
        Ok(())
    }

    fn next_number(&self) -> u64 {
        self.send_counter.fetch_add(1, Ordering::AcqRel)
    }

    /// The broadcast pipeline for received messages.
    pub fn handle_incoming_message(&self, msg: NetMessage) {
        self.process_message(msg, None);
    }

    /// Deduplication and membership bookkeeping happen in one critical section, so the liveness
    ///  sweep never sees a message marked as seen without its heartbeat being recorded.
    ///  Forwarding and dispatch happen after the lock is released.
    fn process_message(&self, msg: NetMessage, frame: Option<Bytes>) {
        if !lock(&self.peer_table).on_message(&msg, self.myself.get(), Instant::now()) {
            return;
        }

        let frame = match frame {
            Some(frame) => Some(frame),
            None => match encode_frame(&msg, self.config.max_frame_len) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    error!("cannot forward {:?}: {}", msg, e);
                    None
                }
            },
        };
        if let Some(frame) = frame {
            self.forward(frame);
        }

        debug!("processing {:?}", msg);
        match msg.kind {
            NetMessageType::Message => {
                match (self.delegate.get(), msg.content) {
                    (Some(delegate), Some(content)) => {
                        let delegate = delegate.clone();
                        self.call_delegate("on_new_message", move || delegate.on_new_message(content));
                    }
                    (None, _) => debug!("no delegate registered - dropping message content"),
                    (_, None) => warn!("message without content - ignoring"),
                }
            }
            NetMessageType::Heartbeat => {}
            NetMessageType::Unknown(id) => {
                warn!("received message of unknown type {} - dropping it after forwarding", id);
            }
        }
    }

    fn forward(&self, frame: Bytes) {
        let closed = {
            let connections = lock(&self.connections);
            connections.values()
                .filter(|c| c.send(frame.clone()) == SendOutcome::Closed)
                .map(|c| c.id())
                .collect::<Vec<_>>()
        };
        for id in closed {
            self.remove_connection(id);
        }
    }

    /// Evicts all peers that timed out, notifying the delegate for each of them. Connections are
    ///  not touched.
    pub fn check_liveness(&self, now: Instant) {
        let evicted = lock(&self.peer_table)
            .sweep(now, self.config.peer_timeout, self.myself.get());

        for peer in evicted {
            info!("peer {:?} is not responding", peer);
            if let Some(delegate) = self.delegate.get() {
                let delegate = delegate.clone();
                self.call_delegate("peer_not_responding", move || delegate.peer_not_responding(peer.unique_name()));
            }
        }
    }

    fn call_delegate(&self, what: &str, f: impl FnOnce()) {
        if catch_unwind(AssertUnwindSafe(f)).is_err() {
            error!("delegate panicked in {} - ignoring", what);
        }
    }

    pub fn known_peers(&self) -> Vec<Peer> {
        lock(&self.peer_table).known_peers()
    }

    pub fn is_known_peer(&self, peer: &Peer) -> bool {
        lock(&self.peer_table).is_known(peer)
    }

    pub fn last_seen_number(&self, sender: &Peer) -> Option<u64> {
        lock(&self.peer_table).last_seen_number(sender)
    }
}

impl ConnectionHandler for NetHandler {
    fn on_message(&self, _connection: ConnectionId, msg: NetMessage) {
        self.handle_incoming_message(msg);
    }

    fn on_closed(&self, connection: ConnectionId) {
        self.remove_connection(connection);
    }
}

impl MessageSender for NetHandler {
    fn send_message(&self, content: Bytes) -> anyhow::Result<()> {
        NetHandler::send_message(self, content)
    }
}

/// None of the critical sections can leave the data inconsistent (delegate calls happen outside
///  of locks), so a poisoned lock is still safe to use.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock()
        .unwrap_or_else(|e| e.into_inner())
}


#[cfg(test)]
mod test {
    use tokio::time::{sleep, timeout};

    use crate::messaging::delegate::MockDelegate;
    use crate::test_util::delegate::RecordingDelegate;

    use super::*;

    fn test_config(unique_name: &str) -> NetConfig {
        let mut config = NetConfig::new(0);
        config.listen_host = "127.0.0.1".to_string();
        config.unique_name = Some(unique_name.to_string());
        config.heartbeat_interval = Duration::from_millis(50);
        config.liveness_sweep_interval = Duration::from_millis(25);
        config.peer_timeout = Duration::from_millis(300);
        config
    }

    async fn started_node(unique_name: &str) -> (Arc<NetHandler>, Arc<RecordingDelegate>) {
        let node = Arc::new(NetHandler::new(test_config(unique_name)));
        let delegate = Arc::new(RecordingDelegate::default());
        node.set_delegate(delegate.clone()).unwrap();
        node.create_server_socket(0).await.unwrap();
        node.start().unwrap();
        (node, delegate)
    }

    async fn connect(from: &Arc<NetHandler>, to: &Arc<NetHandler>) {
        let port = to.local_addr().unwrap().port();
        from.connect_to("127.0.0.1", port).await.unwrap();
    }

    async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
        let result = timeout(Duration::from_secs(5), async {
            while !condition() {
                sleep(Duration::from_millis(10)).await;
            }
        }).await;
        assert!(result.is_ok(), "timed out waiting for {}", what);
    }

    fn unstarted_node() -> NetHandler {
        NetHandler::new(test_config("me"))
    }

    #[test]
    fn test_local_message_is_delivered_once() {
        let node = unstarted_node();
        let delegate = Arc::new(RecordingDelegate::default());
        node.set_delegate(delegate.clone()).unwrap();

        node.send_message(Bytes::from_static(b"a")).unwrap();
        node.send_message(Bytes::from_static(b"b")).unwrap();

        assert_eq!(delegate.messages(), vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
        assert_eq!(node.last_seen_number(&Peer::new("me")), Some(1));
    }

    #[test]
    fn test_oversized_message_is_rejected_before_local_delivery() {
        let mut config = test_config("me");
        config.max_frame_len = 16;
        let node = NetHandler::new(config);
        let delegate = Arc::new(RecordingDelegate::default());
        node.set_delegate(delegate.clone()).unwrap();

        assert!(node.send_message(Bytes::from(vec![7u8; 100])).is_err());
        assert!(delegate.messages().is_empty());

        node.send_message(Bytes::from_static(b"hi")).unwrap();
        assert_eq!(delegate.messages(), vec![Bytes::from_static(b"hi")]);
    }

    #[tokio::test]
    async fn test_oversized_message_reaches_nobody() {
        let mut config = test_config("a");
        config.max_frame_len = 16;
        let a = Arc::new(NetHandler::new(config));
        let delegate_a = Arc::new(RecordingDelegate::default());
        a.set_delegate(delegate_a.clone()).unwrap();
        a.create_server_socket(0).await.unwrap();
        a.start().unwrap();

        let (b, delegate_b) = started_node("b").await;
        connect(&a, &b).await;
        eventually("discovery", || b.is_known_peer(&Peer::new("a"))).await;

        assert!(a.send_message(Bytes::from(vec![7u8; 100])).is_err());
        a.send_message(Bytes::from_static(b"hi")).unwrap();

        eventually("delivery of the small message", || !delegate_b.messages().is_empty()).await;
        assert_eq!(delegate_b.messages(), vec![Bytes::from_static(b"hi")]);
        assert_eq!(delegate_a.messages(), vec![Bytes::from_static(b"hi")]);

        a.shutdown();
        b.shutdown();
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let node = unstarted_node();
        let mut delegate = MockDelegate::new();
        delegate.expect_on_new_message()
            .withf(|content| content.as_ref() == b"x")
            .times(1)
            .returning(|_| ());
        delegate.expect_on_new_message()
            .withf(|content| content.as_ref() == b"y")
            .times(1)
            .returning(|_| ());
        node.set_delegate(Arc::new(delegate)).unwrap();

        let other = Peer::new("other");
        node.handle_incoming_message(NetMessage::message(other.clone(), 5, Bytes::from_static(b"x")));
        node.handle_incoming_message(NetMessage::message(other.clone(), 5, Bytes::from_static(b"x")));
        node.handle_incoming_message(NetMessage::message(other.clone(), 4, Bytes::from_static(b"old")));
        node.handle_incoming_message(NetMessage::message(other.clone(), 9, Bytes::from_static(b"y")));
        assert_eq!(node.last_seen_number(&other), Some(9));
    }

    #[test]
    fn test_heartbeats_populate_known_peers() {
        let node = unstarted_node();
        node.set_delegate(Arc::new(RecordingDelegate::default())).unwrap();

        node.send_heartbeat().unwrap();
        assert!(node.known_peers().is_empty(), "a node must not know itself as a peer");

        node.handle_incoming_message(NetMessage::heartbeat(Peer::new("b"), 0));
        node.handle_incoming_message(NetMessage::heartbeat(Peer::new("a"), 3));
        assert_eq!(node.known_peers(), vec![Peer::new("a"), Peer::new("b")]);
        assert_eq!(node.last_seen_number(&Peer::new("a")), Some(3));
        assert_eq!(node.last_seen_number(&Peer::new("b")), Some(0));
    }

    #[test]
    fn test_unknown_message_type_is_dropped() {
        let node = unstarted_node();
        let mut delegate = MockDelegate::new();
        delegate.expect_on_new_message().never();
        node.set_delegate(Arc::new(delegate)).unwrap();

        let sender = Peer::new("future");
        node.handle_incoming_message(NetMessage {
            kind: NetMessageType::Unknown(42),
            sender: sender.clone(),
            number: 1,
            content: Some(Bytes::from_static(b"?")),
        });
        assert_eq!(node.last_seen_number(&sender), Some(1));
        assert!(!node.is_known_peer(&sender));
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_sweep() {
        let node = unstarted_node();
        let mut delegate = MockDelegate::new();
        delegate.expect_peer_not_responding()
            .withf(|name| name == "b")
            .times(1)
            .returning(|_| ());
        node.set_delegate(Arc::new(delegate)).unwrap();

        let a = Peer::new("a");
        let b = Peer::new("b");
        node.handle_incoming_message(NetMessage::heartbeat(b.clone(), 0));
        time::advance(Duration::from_millis(200)).await;
        node.handle_incoming_message(NetMessage::heartbeat(a.clone(), 0));

        time::advance(Duration::from_millis(101)).await;
        node.check_liveness(Instant::now());
        assert_eq!(node.known_peers(), vec![a.clone()]);
        assert_eq!(node.last_seen_number(&b), None);

        node.check_liveness(Instant::now());
        assert_eq!(node.known_peers(), vec![a]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_numbers_of_silent_senders_expire() {
        let node = unstarted_node();
        let mut delegate = MockDelegate::new();
        delegate.expect_on_new_message().returning(|_| ());
        delegate.expect_peer_not_responding().never();
        node.set_delegate(Arc::new(delegate)).unwrap();

        node.send_message(Bytes::from_static(b"own")).unwrap();
        node.handle_incoming_message(NetMessage::message(Peer::new("silent"), 4, Bytes::from_static(b"x")));

        time::advance(Duration::from_millis(301)).await;
        node.check_liveness(Instant::now());
        assert_eq!(node.last_seen_number(&Peer::new("silent")), None);
        assert_eq!(node.last_seen_number(&Peer::new("me")), Some(0));
    }

    #[test]
    fn test_panicking_delegate() {
        struct PanickingDelegate {
            calls: Mutex<usize>,
        }
        impl Delegate for PanickingDelegate {
            fn on_new_message(&self, _content: Bytes) {
                *lock(&self.calls) += 1;
                panic!("boom");
            }
            fn peer_not_responding(&self, _unique_name: &str) {}
        }

        let node = unstarted_node();
        let delegate = Arc::new(PanickingDelegate { calls: Mutex::new(0) });
        node.set_delegate(delegate.clone()).unwrap();

        node.send_message(Bytes::from_static(b"1")).unwrap();
        node.send_message(Bytes::from_static(b"2")).unwrap();
        assert_eq!(*lock(&delegate.calls), 2);
        assert_eq!(node.last_seen_number(&Peer::new("me")), Some(1));
    }

    #[test]
    fn test_wiring_happens_once() {
        let node = NetHandler::new(NetConfig::new(0));
        assert!(node.myself().is_err());
        assert!(node.send_message(Bytes::new()).is_err());

        node.set_unique_name("x").unwrap();
        assert!(node.set_unique_name("y").is_err());
        assert_eq!(node.myself().unwrap(), &Peer::new("x"));

        node.set_delegate(Arc::new(RecordingDelegate::default())).unwrap();
        assert!(node.set_delegate(Arc::new(RecordingDelegate::default())).is_err());
    }

    #[tokio::test]
    async fn test_start_preconditions() {
        let node = Arc::new(unstarted_node());
        assert!(node.start().is_err(), "no delegate");

        node.set_delegate(Arc::new(RecordingDelegate::default())).unwrap();
        assert!(node.start().is_err(), "no server socket");

        node.create_server_socket(0).await.unwrap();
        node.start().unwrap();
        assert!(node.start().is_err(), "started twice");
        node.shutdown();
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let (a, _) = started_node("a").await;
        let port = a.local_addr().unwrap().port();

        let b = NetHandler::new(test_config("b"));
        assert!(b.create_server_socket(port).await.is_err());
        a.shutdown();
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let (a, _) = started_node("a").await;
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(a.connect_to("127.0.0.1", port).await.is_err());
        assert_eq!(a.connection_count(), 0);
        a.shutdown();
    }

    #[tokio::test]
    async fn test_two_node_discovery() {
        let (a, delegate_a) = started_node("a").await;
        let (b, delegate_b) = started_node("b").await;
        connect(&b, &a).await;

        eventually("mutual discovery", || {
            a.known_peers() == vec![Peer::new("b")] && b.known_peers() == vec![Peer::new("a")]
        }).await;
        assert!(delegate_a.messages().is_empty());
        assert!(delegate_b.messages().is_empty());

        a.shutdown();
        b.shutdown();
    }

    #[tokio::test]
    async fn test_flood_dedup_in_full_mesh() {
        let (a, delegate_a) = started_node("a").await;
        let (b, delegate_b) = started_node("b").await;
        let (c, delegate_c) = started_node("c").await;
        connect(&a, &b).await;
        connect(&b, &c).await;
        connect(&c, &a).await;

        eventually("full mesh", || {
            a.known_peers().len() == 2 && b.known_peers().len() == 2 && c.known_peers().len() == 2
        }).await;

        a.send_message(Bytes::from_static(b"x")).unwrap();

        eventually("delivery", || {
            !delegate_b.messages().is_empty() && !delegate_c.messages().is_empty()
        }).await;
        // give the redundant copies time to arrive
        sleep(Duration::from_millis(200)).await;

        for delegate in [&delegate_a, &delegate_b, &delegate_c] {
            assert_eq!(delegate.messages(), vec![Bytes::from_static(b"x")]);
        }

        for node in [a, b, c] {
            node.shutdown();
        }
    }

    #[tokio::test]
    async fn test_flood_reaches_indirect_peers() {
        let (a, _) = started_node("a").await;
        let (b, _) = started_node("b").await;
        let (c, delegate_c) = started_node("c").await;
        // a line: a - b - c
        connect(&a, &b).await;
        connect(&c, &b).await;

        eventually("a and c know each other via b", || {
            a.is_known_peer(&Peer::new("c")) && c.is_known_peer(&Peer::new("a"))
        }).await;

        a.send_message(Bytes::from_static(b"hello")).unwrap();
        eventually("delivery to c", || !delegate_c.messages().is_empty()).await;
        assert_eq!(delegate_c.messages(), vec![Bytes::from_static(b"hello")]);

        for node in [a, b, c] {
            node.shutdown();
        }
    }

    #[tokio::test]
    async fn test_timeout_demotion() {
        let (a, delegate_a) = started_node("a").await;
        let (b, _) = started_node("b").await;
        connect(&b, &a).await;

        eventually("discovery", || a.is_known_peer(&Peer::new("b"))).await;

        // cut b off the network
        b.shutdown();

        eventually("demotion", || !a.is_known_peer(&Peer::new("b"))).await;
        // more sweeps must not report b again
        sleep(Duration::from_millis(100)).await;
        assert_eq!(delegate_a.not_responding(), vec!["b".to_string()]);
        a.shutdown();
    }

    #[tokio::test]
    async fn test_closed_connection_is_removed_without_demotion() {
        let (a, _) = started_node("a").await;
        let (b, _) = started_node("b").await;
        let connection = {
            let port = a.local_addr().unwrap().port();
            b.connect_to("127.0.0.1", port).await.unwrap()
        };

        eventually("discovery", || b.is_known_peer(&Peer::new("a"))).await;
        eventually("accepted", || a.connection_count() == 1).await;

        b.remove_connection(connection);
        b.remove_connection(connection);
        assert_eq!(b.connection_count(), 0);
        assert!(b.is_known_peer(&Peer::new("a")), "closing a connection does not demote a peer");
        eventually("remote side cleans up", || a.connection_count() == 0).await;

        a.shutdown();
        b.shutdown();
    }
}
