use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NetConfig {
    pub listen_host: String,
    pub listen_port: u16,

    /// The local node's identity. If this is `None`, it must be set on the
    ///  [NetHandler](crate::messaging::net_handler::NetHandler) before it is started.
    pub unique_name: Option<String>,

    pub heartbeat_interval: Duration,
    pub liveness_sweep_interval: Duration,
    /// a peer is evicted if nothing was heard from it for strictly longer than this
    pub peer_timeout: Duration,

    pub max_frame_len: usize,
    /// number of encoded frames buffered per connection before further frames for that
    ///  connection are dropped
    pub connection_send_queue_len: usize,
}

impl NetConfig {
    pub fn new(listen_port: u16) -> NetConfig {
        NetConfig {
            listen_host: "0.0.0.0".to_string(),
            listen_port,
            unique_name: None,
            heartbeat_interval: Duration::from_millis(1000),
            liveness_sweep_interval: Duration::from_millis(500),
            peer_timeout: Duration::from_millis(3000),
            max_frame_len: 1024*1024,
            connection_send_queue_len: 1024,
        }
    }
}
