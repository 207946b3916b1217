//! The gossip transport: every node is both client and server, floods every new message to all
//!  its connections, and derives membership from heartbeats.

use bytes::Bytes;
#[cfg(test)] use mockall::automock;

pub mod connection;
pub mod delegate;
pub mod net_config;
pub mod net_handler;
pub mod net_message;
pub mod peer;
pub mod peer_table;


/// The application's view of the transport: content handed in here reaches every live node in
///  the mesh, including the local one (through its delegate).
#[cfg_attr(test, automock)]
pub trait MessageSender: Send + Sync + 'static {
    fn send_message(&self, content: Bytes) -> anyhow::Result<()>;
}
