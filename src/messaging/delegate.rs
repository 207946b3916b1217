use bytes::Bytes;
#[cfg(test)] use mockall::automock;


/// The single application-level consumer of transport upcalls.
///
/// Calls are made synchronously from whichever task processed the triggering message or sweep,
///  possibly from several tasks at the same time. Implementations must not block: anything
///  non-trivial should be handed off to a task of their own, typically through a channel.
#[cfg_attr(test, automock)]
pub trait Delegate: Send + Sync + 'static {
    /// called exactly once for every distinct `(sender, number)` of a MESSAGE, including the
    ///  local node's own messages
    fn on_new_message(&self, content: Bytes);

    /// called when a known peer was evicted because no heartbeat was received from it in time.
    ///  If the peer re-appears and times out again, this is called again.
    fn peer_not_responding(&self, unique_name: &str);
}
