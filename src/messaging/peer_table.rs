use std::collections::hash_map::Entry;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::messaging::net_message::{NetMessage, NetMessageType};
use crate::messaging::peer::Peer;


#[derive(Debug, Clone, Copy)]
struct SeenEntry {
    number: u64,
    updated: Instant,
}

/// Membership and deduplication bookkeeping, derived from nothing but received traffic.
///
/// A peer is *known* (i.e. live) iff it has a last-heard timestamp, which is set by every
///  heartbeat received from it. The seen table records the highest message number processed per
///  sender, which is what stops the flood: a message is only new if its number is strictly
///  greater than the recorded one.
///
/// Every known peer has a seen entry: both are updated in [PeerTable::on_message], and evicted
///  together when a peer times out, so a peer that comes back later is treated like a fresh one.
///  Seen entries of senders that never send heartbeats expire after the same timeout.
#[derive(Default, Debug)]
pub struct PeerTable {
    last_heard: FxHashMap<Peer, Instant>,
    seen_messages: FxHashMap<Peer, SeenEntry>,
}

impl PeerTable {
    pub fn new() -> PeerTable {
        Default::default()
    }

    pub fn is_new(&self, sender: &Peer, number: u64) -> bool {
        match self.seen_messages.get(sender) {
            Some(seen) => number > seen.number,
            None => true,
        }
    }

    /// Registers a message in a single step: returns `false` for a duplicate. Otherwise the
    ///  message is marked as seen and, if it is a heartbeat from some node other than `myself`,
    ///  its sender's last-heard timestamp is updated.
    pub fn on_message(&mut self, msg: &NetMessage, myself: Option<&Peer>, now: Instant) -> bool {
        if !self.check_and_mark_seen(&msg.sender, msg.number, now) {
            return false;
        }
        if msg.kind == NetMessageType::Heartbeat && myself != Some(&msg.sender) {
            self.on_heartbeat(&msg.sender, now);
        }
        true
    }

    fn check_and_mark_seen(&mut self, sender: &Peer, number: u64, now: Instant) -> bool {
        match self.seen_messages.entry(sender.clone()) {
            Entry::Occupied(mut e) => {
                if number > e.get().number {
                    e.insert(SeenEntry { number, updated: now });
                    true
                }
                else {
                    trace!("duplicate message {:?}#{} (last seen #{})", sender, number, e.get().number);
                    false
                }
            }
            Entry::Vacant(e) => {
                e.insert(SeenEntry { number, updated: now });
                true
            }
        }
    }

    pub fn last_seen_number(&self, sender: &Peer) -> Option<u64> {
        self.seen_messages.get(sender)
            .map(|seen| seen.number)
    }

    fn on_heartbeat(&mut self, peer: &Peer, now: Instant) {
        if self.last_heard.insert(peer.clone(), now).is_none() {
            debug!("{:?} is now a known peer", peer);
        }
    }

    pub fn is_known(&self, peer: &Peer) -> bool {
        self.last_heard.contains_key(peer)
    }

    pub fn known_peers(&self) -> Vec<Peer> {
        let mut result = self.last_heard.keys()
            .cloned()
            .collect::<Vec<_>>();
        result.sort();
        result
    }

    /// Evicts all peers that were not heard from for strictly longer than `timeout`, returning
    ///  them. Eviction removes a peer from both the known-peer and the seen-message table.
    ///
    /// Seen entries of senders that are not known peers are dropped silently under the same
    ///  rule, except for `myself`.
    pub fn sweep(&mut self, now: Instant, timeout: Duration, myself: Option<&Peer>) -> Vec<Peer> {
        let mut evicted = self.last_heard.iter()
            .filter(|(_, last_heard)| now.saturating_duration_since(**last_heard) > timeout)
            .map(|(peer, _)| peer.clone())
            .collect::<Vec<_>>();
        evicted.sort();

        for peer in &evicted {
            debug!("{:?} timed out", peer);
            self.last_heard.remove(peer);
            self.seen_messages.remove(peer);
        }

        let last_heard = &self.last_heard;
        self.seen_messages.retain(|sender, seen| {
            let keep = myself == Some(sender)
                || last_heard.contains_key(sender)
                || now.saturating_duration_since(seen.updated) <= timeout;
            if !keep {
                debug!("discarding stale message numbers of {:?}", sender);
            }
            keep
        });

        evicted
    }
}
