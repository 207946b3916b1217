use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::game::payload::Payload;
use crate::messaging::MessageSender;

/// A [MessageSender] that records everything sent through it instead of sending it
#[derive(Debug, Default, Clone)]
pub struct TrackingMessageSender {
    tracker: Arc<Mutex<Vec<Bytes>>>,
}
impl TrackingMessageSender {
    pub fn new() -> Self {
        Default::default()
    }

    /// removes and returns all payloads sent so far, decoded
    pub fn take_sent(&self) -> Vec<Payload> {
        self.tracker.lock().unwrap()
            .drain(..)
            .map(|raw| Payload::try_deser(&raw).unwrap())
            .collect()
    }

    pub fn assert_payload_sent(&self, expected: Payload) {
        let mut lock = self.tracker.lock().unwrap();
        if lock.is_empty() {
            panic!("no message was sent, expected {:?}", expected);
        }
        let actual = Payload::try_deser(&lock.remove(0)).unwrap();
        assert_eq!(actual, expected);
    }

    pub fn assert_no_remaining_messages(&self) {
        let remaining = self.take_sent();
        assert!(remaining.is_empty(), "unexpected messages: {:?}", remaining);
    }
}

impl MessageSender for TrackingMessageSender {
    fn send_message(&self, content: Bytes) -> anyhow::Result<()> {
        self.tracker.lock().unwrap().push(content);
        Ok(())
    }
}
