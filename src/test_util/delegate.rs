use std::sync::Mutex;

use bytes::Bytes;

use crate::messaging::delegate::Delegate;

/// A [Delegate] that records all upcalls for later inspection
#[derive(Default, Debug)]
pub struct RecordingDelegate {
    messages: Mutex<Vec<Bytes>>,
    not_responding: Mutex<Vec<String>>,
}

impl RecordingDelegate {
    pub fn messages(&self) -> Vec<Bytes> {
        self.messages.lock().unwrap().clone()
    }

    pub fn not_responding(&self) -> Vec<String> {
        self.not_responding.lock().unwrap().clone()
    }
}

impl Delegate for RecordingDelegate {
    fn on_new_message(&self, content: Bytes) {
        self.messages.lock().unwrap().push(content);
    }

    fn peer_not_responding(&self, unique_name: &str) {
        self.not_responding.lock().unwrap().push(unique_name.to_string());
    }
}
