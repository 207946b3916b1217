//! Test doubles for the transport's seams. They are part of the regular (non-#[cfg(test)]) code
//!  so applications can use them for testing their own delegates and message handling.

pub mod delegate;
pub mod message;
