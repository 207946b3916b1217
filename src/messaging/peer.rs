use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use bytes::{Buf, BufMut};

use crate::util::buf::{BufExt, BufMutExt};

/// A node in the mesh, identified by an opaque unique name. Two peers are equal iff their names
///  are equal - the name is all a node ever learns about another node from the traffic it
///  receives.
///
/// By convention the name is the node's address plus a random suffix (see [Peer::generate]), so
///  a node restarted on the same address does not collide with its previous incarnation. Nothing
///  relies on the structure, though.
#[derive(Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Peer {
    unique_name: Arc<str>,
}

impl Peer {
    pub fn new(unique_name: impl Into<Arc<str>>) -> Peer {
        Peer {
            unique_name: unique_name.into(),
        }
    }

    pub fn generate(host: &str, port: u16) -> Peer {
        let suffix: u32 = rand::random();
        Peer::new(format!("{}:{}#{:08x}", host, port, suffix))
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_string(&self.unique_name);
    }

    pub fn try_deser(buf: &mut impl Buf) -> anyhow::Result<Peer> {
        Ok(Peer::new(buf.try_get_string()?))
    }
}

impl Debug for Peer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.unique_name)
    }
}

impl Display for Peer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.unique_name)
    }
}

impl From<&str> for Peer {
    fn from(value: &str) -> Self {
        Peer::new(value)
    }
}
