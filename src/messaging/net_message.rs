use std::fmt::{Debug, Formatter};

use anyhow::bail;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::FromPrimitive;

use crate::messaging::peer::Peer;
use crate::util::buf::{BufExt, BufMutExt};


/// The kind of a [NetMessage]. Type bytes this node does not know are preserved as
///  [NetMessageType::Unknown] so they are still deduplicated and flooded, and only dropped at
///  local dispatch.
#[derive(Debug, Clone, Copy, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum NetMessageType {
    Heartbeat = 1,
    Message = 2,
    #[num_enum(catch_all)]
    Unknown(u8),
}
impl NetMessageType {
    pub fn id(&self) -> u8 {
        match *self {
            NetMessageType::Heartbeat => 1,
            NetMessageType::Message => 2,
            NetMessageType::Unknown(id) => id,
        }
    }
}


/// A single message travelling through the mesh. `(sender, number)` identifies it globally: the
///  sender stamps each message it originates with its next counter value, and everybody else
///  forwards it unchanged.
#[derive(Clone, Eq, PartialEq)]
pub struct NetMessage {
    pub kind: NetMessageType,
    pub sender: Peer,
    pub number: u64,
    pub content: Option<Bytes>,
}

impl Debug for NetMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{{{:?}#{}", self.kind, self.sender, self.number)?;
        if let Some(content) = &self.content {
            write!(f, ", {} bytes", content.len())?;
        }
        write!(f, "}}")
    }
}

impl NetMessage {
    pub fn heartbeat(sender: Peer, number: u64) -> NetMessage {
        NetMessage {
            kind: NetMessageType::Heartbeat,
            sender,
            number,
            content: None,
        }
    }

    pub fn message(sender: Peer, number: u64, content: Bytes) -> NetMessage {
        NetMessage {
            kind: NetMessageType::Message,
            sender,
            number,
            content: Some(content),
        }
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.put_u8(self.kind.id());
        self.sender.ser(buf);
        buf.put_u64(self.number);
        match &self.content {
            Some(content) => buf.put_len_prefixed_bytes(content),
            None => buf.put_len(0),
        }
    }

    pub fn try_deser(buf: &mut impl Buf) -> anyhow::Result<NetMessage> {
        let kind = NetMessageType::from_primitive(buf.try_get_u8()?);
        let sender = Peer::try_deser(buf)?;
        let number = buf.try_get_u64()?;
        let content = buf.try_get_len_prefixed_bytes()?;

        if buf.has_remaining() {
            bail!("{} trailing bytes after message", buf.remaining());
        }

        let content = match kind {
            NetMessageType::Heartbeat if content.is_empty() => None,
            NetMessageType::Heartbeat => bail!("heartbeat with non-empty content"),
            NetMessageType::Message => Some(content),
            NetMessageType::Unknown(_) => if content.is_empty() { None } else { Some(content) },
        };

        Ok(NetMessage {
            kind,
            sender,
            number,
            content,
        })
    }
}


#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::heartbeat(NetMessage::heartbeat(Peer::new("a"), 0), b"\x01\x01a\0\0\0\0\0\0\0\0\0")]
    #[case::message(NetMessage::message(Peer::new("bc"), 258, Bytes::from_static(b"x")), b"\x02\x02bc\0\0\0\0\0\0\x01\x02\x01x")]
    #[case::empty_message(NetMessage::message(Peer::new("a"), 1, Bytes::new()), b"\x02\x01a\0\0\0\0\0\0\0\x01\0")]
    fn test_ser(#[case] msg: NetMessage, #[case] expected: &[u8]) {
        let mut buf = BytesMut::new();
        msg.ser(&mut buf);
        assert_eq!(&buf[..], expected);

        let mut b: &[u8] = &buf;
        assert_eq!(NetMessage::try_deser(&mut b).unwrap(), msg);
    }

    #[test]
    fn test_deser_unknown_type() {
        let mut buf: &[u8] = b"\x07\x01a\0\0\0\0\0\0\0\x05\x02hi";
        let msg = NetMessage::try_deser(&mut buf).unwrap();
        assert_eq!(msg.kind, NetMessageType::Unknown(7));
        assert_eq!(msg.number, 5);
        assert_eq!(msg.content, Some(Bytes::from_static(b"hi")));

        let mut reser = BytesMut::new();
        msg.ser(&mut reser);
        assert_eq!(&reser[..], b"\x07\x01a\0\0\0\0\0\0\0\x05\x02hi");
    }

    #[rstest]
    #[case::empty(b"")]
    #[case::truncated_sender(b"\x01\x05ab")]
    #[case::truncated_number(b"\x01\x01a\0\0\0")]
    #[case::missing_content(b"\x02\x01a\0\0\0\0\0\0\0\x01")]
    #[case::trailing_bytes(b"\x01\x01a\0\0\0\0\0\0\0\0\0\0")]
    #[case::heartbeat_with_content(b"\x01\x01a\0\0\0\0\0\0\0\0\x01x")]
    fn test_deser_invalid(#[case] mut buf: &[u8]) {
        assert!(NetMessage::try_deser(&mut buf).is_err());
    }
}
