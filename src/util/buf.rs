use anyhow::anyhow;
use bytes::{Buf, BufMut, Bytes};
use bytes_varint::{VarIntSupport, VarIntSupportMut};


/// Length-prefixed primitives shared by the transport's wire format and the game payloads.
///  Lengths are written as varints, everything else in network byte order.
pub trait BufExt: Buf + VarIntSupport {
    fn try_get_len(&mut self) -> anyhow::Result<usize> {
        let len = self.try_get_u64_varint()
            .map_err(|e| anyhow!("varint error: {:?}", e))?;
        let len: usize = len.try_into()?;
        if len > self.remaining() {
            return Err(anyhow!("length prefix {} exceeds remaining buffer of {} bytes", len, self.remaining()));
        }
        Ok(len)
    }

    fn try_get_string(&mut self) -> anyhow::Result<String> {
        let len = self.try_get_len()?;
        let raw = self.copy_to_bytes(len);
        Ok(String::from_utf8(raw.to_vec())?)
    }

    fn try_get_len_prefixed_bytes(&mut self) -> anyhow::Result<Bytes> {
        let len = self.try_get_len()?;
        Ok(self.copy_to_bytes(len))
    }
}

pub trait BufMutExt: BufMut + VarIntSupportMut {
    fn put_len(&mut self, len: usize) {
        self.put_u64_varint(len as u64);
    }

    fn put_string(&mut self, s: &str) {
        self.put_len(s.len());
        self.put_slice(s.as_bytes());
    }

    fn put_len_prefixed_bytes(&mut self, data: &[u8]) {
        self.put_len(data.len());
        self.put_slice(data);
    }
}

impl <T: Buf> BufExt for T {
}

impl <T: BufMut> BufMutExt for T {
}
