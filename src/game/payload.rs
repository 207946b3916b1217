use std::fmt::{Display, Formatter};

use anyhow::{anyhow, bail};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::messaging::peer::Peer;
use crate::util::buf::{BufExt, BufMutExt};


#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Choice {
    Rock = 1,
    Paper = 2,
    Scissors = 3,
}
impl Choice {
    pub const ALL: [Choice; 3] = [Choice::Rock, Choice::Paper, Choice::Scissors];

    pub fn beats(&self, other: Choice) -> bool {
        matches!(
            (*self, other),
            (Choice::Rock, Choice::Scissors) | (Choice::Scissors, Choice::Paper) | (Choice::Paper, Choice::Rock)
        )
    }
}

impl Display for Choice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Choice::Rock => "rock",
            Choice::Paper => "paper",
            Choice::Scissors => "scissors",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Choice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rock" | "r" => Ok(Choice::Rock),
            "paper" | "p" => Ok(Choice::Paper),
            "scissors" | "s" => Ok(Choice::Scissors),
            other => Err(anyhow!("not a valid choice: {:?}", other)),
        }
    }
}


const ID_PLAYER_INFO: u8 = 1;
const ID_PLAY_COMMAND: u8 = 2;
const ID_CHAT: u8 = 3;

/// The content the game puts into the transport's messages. The transport treats it as opaque
///  bytes, so nodes disagreeing on this format still share membership.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Payload {
    PlayerInfo { player: Peer, display_name: String },
    PlayCommand { player: Peer, choice: Choice },
    ChatMessage(String),
}

impl Payload {
    pub fn id(&self) -> u8 {
        match self {
            Payload::PlayerInfo { .. } => ID_PLAYER_INFO,
            Payload::PlayCommand { .. } => ID_PLAY_COMMAND,
            Payload::ChatMessage(_) => ID_CHAT,
        }
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.id());
        match self {
            Payload::PlayerInfo { player, display_name } => {
                player.ser(buf);
                buf.put_string(display_name);
            }
            Payload::PlayCommand { player, choice } => {
                player.ser(buf);
                buf.put_u8((*choice).into());
            }
            Payload::ChatMessage(text) => {
                buf.put_string(text);
            }
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.ser(&mut buf);
        buf.freeze()
    }

    pub fn try_deser(mut buf: &[u8]) -> anyhow::Result<Payload> {
        let result = match buf.try_get_u8()? {
            ID_PLAYER_INFO => {
                let player = Peer::try_deser(&mut buf)?;
                let display_name = buf.try_get_string()?;
                Payload::PlayerInfo { player, display_name }
            }
            ID_PLAY_COMMAND => {
                let player = Peer::try_deser(&mut buf)?;
                let choice = Choice::try_from(buf.try_get_u8()?)?;
                Payload::PlayCommand { player, choice }
            }
            ID_CHAT => {
                Payload::ChatMessage(buf.try_get_string()?)
            }
            id => bail!("invalid payload discriminator {}", id),
        };

        if buf.has_remaining() {
            bail!("{} trailing bytes after payload", buf.remaining());
        }
        Ok(result)
    }
}
