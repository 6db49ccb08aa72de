//! Message transport between vehicles and their controller peers.

use crate::error::{Result, SimError};
use crate::network::TileSet;
use crate::vehicle::VehicleId;

pub mod codec;
pub mod memory;

pub use memory::{MemoryChannel, PeerEnd};

/// Non-blocking, message-oriented link to a vehicle's controller.
pub trait MessageChannel {
    fn send(&mut self, bytes: &[u8]);

    /// At most one message per call.
    fn try_receive(&mut self) -> Option<Vec<u8>>;
}

/// Supplies a fresh channel for every spawned vehicle.
pub trait ChannelProvider {
    fn open(&mut self, vehicle: VehicleId) -> Box<dyn MessageChannel>;

    /// Called once at the end of every world step.
    fn poll(&mut self, _now_ms: u64) {}
}

/// Vehicle to controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Tune to an intersection's coordination channel.
    ChannelSwitch(u8),
    /// Start a coordination round as initiator.
    Initiate,
    Join,
    Leave,
    Reserve(TileSet),
}

impl Command {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::ChannelSwitch(channel) => vec![b'C', *channel],
            Command::Initiate => vec![b'I'],
            Command::Join => vec![b'J'],
            Command::Leave => vec![b'L'],
            Command::Reserve(tiles) => {
                let mut bytes = vec![b'R'];
                bytes.extend(tiles.to_bytes());
                bytes
            }
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        match bytes {
            [b'C', channel] => Ok(Command::ChannelSwitch(*channel)),
            [b'I'] => Ok(Command::Initiate),
            [b'J'] => Ok(Command::Join),
            [b'L'] => Ok(Command::Leave),
            [b'R', tiles @ ..] => Ok(Command::Reserve(TileSet::from_bytes(tiles))),
            _ => Err(SimError::Frame(format!("unknown command {:?}", String::from_utf8_lossy(bytes)))),
        }
    }
}

pub const STATS_PREFIX: &[u8] = b"MC-STATS";

/// Controller to vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Init,
    Ack,
    Accepted,
    /// Membership in the coordination network, with the assigned node index.
    Joined(u8),
    Left,
    IsInitiator,
    RoundEnd,
    /// Raw `MC-STATS-*` report.
    Stats(Vec<u8>),
    Unknown(Vec<u8>),
}

impl Message {
    pub fn parse(bytes: &[u8]) -> Self {
        match bytes {
            b"init" => Message::Init,
            b"ack" => Message::Ack,
            b"accepted" => Message::Accepted,
            b"left" => Message::Left,
            b"is_initiator" => Message::IsInitiator,
            b"round_end" => Message::RoundEnd,
            [b'j', b'o', b'i', b'n', b'e', b'd', index, ..] => Message::Joined(*index),
            _ if bytes.starts_with(STATS_PREFIX) => Message::Stats(bytes.to_vec()),
            _ => Message::Unknown(bytes.to_vec()),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::Init => b"init".to_vec(),
            Message::Ack => b"ack".to_vec(),
            Message::Accepted => b"accepted".to_vec(),
            Message::Joined(index) => {
                let mut bytes = b"joined".to_vec();
                bytes.push(*index);
                bytes
            }
            Message::Left => b"left".to_vec(),
            Message::IsInitiator => b"is_initiator".to_vec(),
            Message::RoundEnd => b"round_end".to_vec(),
            Message::Stats(raw) | Message::Unknown(raw) => raw.clone(),
        }
    }
}
