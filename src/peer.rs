//! In-process stand-in for the radio controllers. Every vehicle gets its own
//! memory link; links tuned to the same intersection channel form one
//! coordination network that grants tile reservations first come, first
//! served.

use crate::channel::{memory, ChannelProvider, Command, Message, MessageChannel, PeerEnd};
use crate::network::TileSet;
use crate::vehicle::VehicleId;

/// Traffic seen by the coordinator, for inspection in tests and tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Received(VehicleId, Command),
    Sent(VehicleId, Message),
}

#[derive(Debug)]
struct PeerLink {
    /// Vehicle the link was opened for. The link may change hands later.
    owner: VehicleId,
    end: PeerEnd,
    channel: Option<u8>,
    node: Option<u8>,
    accepted: TileSet,
    pending: Option<TileSet>,
}

impl PeerLink {
    fn reset_membership(&mut self) {
        self.node = None;
        self.accepted = TileSet::default();
        self.pending = None;
    }
}

#[derive(Debug, Default)]
pub struct CoordinatorPeer {
    links: Vec<PeerLink>,
    events: Option<Vec<PeerEvent>>,
}

impl CoordinatorPeer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps a log of every command and reply.
    pub fn recording() -> Self {
        Self {
            events: Some(Vec::new()),
            ..Default::default()
        }
    }

    pub fn events(&self) -> &[PeerEvent] {
        self.events.as_deref().unwrap_or_default()
    }

    /// Commands received on the link opened for `vehicle`, oldest first.
    pub fn commands_from(&self, vehicle: VehicleId) -> Vec<Command> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                PeerEvent::Received(v, c) if *v == vehicle => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    /// Tiles currently granted on `channel`, per link owner.
    pub fn accepted_on(&self, channel: u8) -> Vec<(VehicleId, &TileSet)> {
        self.links
            .iter()
            .filter(|l| l.channel == Some(channel) && !l.accepted.is_empty())
            .map(|l| (l.owner, &l.accepted))
            .collect()
    }

    pub fn open_links(&self) -> usize {
        self.links.len()
    }

    fn send(&mut self, index: usize, message: Message) {
        let link = &mut self.links[index];
        link.end.send(&message.encode());
        if let Some(events) = self.events.as_mut() {
            events.push(PeerEvent::Sent(link.owner, message));
        }
    }

    fn handle(&mut self, index: usize, command: Command) {
        if let Some(events) = self.events.as_mut() {
            events.push(PeerEvent::Received(self.links[index].owner, command.clone()));
        }

        match command {
            Command::ChannelSwitch(channel) => {
                let link = &mut self.links[index];
                if link.channel != Some(channel) {
                    link.reset_membership();
                    link.channel = Some(channel);
                }
            }
            Command::Initiate => self.send(index, Message::IsInitiator),
            Command::Join => {
                let node = match self.links[index].node {
                    Some(node) => node,
                    None => {
                        let node = self.free_node(self.links[index].channel);
                        self.links[index].node = Some(node);
                        node
                    }
                };
                self.send(index, Message::Joined(node));
            }
            Command::Reserve(tiles) => {
                self.send(index, Message::Ack);
                let link = &mut self.links[index];
                if link.node.is_some() {
                    link.pending = Some(tiles);
                } else {
                    log::debug!("Reservation from {} outside the network ignored", link.owner);
                }
            }
            Command::Leave => {
                self.links[index].reset_membership();
                self.send(index, Message::Left);
            }
        }
    }

    /// Lowest node index not taken on `channel`.
    fn free_node(&self, channel: Option<u8>) -> u8 {
        let taken: Vec<u8> = self
            .links
            .iter()
            .filter(|l| l.channel == channel)
            .filter_map(|l| l.node)
            .collect();
        (0..=u8::MAX).find(|n| !taken.contains(n)).unwrap_or(u8::MAX)
    }

    /// Grants every pending request that does not overlap tiles held by
    /// another link on the same channel. A link keeps its old grant until
    /// the new one goes through.
    fn grant_pending(&mut self) {
        for i in 0..self.links.len() {
            let Some(wanted) = self.links[i].pending.clone() else {
                continue;
            };
            let channel = self.links[i].channel;
            let free = self
                .links
                .iter()
                .enumerate()
                .filter(|(j, l)| *j != i && l.channel == channel)
                .all(|(_, l)| l.accepted.is_disjoint(&wanted));

            if free {
                let link = &mut self.links[i];
                link.accepted = wanted;
                link.pending = None;
                self.send(i, Message::Accepted);
            }
        }
    }
}

impl ChannelProvider for CoordinatorPeer {
    fn open(&mut self, vehicle: VehicleId) -> Box<dyn MessageChannel> {
        let (channel, mut end) = memory::pair();
        end.log_line(&format!("node {} booting", vehicle));
        self.links.push(PeerLink {
            owner: vehicle,
            end,
            channel: None,
            node: None,
            accepted: TileSet::default(),
            pending: None,
        });
        let index = self.links.len() - 1;
        self.send(index, Message::Init);
        Box::new(channel)
    }

    fn poll(&mut self, _now_ms: u64) {
        for i in 0..self.links.len() {
            while let Some(frame) = self.links[i].end.try_receive() {
                match Command::parse(&frame) {
                    Ok(command) => self.handle(i, command),
                    Err(e) => log::warn!("Dropping frame from {}: {}", self.links[i].owner, e),
                }
            }
        }

        let before = self.links.len();
        self.links.retain(|l| l.end.is_open());
        if self.links.len() != before {
            log::trace!("{} controller links closed", before - self.links.len());
        }

        self.grant_pending();
    }
}
