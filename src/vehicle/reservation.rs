//! Tile reservation handshake, run by whichever vehicle speaks for a platoon.

use super::{StepContext, VehicleController};
use crate::channel::{Command, Message, MessageChannel};
use crate::network::TileSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestPhase {
    Init,
    Sent,
    Acknowledged,
    Accepted,
}

/// `wanted` is what the vehicle needs right now, `held` what it last asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    phase: RequestPhase,
    wanted: TileSet,
    held: TileSet,
}

impl Default for Reservation {
    fn default() -> Self {
        Self {
            phase: RequestPhase::Init,
            wanted: TileSet::default(),
            held: TileSet::default(),
        }
    }
}

impl Reservation {
    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    pub fn wanted(&self) -> &TileSet {
        &self.wanted
    }

    pub fn held(&self) -> &TileSet {
        &self.held
    }

    pub fn is_accepted(&self) -> bool {
        self.phase == RequestPhase::Accepted
    }

    /// Replaces the wanted set. An accepted reservation that no longer covers
    /// what is wanted has to be negotiated again.
    pub fn set_wanted(&mut self, wanted: TileSet) {
        if wanted != self.held && self.phase == RequestPhase::Accepted {
            self.phase = RequestPhase::Init;
        }
        self.wanted = wanted;
    }

    /// Sends the wanted set unless a request is still unanswered.
    /// Returns whether a request went out.
    pub fn update(&mut self, channel: &mut dyn MessageChannel) -> bool {
        if self.wanted == self.held || self.phase == RequestPhase::Sent {
            return false;
        }
        self.held = self.wanted.clone();
        channel.send(&Command::Reserve(self.held.clone()).encode());
        self.phase = RequestPhase::Sent;
        true
    }

    pub fn on_message(&mut self, message: &Message) {
        match (self.phase, message) {
            (RequestPhase::Sent, Message::Ack) => self.phase = RequestPhase::Acknowledged,
            (RequestPhase::Acknowledged, Message::Accepted) => {
                // the request may have been superseded while the ack was in flight
                self.phase = if self.wanted == self.held {
                    RequestPhase::Accepted
                } else {
                    RequestPhase::Init
                };
            }
            _ => {}
        }
    }
}

impl VehicleController {
    /// Recomputes the tiles the whole platoon still needs at the current
    /// intersection. Only the member holding the network token negotiates.
    pub(super) fn request_reservation(&mut self, ctx: &StepContext<'_>) {
        if self.network_token.is_none() {
            return;
        }
        let Some(intersection) = self.intersection else {
            return;
        };

        let grid = ctx.network.intersection(intersection).tiles();
        let mut wanted = TileSet::default();
        for member in ctx.platoons.get(self.platoon).members() {
            let vehicle = if *member == self.id {
                &*self
            } else if let Some(other) = ctx.others.get(member) {
                other
            } else {
                continue;
            };
            wanted.extend(&grid.tiles_for(vehicle.remaining_waypoints_with_previous()));
        }

        if wanted != *self.reservation.wanted() {
            log::debug!("Vehicle {} wants tiles {:?}", self.id, wanted.to_bytes());
        }
        self.reservation.set_wanted(wanted);
    }

    pub(super) fn update_reservation(&mut self) {
        if self.reservation.update(self.channel.as_mut()) {
            log::debug!("Vehicle {} requested {} tiles", self.id, self.reservation.held().len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<Vec<u8>>);

    impl MessageChannel for Recorder {
        fn send(&mut self, bytes: &[u8]) {
            self.0.push(bytes.to_vec());
        }

        fn try_receive(&mut self) -> Option<Vec<u8>> {
            None
        }
    }

    fn tiles(bytes: &[u8]) -> TileSet {
        TileSet::from_bytes(bytes)
    }

    #[test]
    fn test_handshake_reaches_accepted() {
        let mut r = Reservation::default();
        let mut channel = Recorder::default();

        r.set_wanted(tiles(&[3, 1]));
        assert!(r.update(&mut channel));
        assert_eq!(channel.0, vec![vec![b'R', 1, 3]]);
        assert_eq!(r.phase(), RequestPhase::Sent);

        // accepted before ack is ignored
        r.on_message(&Message::Accepted);
        assert_eq!(r.phase(), RequestPhase::Sent);

        r.on_message(&Message::Ack);
        r.on_message(&Message::Accepted);
        assert!(r.is_accepted());
        assert_eq!(r.held(), &tiles(&[1, 3]));
    }

    #[test]
    fn test_no_resend_while_sent() {
        let mut r = Reservation::default();
        let mut channel = Recorder::default();
        r.set_wanted(tiles(&[1]));
        r.update(&mut channel);
        r.set_wanted(tiles(&[1, 2]));
        assert!(!r.update(&mut channel));
        assert_eq!(channel.0.len(), 1);

        r.on_message(&Message::Ack);
        assert!(r.update(&mut channel));
        assert_eq!(channel.0.last(), Some(&vec![b'R', 1, 2]));
    }

    #[test]
    fn test_stale_accept_is_rejected() {
        let mut r = Reservation::default();
        let mut channel = Recorder::default();
        r.set_wanted(tiles(&[1, 2, 3]));
        r.update(&mut channel);
        r.on_message(&Message::Ack);

        // the vehicle moved on while the ack was in flight
        r.set_wanted(tiles(&[2, 3]));
        r.on_message(&Message::Accepted);
        assert_eq!(r.phase(), RequestPhase::Init);

        assert!(r.update(&mut channel));
        assert_eq!(r.held(), &tiles(&[2, 3]));
    }

    #[test]
    fn test_shrinking_accepted_reservation_renegotiates() {
        let mut r = Reservation::default();
        let mut channel = Recorder::default();
        r.set_wanted(tiles(&[4, 5]));
        r.update(&mut channel);
        r.on_message(&Message::Ack);
        r.on_message(&Message::Accepted);

        r.set_wanted(tiles(&[4, 5]));
        assert!(r.is_accepted());

        r.set_wanted(tiles(&[5]));
        assert_eq!(r.phase(), RequestPhase::Init);
        assert!(r.update(&mut channel));
    }
}
