//! Platoons: vehicles that cross as a unit behind one negotiating head.

use super::{StepContext, VehicleController, VehicleId, VehicleState};
use crate::geometry::VectorExt;
use crate::simulation::physics::{self, PhysicsEngine};
use std::collections::BTreeMap;

/// Extra gap, in vehicle radii, kept behind a followed vehicle.
pub(super) const FOLLOW_MARGIN: f64 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlatoonId(pub u32);

#[derive(Debug, Clone)]
pub struct Platoon {
    members: Vec<VehicleId>,
    joined: bool,
}

impl Platoon {
    pub fn members(&self) -> &[VehicleId] {
        &self.members
    }

    pub fn head(&self) -> Option<VehicleId> {
        self.members.first().copied()
    }

    pub fn tail(&self) -> Option<VehicleId> {
        self.members.last().copied()
    }

    pub fn is_head(&self, vehicle: VehicleId) -> bool {
        self.head() == Some(vehicle)
    }

    pub fn is_tail(&self, vehicle: VehicleId) -> bool {
        self.tail() == Some(vehicle)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether the head holds a place in the coordination network.
    pub fn is_joined(&self) -> bool {
        self.joined
    }
}

/// Owns every platoon. Empty platoons are dropped as soon as their last
/// member leaves.
#[derive(Debug, Clone, Default)]
pub struct Platoons {
    platoons: BTreeMap<PlatoonId, Platoon>,
    next_id: u32,
    max_size: Option<usize>,
}

impl Platoons {
    /// `max_size` of `None` lets platoons grow without bound.
    pub fn new(max_size: Option<usize>) -> Self {
        Self {
            max_size,
            ..Default::default()
        }
    }

    pub fn create(&mut self, founder: VehicleId) -> PlatoonId {
        let id = PlatoonId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.platoons.insert(
            id,
            Platoon {
                members: vec![founder],
                joined: false,
            },
        );
        id
    }

    /// # Panics
    /// If the platoon has been dropped; vehicles always point at a live one.
    pub fn get(&self, id: PlatoonId) -> &Platoon {
        &self.platoons[&id]
    }

    pub fn set_joined(&mut self, id: PlatoonId, joined: bool) {
        if let Some(p) = self.platoons.get_mut(&id) {
            p.joined = joined;
        }
    }

    pub fn has_room(&self, id: PlatoonId) -> bool {
        self.max_size.map_or(true, |max| self.get(id).len() < max)
    }

    pub fn push(&mut self, id: PlatoonId, vehicle: VehicleId) {
        if let Some(p) = self.platoons.get_mut(&id) {
            p.members.push(vehicle);
        }
    }

    /// Removes `vehicle` and reports whether it was the tail.
    pub fn remove(&mut self, id: PlatoonId, vehicle: VehicleId) -> bool {
        let Some(p) = self.platoons.get_mut(&id) else {
            return false;
        };
        let was_tail = p.is_tail(vehicle);
        p.members.retain(|&m| m != vehicle);
        if p.members.is_empty() {
            self.platoons.remove(&id);
        }
        was_tail
    }

    pub fn len(&self) -> usize {
        self.platoons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platoons.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlatoonId, &Platoon)> {
        self.platoons.iter().map(|(id, p)| (*id, p))
    }
}

impl VehicleController {
    pub(super) fn member_state(&self, ctx: &StepContext<'_>, vehicle: VehicleId) -> Option<VehicleState> {
        if vehicle == self.id {
            Some(self.state)
        } else {
            ctx.others.get(&vehicle).map(|v| v.state)
        }
    }

    pub(super) fn is_platoon_head(&self, ctx: &StepContext<'_>) -> bool {
        ctx.platoons.get(self.platoon).is_head(self.id)
    }

    fn platoon_moving(&self, ctx: &StepContext<'_>, platoon: PlatoonId) -> bool {
        ctx.platoons
            .get(platoon)
            .head()
            .and_then(|head| self.member_state(ctx, head))
            .is_some_and(|state| state > VehicleState::Waiting)
    }

    /// The own platoon has started crossing.
    pub(super) fn platoon_is_moving(&self, ctx: &StepContext<'_>) -> bool {
        self.platoon_moving(ctx, self.platoon)
    }

    /// Platoons stop accepting members once their head negotiates or drives.
    fn may_join(&self, ctx: &StepContext<'_>, platoon: PlatoonId) -> bool {
        !self.platoon_moving(ctx, platoon) && !ctx.platoons.get(platoon).is_joined() && ctx.platoons.has_room(platoon)
    }

    /// A platoon head queued behind another platoon tries to become its tail.
    pub(super) fn try_join_predecessor(&mut self, ctx: &mut StepContext<'_>) {
        if !self.is_platoon_head(ctx) {
            return;
        }
        let Some(pred) = self.predecessor else {
            return;
        };
        let Some(target) = ctx.others.get(&pred).map(|v| v.platoon) else {
            return;
        };
        if target == self.platoon || !self.may_join(ctx, target) {
            return;
        }

        ctx.platoons.remove(self.platoon, self.id);

        let Some(old_tail) = ctx.platoons.get(target).tail() else {
            return;
        };
        if let Some(tail) = ctx.others.get_mut(&old_tail) {
            tail.successor = Some(self.id);
        }
        self.predecessor = Some(old_tail);
        self.platoon = target;
        ctx.platoons.push(target, self.id);

        log::debug!("Vehicle {} joined platoon {:?} behind {}", self.id, target, old_tail);
    }

    /// Leaves the current platoon for a fresh one of its own. Returns whether
    /// it was the tail and the platoon it left.
    pub(super) fn leave_platoon(&mut self, ctx: &mut StepContext<'_>) -> (bool, PlatoonId) {
        let old = self.platoon;
        let was_tail = ctx.platoons.remove(old, self.id);
        self.platoon = ctx.platoons.create(self.id);
        (was_tail, old)
    }

    fn shares_lane(&self, other: &VehicleController) -> bool {
        self.lane == other.lane && self.target_lane == other.target_lane
    }

    /// Vehicle straight ahead within `range`, using current body positions.
    pub(super) fn sense_ahead(&self, ctx: &StepContext<'_>, range: f64) -> Option<VehicleId> {
        let bodies = ctx.others.iter().map(|(id, v)| (*id, &v.body));
        PhysicsEngine::nearest_hit(bodies, &self.body.center, &self.body.dir.normalized_or_zero(), self.id, range)
            .map(|hit| hit.vehicle)
    }

    pub(super) fn link_behind(&mut self, ctx: &mut StepContext<'_>, pred: VehicleId) {
        if let Some(p) = ctx.others.get_mut(&pred) {
            p.successor = Some(self.id);
            self.predecessor = Some(pred);
        }
    }

    pub(super) fn unlink_predecessor(&mut self, ctx: &mut StepContext<'_>) {
        if let Some(pred) = self.predecessor.take() {
            if let Some(p) = ctx.others.get_mut(&pred) {
                p.successor = None;
            }
        }
    }

    /// Keeps the ordering link to the vehicle ahead current.
    pub(super) fn update_predecessor(&mut self, ctx: &mut StepContext<'_>) {
        let radius = self.body.radius;

        if self.predecessor.is_none() {
            self.predecessor_was_moving = false;
            let range = physics::brake_distance(self.body.speed(), ctx.config.kinematics.deceleration) + FOLLOW_MARGIN * radius;

            if let Some(candidate) = self.sense_ahead(ctx, range) {
                let acceptable = ctx.others.get(&candidate).is_some_and(|c| {
                    c.state < VehicleState::Left
                        && !(self.state == VehicleState::Queuing && c.state == VehicleState::Moving)
                        && c.successor.is_none()
                        && self.shares_lane(c)
                });
                if acceptable {
                    self.link_behind(ctx, candidate);
                }
            }
        }

        let Some(pred) = self.predecessor else {
            return;
        };
        let pred_state = ctx.others.get(&pred).map(|p| p.state);

        // vehicles step one after another, so a predecessor seen moving is
        // only let go once it is still moving on the next tick
        if self.state == VehicleState::Queuing && pred_state == Some(VehicleState::Moving) {
            if self.predecessor_was_moving {
                self.unlink_predecessor(ctx);
            }
            self.predecessor_was_moving = true;
        } else {
            self.predecessor_was_moving = false;
        }

        if self.predecessor.is_some() && pred_state.map_or(true, |s| s >= VehicleState::Left) {
            self.unlink_predecessor(ctx);
        }
    }

    /// Hands the network identity of this vehicle to `to`: the controller
    /// link, its statistics, the reservation and the network token.
    pub(super) fn hand_over(&mut self, to: &mut VehicleController) {
        std::mem::swap(&mut self.channel, &mut to.channel);
        std::mem::swap(&mut self.stats, &mut to.stats);
        std::mem::swap(&mut self.reservation, &mut to.reservation);
        std::mem::swap(&mut self.network_token, &mut to.network_token);
        log::debug!("Vehicle {} handed its network role over to {}", self.id, to.id);
    }
}

#[cfg(test)]
mod tests {
    use super::super::{CrossingPolicy, RequestPhase, Reservation};
    use super::*;
    use crate::channel::memory::{self, PeerEnd};
    use crate::channel::{Command, Message};
    use crate::geometry::Vec2;
    use crate::network::TileSet;

    fn controller(id: u16, platoon: PlatoonId) -> (VehicleController, PeerEnd) {
        let (channel, peer) = memory::pair();
        let v = VehicleController::new(VehicleId(id), Vec2::zeros(), Box::new(channel), CrossingPolicy::Reservation, platoon, 1.0);
        (v, peer)
    }

    #[test]
    fn test_members_keep_order() {
        let mut platoons = Platoons::new(None);
        let id = platoons.create(VehicleId(4));
        platoons.push(id, VehicleId(9));
        platoons.push(id, VehicleId(2));

        let p = platoons.get(id);
        assert_eq!(p.head(), Some(VehicleId(4)));
        assert_eq!(p.tail(), Some(VehicleId(2)));
        assert_eq!(p.members(), &[VehicleId(4), VehicleId(9), VehicleId(2)]);
        assert!(!p.is_joined());
    }

    #[test]
    fn test_removal_reports_tail_and_drops_empty() {
        let mut platoons = Platoons::new(None);
        let id = platoons.create(VehicleId(1));
        platoons.push(id, VehicleId(2));

        assert!(!platoons.remove(id, VehicleId(1)));
        assert!(platoons.get(id).is_head(VehicleId(2)));
        assert!(platoons.remove(id, VehicleId(2)));
        assert!(platoons.is_empty());
    }

    #[test]
    fn test_capacity() {
        let mut platoons = Platoons::new(Some(2));
        let id = platoons.create(VehicleId(1));
        assert!(platoons.has_room(id));
        platoons.push(id, VehicleId(2));
        assert!(!platoons.has_room(id));

        let mut unbounded = Platoons::new(None);
        let id = unbounded.create(VehicleId(1));
        for v in 2..50 {
            unbounded.push(id, VehicleId(v));
        }
        assert!(unbounded.has_room(id));
    }

    #[test]
    fn test_joined_flag() {
        let mut platoons = Platoons::new(None);
        let id = platoons.create(VehicleId(1));
        platoons.set_joined(id, true);
        assert!(platoons.get(id).is_joined());
    }

    #[test]
    fn test_hand_over_moves_network_identity() {
        let mut platoons = Platoons::new(None);
        let platoon = platoons.create(VehicleId(1));
        platoons.push(platoon, VehicleId(2));
        let (mut head, mut head_peer) = controller(1, platoon);
        let (mut next, mut next_peer) = controller(2, platoon);

        head.network_token = Some(3);
        head.reservation.set_wanted(TileSet::from_bytes(&[4, 5, 10]));
        assert!(head.reservation.update(head.channel.as_mut()));
        head.reservation.on_message(&Message::Ack);
        assert_eq!(head.reservation().phase(), RequestPhase::Acknowledged);
        assert!(!head.reservation().held().is_empty());
        let before = head.reservation().clone();
        assert!(head_peer.try_receive().is_some());

        head.hand_over(&mut next);

        assert_eq!(next.reservation(), &before);
        assert_eq!(next.network_token(), Some(3));
        assert_eq!(head.reservation(), &Reservation::default());
        assert_eq!(head.network_token(), None);

        // the controller link goes along with the role
        next.channel.send(&Command::Leave.encode());
        assert_eq!(head_peer.try_receive(), Some(Command::Leave.encode()));
        assert_eq!(next_peer.try_receive(), None);
    }
}
