//! Per-vehicle controllers. Every vehicle runs a crossing state machine
//! against the road network and talks to its own controller peer over a
//! [`MessageChannel`].

use crate::channel::{Command, Message, MessageChannel};
use crate::config::{IntersectionType, VehiclesConfig};
use crate::geometry::{self, Vec2};
use crate::network::{IntersectionId, LaneId, RoadNetwork, Turn, STEPS_INTO_LANE};
use crate::simulation::physics::{self, LineHit, VehicleBody};
use crate::simulation::traffic;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::fmt;

pub mod platoon;
pub mod reservation;
pub mod stats;
mod traffic_light;

pub use platoon::{Platoon, PlatoonId, Platoons};
pub use reservation::{RequestPhase, Reservation};
pub use stats::{StatsHandler, StatsSlot};

/// Where retired bodies are put, far outside any network.
pub const PARKED_COORD: f64 = -1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VehicleId(pub u16);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Crossing progress. The order is meaningful: later states compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VehicleState {
    Init,
    Initialized,
    Queuing,
    Waiting,
    Moving,
    Leaving,
    Left,
    Finished,
}

/// How a vehicle earns the right to cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingPolicy {
    /// Negotiate intersection tiles over the coordination network.
    Reservation,
    /// Follow the fixed light cycle.
    TrafficLight,
}

impl From<IntersectionType> for CrossingPolicy {
    fn from(t: IntersectionType) -> Self {
        match t {
            IntersectionType::Reservation => CrossingPolicy::Reservation,
            IntersectionType::TrafficLight => CrossingPolicy::TrafficLight,
        }
    }
}

/// Everything a vehicle may touch while it steps. The stepping vehicle
/// itself is not part of `others`.
pub struct StepContext<'a> {
    pub now_ms: u64,
    /// Seconds.
    pub dt: f64,
    pub network: &'a mut RoadNetwork,
    pub others: &'a mut BTreeMap<VehicleId, VehicleController>,
    pub platoons: &'a mut Platoons,
    pub rng: &'a mut StdRng,
    pub config: &'a VehiclesConfig,
}

impl StepContext<'_> {
    fn tile_size(&self) -> f64 {
        self.network.tile_size()
    }
}

pub struct VehicleController {
    id: VehicleId,
    state: VehicleState,
    policy: CrossingPolicy,
    body: VehicleBody,
    channel: Box<dyn MessageChannel>,
    stats: StatsHandler,

    lane: Option<LaneId>,
    target_lane: Option<LaneId>,
    intersection: Option<IntersectionId>,
    stop_pos: Vec2,
    waypoints: Vec<Vec2>,
    cursor: usize,

    predecessor: Option<VehicleId>,
    successor: Option<VehicleId>,
    predecessor_was_moving: bool,
    platoon: PlatoonId,

    reservation: Reservation,
    /// Node index in the intersection's coordination network.
    network_token: Option<u8>,

    sensor: Option<LineHit>,
    drive_through: bool,
    /// Set for one tick after this vehicle gave its controller link away.
    handed_over_to: Option<VehicleId>,
}

impl fmt::Debug for VehicleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VehicleController")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("policy", &self.policy)
            .field("center", &self.body.center)
            .field("lane", &self.lane)
            .field("target_lane", &self.target_lane)
            .field("cursor", &self.cursor)
            .field("predecessor", &self.predecessor)
            .field("successor", &self.successor)
            .field("platoon", &self.platoon)
            .field("network_token", &self.network_token)
            .finish_non_exhaustive()
    }
}

impl VehicleController {
    /// A vehicle waiting at `position` for its controller to come up.
    pub fn new(
        id: VehicleId,
        position: Vec2,
        channel: Box<dyn MessageChannel>,
        policy: CrossingPolicy,
        platoon: PlatoonId,
        radius: f64,
    ) -> Self {
        Self {
            id,
            state: VehicleState::Init,
            policy,
            body: VehicleBody::new(position, radius),
            channel,
            stats: StatsHandler::new(id.0),
            lane: None,
            target_lane: None,
            intersection: None,
            stop_pos: position,
            waypoints: Vec::new(),
            cursor: 0,
            predecessor: None,
            successor: None,
            predecessor_was_moving: false,
            platoon,
            reservation: Reservation::default(),
            network_token: None,
            sensor: None,
            drive_through: false,
            handed_over_to: None,
        }
    }

    pub fn id(&self) -> VehicleId {
        self.id
    }

    pub fn state(&self) -> VehicleState {
        self.state
    }

    pub fn policy(&self) -> CrossingPolicy {
        self.policy
    }

    pub fn body(&self) -> &VehicleBody {
        &self.body
    }

    pub(crate) fn body_mut(&mut self) -> &mut VehicleBody {
        &mut self.body
    }

    pub fn lane(&self) -> Option<LaneId> {
        self.lane
    }

    pub fn target_lane(&self) -> Option<LaneId> {
        self.target_lane
    }

    pub fn intersection(&self) -> Option<IntersectionId> {
        self.intersection
    }

    pub fn stop_position(&self) -> Vec2 {
        self.stop_pos
    }

    pub fn waypoints(&self) -> &[Vec2] {
        &self.waypoints
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn predecessor(&self) -> Option<VehicleId> {
        self.predecessor
    }

    pub fn successor(&self) -> Option<VehicleId> {
        self.successor
    }

    pub fn platoon(&self) -> PlatoonId {
        self.platoon
    }

    pub fn reservation(&self) -> &Reservation {
        &self.reservation
    }

    pub fn network_token(&self) -> Option<u8> {
        self.network_token
    }

    pub fn stats(&self) -> &StatsHandler {
        &self.stats
    }

    pub fn sensor(&self) -> Option<LineHit> {
        self.sensor
    }

    pub(crate) fn set_sensor(&mut self, reading: Option<LineHit>) {
        self.sensor = reading;
    }

    /// The vehicle that took over this one's controller link during the
    /// last step, if any.
    pub(crate) fn take_handover(&mut self) -> Option<VehicleId> {
        self.handed_over_to.take()
    }

    /// Waypoints from the one last passed onwards.
    pub fn remaining_waypoints_with_previous(&self) -> &[Vec2] {
        let from = self.cursor.saturating_sub(1).min(self.waypoints.len());
        &self.waypoints[from..]
    }

    pub fn step(&mut self, ctx: &mut StepContext<'_>) {
        match self.policy {
            CrossingPolicy::Reservation => self.step_reservation(ctx),
            CrossingPolicy::TrafficLight => self.step_traffic_light(ctx),
        }
    }

    fn step_reservation(&mut self, ctx: &mut StepContext<'_>) {
        while let Some(bytes) = self.channel.try_receive() {
            self.handle_message(ctx, Message::parse(&bytes));
        }

        if self.state == VehicleState::Waiting {
            self.claim_initiator(ctx);
        }

        self.state = self.next_state(ctx);
        self.move_body(ctx, platoon::FOLLOW_MARGIN);
        self.update_reservation();
    }

    fn handle_message(&mut self, ctx: &mut StepContext<'_>, message: Message) {
        match &message {
            Message::Stats(raw) => self.handle_stats(raw),
            Message::IsInitiator => {
                if let Some(i) = self.intersection {
                    ctx.network.intersection_mut(i).set_last_initiator_ms(ctx.now_ms);
                }
            }
            Message::Init if self.state == VehicleState::Init => {
                self.init(ctx);
                self.state = VehicleState::Initialized;
            }
            Message::Left if self.state == VehicleState::Leaving => {
                self.state = VehicleState::Left;
                ctx.platoons.set_joined(self.platoon, false);
                self.reservation = Reservation::default();
                self.network_token = None;
                self.prepare_removal(ctx);
            }
            Message::Joined(index) if self.state == VehicleState::Waiting => {
                log::debug!("Vehicle {} joined the network as node {}", self.id, index);
                self.network_token = Some(*index);
                ctx.platoons.set_joined(self.platoon, true);
            }
            Message::RoundEnd if self.state == VehicleState::Left && self.target_is_exit(ctx) => {
                self.state = VehicleState::Finished;
            }
            Message::Unknown(raw) => {
                log::trace!("Vehicle {} ignored message {:?}", self.id, String::from_utf8_lossy(raw));
            }
            _ => {}
        }

        self.reservation.on_message(&message);
    }

    pub(super) fn handle_stats(&mut self, raw: &[u8]) {
        if let Err(e) = self.stats.handle(raw) {
            log::warn!("Vehicle {} got a malformed stats report: {}", self.id, e);
        }
    }

    /// Starts a new coordination round when the intersection has been quiet
    /// for longer than the initiator timeout.
    fn claim_initiator(&mut self, ctx: &mut StepContext<'_>) {
        let Some(id) = self.intersection else {
            return;
        };
        let intersection = ctx.network.intersection_mut(id);
        if intersection.last_initiator_ms() + ctx.config.initiator_timeout_ms > ctx.now_ms {
            return;
        }

        self.channel.send(&Command::ChannelSwitch(intersection.channel()).encode());
        self.channel.send(&Command::Initiate.encode());
        intersection.set_last_initiator_ms(ctx.now_ms);
        log::info!("Vehicle {} is initiating at intersection {}", self.id, id.0);
    }

    fn switch_channel(&mut self, ctx: &StepContext<'_>) {
        if let Some(i) = self.intersection {
            let channel = ctx.network.intersection(i).channel();
            self.channel.send(&Command::ChannelSwitch(channel).encode());
        }
    }

    fn next_state(&mut self, ctx: &mut StepContext<'_>) -> VehicleState {
        match self.state {
            VehicleState::Init => VehicleState::Init,
            VehicleState::Initialized => {
                self.switch_channel(ctx);
                VehicleState::Queuing
            }
            VehicleState::Queuing => {
                self.update_predecessor(ctx);
                self.try_join_predecessor(ctx);

                if self.platoon_is_moving(ctx) {
                    return VehicleState::Moving;
                }

                // only heads speak for their platoon
                let at_stop_line = geometry::distance(&self.stop_pos, &self.body.center) < 0.2 * ctx.tile_size();
                if self.is_platoon_head(ctx) && at_stop_line {
                    self.channel.send(&Command::Join.encode());
                    VehicleState::Waiting
                } else {
                    VehicleState::Queuing
                }
            }
            VehicleState::Waiting => {
                if self.network_token.is_some() && self.reservation.phase() == RequestPhase::Init {
                    self.request_reservation(ctx);
                }

                if self.reservation.is_accepted() {
                    VehicleState::Moving
                } else {
                    VehicleState::Waiting
                }
            }
            VehicleState::Moving => {
                self.update_predecessor(ctx);
                // release tiles already crossed
                self.request_reservation(ctx);

                if self.cursor + STEPS_INTO_LANE > self.waypoints.len() {
                    self.leave_intersection(ctx)
                } else {
                    VehicleState::Moving
                }
            }
            VehicleState::Leaving => VehicleState::Leaving,
            VehicleState::Left => {
                let route_done = self.cursor >= self.waypoints.len() || !self.body.registered;
                if !route_done {
                    VehicleState::Left
                } else if self.target_is_exit(ctx) {
                    self.prepare_removal(ctx);
                    VehicleState::Finished
                } else {
                    self.continue_on_target(ctx);
                    self.switch_channel(ctx);
                    VehicleState::Queuing
                }
            }
            VehicleState::Finished => VehicleState::Finished,
        }
    }

    /// Past the intersection: the tail of a platoon leaves the network,
    /// any other member holding the token hands it to the next in line.
    fn leave_intersection(&mut self, ctx: &mut StepContext<'_>) -> VehicleState {
        let (was_tail, old_platoon) = self.leave_platoon(ctx);

        if self.network_token.is_none() {
            return VehicleState::Left;
        }

        if was_tail {
            self.channel.send(&Command::Leave.encode());
            return VehicleState::Leaving;
        }

        if let Some(new_head) = ctx.platoons.get(old_platoon).head() {
            if let Some(next) = ctx.others.get_mut(&new_head) {
                self.hand_over(next);
                self.handed_over_to = Some(new_head);
                if next.state >= VehicleState::Moving {
                    next.state = VehicleState::Moving;
                }
            }
        }
        self.prepare_removal(ctx);
        VehicleState::Left
    }

    fn target_is_exit(&self, ctx: &StepContext<'_>) -> bool {
        self.target_lane.map_or(true, |t| ctx.network.lane(t).is_exit())
    }

    /// Takes the body out of the world once the vehicle is about to leave
    /// the network for good.
    fn prepare_removal(&mut self, ctx: &StepContext<'_>) {
        if !self.target_is_exit(ctx) {
            return;
        }
        self.body.registered = false;
        self.body.center = Vec2::repeat(PARKED_COORD);
        self.body.vel = Vec2::zeros();
    }

    /// Places the vehicle on its entry lane. A spawn position on an entry
    /// lane's approach is kept, anything else gets a free queue slot.
    fn init(&mut self, ctx: &mut StepContext<'_>) {
        let (lane, position, turn) = match ctx.network.entry_lane_at(&self.body.center) {
            Some(lane) => (lane, self.body.center, None),
            None => {
                let bodies = ctx.others.values().map(|v| (v.id, &v.body));
                let (lane, position, turn) = traffic::free_position(&*ctx.network, bodies, &mut *ctx.rng, ctx.config);
                (lane, position, Some(turn))
            }
        };

        self.body.center = position;
        self.body.dir = ctx.network.lane(lane).direction_vector();
        self.body.vel = Vec2::zeros();
        self.body.registered = true;
        self.init_lane(ctx, lane, turn);
        log::debug!("Vehicle {} entered on lane {:?}", self.id, lane);
    }

    fn continue_on_target(&mut self, ctx: &mut StepContext<'_>) {
        if let Some(target) = self.target_lane {
            self.init_lane(ctx, target, None);
        }
    }

    /// Picks a target lane behind the intersection `lane` feeds and plans
    /// the path into it.
    fn init_lane(&mut self, ctx: &mut StepContext<'_>, lane: LaneId, turn: Option<Turn>) {
        let turn = turn.unwrap_or_else(|| traffic::draw_turn(&mut *ctx.rng, ctx.config));
        let mut candidates = ctx.network.lanes_with_turn(lane, turn);
        if candidates.is_empty() {
            candidates = ctx.network.lanes_with_turn(lane, Turn::Straight);
        }
        if candidates.is_empty() {
            candidates = ctx.network.possible_lanes(lane);
        }

        let from = ctx.network.lane(lane);
        self.lane = Some(lane);
        self.intersection = from.end.map(|e| e.intersection);
        self.stop_pos = from.end_pos;
        self.cursor = 0;
        self.reservation = Reservation::default();
        self.network_token = None;
        self.drive_through = false;

        match candidates.choose(&mut *ctx.rng).copied() {
            Some(target) => {
                self.target_lane = Some(target);
                self.waypoints = ctx.network.waypoints(lane, target);
                if self.policy == CrossingPolicy::TrafficLight {
                    self.waypoints.push(ctx.network.lane(target).end_pos);
                }
            }
            None => {
                log::warn!("Vehicle {} found no way on from lane {:?}", self.id, lane);
                self.target_lane = None;
                self.waypoints.clear();
            }
        }
    }

    fn update_waypoints(&mut self, tile_size: f64) {
        if let Some(wp) = self.waypoints.get(self.cursor) {
            if geometry::distance(wp, &self.body.center) < 0.5 * tile_size {
                self.cursor += 1;
            }
        }
    }

    /// The current waypoint, or a later one if every waypoint in between
    /// lies on the straight line towards it.
    fn next_waypoint(&self, tile_size: f64) -> Option<Vec2> {
        let current = *self.waypoints.get(self.cursor)?;
        let towards = current - self.body.center;
        if towards.magnitude() == 0.0 {
            return Some(current);
        }

        let dir = towards.normalize();
        let threshold = 0.1 * tile_size;
        let mut next = current;
        for wp in &self.waypoints[self.cursor + 1..] {
            let on_line = geometry::closest_point_on_line(&self.body.center, &dir, wp);
            if geometry::distance(&on_line, wp) < threshold {
                next = *wp;
            } else {
                break;
            }
        }
        Some(next)
    }

    /// Picks where to go this tick and how hard to brake, then drives.
    /// `follow_margin` is the gap to a followed vehicle in radii.
    fn move_body(&mut self, ctx: &StepContext<'_>, follow_margin: f64) {
        if !self.body.registered {
            return;
        }
        let tile_size = ctx.tile_size();
        let limits = &ctx.config.kinematics;
        let radius = self.body.radius;

        let wanted_pos = match self.state {
            VehicleState::Queuing => Some(self.stop_pos),
            VehicleState::Moving | VehicleState::Leaving | VehicleState::Left => {
                self.update_waypoints(tile_size);
                self.next_waypoint(tile_size)
            }
            _ => None,
        };

        let mut max_brake = wanted_pos.map_or(0.0, |p| geometry::distance(&p, &self.body.center));

        // inside the intersection the reservation keeps others out of the way
        if let Some(hit) = self.sensor {
            if self.state != VehicleState::Moving || self.cursor + STEPS_INTO_LANE >= self.waypoints.len() {
                max_brake = (hit.distance - follow_margin * radius).min(max_brake).max(0.0);
            }
        }

        if let Some(pred) = self.predecessor.and_then(|p| ctx.others.get(&p)) {
            let gap = physics::brake_distance(pred.body.speed(), limits.deceleration)
                + geometry::distance(&pred.body.center, &self.body.center)
                - follow_margin * radius;
            max_brake = max_brake.min(gap.max(0.0));
        }

        physics::drive(&mut self.body, limits, ctx.dt, wanted_pos, Some(max_brake));
    }

    /// Removes every link other vehicles and platoons hold to this one.
    pub(crate) fn detach(&self, others: &mut BTreeMap<VehicleId, VehicleController>, platoons: &mut Platoons) {
        if let Some(s) = self.successor.and_then(|s| others.get_mut(&s)) {
            s.predecessor = None;
        }
        if let Some(p) = self.predecessor.and_then(|p| others.get_mut(&p)) {
            p.successor = None;
        }
        platoons.remove(self.platoon, self.id);
    }

    /// Per-tick state and speed events.
    pub fn log_events(&self, now_ms: u64) {
        log::debug!(target: "vanet::event", "{} {:06} state {:?}", now_ms, self.id.0, self.state);
        log::debug!(target: "vanet::event", "{} {:06} speed {:.3}", now_ms, self.id.0, self.body.speed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::memory::{self, PeerEnd};
    use crate::config::NetworkConfig;
    use rand::SeedableRng;

    struct Fixture {
        network: RoadNetwork,
        others: BTreeMap<VehicleId, VehicleController>,
        platoons: Platoons,
        rng: StdRng,
        config: VehiclesConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                network: RoadNetwork::new(&NetworkConfig {
                    restricted_directions: true,
                    ..Default::default()
                }),
                others: BTreeMap::new(),
                platoons: Platoons::new(Some(4)),
                rng: StdRng::seed_from_u64(3),
                config: VehiclesConfig::default(),
            }
        }

        fn vehicle(&mut self, id: u16, position: Vec2) -> (VehicleController, PeerEnd) {
            let (channel, peer) = memory::pair();
            let vid = VehicleId(id);
            let platoon = self.platoons.create(vid);
            let v = VehicleController::new(vid, position, Box::new(channel), CrossingPolicy::Reservation, platoon, 1.0);
            (v, peer)
        }

        fn step(&mut self, v: &mut VehicleController, now_ms: u64) {
            let mut ctx = StepContext {
                now_ms,
                dt: 0.02,
                network: &mut self.network,
                others: &mut self.others,
                platoons: &mut self.platoons,
                rng: &mut self.rng,
                config: &self.config,
            };
            v.step(&mut ctx);
        }
    }

    fn drain(peer: &mut PeerEnd) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| peer.try_receive()).collect()
    }

    #[test]
    fn test_states_are_ordered() {
        assert!(VehicleState::Init < VehicleState::Queuing);
        assert!(VehicleState::Waiting < VehicleState::Moving);
        assert!(VehicleState::Left < VehicleState::Finished);
    }

    #[test]
    fn test_stays_in_init_until_told() {
        let mut f = Fixture::new();
        let (mut v, mut peer) = f.vehicle(1, Vec2::repeat(PARKED_COORD));
        for tick in 0..10 {
            f.step(&mut v, tick * 20);
        }
        assert_eq!(v.state(), VehicleState::Init);
        assert!(!v.body().registered);
        assert!(drain(&mut peer).is_empty());
    }

    #[test]
    fn test_init_switches_to_intersection_channel() {
        let mut f = Fixture::new();
        let lane = f.network.entry_lanes().next().unwrap().id;
        let start = f.network.lane(lane).end_pos - f.network.lane(lane).direction_vector() * 20.0;
        let (mut v, mut peer) = f.vehicle(1, start);

        peer.send(&Message::Init.encode());
        f.step(&mut v, 0);
        assert_eq!(v.state(), VehicleState::Queuing);
        assert_eq!(v.lane(), Some(lane));
        assert!(v.body().registered);
        assert!(geometry::approx_eq(&v.body().center, &start, 1.0));
        assert_eq!(drain(&mut peer), vec![Command::ChannelSwitch(11).encode()]);
    }

    #[test]
    fn test_parked_spawn_gets_free_position() {
        let mut f = Fixture::new();
        let (mut v, mut peer) = f.vehicle(1, Vec2::repeat(PARKED_COORD));
        peer.send(&Message::Init.encode());
        f.step(&mut v, 0);
        let lane = v.lane().unwrap();
        assert!(f.network.lane(lane).is_entry());
        assert_eq!(f.network.entry_lane_at(&v.body().center), Some(lane));
    }

    #[test]
    fn test_joins_at_stop_line() {
        let mut f = Fixture::new();
        let lane = f.network.entry_lanes().next().unwrap().id;
        let start = f.network.lane(lane).end_pos - f.network.lane(lane).direction_vector() * 0.3;
        let (mut v, mut peer) = f.vehicle(1, start);

        peer.send(&Message::Init.encode());
        f.step(&mut v, 0);
        f.step(&mut v, 20);
        assert_eq!(v.state(), VehicleState::Waiting);
        let sent = drain(&mut peer);
        assert_eq!(sent.last(), Some(&Command::Join.encode()));

        peer.send(&Message::Joined(2).encode());
        f.step(&mut v, 40);
        assert_eq!(v.network_token(), Some(2));
        assert!(f.platoons.get(v.platoon()).is_joined());
        assert_eq!(v.reservation().phase(), RequestPhase::Sent);
        let sent = drain(&mut peer);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][0], b'R');
        assert!(sent[0].len() > 1);

        peer.send(&Message::Ack.encode());
        peer.send(&Message::Accepted.encode());
        f.step(&mut v, 60);
        assert_eq!(v.state(), VehicleState::Moving);
    }

    #[test]
    fn test_recomputing_unchanged_route_keeps_tiles() {
        let mut f = Fixture::new();
        let (stop, dir) = {
            let lane = f.network.entry_lanes().next().unwrap();
            (lane.end_pos, lane.direction_vector())
        };
        let (mut v, mut peer) = f.vehicle(1, stop - dir * 0.3);

        peer.send(&Message::Init.encode());
        f.step(&mut v, 0);
        f.step(&mut v, 20);
        peer.send(&Message::Joined(0).encode());
        f.step(&mut v, 40);
        let first = v.reservation().wanted().clone();
        assert!(!first.is_empty());

        let ctx = StepContext {
            now_ms: 60,
            dt: 0.02,
            network: &mut f.network,
            others: &mut f.others,
            platoons: &mut f.platoons,
            rng: &mut f.rng,
            config: &f.config,
        };
        v.request_reservation(&ctx);
        v.request_reservation(&ctx);
        assert_eq!(v.reservation().wanted(), &first);
        assert_eq!(v.reservation().phase(), RequestPhase::Sent);
    }

    #[test]
    fn test_waiting_vehicle_claims_initiator_after_timeout() {
        let mut f = Fixture::new();
        let lane = f.network.entry_lanes().next().unwrap().id;
        let start = f.network.lane(lane).end_pos;
        let (mut v, mut peer) = f.vehicle(1, start);

        peer.send(&Message::Init.encode());
        f.step(&mut v, 0);
        f.step(&mut v, 20);
        assert_eq!(v.state(), VehicleState::Waiting);
        drain(&mut peer);

        f.step(&mut v, 4_000);
        assert!(drain(&mut peer).is_empty());

        f.step(&mut v, 5_000);
        assert_eq!(drain(&mut peer), vec![Command::ChannelSwitch(11).encode(), Command::Initiate.encode()]);
        assert_eq!(f.network.intersection(IntersectionId(0)).last_initiator_ms(), 5_000);

        f.step(&mut v, 5_020);
        assert!(drain(&mut peer).is_empty());
    }

    #[test]
    fn test_waypoint_skipping_follows_straight_runs() {
        let mut f = Fixture::new();
        let lane = f
            .network
            .entry_lanes()
            .map(|l| l.id)
            .find(|&l| !f.network.lanes_with_turn(l, Turn::Straight).is_empty())
            .unwrap();
        let (mut v, mut peer) = f.vehicle(1, f.network.lane(lane).end_pos);
        peer.send(&Message::Init.encode());
        f.step(&mut v, 0);

        // every waypoint of a straight crossing lies on one line
        let next = v.next_waypoint(f.network.tile_size()).unwrap();
        assert!(geometry::approx_eq(&next, v.waypoints().last().unwrap(), 1e-6));
    }

    #[test]
    fn test_malformed_stats_are_tolerated() {
        let mut f = Fixture::new();
        let (mut v, mut peer) = f.vehicle(1, Vec2::repeat(PARKED_COORD));
        peer.send(b"MC-STATS-START\x01");
        peer.send(&Message::Init.encode());
        f.step(&mut v, 0);
        assert_eq!(v.state(), VehicleState::Queuing);
    }
}
