use crate::config::KinematicsConfig;
use crate::geometry::{self, Vec2, VectorExt};
use crate::vehicle::VehicleId;

const COLLISION_HISTORY_MS: u64 = 60_000;

/// Circle body of a vehicle. Only registered bodies move, collide and show
/// up in line queries.
#[derive(Debug, Clone)]
pub struct VehicleBody {
    pub center: Vec2,
    pub vel: Vec2,
    pub dir: Vec2,
    pub radius: f64,
    pub registered: bool,
}

impl VehicleBody {
    pub fn new(center: Vec2, radius: f64) -> Self {
        Self {
            center,
            vel: Vec2::zeros(),
            dir: Vec2::new(1.0, 0.0),
            radius,
            registered: false,
        }
    }

    pub fn speed(&self) -> f64 {
        self.vel.magnitude()
    }

    pub fn collides_with(&self, other: &VehicleBody) -> bool {
        geometry::distance(&self.center, &other.center) < self.radius + other.radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineHit {
    pub vehicle: VehicleId,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyCollision {
    pub time_ms: u64,
    pub a: VehicleId,
    pub b: VehicleId,
}

#[derive(Debug, Default)]
pub struct PhysicsEngine {
    collisions: Vec<BodyCollision>,
}

impl PhysicsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step<'a, I>(&mut self, bodies: I, dt: f64, now_ms: u64)
    where
        I: IntoIterator<Item = (VehicleId, &'a mut VehicleBody)>,
    {
        let mut bodies: Vec<(VehicleId, &mut VehicleBody)> = bodies.into_iter().filter(|(_, b)| b.registered).collect();

        for (_, body) in bodies.iter_mut() {
            body.center += body.vel * dt;
        }

        for i in 0..bodies.len() {
            for j in (i + 1)..bodies.len() {
                if bodies[i].1.collides_with(bodies[j].1) {
                    let (a, b) = (bodies[i].0, bodies[j].0);
                    log::warn!("Collision between vehicles {} and {} at {} ms", a, b, now_ms);
                    self.collisions.push(BodyCollision { time_ms: now_ms, a, b });
                }
            }
        }

        let horizon = now_ms.saturating_sub(COLLISION_HISTORY_MS);
        self.collisions.retain(|c| c.time_ms >= horizon);
    }

    pub fn collisions(&self) -> &[BodyCollision] {
        &self.collisions
    }

    pub fn has_collision(&self, vehicle: VehicleId, from_ms: u64, to_ms: u64) -> bool {
        self.collisions
            .iter()
            .any(|c| (c.a == vehicle || c.b == vehicle) && from_ms <= c.time_ms && c.time_ms < to_ms)
    }

    /// Every registered body the ray from `origin` along unit `dir` passes
    /// through. Distances are signed, bodies behind the origin are negative.
    pub fn line_hits<'a, I>(bodies: I, origin: &Vec2, dir: &Vec2) -> Vec<LineHit>
    where
        I: IntoIterator<Item = (VehicleId, &'a VehicleBody)>,
    {
        bodies
            .into_iter()
            .filter(|(_, b)| b.registered)
            .filter_map(|(id, body)| {
                let closest = geometry::closest_point_on_line(origin, dir, &body.center);
                if geometry::distance(&closest, &body.center) <= body.radius {
                    Some(LineHit {
                        vehicle: id,
                        distance: (body.center - origin).dot(dir),
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn nearest_hit<'a, I>(bodies: I, origin: &Vec2, dir: &Vec2, except: VehicleId, max_len: f64) -> Option<LineHit>
    where
        I: IntoIterator<Item = (VehicleId, &'a VehicleBody)>,
    {
        Self::line_hits(bodies, origin, dir)
            .into_iter()
            .filter(|hit| hit.vehicle != except && hit.distance >= 0.0 && hit.distance <= max_len)
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

pub fn brake_distance(speed: f64, deceleration: f64) -> f64 {
    speed * speed / (2.0 * deceleration)
}

pub fn max_speed_for(distance: f64, deceleration: f64) -> f64 {
    (2.0 * deceleration * distance.max(0.0)).sqrt()
}

/// Point-model driving: steer towards `target` at a bounded turn rate and
/// pick a speed that allows stopping within `max_brake_distance`. Without a
/// target the body brakes to a halt.
pub fn drive(body: &mut VehicleBody, limits: &KinematicsConfig, dt: f64, target: Option<Vec2>, max_brake_distance: Option<f64>) {
    let mut wanted_dir = None;
    let mut wanted_speed = 0.0;

    if let Some(target) = target {
        let to_target = target - body.center;
        let angle = body.dir.signed_angle_to(&to_target);

        wanted_speed = limits.max_speed;
        if let Some(distance) = max_brake_distance {
            wanted_speed = wanted_speed.min(max_speed_for(distance, limits.deceleration));
        }

        // sharp corners force a slow down
        let turn_penalty = (angle.abs() / limits.max_turn_rate).cbrt();
        wanted_speed *= 1.0 - turn_penalty.min(1.0);
        wanted_dir = Some(to_target);
    }

    steer(body, limits, dt, wanted_dir, wanted_speed);
}

fn steer(body: &mut VehicleBody, limits: &KinematicsConfig, dt: f64, wanted_dir: Option<Vec2>, wanted_speed: f64) {
    if let Some(wanted_dir) = wanted_dir.filter(|d| d.magnitude() > 0.0) {
        let angle = body.dir.signed_angle_to(&wanted_dir);
        let turn = angle.signum() * angle.abs().min(dt * limits.max_turn_rate);
        body.dir = body.dir.rotated(turn).normalized_or_zero();
        body.vel = body.vel.rotated(turn);
    }

    let speed = body.speed();
    let diff = wanted_speed - speed;

    if diff > limits.acceleration * dt {
        body.vel += body.dir * limits.acceleration * dt;
    } else if diff <= 0.0 {
        if speed > limits.deceleration * dt {
            body.vel -= body.dir * limits.deceleration * dt;
        } else {
            body.vel = Vec2::zeros();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(x: f64, y: f64) -> VehicleBody {
        let mut b = VehicleBody::new(Vec2::new(x, y), 1.0);
        b.registered = true;
        b
    }

    #[test]
    fn test_bodies_move_by_velocity() {
        let mut physics = PhysicsEngine::new();
        let mut a = body(0.0, 0.0);
        a.vel = Vec2::new(2.0, 0.0);
        let mut parked = body(50.0, 0.0);
        parked.registered = false;
        parked.vel = Vec2::new(1.0, 0.0);

        physics.step([(VehicleId(1), &mut a), (VehicleId(2), &mut parked)], 0.5, 0);
        assert!((a.center.x - 1.0).abs() < 1e-12);
        assert_eq!(parked.center.x, 50.0);
    }

    #[test]
    fn test_collision_is_strict_overlap() {
        let mut physics = PhysicsEngine::new();
        let mut a = body(0.0, 0.0);
        let mut b = body(2.0, 0.0);
        physics.step([(VehicleId(1), &mut a), (VehicleId(2), &mut b)], 0.0, 100);
        assert!(physics.collisions().is_empty());

        b.center.x = 1.9;
        physics.step([(VehicleId(1), &mut a), (VehicleId(2), &mut b)], 0.0, 200);
        assert!(physics.has_collision(VehicleId(2), 200, 201));
        assert!(!physics.has_collision(VehicleId(2), 0, 200));
        assert!(!physics.has_collision(VehicleId(3), 0, 1000));
    }

    #[test]
    fn test_nearest_hit_ignores_self_and_behind() {
        let own = body(0.0, 0.0);
        let behind = body(-5.0, 0.0);
        let near = body(10.0, 0.9);
        let far = body(20.0, 0.0);
        let beside = body(5.0, 3.0);
        let bodies = [
            (VehicleId(1), &own),
            (VehicleId(2), &behind),
            (VehicleId(3), &near),
            (VehicleId(4), &far),
            (VehicleId(5), &beside),
        ];

        let hit = PhysicsEngine::nearest_hit(bodies, &Vec2::zeros(), &Vec2::new(1.0, 0.0), VehicleId(1), 100.0).unwrap();
        assert_eq!(hit.vehicle, VehicleId(3));
        assert!((hit.distance - 10.0).abs() < 1e-12);

        assert!(PhysicsEngine::nearest_hit(bodies, &Vec2::zeros(), &Vec2::new(1.0, 0.0), VehicleId(1), 5.0).is_none());

        let hits = PhysicsEngine::line_hits(bodies, &Vec2::zeros(), &Vec2::new(1.0, 0.0));
        assert_eq!(hits.len(), 4);
        assert!(hits.iter().any(|h| h.vehicle == VehicleId(2) && h.distance < 0.0));
    }

    #[test]
    fn test_drive_accelerates_towards_target() {
        let limits = KinematicsConfig::default();
        let mut b = body(0.0, 0.0);
        drive(&mut b, &limits, 0.1, Some(Vec2::new(100.0, 0.0)), None);
        assert!((b.speed() - 0.2).abs() < 1e-12);
        assert!(b.vel.x > 0.0);
    }

    #[test]
    fn test_drive_respects_brake_distance() {
        let limits = KinematicsConfig::default();
        let mut b = body(0.0, 0.0);
        b.vel = Vec2::new(10.0, 0.0);
        // 10 m/s needs 12.5 m to stop at 4 m/s²
        drive(&mut b, &limits, 0.1, Some(Vec2::new(100.0, 0.0)), Some(2.0));
        assert!((b.speed() - 9.6).abs() < 1e-12);
    }

    #[test]
    fn test_drive_without_target_stops() {
        let limits = KinematicsConfig::default();
        let mut b = body(0.0, 0.0);
        b.vel = Vec2::new(0.3, 0.0);
        drive(&mut b, &limits, 0.1, None, None);
        assert_eq!(b.speed(), 0.0);
    }

    #[test]
    fn test_turn_rate_is_bounded() {
        let limits = KinematicsConfig::default();
        let mut b = body(0.0, 0.0);
        drive(&mut b, &limits, 0.1, Some(Vec2::new(0.0, 10.0)), None);
        let turned = Vec2::new(1.0, 0.0).signed_angle_to(&b.dir);
        assert!((turned - 0.1 * limits.max_turn_rate).abs() < 1e-9);
        // a right-angle target leaves no speed budget
        assert_eq!(b.speed(), 0.0);
    }

    #[test]
    fn test_brake_distance_matches_max_speed() {
        let d = brake_distance(8.0, 4.0);
        assert!((d - 8.0).abs() < 1e-12);
        assert!((max_speed_for(d, 4.0) - 8.0).abs() < 1e-12);
    }
}
