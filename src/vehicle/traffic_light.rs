use super::{StepContext, VehicleController, VehicleState};
use crate::channel::Message;
use crate::geometry;
use crate::network::LightPhase;
use crate::simulation::physics;

/// Gap behind a followed vehicle, in radii. Light-controlled traffic keeps
/// a little more room since nobody reserves the space ahead.
const FOLLOW_MARGIN: f64 = 3.0;

impl VehicleController {
    pub(super) fn step_traffic_light(&mut self, ctx: &mut StepContext<'_>) {
        // nothing to negotiate, only reports are of interest
        while let Some(bytes) = self.channel.try_receive() {
            if let Message::Stats(raw) = Message::parse(&bytes) {
                self.handle_stats(&raw);
            }
        }

        self.state = self.next_light_state(ctx);
        self.move_body(ctx, FOLLOW_MARGIN);
    }

    fn light_phase(&self, ctx: &StepContext<'_>) -> LightPhase {
        match (self.intersection, self.lane) {
            (Some(i), Some(lane)) => {
                let direction = ctx.network.lane(lane).direction();
                ctx.network.intersection(i).light_phase(direction, ctx.now_ms)
            }
            _ => LightPhase::Red,
        }
    }

    fn next_light_state(&mut self, ctx: &mut StepContext<'_>) -> VehicleState {
        let phase = self.light_phase(ctx);

        match self.state {
            VehicleState::Init => {
                self.init(ctx);
                VehicleState::Initialized
            }
            VehicleState::Initialized => VehicleState::Queuing,
            VehicleState::Queuing => {
                if self.predecessor.is_none() {
                    self.follow_vehicle_ahead(ctx);
                    let pred_moving = self
                        .predecessor
                        .and_then(|p| ctx.others.get(&p))
                        .is_some_and(|p| p.state == VehicleState::Moving);
                    if pred_moving {
                        self.unlink_predecessor(ctx);
                    }
                }

                if phase == LightPhase::Green {
                    VehicleState::Moving
                } else {
                    VehicleState::Queuing
                }
            }
            // never entered under light control
            VehicleState::Waiting => VehicleState::Waiting,
            VehicleState::Moving => {
                if self.predecessor.is_none() {
                    self.follow_vehicle_ahead(ctx);
                }

                if self.cursor + 1 >= self.waypoints.len() {
                    return VehicleState::Leaving;
                }
                if phase == LightPhase::Green {
                    return VehicleState::Moving;
                }

                // once committed, keep going
                if !self.drive_through {
                    self.drive_through = self.cannot_stop_in_time(ctx);
                }
                if self.drive_through {
                    VehicleState::Moving
                } else {
                    VehicleState::Queuing
                }
            }
            VehicleState::Leaving => {
                if let Some(s) = self.successor.take() {
                    if let Some(v) = ctx.others.get_mut(&s) {
                        v.predecessor = None;
                    }
                }
                self.unlink_predecessor(ctx);
                VehicleState::Left
            }
            VehicleState::Left => {
                if self.target_is_exit(ctx) {
                    self.prepare_removal(ctx);
                    VehicleState::Finished
                } else {
                    self.continue_on_target(ctx);
                    VehicleState::Queuing
                }
            }
            VehicleState::Finished => VehicleState::Finished,
        }
    }

    /// Already inside the intersection, past the stop line, or too fast to
    /// stop before it.
    fn cannot_stop_in_time(&self, ctx: &StepContext<'_>) -> bool {
        if self.cursor > 0 {
            return true;
        }
        let Some(first) = self.waypoints.first() else {
            return true;
        };
        if geometry::distance(&self.body.center, first) < geometry::distance(&self.stop_pos, first) {
            return true;
        }
        let limit = physics::max_speed_for(
            geometry::distance(&self.stop_pos, &self.body.center),
            ctx.config.kinematics.deceleration,
        );
        self.body.speed() > limit
    }

    /// Links behind the vehicle directly ahead if it drives the same route
    /// and has nobody following yet.
    fn follow_vehicle_ahead(&mut self, ctx: &mut StepContext<'_>) {
        let radius = self.body.radius;
        let range = physics::brake_distance(self.body.speed(), ctx.config.kinematics.deceleration).max(2.0 * radius) * 1.5;

        let Some(candidate) = self.sense_ahead(ctx, range) else {
            return;
        };
        let acceptable = ctx.others.get(&candidate).is_some_and(|c| {
            c.state < VehicleState::Leaving && c.successor.is_none() && self.lane == c.lane && self.target_lane == c.target_lane
        });
        if acceptable {
            self.link_behind(ctx, candidate);
        }
    }
}
