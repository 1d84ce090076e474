//! Biped steering
//!
//! The agent turns toward its target at a bounded rate and walks along its
//! facing. It slows down while the target is still off its facing, and again
//! inside the arrival radius. Targets that are close and off to the side are
//! reached by strafing instead of turning first.

use std::f32::consts::PI;

use navgraph_common::{angle_2d, dist_2d, direction_2d, rotate_towards_2d, Error, Result, Vec3};

use super::agent::{Action, AgentState};
use super::modifiers::Steering;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct SteeringConfig {
    /// Radians per second
    pub max_turn_rate: f32,
    /// Share of the speed lost when the target is straight behind, in `[0, 1]`
    pub turn_slowdown: f32,
    /// Speed decreases linearly inside this radius
    pub arrival_radius: f32,
    /// Targets closer than this may be strafed to
    pub strafe_radius: f32,
    /// Minimum offset in degrees from the facing for strafing
    pub strafe_angle: f32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            max_turn_rate: PI,
            turn_slowdown: 0.5,
            arrival_radius: 1.0,
            strafe_radius: 2.0,
            strafe_angle: 5.0,
        }
    }
}

impl SteeringConfig {
    pub fn with_max_turn_rate(mut self, max_turn_rate: f32) -> Self {
        self.max_turn_rate = max_turn_rate;
        self
    }

    pub fn with_strafe_radius(mut self, strafe_radius: f32) -> Self {
        self.strafe_radius = strafe_radius;
        self
    }

    pub fn with_arrival_radius(mut self, arrival_radius: f32) -> Self {
        self.arrival_radius = arrival_radius;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_turn_rate.is_finite() || self.max_turn_rate <= 0.0 {
            return Err(Error::Config(format!(
                "max_turn_rate must be positive, got {}",
                self.max_turn_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.turn_slowdown) {
            return Err(Error::Config(format!(
                "turn_slowdown must be within [0, 1], got {}",
                self.turn_slowdown
            )));
        }
        if !self.arrival_radius.is_finite() || self.arrival_radius < 0.0 {
            return Err(Error::Config(format!(
                "arrival_radius must not be negative, got {}",
                self.arrival_radius
            )));
        }
        if !self.strafe_radius.is_finite() || self.strafe_radius < 0.0 {
            return Err(Error::Config(format!(
                "strafe_radius must not be negative, got {}",
                self.strafe_radius
            )));
        }
        if !(0.0..=180.0).contains(&self.strafe_angle) {
            return Err(Error::Config(format!(
                "strafe_angle must be within [0, 180] degrees, got {}",
                self.strafe_angle
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SteeringSimpleBiped {
    config: SteeringConfig,
}

impl SteeringSimpleBiped {
    pub fn new(config: SteeringConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SteeringConfig {
        &self.config
    }
}

impl Steering for SteeringSimpleBiped {
    fn compute_action(&self, agent: &AgentState, max_speed: f32, target: Vec3, dt: f32) -> Option<Action> {
        if !dt.is_finite() || dt <= 0.0 || !max_speed.is_finite() || max_speed < 0.0 {
            return None;
        }

        let offset = target - agent.position;
        let dist = dist_2d(&agent.position, &target);
        let Some(desired) = direction_2d(&offset) else {
            return Some(Action::idle(agent.orientation));
        };
        let facing = direction_2d(&agent.orientation).unwrap_or(desired);

        let max_turn = self.config.max_turn_rate * dt;
        let orientation = rotate_towards_2d(&facing, &desired, max_turn);

        let strafe = dist <= self.config.strafe_radius
            && angle_2d(&facing, &desired) > self.config.strafe_angle.to_radians();

        let (direction, mut speed) = if strafe {
            (desired, max_speed)
        } else {
            let remaining = angle_2d(&orientation, &desired);
            let factor = 1.0 - self.config.turn_slowdown * (remaining / PI);
            (orientation, max_speed * factor)
        };

        if dist < self.config.arrival_radius {
            speed *= dist / self.config.arrival_radius;
        }
        // Never overshoot within one frame
        speed = speed.min(dist / dt);

        Some(Action {
            direction,
            speed,
            orientation,
        })
    }
}
