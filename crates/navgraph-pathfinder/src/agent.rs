//! Per-agent inputs and outputs of the follow loop

use navgraph::{AgentId, GraphManager, TimeBudget};
use navgraph_common::{Error, Result, Vec3};

/// Snapshot of the agent a [`PathFinder`](crate::PathFinder) drives
///
/// Positions are y-up; `orientation` is a horizontal unit vector, or zero when
/// the agent has no facing yet.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentState {
    pub id: AgentId,
    pub position: Vec3,
    pub orientation: Vec3,
    pub speed: f32,
    pub max_speed: f32,
    pub radius: f32,
    pub height: f32,
}

impl AgentState {
    pub fn new(id: AgentId, position: Vec3) -> Self {
        Self {
            id,
            position,
            orientation: Vec3::ZERO,
            speed: 0.0,
            max_speed: 3.5,
            radius: 0.4,
            height: 1.8,
        }
    }

    pub fn with_orientation(mut self, orientation: Vec3) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_max_speed(mut self, max_speed: f32) -> Self {
        self.max_speed = max_speed;
        self
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_speed.is_finite() || self.max_speed < 0.0 {
            return Err(Error::Config(format!(
                "max_speed must be finite and non-negative, got {}",
                self.max_speed
            )));
        }
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(Error::Config(format!("radius must not be negative, got {}", self.radius)));
        }
        Ok(())
    }

    /// Moves the agent by one frame of `action`
    pub fn apply(&mut self, action: &Action, dt: f32) {
        self.position += action.direction * action.speed * dt;
        self.speed = action.speed;
        if action.orientation != Vec3::ZERO {
            self.orientation = action.orientation;
        }
    }
}

/// Movement command for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Action {
    /// Horizontal unit direction of travel
    pub direction: Vec3,
    pub speed: f32,
    /// Facing after this frame
    pub orientation: Vec3,
}

impl Action {
    /// Standing still while keeping the given facing
    pub fn idle(orientation: Vec3) -> Self {
        Self {
            direction: Vec3::ZERO,
            speed: 0.0,
            orientation,
        }
    }
}

/// What the agent should do this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NextMove {
    /// The goal is reached; the path was cleared
    Arrived,
    /// A path is being computed or the start/destination vertex is not resolved yet
    Waiting,
    /// The last search failed; retried after the attempt period
    NoPath,
    Move(Action),
}

/// Everything shared by the agents updated in one frame
pub struct FrameContext<'a> {
    pub graph: &'a GraphManager,
    pub budget: &'a mut dyn TimeBudget,
    /// Current time in seconds
    pub now: f32,
    /// Duration of the frame in seconds
    pub dt: f32,
}

impl<'a> FrameContext<'a> {
    pub fn new(graph: &'a GraphManager, budget: &'a mut dyn TimeBudget, now: f32, dt: f32) -> Self {
        Self {
            graph,
            budget,
            now,
            dt,
        }
    }
}
