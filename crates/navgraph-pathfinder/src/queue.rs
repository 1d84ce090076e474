//! Queueing behind other bodies near the destination
//!
//! When several agents head for the same point, the ones arriving last stop
//! behind whoever already stands there instead of pushing into them.

use std::sync::Arc;

use navgraph::{AgentId, Path, PathNodeId};
use navgraph_common::{dist_2d, height_delta, point_along_segment, Error, Result, Vec3};

use super::agent::AgentState;
use super::modifiers::{CanGo, ComputeTargetPoint};

/// Overlaps shallower than this are ignored
const OVERLAP_TOLERANCE: f32 = 1e-3;

/// A cylinder occupied by another agent or a dynamic object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    /// Agent controlling the body, `None` for objects
    pub owner: Option<AgentId>,
    pub position: Vec3,
    pub radius: f32,
    pub height: f32,
}

impl Body {
    pub fn new(position: Vec3, radius: f32, height: f32) -> Self {
        Self {
            owner: None,
            position,
            radius,
            height,
        }
    }

    pub fn with_owner(mut self, owner: AgentId) -> Self {
        self.owner = Some(owner);
        self
    }
}

/// Spatial query over the bodies of the embedding world
pub trait NearbyBodies: Send + Sync {
    /// Bodies whose footprint comes within `radius` of `position` in the xz-plane
    fn bodies_near(&self, position: Vec3, radius: f32) -> Vec<Body>;
}

/// World without bodies
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBodies;

impl NearbyBodies for NoBodies {
    fn bodies_near(&self, _position: Vec3, _radius: f32) -> Vec<Body> {
        Vec::new()
    }
}

impl NearbyBodies for Vec<Body> {
    fn bodies_near(&self, position: Vec3, radius: f32) -> Vec<Body> {
        self.iter()
            .filter(|body| dist_2d(&body.position, &position) - body.radius < radius)
            .copied()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ComputeTargetPointQueueConfig {
    /// Queueing only applies once the agent is this close to its destination
    pub max_distance: f32,
    /// Bodies farther than this beyond the destination are not queued behind
    pub max_body_distance: f32,
    /// Free space kept between the agent and the body ahead
    pub extra_gap: f32,
    /// Bodies are ignored when their height differs by more than this ratio
    /// of the mean half-height of the two bodies
    pub max_delta_height_ratio: f32,
}

impl Default for ComputeTargetPointQueueConfig {
    fn default() -> Self {
        Self {
            max_distance: 10.0,
            max_body_distance: 2.5,
            extra_gap: 0.25,
            max_delta_height_ratio: 1.0,
        }
    }
}

impl ComputeTargetPointQueueConfig {
    pub fn with_max_distance(mut self, max_distance: f32) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_max_body_distance(mut self, max_body_distance: f32) -> Self {
        self.max_body_distance = max_body_distance;
        self
    }

    pub fn with_extra_gap(mut self, extra_gap: f32) -> Self {
        self.extra_gap = extra_gap;
        self
    }

    pub fn with_max_delta_height_ratio(mut self, ratio: f32) -> Self {
        self.max_delta_height_ratio = ratio;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.max_distance.is_finite() && self.max_distance > 0.0) {
            return Err(Error::Config(format!(
                "max_distance must be positive, got {}",
                self.max_distance
            )));
        }
        if !(self.max_body_distance.is_finite() && self.max_body_distance >= 0.0) {
            return Err(Error::Config(format!(
                "max_body_distance must not be negative, got {}",
                self.max_body_distance
            )));
        }
        if !(self.extra_gap.is_finite() && self.extra_gap >= 0.0) {
            return Err(Error::Config(format!(
                "extra_gap must not be negative, got {}",
                self.extra_gap
            )));
        }
        if self.max_delta_height_ratio.is_nan() || self.max_delta_height_ratio <= 0.0 {
            return Err(Error::Config(format!(
                "max_delta_height_ratio must be positive, got {}",
                self.max_delta_height_ratio
            )));
        }
        Ok(())
    }
}

/// Targets the nearest free spot in front of the bodies standing on the
/// final destination
///
/// Before the last node, or while the destination is still far, the target is
/// the current node as with [`ComputeTargetPointTrivial`](crate::ComputeTargetPointTrivial).
pub struct ComputeTargetPointQueue {
    config: ComputeTargetPointQueueConfig,
    bodies: Arc<dyn NearbyBodies>,
}

impl ComputeTargetPointQueue {
    pub fn new(config: ComputeTargetPointQueueConfig, bodies: Arc<dyn NearbyBodies>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, bodies })
    }

    /// Default settings against the given bodies
    pub fn with_bodies(bodies: Arc<dyn NearbyBodies>) -> Self {
        Self {
            config: ComputeTargetPointQueueConfig::default(),
            bodies,
        }
    }

    pub fn config(&self) -> &ComputeTargetPointQueueConfig {
        &self.config
    }

    fn blocking_bodies(&self, agent: &AgentState, dest: Vec3, reach: f32) -> Vec<Body> {
        self.bodies
            .bodies_near(agent.position, reach + self.config.max_body_distance)
            .into_iter()
            .filter(|body| body.owner != Some(agent.id))
            .filter(|body| {
                let tolerance = self.config.max_delta_height_ratio * 0.5 * (agent.height + body.height);
                height_delta(&body.position, &dest) <= tolerance
            })
            .collect()
    }

    /// Backs the target off along the approach until no body overlaps it
    fn queue_target(&self, agent: &AgentState, dest: Vec3) -> Vec3 {
        let approach = dist_2d(&agent.position, &dest);
        if approach < f32::EPSILON {
            return dest;
        }
        let bodies = self.blocking_bodies(agent, dest, approach);
        if bodies.is_empty() {
            return dest;
        }

        let start = agent.position;
        let direction = Vec3::new(dest.x - start.x, 0.0, dest.z - start.z) / approach;
        let length = (dest - start).length();
        let mut along = approach;
        let mut target = dest;

        for _ in 0..bodies.len() {
            let ahead = bodies
                .iter()
                .filter(|body| {
                    let clearance = agent.radius + body.radius + self.config.extra_gap;
                    dist_2d(&body.position, &target) < clearance - OVERLAP_TOLERANCE
                })
                .map(|body| {
                    let clearance = agent.radius + body.radius + self.config.extra_gap;
                    let body_along = (body.position - start).dot(direction);
                    (body_along - clearance).max(0.0)
                })
                .min_by(|a, b| a.total_cmp(b));
            let Some(next_along) = ahead else {
                break;
            };
            if next_along >= along {
                break;
            }
            along = next_along;
            target = point_along_segment(&start, &dest, length * along / approach);
            if along <= 0.0 {
                break;
            }
        }

        if along < approach {
            log::trace!(
                "Agent {:?} queues {:.2} short of {:?}",
                agent.id,
                approach - along,
                dest
            );
        }
        target
    }
}

impl ComputeTargetPoint for ComputeTargetPointQueue {
    fn compute_target_point(
        &self,
        agent: &AgentState,
        _can_go: &dyn CanGo,
        path: &Path,
        current: PathNodeId,
    ) -> Option<Vec3> {
        let node = path.get(current)?;
        if path.last() != Some(current) || dist_2d(&agent.position, &node.position) > self.config.max_distance {
            return Some(node.position);
        }
        Some(self.queue_target(agent, node.position))
    }
}

impl Default for ComputeTargetPointQueue {
    fn default() -> Self {
        Self::with_bodies(Arc::new(NoBodies))
    }
}

impl std::fmt::Debug for ComputeTargetPointQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeTargetPointQueue")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CanGoAlways;

    fn line_path(last_x: f32) -> (Path, PathNodeId, PathNodeId) {
        let path = Path::from_positions([Vec3::ZERO, Vec3::new(last_x, 0.0, 0.0)]);
        let first = path.first().unwrap();
        let last = path.last().unwrap();
        (path, first, last)
    }

    fn queue(bodies: Vec<Body>) -> Result<ComputeTargetPointQueue> {
        ComputeTargetPointQueue::new(ComputeTargetPointQueueConfig::default(), Arc::new(bodies))
    }

    fn agent() -> AgentState {
        AgentState::new(AgentId(1), Vec3::ZERO)
    }

    #[test]
    fn test_stops_behind_body_on_destination() -> Result<()> {
        let (path, _, last) = line_path(5.0);
        let modifier = queue(vec![Body::new(Vec3::new(5.0, 0.0, 0.0), 0.4, 1.8)])?;

        let target = modifier.compute_target_point(&agent(), &CanGoAlways, &path, last);
        let target = target.ok_or_else(|| Error::Pathfinding("no target".to_string()))?;
        // 0.4 + 0.4 + 0.25 short of the destination
        assert!((target.x - 3.95).abs() < 1e-4, "target {:?}", target);
        assert_eq!(target.z, 0.0);
        Ok(())
    }

    #[test]
    fn test_queues_behind_a_line_of_bodies() -> Result<()> {
        let (path, _, last) = line_path(5.0);
        let modifier = queue(vec![
            Body::new(Vec3::new(5.0, 0.0, 0.0), 0.4, 1.8),
            Body::new(Vec3::new(3.5, 0.0, 0.0), 0.4, 1.8),
        ])?;

        let target = modifier
            .compute_target_point(&agent(), &CanGoAlways, &path, last)
            .ok_or_else(|| Error::Pathfinding("no target".to_string()))?;
        assert!((target.x - 2.45).abs() < 1e-3, "target {:?}", target);
        Ok(())
    }

    #[test]
    fn test_agent_already_in_line_stays() -> Result<()> {
        let (path, _, last) = line_path(1.0);
        let modifier = queue(vec![Body::new(Vec3::new(1.0, 0.0, 0.0), 0.4, 1.8)])?;

        let target = modifier.compute_target_point(&agent(), &CanGoAlways, &path, last);
        assert_eq!(target, Some(Vec3::ZERO));
        Ok(())
    }

    #[test]
    fn test_ignored_bodies() -> Result<()> {
        let (path, _, last) = line_path(5.0);
        let dest = Vec3::new(5.0, 0.0, 0.0);
        let modifier = queue(vec![
            // The agent's own body
            Body::new(dest, 0.4, 1.8).with_owner(AgentId(1)),
            // A floor above
            Body::new(Vec3::new(5.0, 4.0, 0.0), 0.4, 1.8),
            // Standing aside
            Body::new(Vec3::new(5.0, 0.0, 2.0), 0.4, 1.8),
        ])?;

        let target = modifier.compute_target_point(&agent(), &CanGoAlways, &path, last);
        assert_eq!(target, Some(dest));
        Ok(())
    }

    #[test]
    fn test_only_the_final_node_nearby_is_queued() -> Result<()> {
        let dest = Vec3::new(5.0, 0.0, 0.0);
        let modifier = queue(vec![Body::new(dest, 0.4, 1.8)])?;

        let (path, first, _) = line_path(5.0);
        let far = AgentState::new(AgentId(1), Vec3::new(0.0, 0.0, 0.0));
        assert_eq!(
            modifier.compute_target_point(&far, &CanGoAlways, &path, first),
            Some(Vec3::ZERO)
        );

        let path = Path::from_positions([Vec3::new(-20.0, 0.0, 0.0), dest]);
        let last = path.last().unwrap();
        let far = AgentState::new(AgentId(1), Vec3::new(-20.0, 0.0, 0.0));
        assert_eq!(modifier.compute_target_point(&far, &CanGoAlways, &path, last), Some(dest));
        Ok(())
    }

    #[test]
    fn test_config_validation() {
        assert!(ComputeTargetPointQueueConfig::default().validate().is_ok());
        assert!(ComputeTargetPointQueueConfig::default()
            .with_max_distance(0.0)
            .validate()
            .is_err());
        assert!(ComputeTargetPointQueueConfig::default()
            .with_extra_gap(-1.0)
            .validate()
            .is_err());
        assert!(ComputeTargetPointQueueConfig::default()
            .with_max_delta_height_ratio(0.0)
            .validate()
            .is_err());
    }
}
