//! Default candidate selection, target point and goto modifiers

use std::sync::Arc;

use navgraph::{GraphManager, Path, PathNode, PathNodeId};
use navgraph_common::{distance, height_delta, point_along_segment, Error, Result, Vec3};

use super::agent::{Action, AgentState};
use super::modifiers::{CanGo, ComputeTargetPoint, Goto, RefineGoal, SelectPathNodeCandidate, Steering};

/// Largest number of samples taken along one edge
const MAX_EDGE_SAMPLES: u32 = 1024;

/// Checks if smoothing may skip the edge leaving `node`
#[inline]
fn can_bypass(node: &PathNode) -> bool {
    node.path_object.map_or(true, |link| link.smoothable)
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct SelectPathNodeCandidateConfig {
    /// Consecutive unreachable nodes looked past before giving up
    pub nodes_to_skip: u32,
    /// Nodes farther than this from the agent are not considered
    pub max_candidate_distance: f32,
}

impl Default for SelectPathNodeCandidateConfig {
    fn default() -> Self {
        Self {
            nodes_to_skip: 4,
            max_candidate_distance: 50.0,
        }
    }
}

impl SelectPathNodeCandidateConfig {
    pub fn with_nodes_to_skip(mut self, nodes_to_skip: u32) -> Self {
        self.nodes_to_skip = nodes_to_skip;
        self
    }

    pub fn with_max_candidate_distance(mut self, max_candidate_distance: f32) -> Self {
        self.max_candidate_distance = max_candidate_distance;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_candidate_distance.is_finite() || self.max_candidate_distance <= 0.0 {
            return Err(Error::Config(format!(
                "max_candidate_distance must be positive, got {}",
                self.max_candidate_distance
            )));
        }
        Ok(())
    }
}

/// Looks ahead along the path for the farthest node the agent can walk to directly
///
/// Unreachable nodes are looked past, up to `nodes_to_skip` in a row. The walk
/// stops at a node whose outgoing edge is controlled by a path-object that may
/// not be bypassed: that node is the farthest candidate.
#[derive(Debug, Clone, Default)]
pub struct SelectPathNodeCandidateNextPathNode {
    config: SelectPathNodeCandidateConfig,
}

impl SelectPathNodeCandidateNextPathNode {
    pub fn new(config: SelectPathNodeCandidateConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SelectPathNodeCandidateConfig {
        &self.config
    }
}

impl SelectPathNodeCandidate for SelectPathNodeCandidateNextPathNode {
    fn select_candidate(
        &self,
        agent: &AgentState,
        can_go: &dyn CanGo,
        path: &Path,
        current: PathNodeId,
    ) -> PathNodeId {
        match path.get(current) {
            Some(node) if can_bypass(node) => {}
            _ => return current,
        }

        let mut best = current;
        let mut unreachable = 0;
        let mut candidate = path.next(current);

        while let Some(id) = candidate {
            let Some(node) = path.get(id) else {
                break;
            };
            if distance(&agent.position, &node.position) > self.config.max_candidate_distance {
                break;
            }

            if can_go.can_go(agent, agent.position, node.position) {
                best = id;
                unreachable = 0;
            } else {
                unreachable += 1;
                if unreachable > self.config.nodes_to_skip {
                    break;
                }
            }

            if !can_bypass(node) {
                break;
            }
            candidate = path.next(id);
        }

        best
    }
}

/// Heads straight for the current node
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputeTargetPointTrivial;

impl ComputeTargetPoint for ComputeTargetPointTrivial {
    fn compute_target_point(
        &self,
        _agent: &AgentState,
        _can_go: &dyn CanGo,
        path: &Path,
        current: PathNodeId,
    ) -> Option<Vec3> {
        path.get(current).map(|node| node.position)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ComputeTargetPointShortcutConfig {
    /// Distance between two samples along the edge
    pub sampling_step: f32,
    /// Samples whose height differs more than this from the agent are not used
    pub max_delta_height: f32,
}

impl Default for ComputeTargetPointShortcutConfig {
    fn default() -> Self {
        Self {
            sampling_step: 0.5,
            max_delta_height: f32::MAX,
        }
    }
}

impl ComputeTargetPointShortcutConfig {
    pub fn with_sampling_step(mut self, sampling_step: f32) -> Self {
        self.sampling_step = sampling_step;
        self
    }

    pub fn with_max_delta_height(mut self, max_delta_height: f32) -> Self {
        self.max_delta_height = max_delta_height;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.sampling_step.is_finite() || self.sampling_step <= 0.0 {
            return Err(Error::Config(format!(
                "sampling_step must be positive, got {}",
                self.sampling_step
            )));
        }
        if self.max_delta_height.is_nan() || self.max_delta_height <= 0.0 {
            return Err(Error::Config(format!(
                "max_delta_height must be positive, got {}",
                self.max_delta_height
            )));
        }
        Ok(())
    }
}

/// Samples the edge leaving the current node and targets the farthest sample
/// the agent can walk to directly
///
/// Falls back to the current node when it is itself out of reach, when it is
/// the last node, or when its outgoing edge may not be bypassed.
#[derive(Debug, Clone, Default)]
pub struct ComputeTargetPointShortcut {
    config: ComputeTargetPointShortcutConfig,
}

impl ComputeTargetPointShortcut {
    pub fn new(config: ComputeTargetPointShortcutConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ComputeTargetPointShortcutConfig {
        &self.config
    }
}

impl ComputeTargetPoint for ComputeTargetPointShortcut {
    fn compute_target_point(
        &self,
        agent: &AgentState,
        can_go: &dyn CanGo,
        path: &Path,
        current: PathNodeId,
    ) -> Option<Vec3> {
        let node = path.get(current)?;
        let Some(next) = path.next(current).and_then(|id| path.get(id)) else {
            return Some(node.position);
        };
        if !can_bypass(node) || !can_go.can_go(agent, agent.position, node.position) {
            return Some(node.position);
        }

        let length = distance(&node.position, &next.position);
        let samples = ((length / self.config.sampling_step).floor() as u32).min(MAX_EDGE_SAMPLES);

        let mut target = node.position;
        for i in 1..=samples {
            let sample = point_along_segment(&node.position, &next.position, i as f32 * self.config.sampling_step);
            if height_delta(&agent.position, &sample) > self.config.max_delta_height
                || !can_go.can_go(agent, agent.position, sample)
            {
                break;
            }
            target = sample;
        }
        Some(target)
    }
}

/// Hands the target point to a [`Steering`] at the agent's full speed
#[derive(Clone)]
pub struct GotoTrivial {
    steering: Arc<dyn Steering>,
}

impl GotoTrivial {
    pub fn new(steering: Arc<dyn Steering>) -> Self {
        Self { steering }
    }
}

impl std::fmt::Debug for GotoTrivial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GotoTrivial").finish_non_exhaustive()
    }
}

impl Goto for GotoTrivial {
    fn goto(&self, agent: &AgentState, target: Vec3, dt: f32) -> Option<Action> {
        self.steering.compute_action(agent, agent.max_speed, target, dt)
    }
}

/// Uses the requested goal unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct RefineGoalTrivial;

impl RefineGoal for RefineGoalTrivial {
    fn refine_goal(&self, _graph: &GraphManager, _agent: &AgentState, goal: Vec3) -> Vec3 {
        goal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CanGoAlways, SteeringSimpleBiped};
    use navgraph::{AgentId, PathObjectLink};
    use navgraph_common::dist_2d;

    /// Straight moves up to a fixed horizontal length
    struct CanGoWithin(f32);

    impl CanGo for CanGoWithin {
        fn can_go(&self, _agent: &AgentState, from: Vec3, to: Vec3) -> bool {
            dist_2d(&from, &to) <= self.0
        }
    }

    /// Blocks moves ending at the listed x coordinates
    struct BlockedAt(Vec<f32>);

    impl CanGo for BlockedAt {
        fn can_go(&self, _agent: &AgentState, _from: Vec3, to: Vec3) -> bool {
            !self.0.iter().any(|x| (to.x - x).abs() < 1e-4)
        }
    }

    fn straight_path(count: usize) -> Path {
        Path::from_positions((0..count).map(|i| Vec3::new(i as f32, 0.0, 0.0)))
    }

    fn node_x(path: &Path, id: PathNodeId) -> f32 {
        path.get(id).map(|n| n.position.x).unwrap_or(f32::NAN)
    }

    #[test]
    fn test_selection_converges_and_stays() {
        let path = straight_path(9);
        let agent = AgentState::new(AgentId(1), Vec3::new(0.2, 0.0, 0.0));
        let select = SelectPathNodeCandidateNextPathNode::default();
        let can_go = CanGoWithin(3.0);

        let mut current = path.first().unwrap();
        for _ in 0..5 {
            current = select.select_candidate(&agent, &can_go, &path, current);
        }
        assert_eq!(node_x(&path, current), 3.0);

        let again = select.select_candidate(&agent, &can_go, &path, current);
        assert_eq!(again, current);

        // Without obstacles the last node is the farthest
        let last = select.select_candidate(&agent, &CanGoAlways, &path, current);
        assert_eq!(last, path.last().unwrap());
        assert_eq!(select.select_candidate(&agent, &CanGoAlways, &path, last), last);
    }

    #[test]
    fn test_selection_skips_a_bounded_number_of_blocked_nodes() -> Result<()> {
        let path = straight_path(8);
        let agent = AgentState::new(AgentId(1), Vec3::ZERO);
        let first = path.first().unwrap();

        let select = SelectPathNodeCandidateNextPathNode::default();
        let blocked = BlockedAt(vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(node_x(&path, select.select_candidate(&agent, &blocked, &path, first)), 2.0);

        let blocked = BlockedAt(vec![1.0, 2.0, 3.0]);
        assert_eq!(node_x(&path, select.select_candidate(&agent, &blocked, &path, first)), 7.0);

        let strict = SelectPathNodeCandidateNextPathNode::new(
            SelectPathNodeCandidateConfig::default().with_nodes_to_skip(2),
        )?;
        assert_eq!(node_x(&path, strict.select_candidate(&agent, &blocked, &path, first)), 0.0);
        Ok(())
    }

    #[test]
    fn test_selection_stops_at_controlled_edges() {
        let mut path = Path::new();
        let first = path.push_back(PathNode::at(Vec3::ZERO));
        let door = path.push_back(PathNode {
            path_object: Some(PathObjectLink {
                id: 7,
                smoothable: false,
            }),
            ..PathNode::at(Vec3::new(1.0, 0.0, 0.0))
        });
        path.push_back(PathNode::at(Vec3::new(2.0, 0.0, 0.0)));

        let agent = AgentState::new(AgentId(1), Vec3::ZERO);
        let select = SelectPathNodeCandidateNextPathNode::default();
        assert_eq!(select.select_candidate(&agent, &CanGoAlways, &path, first), door);
        assert_eq!(select.select_candidate(&agent, &CanGoAlways, &path, door), door);
    }

    #[test]
    fn test_shortcut_target_runs_along_the_next_edge() -> Result<()> {
        let path = Path::from_positions([Vec3::ZERO, Vec3::new(0.0, 0.0, 2.0), Vec3::new(4.0, 0.0, 2.0)]);
        let agent = AgentState::new(AgentId(1), Vec3::new(0.0, 0.0, 1.0));
        let current = path.next(path.first().unwrap()).unwrap();

        let trivial = ComputeTargetPointTrivial.compute_target_point(&agent, &CanGoAlways, &path, current);
        assert_eq!(trivial, Some(Vec3::new(0.0, 0.0, 2.0)));

        let shortcut = ComputeTargetPointShortcut::default();
        let target = shortcut.compute_target_point(&agent, &CanGoWithin(2.3), &path, current);
        // Samples every 0.5 along the edge; (2, 0, 2) is the last one within 2.3
        assert_eq!(target, Some(Vec3::new(2.0, 0.0, 2.0)));

        let all_the_way = shortcut.compute_target_point(&agent, &CanGoAlways, &path, current);
        assert_eq!(all_the_way, Some(Vec3::new(4.0, 0.0, 2.0)));

        assert!(ComputeTargetPointShortcut::new(
            ComputeTargetPointShortcutConfig::default().with_sampling_step(0.0)
        )
        .is_err());
        Ok(())
    }

    #[test]
    fn test_goto_delegates_to_steering() {
        let goto = GotoTrivial::new(Arc::new(SteeringSimpleBiped::default()));
        let agent = AgentState::new(AgentId(1), Vec3::ZERO).with_orientation(Vec3::X);
        let action = goto.goto(&agent, Vec3::new(10.0, 0.0, 0.0), 0.1).unwrap();
        assert_eq!(action.speed, agent.max_speed);
        assert!(goto.goto(&agent, Vec3::X, 0.0).is_none());
    }
}
