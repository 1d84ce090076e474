//! Goal, node and accident detectors

use navgraph::{Path, PathNode, PathNodeId};
use navgraph_common::{distance, within_cylinder, Vec3};

use super::agent::AgentState;
use super::modifiers::{
    Accident, CanGo, DetectAccident, DetectGoalChanged, DetectGoalReached, DetectPathNodeReached,
};

/// Goal reached inside a vertical cylinder around it
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectGoalReachedDistance2d5 {
    pub radius: f32,
    pub height_tolerance: f32,
}

impl Default for DetectGoalReachedDistance2d5 {
    fn default() -> Self {
        Self {
            radius: 0.5,
            height_tolerance: 2.0,
        }
    }
}

impl DetectGoalReached for DetectGoalReachedDistance2d5 {
    fn goal_reached(&self, agent: &AgentState, goal: Vec3) -> bool {
        within_cylinder(&agent.position, &goal, self.radius, self.height_tolerance)
    }
}

/// Path node reached inside a vertical cylinder around it
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectPathNodeReachedDistance2d5 {
    pub radius: f32,
    pub height_tolerance: f32,
}

impl Default for DetectPathNodeReachedDistance2d5 {
    fn default() -> Self {
        Self {
            radius: 0.3,
            height_tolerance: 2.0,
        }
    }
}

impl DetectPathNodeReached for DetectPathNodeReachedDistance2d5 {
    fn node_reached(&self, agent: &AgentState, node: &PathNode) -> bool {
        within_cylinder(&agent.position, &node.position, self.radius, self.height_tolerance)
    }
}

/// Reports an accident when the current node is no longer directly reachable
///
/// The blocked edge is the graph edge leading into the current node, when the
/// previous node still exists and both nodes came from vertices.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectAccidentCanGo;

impl DetectAccident for DetectAccidentCanGo {
    fn detect_accident(
        &self,
        agent: &AgentState,
        can_go: &dyn CanGo,
        path: &Path,
        current: PathNodeId,
    ) -> Option<Accident> {
        let node = path.get(current)?;
        if can_go.can_go(agent, agent.position, node.position) {
            return None;
        }

        let blocked_edge = path
            .prev(current)
            .and_then(|prev| path.get(prev))
            .and_then(|prev| prev.vertex.zip(node.vertex));
        Some(Accident { blocked_edge })
    }
}

/// Never reports accidents
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectAccidentNone;

impl DetectAccident for DetectAccidentNone {
    fn detect_accident(
        &self,
        _agent: &AgentState,
        _can_go: &dyn CanGo,
        _path: &Path,
        _current: PathNodeId,
    ) -> Option<Accident> {
        None
    }
}

/// The goal changed once it moved farther than `threshold`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectGoalChangedDistance {
    pub threshold: f32,
}

impl Default for DetectGoalChangedDistance {
    fn default() -> Self {
        Self { threshold: 1.0 }
    }
}

impl DetectGoalChanged for DetectGoalChangedDistance {
    fn goal_changed(&self, old_goal: Vec3, new_goal: Vec3) -> bool {
        distance(&old_goal, &new_goal) > self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CanGoAlways;
    use navgraph::{encode_ref, AgentId, VertexRef};

    struct Blocked;

    impl CanGo for Blocked {
        fn can_go(&self, _agent: &AgentState, _from: Vec3, _to: Vec3) -> bool {
            false
        }
    }

    #[test]
    fn test_goal_reached_uses_height_tolerance() {
        let detect = DetectGoalReachedDistance2d5::default();
        let agent = AgentState::new(AgentId(1), Vec3::new(0.0, 1.0, 0.0));
        assert!(detect.goal_reached(&agent, Vec3::new(0.3, 0.0, 0.3)));
        assert!(!detect.goal_reached(&agent, Vec3::new(0.3, 4.0, 0.3)));
        assert!(!detect.goal_reached(&agent, Vec3::new(1.0, 1.0, 0.0)));
    }

    #[test]
    fn test_accident_names_the_edge_into_the_current_node() {
        let a = VertexRef::new(encode_ref(1, 0, 1));
        let b = VertexRef::new(encode_ref(1, 0, 2));
        let mut path = Path::new();
        path.push_back(PathNode::from_vertex(a, Vec3::ZERO));
        let current = path.push_back(PathNode::from_vertex(b, Vec3::X));

        let agent = AgentState::new(AgentId(1), Vec3::ZERO);
        assert_eq!(DetectAccidentCanGo.detect_accident(&agent, &CanGoAlways, &path, current), None);
        assert_eq!(
            DetectAccidentCanGo.detect_accident(&agent, &Blocked, &path, current),
            Some(Accident {
                blocked_edge: Some((a, b))
            })
        );

        // No previous node: the accident is still reported
        let mut path = Path::new();
        let only = path.push_back(PathNode::at(Vec3::X));
        assert_eq!(
            DetectAccidentCanGo.detect_accident(&agent, &Blocked, &path, only),
            Some(Accident { blocked_edge: None })
        );
        assert_eq!(DetectAccidentNone.detect_accident(&agent, &Blocked, &path, only), None);
    }

    #[test]
    fn test_goal_changed_threshold() {
        let detect = DetectGoalChangedDistance::default();
        assert!(!detect.goal_changed(Vec3::ZERO, Vec3::new(0.5, 0.0, 0.5)));
        assert!(detect.goal_changed(Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)));
    }
}
