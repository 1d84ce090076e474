//! Modifier interfaces of the follow loop
//!
//! Each modifier controls one aspect of planning or following a path. They are
//! shared by every agent using the same [`Modifiers`] bundle, so implementations
//! keep no per-agent state: the agent and everything else a call needs arrive
//! as arguments.

use std::sync::Arc;

use navgraph::{
    Constraint, EuclideanHeuristic, GraphManager, Heuristic, Path, PathNode, PathNodeId,
    ShortestPathConstraint, VertexRef,
};
use navgraph_common::Vec3;

use super::agent::{Action, AgentState};
use super::detection::{
    DetectAccidentCanGo, DetectGoalChangedDistance, DetectGoalReachedDistance2d5,
    DetectPathNodeReachedDistance2d5,
};
use super::following::{
    ComputeTargetPointShortcut, GotoTrivial, RefineGoalTrivial, SelectPathNodeCandidateNextPathNode,
};
use super::node_selection::{CanGoAlways, CheckDirectWayDistance, FindNodesFromPositionsNearest};
use super::steering::SteeringSimpleBiped;

/// Answers whether an agent can move in a straight line between two points
///
/// Usually backed by the collision layer of the embedding application.
pub trait CanGo: Send + Sync {
    fn can_go(&self, agent: &AgentState, from: Vec3, to: Vec3) -> bool;
}

/// Resolves the start and destination positions of a request to vertices
pub trait FindNodesFromPositions: Send + Sync {
    fn find_start_node(
        &self,
        graph: &GraphManager,
        agent: &AgentState,
        can_go: &dyn CanGo,
        position: Vec3,
    ) -> Option<VertexRef>;

    fn find_dest_node(
        &self,
        graph: &GraphManager,
        agent: &AgentState,
        can_go: &dyn CanGo,
        position: Vec3,
    ) -> Option<VertexRef>;
}

/// Decides whether a request can skip A* and go straight to the destination
pub trait CheckDirectWay: Send + Sync {
    /// Cost of the direct way, or `None` when a search is needed
    fn check_direct_way(&self, agent: &AgentState, can_go: &dyn CanGo, start: Vec3, dest: Vec3) -> Option<f32>;
}

/// Picks the path node the agent heads for
pub trait SelectPathNodeCandidate: Send + Sync {
    /// Returns the new current node, `current` itself when nothing better is reachable
    fn select_candidate(
        &self,
        agent: &AgentState,
        can_go: &dyn CanGo,
        path: &Path,
        current: PathNodeId,
    ) -> PathNodeId;
}

/// Derives the point to steer toward from the current node
pub trait ComputeTargetPoint: Send + Sync {
    /// `None` means no target could be computed this frame
    fn compute_target_point(
        &self,
        agent: &AgentState,
        can_go: &dyn CanGo,
        path: &Path,
        current: PathNodeId,
    ) -> Option<Vec3>;
}

/// Turns a target point into a movement command
pub trait Goto: Send + Sync {
    fn goto(&self, agent: &AgentState, target: Vec3, dt: f32) -> Option<Action>;
}

/// Physically plausible speed and orientation toward a point
pub trait Steering: Send + Sync {
    fn compute_action(&self, agent: &AgentState, max_speed: f32, target: Vec3, dt: f32) -> Option<Action>;
}

pub trait DetectGoalReached: Send + Sync {
    fn goal_reached(&self, agent: &AgentState, goal: Vec3) -> bool;
}

pub trait DetectPathNodeReached: Send + Sync {
    fn node_reached(&self, agent: &AgentState, node: &PathNode) -> bool;
}

/// What went wrong while following a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accident {
    /// Edge that turned out to be blocked, when it is known
    pub blocked_edge: Option<(VertexRef, VertexRef)>,
}

/// Notices that the agent can no longer follow its path
pub trait DetectAccident: Send + Sync {
    fn detect_accident(
        &self,
        agent: &AgentState,
        can_go: &dyn CanGo,
        path: &Path,
        current: PathNodeId,
    ) -> Option<Accident>;
}

pub trait DetectGoalChanged: Send + Sync {
    fn goal_changed(&self, old_goal: Vec3, new_goal: Vec3) -> bool;
}

/// Adjusts the requested goal before it is used
pub trait RefineGoal: Send + Sync {
    fn refine_goal(&self, graph: &GraphManager, agent: &AgentState, goal: Vec3) -> Vec3;
}

/// Perceived passability of an edge the agent marked as blocked
pub trait EdgeStatusAwareness: Send + Sync {
    /// Whether the agent should plan through the edge again
    ///
    /// `real_passable` is the last status reported for the edge and
    /// `last_change` the time of that report.
    fn perceived_passable(
        &self,
        agent: &AgentState,
        edge_from: Vec3,
        edge_to: Vec3,
        real_passable: bool,
        last_change: f32,
        now: f32,
    ) -> bool;
}

/// The modifiers a [`PathFinder`](crate::PathFinder) runs with
#[derive(Clone)]
pub struct Modifiers {
    pub find_nodes: Arc<dyn FindNodesFromPositions>,
    pub check_direct_way: Option<Arc<dyn CheckDirectWay>>,
    pub select_candidate: Arc<dyn SelectPathNodeCandidate>,
    pub can_go: Arc<dyn CanGo>,
    pub compute_target_point: Arc<dyn ComputeTargetPoint>,
    pub goto: Arc<dyn Goto>,
    pub detect_goal_reached: Arc<dyn DetectGoalReached>,
    pub detect_path_node_reached: Arc<dyn DetectPathNodeReached>,
    pub detect_accident: Arc<dyn DetectAccident>,
    pub detect_goal_changed: Arc<dyn DetectGoalChanged>,
    pub refine_goal: Arc<dyn RefineGoal>,
    pub edge_status_awareness: Option<Arc<dyn EdgeStatusAwareness>>,
    pub constraint: Arc<dyn Constraint>,
    pub heuristic: Arc<dyn Heuristic>,
}

impl Default for Modifiers {
    fn default() -> Self {
        Self {
            find_nodes: Arc::new(FindNodesFromPositionsNearest::default()),
            check_direct_way: Some(Arc::new(CheckDirectWayDistance::default())),
            select_candidate: Arc::new(SelectPathNodeCandidateNextPathNode::default()),
            can_go: Arc::new(CanGoAlways),
            compute_target_point: Arc::new(ComputeTargetPointShortcut::default()),
            goto: Arc::new(GotoTrivial::new(Arc::new(SteeringSimpleBiped::default()))),
            detect_goal_reached: Arc::new(DetectGoalReachedDistance2d5::default()),
            detect_path_node_reached: Arc::new(DetectPathNodeReachedDistance2d5::default()),
            detect_accident: Arc::new(DetectAccidentCanGo),
            detect_goal_changed: Arc::new(DetectGoalChangedDistance::default()),
            refine_goal: Arc::new(RefineGoalTrivial),
            edge_status_awareness: None,
            constraint: Arc::new(ShortestPathConstraint::new()),
            heuristic: Arc::new(EuclideanHeuristic::default()),
        }
    }
}

impl Modifiers {
    pub fn with_can_go(mut self, can_go: Arc<dyn CanGo>) -> Self {
        self.can_go = can_go;
        self
    }

    pub fn with_find_nodes(mut self, find_nodes: Arc<dyn FindNodesFromPositions>) -> Self {
        self.find_nodes = find_nodes;
        self
    }

    pub fn with_check_direct_way(mut self, check_direct_way: Option<Arc<dyn CheckDirectWay>>) -> Self {
        self.check_direct_way = check_direct_way;
        self
    }

    pub fn with_select_candidate(mut self, select_candidate: Arc<dyn SelectPathNodeCandidate>) -> Self {
        self.select_candidate = select_candidate;
        self
    }

    pub fn with_compute_target_point(mut self, compute_target_point: Arc<dyn ComputeTargetPoint>) -> Self {
        self.compute_target_point = compute_target_point;
        self
    }

    pub fn with_goto(mut self, goto: Arc<dyn Goto>) -> Self {
        self.goto = goto;
        self
    }

    pub fn with_detect_accident(mut self, detect_accident: Arc<dyn DetectAccident>) -> Self {
        self.detect_accident = detect_accident;
        self
    }

    pub fn with_refine_goal(mut self, refine_goal: Arc<dyn RefineGoal>) -> Self {
        self.refine_goal = refine_goal;
        self
    }

    pub fn with_edge_status_awareness(mut self, awareness: Option<Arc<dyn EdgeStatusAwareness>>) -> Self {
        self.edge_status_awareness = awareness;
        self
    }

    pub fn with_constraint(mut self, constraint: Arc<dyn Constraint>) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn with_heuristic(mut self, heuristic: Arc<dyn Heuristic>) -> Self {
        self.heuristic = heuristic;
        self
    }
}

impl std::fmt::Debug for Modifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Modifiers")
            .field("check_direct_way", &self.check_direct_way.is_some())
            .field("edge_status_awareness", &self.edge_status_awareness.is_some())
            .finish_non_exhaustive()
    }
}
