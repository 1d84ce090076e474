//! Named modifier implementations
//!
//! A [`ModifierConfig`] names one implementation per modifier kind. The
//! [`ModifierRegistry`] is an explicit object mapping those names to
//! constructors; [`ModifierRegistry::with_defaults`] registers every built-in
//! implementation and applications add their own on top.

use std::collections::HashMap;
use std::sync::Arc;

use navgraph::{Constraint, EuclideanHeuristic, Heuristic, ShortestPathConstraint, ZeroHeuristic};
use navgraph_common::{Error, Result};

use super::detection::{
    DetectAccidentCanGo, DetectAccidentNone, DetectGoalChangedDistance, DetectGoalReachedDistance2d5,
    DetectPathNodeReachedDistance2d5,
};
use super::edge_status::EdgeStatusAwarenessDistanceAndTime;
use super::following::{
    ComputeTargetPointShortcut, ComputeTargetPointTrivial, GotoTrivial, RefineGoalTrivial,
    SelectPathNodeCandidateNextPathNode,
};
use super::modifiers::{
    CanGo, CheckDirectWay, ComputeTargetPoint, DetectAccident, DetectGoalChanged, DetectGoalReached,
    DetectPathNodeReached, EdgeStatusAwareness, FindNodesFromPositions, Goto, Modifiers, RefineGoal,
    SelectPathNodeCandidate, Steering,
};
use super::node_selection::{CanGoAlways, CheckDirectWayDistance, FindNodesFromPositionsNearest};
use super::queue::{ComputeTargetPointQueue, NearbyBodies, NoBodies};
use super::steering::SteeringSimpleBiped;

/// Names of the implementation chosen for each modifier kind
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ModifierConfig {
    pub find_nodes: String,
    /// `None` always runs A*
    pub check_direct_way: Option<String>,
    pub select_candidate: String,
    pub can_go: String,
    pub compute_target_point: String,
    pub goto: String,
    /// Steering handed to the goto modifier
    pub steering: String,
    pub detect_goal_reached: String,
    pub detect_path_node_reached: String,
    pub detect_accident: String,
    pub detect_goal_changed: String,
    pub refine_goal: String,
    pub edge_status_awareness: Option<String>,
    pub constraint: String,
    pub heuristic: String,
}

impl Default for ModifierConfig {
    fn default() -> Self {
        Self {
            find_nodes: "nearest".to_string(),
            check_direct_way: Some("distance".to_string()),
            select_candidate: "next_path_node".to_string(),
            can_go: "always".to_string(),
            compute_target_point: "shortcut".to_string(),
            goto: "trivial".to_string(),
            steering: "simple_biped".to_string(),
            detect_goal_reached: "distance_2d5".to_string(),
            detect_path_node_reached: "distance_2d5".to_string(),
            detect_accident: "can_go".to_string(),
            detect_goal_changed: "distance".to_string(),
            refine_goal: "trivial".to_string(),
            edge_status_awareness: None,
            constraint: "shortest_path".to_string(),
            heuristic: "euclidean".to_string(),
        }
    }
}

type Factory<T, A> = Box<dyn Fn(A) -> Arc<T> + Send + Sync>;

/// Constructors of one modifier kind, by name
pub struct Catalog<T: ?Sized, A = ()> {
    kind: &'static str,
    factories: HashMap<String, Factory<T, A>>,
}

impl<T: ?Sized, A> Catalog<T, A> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            factories: HashMap::new(),
        }
    }

    /// Registers a constructor; names are unique within a kind
    pub fn register(&mut self, name: &str, factory: impl Fn(A) -> Arc<T> + Send + Sync + 'static) -> Result<()> {
        if self.factories.contains_key(name) {
            return Err(Error::Config(format!(
                "{} modifier '{}' is already registered",
                self.kind, name
            )));
        }
        self.factories.insert(name.to_string(), Box::new(factory));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in alphabetical order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn build(&self, name: &str, args: A) -> Result<Arc<T>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::Config(format!("unknown {} modifier '{}'", self.kind, name)))?;
        Ok(factory(args))
    }
}

impl<T: ?Sized, A> std::fmt::Debug for Catalog<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("kind", &self.kind)
            .field("names", &self.names())
            .finish()
    }
}

/// Modifier constructors for every kind
#[derive(Debug)]
pub struct ModifierRegistry {
    pub find_nodes: Catalog<dyn FindNodesFromPositions>,
    pub check_direct_way: Catalog<dyn CheckDirectWay>,
    pub select_candidate: Catalog<dyn SelectPathNodeCandidate>,
    pub can_go: Catalog<dyn CanGo>,
    /// Constructors receive the bodies of the world the agent moves in
    pub compute_target_point: Catalog<dyn ComputeTargetPoint, Arc<dyn NearbyBodies>>,
    pub goto: Catalog<dyn Goto, Arc<dyn Steering>>,
    pub steering: Catalog<dyn Steering>,
    pub detect_goal_reached: Catalog<dyn DetectGoalReached>,
    pub detect_path_node_reached: Catalog<dyn DetectPathNodeReached>,
    pub detect_accident: Catalog<dyn DetectAccident>,
    pub detect_goal_changed: Catalog<dyn DetectGoalChanged>,
    pub refine_goal: Catalog<dyn RefineGoal>,
    pub edge_status_awareness: Catalog<dyn EdgeStatusAwareness>,
    pub constraint: Catalog<dyn Constraint>,
    pub heuristic: Catalog<dyn Heuristic>,
}

impl Default for ModifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModifierRegistry {
    /// Registry without any implementation
    pub fn new() -> Self {
        Self {
            find_nodes: Catalog::new("find_nodes"),
            check_direct_way: Catalog::new("check_direct_way"),
            select_candidate: Catalog::new("select_candidate"),
            can_go: Catalog::new("can_go"),
            compute_target_point: Catalog::new("compute_target_point"),
            goto: Catalog::new("goto"),
            steering: Catalog::new("steering"),
            detect_goal_reached: Catalog::new("detect_goal_reached"),
            detect_path_node_reached: Catalog::new("detect_path_node_reached"),
            detect_accident: Catalog::new("detect_accident"),
            detect_goal_changed: Catalog::new("detect_goal_changed"),
            refine_goal: Catalog::new("refine_goal"),
            edge_status_awareness: Catalog::new("edge_status_awareness"),
            constraint: Catalog::new("constraint"),
            heuristic: Catalog::new("heuristic"),
        }
    }

    /// Registry holding every built-in implementation under its default settings
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        registry
            .find_nodes
            .register("nearest", |_| Arc::new(FindNodesFromPositionsNearest::default()))?;
        registry
            .check_direct_way
            .register("distance", |_| Arc::new(CheckDirectWayDistance::default()))?;
        registry
            .select_candidate
            .register("next_path_node", |_| Arc::new(SelectPathNodeCandidateNextPathNode::default()))?;
        registry.can_go.register("always", |_| Arc::new(CanGoAlways))?;
        registry
            .compute_target_point
            .register("trivial", |_| Arc::new(ComputeTargetPointTrivial))?;
        registry
            .compute_target_point
            .register("shortcut", |_| Arc::new(ComputeTargetPointShortcut::default()))?;
        registry
            .compute_target_point
            .register("queue", |bodies| Arc::new(ComputeTargetPointQueue::with_bodies(bodies)))?;
        registry
            .goto
            .register("trivial", |steering| Arc::new(GotoTrivial::new(steering)))?;
        registry
            .steering
            .register("simple_biped", |_| Arc::new(SteeringSimpleBiped::default()))?;
        registry
            .detect_goal_reached
            .register("distance_2d5", |_| Arc::new(DetectGoalReachedDistance2d5::default()))?;
        registry
            .detect_path_node_reached
            .register("distance_2d5", |_| Arc::new(DetectPathNodeReachedDistance2d5::default()))?;
        registry.detect_accident.register("can_go", |_| Arc::new(DetectAccidentCanGo))?;
        registry.detect_accident.register("none", |_| Arc::new(DetectAccidentNone))?;
        registry
            .detect_goal_changed
            .register("distance", |_| Arc::new(DetectGoalChangedDistance::default()))?;
        registry.refine_goal.register("trivial", |_| Arc::new(RefineGoalTrivial))?;
        registry
            .edge_status_awareness
            .register("distance_and_time", |_| Arc::new(EdgeStatusAwarenessDistanceAndTime::default()))?;
        registry
            .constraint
            .register("shortest_path", |_| Arc::new(ShortestPathConstraint::new()))?;
        registry
            .heuristic
            .register("euclidean", |_| Arc::new(EuclideanHeuristic::default()))?;
        registry.heuristic.register("zero", |_| Arc::new(ZeroHeuristic))?;
        Ok(registry)
    }

    /// Builds the modifiers named by `config` for a world without bodies
    pub fn build(&self, config: &ModifierConfig) -> Result<Modifiers> {
        self.build_with_bodies(config, Arc::new(NoBodies))
    }

    /// Builds the modifiers named by `config`, queueing against `bodies`
    pub fn build_with_bodies(&self, config: &ModifierConfig, bodies: Arc<dyn NearbyBodies>) -> Result<Modifiers> {
        let steering = self.steering.build(&config.steering, ())?;
        let check_direct_way = config
            .check_direct_way
            .as_deref()
            .map(|name| self.check_direct_way.build(name, ()))
            .transpose()?;
        let edge_status_awareness = config
            .edge_status_awareness
            .as_deref()
            .map(|name| self.edge_status_awareness.build(name, ()))
            .transpose()?;

        Ok(Modifiers {
            find_nodes: self.find_nodes.build(&config.find_nodes, ())?,
            check_direct_way,
            select_candidate: self.select_candidate.build(&config.select_candidate, ())?,
            can_go: self.can_go.build(&config.can_go, ())?,
            compute_target_point: self.compute_target_point.build(&config.compute_target_point, bodies)?,
            goto: self.goto.build(&config.goto, steering)?,
            detect_goal_reached: self.detect_goal_reached.build(&config.detect_goal_reached, ())?,
            detect_path_node_reached: self
                .detect_path_node_reached
                .build(&config.detect_path_node_reached, ())?,
            detect_accident: self.detect_accident.build(&config.detect_accident, ())?,
            detect_goal_changed: self.detect_goal_changed.build(&config.detect_goal_changed, ())?,
            refine_goal: self.refine_goal.build(&config.refine_goal, ())?,
            edge_status_awareness,
            constraint: self.constraint.build(&config.constraint, ())?,
            heuristic: self.heuristic.build(&config.heuristic, ())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AgentState;
    use navgraph_common::Vec3;

    struct NeverGo;

    impl CanGo for NeverGo {
        fn can_go(&self, _agent: &AgentState, _from: Vec3, _to: Vec3) -> bool {
            false
        }
    }

    #[test]
    fn test_defaults_build() -> Result<()> {
        let registry = ModifierRegistry::with_defaults()?;
        let modifiers = registry.build(&ModifierConfig::default())?;
        assert!(modifiers.check_direct_way.is_some());
        assert!(modifiers.edge_status_awareness.is_none());
        assert_eq!(registry.compute_target_point.names(), vec!["queue", "shortcut", "trivial"]);

        let config = ModifierConfig {
            check_direct_way: None,
            edge_status_awareness: Some("distance_and_time".to_string()),
            heuristic: "zero".to_string(),
            ..Default::default()
        };
        let modifiers = registry.build(&config)?;
        assert!(modifiers.check_direct_way.is_none());
        assert!(modifiers.edge_status_awareness.is_some());
        Ok(())
    }

    #[test]
    fn test_queue_sees_the_given_bodies() -> Result<()> {
        use crate::Body;
        use navgraph::Path;

        let registry = ModifierRegistry::with_defaults()?;
        let config = ModifierConfig {
            compute_target_point: "queue".to_string(),
            ..Default::default()
        };
        let dest = Vec3::new(5.0, 0.0, 0.0);
        let path = Path::from_positions([Vec3::ZERO, dest]);
        let last = path.last().unwrap();
        let agent = AgentState::new(navgraph::AgentId(1), Vec3::ZERO);

        let alone = registry.build(&config)?;
        let target = alone.compute_target_point.compute_target_point(&agent, &CanGoAlways, &path, last);
        assert_eq!(target, Some(dest));

        let bodies: Arc<dyn NearbyBodies> = Arc::new(vec![Body::new(dest, 0.4, 1.8)]);
        let crowded = registry.build_with_bodies(&config, bodies)?;
        let target = crowded
            .compute_target_point
            .compute_target_point(&agent, &CanGoAlways, &path, last)
            .unwrap();
        assert!(target.x < 4.0);
        Ok(())
    }

    #[test]
    fn test_unknown_names_are_config_errors() -> Result<()> {
        let registry = ModifierRegistry::with_defaults()?;
        let config = ModifierConfig {
            can_go: "navmesh".to_string(),
            ..Default::default()
        };
        match registry.build(&config) {
            Err(Error::Config(message)) => assert!(message.contains("navmesh")),
            other => panic!("expected a config error, got {:?}", other.map(|_| ())),
        }

        assert!(ModifierRegistry::new().build(&ModifierConfig::default()).is_err());
        Ok(())
    }

    #[test]
    fn test_custom_registration() -> Result<()> {
        let mut registry = ModifierRegistry::with_defaults()?;
        registry.can_go.register("never", |_| Arc::new(NeverGo))?;
        assert!(registry.can_go.register("never", |_| Arc::new(NeverGo)).is_err());

        let config = ModifierConfig {
            can_go: "never".to_string(),
            ..Default::default()
        };
        let modifiers = registry.build(&config)?;
        let agent = AgentState::new(navgraph::AgentId(1), Vec3::ZERO);
        assert!(!modifiers.can_go.can_go(&agent, Vec3::ZERO, Vec3::X));
        Ok(())
    }
}
