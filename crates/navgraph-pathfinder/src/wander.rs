//! Wander destination search
//!
//! A propagation biased toward the agent's facing looks for a vertex at least
//! the wander distance away inside a cone ahead of the agent. Vertices outside
//! the cone are explored last, farthest first. When no vertex qualifies the
//! best scored one is used, with a random share in the score so agents do not
//! all pick the same spot.

use std::sync::Arc;

use navgraph::{
    EdgeEvaluation, EdgeEvaluator, GraphManager, GraphTraversal, PropagationTraversal,
    PropagationTraversalConfig, TaskId, TimeBudget, TraversalState, TraversalVisitor, UnlimitedBudget, VertexRef,
};
use navgraph_common::{direction_2d, distance, flatten, Error, Result, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::agent::AgentState;
use super::queue::NearbyBodies;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct WanderConfig {
    /// Distance the agent tries to wander
    pub wander_distance: f32,
    /// Full width in degrees of the cone ahead of the agent
    pub propagation_angle: f32,
    /// Vertices farther than this from the start are not explored
    pub search_radius: f32,
    /// Weight of the random share in fallback scores
    pub random_factor: f32,
    pub seed: u64,
    pub task: Option<TaskId>,
}

impl Default for WanderConfig {
    fn default() -> Self {
        Self {
            wander_distance: 10.0,
            propagation_angle: 90.0,
            search_radius: 20.0,
            random_factor: 0.5,
            seed: 0,
            task: None,
        }
    }
}

impl WanderConfig {
    pub fn with_wander_distance(mut self, wander_distance: f32) -> Self {
        self.wander_distance = wander_distance;
        self
    }

    pub fn with_propagation_angle(mut self, degrees: f32) -> Self {
        self.propagation_angle = degrees;
        self
    }

    pub fn with_search_radius(mut self, search_radius: f32) -> Self {
        self.search_radius = search_radius;
        self
    }

    pub fn with_random_factor(mut self, random_factor: f32) -> Self {
        self.random_factor = random_factor;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.wander_distance.is_finite() && self.wander_distance > 0.0) {
            return Err(Error::Config(format!(
                "wander_distance must be positive, got {}",
                self.wander_distance
            )));
        }
        if !(self.search_radius.is_finite() && self.search_radius >= self.wander_distance) {
            return Err(Error::Config(format!(
                "search_radius must be at least the wander distance {}, got {}",
                self.wander_distance, self.search_radius
            )));
        }
        if !(self.propagation_angle > 0.0 && self.propagation_angle <= 360.0) {
            return Err(Error::Config(format!(
                "propagation_angle must be in (0, 360], got {}",
                self.propagation_angle
            )));
        }
        if !(self.random_factor.is_finite() && self.random_factor >= 0.0) {
            return Err(Error::Config(format!(
                "random_factor must not be negative, got {}",
                self.random_factor
            )));
        }
        Ok(())
    }
}

/// Cone ahead of the agent in the xz-plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WanderCone {
    /// `None` covers every direction
    pub direction: Option<Vec3>,
    pub cos_half_angle: f32,
}

impl WanderCone {
    pub fn new(facing: Vec3, propagation_angle: f32) -> Self {
        let direction = if propagation_angle >= 360.0 {
            None
        } else {
            direction_2d(&facing)
        };
        Self {
            direction,
            cos_half_angle: (propagation_angle.to_radians() * 0.5).cos(),
        }
    }

    pub fn contains(&self, origin: Vec3, position: Vec3) -> bool {
        let Some(direction) = self.direction else {
            return true;
        };
        match direction_2d(&flatten(&(position - origin))) {
            Some(offset) => offset.dot(direction) >= self.cos_half_angle,
            None => true,
        }
    }
}

/// Free propagation inside the cone, farthest first outside it
#[derive(Debug, Clone, Copy)]
pub struct WanderBias {
    pub cone: WanderCone,
    pub wander_distance: f32,
}

impl EdgeEvaluator for WanderBias {
    fn evaluate(&self, candidate: &EdgeEvaluation) -> Option<f32> {
        let d = distance(&candidate.start_position, &candidate.to_position);
        if self.cone.contains(candidate.start_position, candidate.to_position) {
            Some(d)
        } else {
            Some(self.wander_distance + (self.wander_distance - d).max(0.0))
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct WanderState {
    ideal: Option<VertexRef>,
    best: Option<(VertexRef, f32)>,
}

struct WanderVisitor<'a> {
    agent: &'a AgentState,
    bodies: &'a dyn NearbyBodies,
    config: &'a WanderConfig,
    cone: WanderCone,
    start: VertexRef,
    origin: Vec3,
    rng: &'a mut StdRng,
    state: &'a mut WanderState,
}

impl WanderVisitor<'_> {
    fn is_clear(&self, position: Vec3) -> bool {
        self.bodies
            .bodies_near(position, self.agent.radius)
            .iter()
            .all(|body| body.owner == Some(self.agent.id))
    }
}

impl TraversalVisitor for WanderVisitor<'_> {
    fn process_vertex(&mut self, graph: &GraphManager, vertex: VertexRef) -> bool {
        // Yielded first, again after every restart
        if vertex == self.start {
            *self.state = WanderState::default();
            return true;
        }
        let Ok(position) = graph.vertex_position(vertex) else {
            return true;
        };
        if !self.is_clear(position) {
            return true;
        }

        let d = distance(&self.origin, &position);
        let in_cone = self.cone.contains(self.origin, position);
        if in_cone && d >= self.config.wander_distance {
            self.state.ideal = Some(vertex);
            return false;
        }

        let mut score = (d / self.config.wander_distance).min(1.0);
        if in_cone {
            score += 1.0;
        }
        if self.config.random_factor > 0.0 {
            score += self.rng.gen::<f32>() * self.config.random_factor;
        }
        if self.state.best.map_or(true, |(_, best)| score > best) {
            self.state.best = Some((vertex, score));
        }
        true
    }
}

/// Time-sliced search for a wander destination
#[derive(Debug)]
pub struct WanderSearch {
    config: WanderConfig,
    traversal: PropagationTraversal,
    rng: StdRng,
    cone: WanderCone,
    origin: Vec3,
    state: WanderState,
}

impl WanderSearch {
    pub fn new(config: WanderConfig) -> Result<Self> {
        config.validate()?;
        let propagation = PropagationTraversalConfig {
            max_distance: config.search_radius,
            task: config.task,
            ..Default::default()
        };
        Ok(Self {
            traversal: PropagationTraversal::new(propagation)?,
            rng: StdRng::seed_from_u64(config.seed),
            cone: WanderCone::new(Vec3::ZERO, 360.0),
            origin: Vec3::ZERO,
            state: WanderState::default(),
            config,
        })
    }

    pub fn config(&self) -> &WanderConfig {
        &self.config
    }

    /// Starts searching from `start` along the agent's facing; false if the
    /// vertex is not loaded
    pub fn start(&mut self, graph: &GraphManager, agent: &AgentState, start: VertexRef) -> bool {
        self.state = WanderState::default();
        let Ok(origin) = graph.vertex_position(start) else {
            return false;
        };
        self.origin = origin;
        self.cone = WanderCone::new(agent.orientation, self.config.propagation_angle);
        self.traversal.set_evaluator(Arc::new(WanderBias {
            cone: self.cone,
            wander_distance: self.config.wander_distance,
        }));
        self.traversal.set_start(start);
        self.traversal.start(graph)
    }

    pub fn run(
        &mut self,
        graph: &GraphManager,
        agent: &AgentState,
        bodies: &dyn NearbyBodies,
        budget: &mut dyn TimeBudget,
    ) -> TraversalState {
        let mut visitor = WanderVisitor {
            agent,
            bodies,
            config: &self.config,
            cone: self.cone,
            start: self.traversal.start_vertex(),
            origin: self.origin,
            rng: &mut self.rng,
            state: &mut self.state,
        };
        self.traversal.traverse_vertices(graph, budget, &mut visitor)
    }

    /// The ideal vertex when one was found, the best scored one otherwise
    pub fn destination(&self) -> Option<VertexRef> {
        self.state.ideal.or(self.state.best.map(|(vertex, _)| vertex))
    }

    /// Whether the destination lies in the cone at the full wander distance
    pub fn found_ideal(&self) -> bool {
        self.state.ideal.is_some()
    }

    pub fn state(&self) -> TraversalState {
        self.traversal.state()
    }

    pub fn stop(&mut self) {
        self.traversal.stop();
    }
}

/// Runs a whole wander search in one call
pub fn find_wander_destination(
    graph: &GraphManager,
    agent: &AgentState,
    start: VertexRef,
    bodies: &dyn NearbyBodies,
    config: WanderConfig,
) -> Result<Option<VertexRef>> {
    let mut search = WanderSearch::new(WanderConfig { task: None, ..config })?;
    if !search.start(graph, agent, start) {
        return Err(Error::Traversal(format!("cannot start a wander search from {}", start)));
    }
    search.run(graph, agent, bodies, &mut UnlimitedBudget);
    Ok(search.destination())
}
