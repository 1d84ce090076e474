//! Time-sliced A* search
//!
//! [`AstarTraversal`] relaxes one edge per unit of work. The search keeps all
//! of its state in an [`AstarContext`], so a paused search resumes with the
//! next edge. Before each resume the search compares the stitched versions of
//! the cells it explored with the live graph and restarts when they changed.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;

use navgraph_common::{distance, Error, Result, Vec3};

use super::astar_context::{AstarContext, CandidateUpdate};
use super::constraint::{Constraint, EdgeCostQuery, EuclideanHeuristic, Heuristic, ShortestPathConstraint};
use super::graph::{GraphManager, TerrainMask, TERRAIN_ALL};
use super::graph_ref::{AgentId, EdgeRef, VertexRef};
use super::path::Path;
use super::time_budget::{TaskId, TimeBudget, UnlimitedBudget};
use super::traversal::{GraphTraversal, NoopVisitor, TraversalCore, TraversalState};
use super::two_bits_status::VertexStatus;
use super::Status;

/// Configuration for A* searches
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct AstarTraversalConfig {
    /// Vertices farther than this from the start are never opened
    pub max_distance: Option<f32>,
    /// Vertices whose cost from the start exceeds this are never opened
    pub max_cost: Option<f32>,
    /// Terrain types the search may enter
    pub allowed_terrain: TerrainMask,
    /// Task the search is time-sliced under; `None` runs to completion
    pub task: Option<TaskId>,
}

impl Default for AstarTraversalConfig {
    fn default() -> Self {
        Self {
            max_distance: None,
            max_cost: None,
            allowed_terrain: TERRAIN_ALL,
            task: None,
        }
    }
}

impl AstarTraversalConfig {
    pub fn with_max_distance(mut self, max_distance: f32) -> Self {
        self.max_distance = Some(max_distance);
        self
    }

    pub fn with_max_cost(mut self, max_cost: f32) -> Self {
        self.max_cost = Some(max_cost);
        self
    }

    pub fn with_allowed_terrain(mut self, allowed_terrain: TerrainMask) -> Self {
        self.allowed_terrain = allowed_terrain;
        self
    }

    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(d) = self.max_distance {
            if d.is_nan() || d <= 0.0 {
                return Err(Error::Config(format!("max_distance must be positive, got {}", d)));
            }
        }
        if let Some(c) = self.max_cost {
            if c.is_nan() || c < 0.0 {
                return Err(Error::Config(format!("max_cost must not be negative, got {}", c)));
            }
        }
        if self.allowed_terrain == 0 {
            return Err(Error::Config("allowed_terrain must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Result of an A* search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchOutcome {
    /// Not started or not finished
    InProgress,
    /// The destination was closed
    Found,
    /// The open list ran out without reaching the destination
    Unreachable,
    /// The open list ran out after the distance or cost ceiling pruned vertices
    BoundExceeded,
    /// The visitor stopped the search or it was stopped
    Interrupted,
    /// Start or destination disappeared from the graph
    Invalidated,
}

impl SearchOutcome {
    pub fn is_found(&self) -> bool {
        *self == SearchOutcome::Found
    }

    /// Equivalent status code
    pub fn status(&self) -> Status {
        match self {
            SearchOutcome::InProgress => Status::InProgress,
            SearchOutcome::Found => Status::Success,
            SearchOutcome::Unreachable => Status::Unreachable,
            SearchOutcome::BoundExceeded => Status::BoundExceeded,
            SearchOutcome::Interrupted => Status::Failure,
            SearchOutcome::Invalidated => Status::StaleReference,
        }
    }
}

/// Resumable A* search between two vertices
///
/// Without a destination the search expands the whole reachable area in cost
/// order, which is how "reachable within cost" queries are answered.
pub struct AstarTraversal {
    core: TraversalCore,
    config: AstarTraversalConfig,
    context: AstarContext,
    constraint: Arc<dyn Constraint>,
    heuristic: Arc<dyn Heuristic>,

    start: VertexRef,
    dest: Option<VertexRef>,
    agent: Option<AgentId>,
    start_position: Vec3,
    dest_position: Option<Vec3>,

    /// Closed vertex whose edges are being relaxed, with its A* id
    current: Option<(VertexRef, u32)>,
    pending_edges: VecDeque<EdgeRef>,
    dest_closed: bool,
    bound_hit: bool,
    outcome: SearchOutcome,
    restarts: u32,
}

impl std::fmt::Debug for AstarTraversal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AstarTraversal")
            .field("state", &self.core.state())
            .field("start", &self.start)
            .field("dest", &self.dest)
            .field("outcome", &self.outcome)
            .field("context", &self.context)
            .finish()
    }
}

impl AstarTraversal {
    /// Creates a search using shortest-path costs and the Euclidean heuristic
    pub fn new(config: AstarTraversalConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            core: TraversalCore::new(config.task),
            config,
            context: AstarContext::default(),
            constraint: Arc::new(ShortestPathConstraint::new()),
            heuristic: Arc::new(EuclideanHeuristic::default()),
            start: VertexRef::NULL,
            dest: None,
            agent: None,
            start_position: Vec3::ZERO,
            dest_position: None,
            current: None,
            pending_edges: VecDeque::new(),
            dest_closed: false,
            bound_hit: false,
            outcome: SearchOutcome::InProgress,
            restarts: 0,
        })
    }

    pub fn with_constraint(mut self, constraint: Arc<dyn Constraint>) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn with_heuristic(mut self, heuristic: Arc<dyn Heuristic>) -> Self {
        self.heuristic = heuristic;
        self
    }

    pub fn set_constraint(&mut self, constraint: Arc<dyn Constraint>) {
        self.constraint = constraint;
    }

    pub fn set_heuristic(&mut self, heuristic: Arc<dyn Heuristic>) {
        self.heuristic = heuristic;
    }

    /// Sets the endpoints of the next search; takes effect on `start()`
    pub fn set_endpoints(&mut self, start: VertexRef, dest: Option<VertexRef>) {
        self.start = start;
        self.dest = dest;
    }

    pub fn set_start(&mut self, start: VertexRef) {
        self.start = start;
    }

    /// Without a destination the search closes vertices in cost order until exhausted
    pub fn set_destination(&mut self, dest: Option<VertexRef>) {
        self.dest = dest;
    }

    pub fn set_allowed_terrain(&mut self, allowed_terrain: TerrainMask) {
        self.config.allowed_terrain = allowed_terrain;
    }

    pub fn set_agent(&mut self, agent: Option<AgentId>) {
        self.agent = agent;
    }

    pub fn config(&self) -> &AstarTraversalConfig {
        &self.config
    }

    /// Replaces the configuration; takes effect on `start()`
    pub fn set_config(&mut self, config: AstarTraversalConfig) -> Result<()> {
        config.validate()?;
        self.core.set_task(config.task);
        self.config = config;
        Ok(())
    }

    pub fn context(&self) -> &AstarContext {
        &self.context
    }

    /// Mutable access to the context, for registering resize observers
    pub fn context_mut(&mut self) -> &mut AstarContext {
        &mut self.context
    }

    pub fn outcome(&self) -> SearchOutcome {
        self.outcome
    }

    pub fn start_vertex(&self) -> VertexRef {
        self.start
    }

    pub fn destination(&self) -> Option<VertexRef> {
        self.dest
    }

    /// Times the search restarted because explored cells changed
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Runs the search with a budget and no visitor
    pub fn run(&mut self, graph: &GraphManager, budget: &mut dyn TimeBudget) -> TraversalState {
        self.traverse_edges(graph, budget, &mut NoopVisitor)
    }

    fn reset_search(&mut self) {
        self.current = None;
        self.pending_edges.clear();
        self.dest_closed = false;
        self.bound_hit = false;
        self.outcome = SearchOutcome::InProgress;
    }

    fn finish(&mut self, outcome: SearchOutcome) {
        self.outcome = outcome;
        self.core.set_state(TraversalState::Finished);
        log::debug!(
            "A* search from {} finished with {:?} ({} edges, {} open)",
            self.start,
            outcome,
            self.core.processed_edges(),
            self.context.open_len()
        );
    }

    fn finish_exhausted(&mut self) {
        if self.bound_hit {
            self.finish(SearchOutcome::BoundExceeded);
        } else {
            self.finish(SearchOutcome::Unreachable);
        }
    }

    /// Closes the best open vertex and queues its edges
    ///
    /// The destination is closed but not expanded.
    fn expand_next(&mut self, graph: &GraphManager) -> Option<VertexRef> {
        let id = self.context.pop_best_candidate()?;
        let vertex = self.context.vertex_ref(id);

        if Some(vertex) == self.dest {
            self.dest_closed = true;
            self.current = None;
            return Some(vertex);
        }

        self.current = Some((vertex, id));
        if let Ok(edges) = graph.out_edges(vertex) {
            self.pending_edges.extend(edges);
        }
        Some(vertex)
    }

    fn relax(&mut self, graph: &GraphManager, edge: EdgeRef) {
        let Some((from, from_id)) = self.current else {
            return;
        };
        // Destination cell not stitched
        let Some(to) = graph.edge_target(edge) else {
            return;
        };
        let Ok(target) = graph.vertex(to) else {
            return;
        };
        let to_id = target.astar_id();
        if to_id >= self.context.max_vertex_count() {
            self.context.allocate(graph.astar_id_capacity());
        }
        if self.context.status(to_id) == VertexStatus::Closed {
            return;
        }
        if target.terrain() & self.config.allowed_terrain == 0 {
            return;
        }

        let to_position = target.position();
        if let Some(max_distance) = self.config.max_distance {
            if distance(&self.start_position, &to_position) > max_distance {
                self.bound_hit = true;
                return;
            }
        }

        let from_position = match graph.vertex_position(from) {
            Ok(p) => p,
            Err(_) => return,
        };
        let query = EdgeCostQuery {
            agent: self.agent,
            edge,
            from,
            to,
            from_position,
            to_position,
            to_terrain: target.terrain(),
        };
        let Some(cost) = self.constraint.cost(&query) else {
            return;
        };
        debug_assert!(cost >= 0.0, "negative edge cost {}", cost);

        let g = self.context.cost_from_start(from_id) + cost.max(0.0);
        if let Some(max_cost) = self.config.max_cost {
            if g > max_cost {
                self.bound_hit = true;
                return;
            }
        }

        let h = match self.dest_position {
            Some(dest) => self.heuristic.estimate(self.agent, to_position, dest),
            None => 0.0,
        };
        if self.context.process_candidate(to, to_id, h, g, Some(from_id)) == CandidateUpdate::Opened {
            if let Some(cell) = graph.cell_of(to) {
                self.context.add_explored_cell(graph, cell);
            }
        }
    }

    fn relax_pending(&mut self, graph: &GraphManager) {
        while let Some(edge) = self.pending_edges.pop_front() {
            self.relax(graph, edge);
        }
    }

    /// Path from the start to the destination of a successful search
    pub fn build_path(&self, graph: &GraphManager) -> Result<Path> {
        match (self.outcome, self.dest) {
            (SearchOutcome::Found, Some(dest)) => self.path_to(graph, dest),
            (SearchOutcome::InProgress, _) => Err(Error::Traversal(Status::InProgress.to_string())),
            (outcome, _) => Err(Error::Pathfinding(outcome.status().to_string())),
        }
    }

    /// Path from the start to any vertex closed by the search
    pub fn path_to(&self, graph: &GraphManager, vertex: VertexRef) -> Result<Path> {
        if self.cost_to(graph, vertex).is_none() {
            return Err(Error::Pathfinding(Status::NotFound.to_string()));
        }
        let mut path = Path::new();
        if !self.context.construct_path(graph, &mut path, self.start, vertex) {
            return Err(Error::Pathfinding(Status::DataCorrupted.to_string()));
        }
        Ok(path)
    }

    /// Final cost of a vertex closed by the search
    pub fn cost_to(&self, graph: &GraphManager, vertex: VertexRef) -> Option<f32> {
        let id = graph.astar_id(vertex)?;
        if id >= self.context.max_vertex_count()
            || self.context.status(id) != VertexStatus::Closed
            || self.context.vertex_ref(id) != vertex
        {
            return None;
        }
        Some(self.context.cost_from_start(id))
    }
}

impl GraphTraversal for AstarTraversal {
    fn core(&self) -> &TraversalCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TraversalCore {
        &mut self.core
    }

    fn start(&mut self, graph: &GraphManager) -> bool {
        self.reset_search();
        self.core.reset_counters();

        if !self.context.reinit_astar(
            graph,
            self.start,
            self.dest,
            self.agent,
            self.config.allowed_terrain,
        ) {
            log::warn!("Cannot start A* search from {} to {:?}", self.start, self.dest);
            self.outcome = SearchOutcome::Invalidated;
            self.core.set_state(TraversalState::Idle);
            return false;
        }

        let (Ok(start_position), Some(start_id)) =
            (graph.vertex_position(self.start), graph.astar_id(self.start))
        else {
            self.outcome = SearchOutcome::Invalidated;
            self.core.set_state(TraversalState::Idle);
            return false;
        };
        self.start_position = start_position;
        self.dest_position = self.dest.and_then(|d| graph.vertex_position(d).ok());

        let h = match self.dest_position {
            Some(dest) => self.heuristic.estimate(self.agent, start_position, dest),
            None => 0.0,
        };
        self.context.process_candidate(self.start, start_id, h, 0.0, None);
        if let Some(cell) = graph.cell_of(self.start) {
            self.context.add_explored_cell(graph, cell);
        }

        self.core.set_state(TraversalState::Running);
        log::debug!("A* search started from {} to {:?}", self.start, self.dest);
        true
    }

    fn stop(&mut self) {
        if self.core.state() == TraversalState::Running || self.core.state() == TraversalState::Paused {
            self.outcome = SearchOutcome::Interrupted;
        }
        self.context.clear();
        self.current = None;
        self.pending_edges.clear();
        self.core.set_state(TraversalState::Idle);
    }

    fn edge_to_process(&mut self, graph: &GraphManager) -> Option<EdgeRef> {
        loop {
            if let Some(edge) = self.pending_edges.pop_front() {
                self.relax(graph, edge);
                return Some(edge);
            }
            if self.dest_closed {
                self.finish(SearchOutcome::Found);
                return None;
            }
            if self.expand_next(graph).is_none() {
                self.finish_exhausted();
                return None;
            }
        }
    }

    fn vertex_to_process(&mut self, graph: &GraphManager) -> Option<VertexRef> {
        // Edges left over from an edge-mode step
        self.relax_pending(graph);

        if self.dest_closed {
            self.finish(SearchOutcome::Found);
            return None;
        }
        match self.expand_next(graph) {
            Some(vertex) => {
                self.relax_pending(graph);
                Some(vertex)
            }
            None => {
                self.finish_exhausted();
                None
            }
        }
    }

    fn revalidate(&mut self, graph: &GraphManager) {
        if self.context.explored_cells_still_stitched(graph) {
            return;
        }

        self.restarts += 1;
        log::debug!("Explored cells changed, restarting A* search from {}", self.start);
        if !self.start(graph) {
            self.outcome = SearchOutcome::Invalidated;
            self.core.set_state(TraversalState::Finished);
        }
    }

    fn on_interrupted(&mut self) {
        self.outcome = SearchOutcome::Interrupted;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Runs a complete search and returns its outcome with the path, if found
pub fn find_path(
    graph: &GraphManager,
    start: VertexRef,
    dest: VertexRef,
    constraint: Arc<dyn Constraint>,
    heuristic: Arc<dyn Heuristic>,
    config: AstarTraversalConfig,
) -> Result<(SearchOutcome, Option<Path>)> {
    let mut search = AstarTraversal::new(AstarTraversalConfig { task: None, ..config })?
        .with_constraint(constraint)
        .with_heuristic(heuristic);
    search.set_endpoints(start, Some(dest));

    if !search.start(graph) {
        return Err(Error::Traversal(Status::InvalidParam.to_string()));
    }
    search.run(graph, &mut UnlimitedBudget);

    match search.outcome() {
        SearchOutcome::Found => {
            let path = search.build_path(graph)?;
            Ok((SearchOutcome::Found, Some(path)))
        }
        outcome => Ok((outcome, None)),
    }
}
