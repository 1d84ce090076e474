//! Bounded best-first propagation from a start vertex
//!
//! The propagation visits the neighbourhood of a start vertex in the order
//! given by an [`EdgeEvaluator`], by default the straight-line distance of an
//! edge's destination from the start. Destinations farther than
//! `max_distance` are never queued. Among equal evaluations, edges queued
//! first are processed first.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use navgraph_common::{distance, distance_squared, Error, Result, Vec3};

use super::astar_context::ExploredCell;
use super::graph::GraphManager;
use super::graph_ref::{EdgeRef, VertexRef};
use super::time_budget::TaskId;
use super::traversal::{GraphTraversal, TraversalCore, TraversalState};

/// Configuration for propagation traversals
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PropagationTraversalConfig {
    /// Hard cut-off on the straight-line distance from the start
    pub max_distance: f32,
    /// Yield a vertex again each time a new edge reaches it
    pub allow_duplicate_vertices: bool,
    pub task: Option<TaskId>,
}

impl Default for PropagationTraversalConfig {
    fn default() -> Self {
        Self {
            max_distance: 20.0,
            allow_duplicate_vertices: false,
            task: None,
        }
    }
}

impl PropagationTraversalConfig {
    pub fn with_max_distance(mut self, max_distance: f32) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_duplicate_vertices(mut self, allow: bool) -> Self {
        self.allow_duplicate_vertices = allow;
        self
    }

    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.max_distance.is_finite() && self.max_distance > 0.0) {
            return Err(Error::Config(format!(
                "max_distance must be positive, got {}",
                self.max_distance
            )));
        }
        Ok(())
    }
}

/// One candidate edge as seen by an [`EdgeEvaluator`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeEvaluation {
    pub edge: EdgeRef,
    pub from: VertexRef,
    pub to: VertexRef,
    pub start_position: Vec3,
    pub from_position: Vec3,
    pub to_position: Vec3,
    /// Evaluation that reached `from`, zero for the start vertex
    pub from_value: f32,
}

/// Orders the propagation; lower values are processed first
pub trait EdgeEvaluator: Send + Sync {
    /// Priority of an edge, or `None` to skip it
    fn evaluate(&self, candidate: &EdgeEvaluation) -> Option<f32>;
}

/// Straight-line distance of the edge's destination from the start
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceFromStart;

impl EdgeEvaluator for DistanceFromStart {
    fn evaluate(&self, candidate: &EdgeEvaluation) -> Option<f32> {
        Some(distance(&candidate.start_position, &candidate.to_position))
    }
}

/// Length travelled along edges, giving Dijkstra order
#[derive(Debug, Clone, Copy, Default)]
pub struct AccumulatedLength;

impl EdgeEvaluator for AccumulatedLength {
    fn evaluate(&self, candidate: &EdgeEvaluation) -> Option<f32> {
        Some(candidate.from_value + distance(&candidate.from_position, &candidate.to_position))
    }
}

#[derive(Debug, Clone, Copy)]
struct FrontierEntry {
    value: f32,
    seq: u64,
    edge: EdgeRef,
    to: VertexRef,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierEntry {}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap: lowest value, then oldest entry
        other
            .value
            .total_cmp(&self.value)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Resumable best-first exploration around a start vertex
pub struct PropagationTraversal {
    core: TraversalCore,
    config: PropagationTraversalConfig,
    evaluator: Arc<dyn EdgeEvaluator>,
    start: VertexRef,
    start_position: Vec3,
    frontier: BinaryHeap<FrontierEntry>,
    next_seq: u64,
    reached: HashMap<VertexRef, f32>,
    processed: HashSet<EdgeRef>,
    start_emitted: bool,
    explored_cells: Vec<ExploredCell>,
    restarts: u32,
}

impl std::fmt::Debug for PropagationTraversal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropagationTraversal")
            .field("state", &self.core.state())
            .field("start", &self.start)
            .field("frontier", &self.frontier.len())
            .field("reached", &self.reached.len())
            .finish()
    }
}

impl PropagationTraversal {
    pub fn new(config: PropagationTraversalConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            core: TraversalCore::new(config.task),
            config,
            evaluator: Arc::new(DistanceFromStart),
            start: VertexRef::NULL,
            start_position: Vec3::ZERO,
            frontier: BinaryHeap::new(),
            next_seq: 0,
            reached: HashMap::new(),
            processed: HashSet::new(),
            start_emitted: false,
            explored_cells: Vec::new(),
            restarts: 0,
        })
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn EdgeEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn set_evaluator(&mut self, evaluator: Arc<dyn EdgeEvaluator>) {
        self.evaluator = evaluator;
    }

    /// Sets the start of the next propagation; takes effect on `start()`
    pub fn set_start(&mut self, start: VertexRef) {
        self.start = start;
    }

    pub fn start_vertex(&self) -> VertexRef {
        self.start
    }

    pub fn config(&self) -> &PropagationTraversalConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: PropagationTraversalConfig) -> Result<()> {
        config.validate()?;
        self.core.set_task(config.task);
        self.config = config;
        Ok(())
    }

    /// Evaluation at which a vertex was first reached
    pub fn reached_value(&self, vertex: VertexRef) -> Option<f32> {
        self.reached.get(&vertex).copied()
    }

    pub fn reached_count(&self) -> usize {
        self.reached.len()
    }

    /// Times the propagation restarted because explored cells changed
    ///
    /// A restart yields the start vertex and its neighbourhood again.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn reached_vertices(&self) -> impl Iterator<Item = (VertexRef, f32)> + '_ {
        self.reached.iter().map(|(v, value)| (*v, *value))
    }

    fn clear(&mut self) {
        self.frontier.clear();
        self.next_seq = 0;
        self.reached.clear();
        self.processed.clear();
        self.start_emitted = false;
        self.explored_cells.clear();
    }

    fn record_cell(&mut self, graph: &GraphManager, vertex: VertexRef) {
        let Some(cell) = graph.cell_of(vertex) else {
            return;
        };
        if self.explored_cells.iter().any(|c| c.cell == cell) {
            return;
        }
        if let Some(stitched_version) = graph.cell_stitched_version(cell) {
            self.explored_cells.push(ExploredCell {
                cell,
                stitched_version,
            });
        }
    }

    fn queue_out_edges(&mut self, graph: &GraphManager, from: VertexRef, from_value: f32) {
        let Ok(from_position) = graph.vertex_position(from) else {
            return;
        };
        let Ok(edges) = graph.out_edges(from) else {
            return;
        };
        let max_distance_sqr = self.config.max_distance * self.config.max_distance;

        for edge in edges {
            let Some(to) = graph.edge_target(edge) else {
                continue;
            };
            if !self.config.allow_duplicate_vertices && self.reached.contains_key(&to) {
                continue;
            }
            let Ok(to_position) = graph.vertex_position(to) else {
                continue;
            };
            if distance_squared(&self.start_position, &to_position) > max_distance_sqr {
                continue;
            }

            let candidate = EdgeEvaluation {
                edge,
                from,
                to,
                start_position: self.start_position,
                from_position,
                to_position,
                from_value,
            };
            let Some(value) = self.evaluator.evaluate(&candidate) else {
                continue;
            };

            self.frontier.push(FrontierEntry {
                value,
                seq: self.next_seq,
                edge,
                to,
            });
            self.next_seq += 1;
        }
    }

    /// Pops the next edge and reports whether its destination was new
    fn next_edge(&mut self, graph: &GraphManager) -> Option<(EdgeRef, VertexRef, bool)> {
        while let Some(entry) = self.frontier.pop() {
            if !self.processed.insert(entry.edge) {
                continue;
            }
            let first_visit = !self.reached.contains_key(&entry.to);
            if !first_visit && !self.config.allow_duplicate_vertices {
                continue;
            }
            if first_visit {
                self.reached.insert(entry.to, entry.value);
                self.record_cell(graph, entry.to);
                self.queue_out_edges(graph, entry.to, entry.value);
            }
            return Some((entry.edge, entry.to, first_visit));
        }
        None
    }
}

impl GraphTraversal for PropagationTraversal {
    fn core(&self) -> &TraversalCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TraversalCore {
        &mut self.core
    }

    fn start(&mut self, graph: &GraphManager) -> bool {
        self.clear();
        self.core.reset_counters();

        let Ok(start_position) = graph.vertex_position(self.start) else {
            log::warn!("Cannot start propagation from {}", self.start);
            self.core.set_state(TraversalState::Idle);
            return false;
        };
        self.start_position = start_position;
        self.reached.insert(self.start, 0.0);
        self.record_cell(graph, self.start);
        self.queue_out_edges(graph, self.start, 0.0);

        self.core.set_state(TraversalState::Running);
        log::debug!(
            "Propagation started from {} within {}",
            self.start,
            self.config.max_distance
        );
        true
    }

    fn stop(&mut self) {
        self.clear();
        self.core.set_state(TraversalState::Idle);
    }

    fn edge_to_process(&mut self, graph: &GraphManager) -> Option<EdgeRef> {
        self.next_edge(graph).map(|(edge, _, _)| edge)
    }

    fn vertex_to_process(&mut self, graph: &GraphManager) -> Option<VertexRef> {
        if !self.start_emitted {
            self.start_emitted = true;
            return Some(self.start);
        }
        // With duplicates allowed every edge yields its destination
        self.next_edge(graph).map(|(_, to, _)| to)
    }

    fn revalidate(&mut self, graph: &GraphManager) {
        let unchanged = self
            .explored_cells
            .iter()
            .all(|c| graph.cell_stitched_version(c.cell) == Some(c.stitched_version));
        if unchanged {
            return;
        }

        self.restarts += 1;
        log::debug!("Explored cells changed, restarting propagation from {}", self.start);
        if !self.start(graph) {
            self.core.set_state(TraversalState::Finished);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridGraphBuilder;
    use crate::time_budget::{StepBudget, UnlimitedBudget};
    use crate::traversal::TraversalVisitor;

    #[derive(Default)]
    struct Record {
        vertices: Vec<VertexRef>,
        edges: Vec<EdgeRef>,
    }

    impl TraversalVisitor for Record {
        fn process_edge(&mut self, _graph: &GraphManager, edge: EdgeRef) -> bool {
            self.edges.push(edge);
            true
        }

        fn process_vertex(&mut self, _graph: &GraphManager, vertex: VertexRef) -> bool {
            self.vertices.push(vertex);
            true
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(PropagationTraversalConfig::default().validate().is_ok());
        assert!(PropagationTraversalConfig::default().with_max_distance(0.0).validate().is_err());
        assert!(PropagationTraversal::new(
            PropagationTraversalConfig::default().with_max_distance(f32::INFINITY)
        )
        .is_err());
    }

    #[test]
    fn test_vertices_in_distance_order_within_radius() -> Result<()> {
        let grid = GridGraphBuilder::new(7, 7);
        let graph = grid.build()?;
        let start = grid.vertex_at(&graph, 3, 3)?;

        let mut propagation =
            PropagationTraversal::new(PropagationTraversalConfig::default().with_max_distance(2.0))?;
        propagation.set_start(start);
        assert!(propagation.start(&graph));

        let mut record = Record::default();
        let state = propagation.traverse_vertices(&graph, &mut UnlimitedBudget, &mut record);
        assert_eq!(state, TraversalState::Finished);

        assert_eq!(record.vertices[0], start);
        let start_position = graph.vertex_position(start)?;
        let distances: Vec<f32> = record
            .vertices
            .iter()
            .map(|v| graph.vertex_position(*v).map(|p| distance(&start_position, &p)))
            .collect::<Result<_>>()?;
        assert!(distances.windows(2).all(|w| w[0] <= w[1] + 1e-5));
        assert!(distances.iter().all(|d| *d <= 2.0 + 1e-5));

        // Center, 4 at distance 1, 4 diagonals at sqrt(2), 4 at distance 2
        assert_eq!(record.vertices.len(), 13);
        let unique: HashSet<_> = record.vertices.iter().collect();
        assert_eq!(unique.len(), record.vertices.len());
        Ok(())
    }

    #[test]
    fn test_equal_values_are_fifo() -> Result<()> {
        let grid = GridGraphBuilder::new(3, 1);
        let graph = grid.build()?;
        let center = grid.vertex_at(&graph, 1, 0)?;

        let mut propagation = PropagationTraversal::new(PropagationTraversalConfig::default())?;
        propagation.set_start(center);
        assert!(propagation.start(&graph));

        let mut record = Record::default();
        propagation.traverse_edges(&graph, &mut UnlimitedBudget, &mut record);

        let expected: Vec<EdgeRef> = graph.out_edges(center)?.collect();
        assert_eq!(&record.edges[..2], &expected[..]);
        Ok(())
    }

    #[test]
    fn test_duplicate_vertices() -> Result<()> {
        let grid = GridGraphBuilder::new(2, 2);
        let graph = grid.build()?;
        let start = grid.vertex_at(&graph, 0, 0)?;

        let config = PropagationTraversalConfig::default().with_duplicate_vertices(true);
        let mut propagation = PropagationTraversal::new(config)?;
        propagation.set_start(start);
        assert!(propagation.start(&graph));

        let mut record = Record::default();
        propagation.traverse_vertices(&graph, &mut UnlimitedBudget, &mut record);

        // Every directed edge of the 2x2 square reaches its destination once
        assert_eq!(record.vertices.len(), 1 + 8);
        assert_eq!(propagation.reached_count(), 4);
        Ok(())
    }

    #[test]
    fn test_resumed_propagation_matches_single_run() -> Result<()> {
        let grid = GridGraphBuilder::new(6, 6);
        let graph = grid.build()?;
        let start = grid.vertex_at(&graph, 2, 2)?;
        let task = TaskId(4);

        let mut single = PropagationTraversal::new(PropagationTraversalConfig::default())?;
        single.set_start(start);
        assert!(single.start(&graph));
        let mut expected = Record::default();
        single.traverse_vertices(&graph, &mut UnlimitedBudget, &mut expected);

        let mut sliced = PropagationTraversal::new(PropagationTraversalConfig::default().with_task(task))?;
        sliced.set_start(start);
        assert!(sliced.start(&graph));
        let mut budget = StepBudget::new(3);
        let mut actual = Record::default();
        while sliced.traverse_vertices(&graph, &mut budget, &mut actual) == TraversalState::Paused {
            budget.new_frame();
        }

        assert_eq!(actual.vertices, expected.vertices);
        Ok(())
    }

    #[test]
    fn test_restart_when_explored_cell_changes() -> Result<()> {
        let grid = GridGraphBuilder::new(12, 4).with_cell_size(4);
        let mut graph = grid.build()?;
        let start = grid.vertex_at(&graph, 1, 1)?;

        let config = PropagationTraversalConfig::default().with_task(TaskId(2));
        let mut propagation = PropagationTraversal::new(config)?;
        propagation.set_start(start);
        assert!(propagation.start(&graph));

        let mut budget = StepBudget::new(3);
        let mut record = Record::default();
        assert_eq!(
            propagation.traverse_vertices(&graph, &mut budget, &mut record),
            TraversalState::Paused
        );
        assert_eq!(propagation.restarts(), 0);
        let before = record.vertices.len();

        let middle = graph.find_cell(1).ok_or(Error::Graph("missing cell".into()))?;
        graph.remove_cell(middle)?;

        budget.new_frame();
        while propagation.traverse_vertices(&graph, &mut budget, &mut record) == TraversalState::Paused {
            budget.new_frame();
        }

        assert_eq!(propagation.restarts(), 1);
        // The restarted propagation yields the start vertex again
        assert_eq!(record.vertices[before], start);
        assert_eq!(record.vertices.iter().filter(|v| **v == start).count(), 2);
        // Only the start cell is left connected
        assert_eq!(propagation.reached_count(), 16);
        Ok(())
    }

    #[test]
    fn test_accumulated_length() -> Result<()> {
        let grid = GridGraphBuilder::new(3, 3).without_edge((0, 0), (1, 0));
        let graph = grid.build()?;
        let start = grid.vertex_at(&graph, 0, 0)?;

        let mut propagation = PropagationTraversal::new(PropagationTraversalConfig::default())?
            .with_evaluator(Arc::new(AccumulatedLength));
        propagation.set_start(start);
        assert!(propagation.start(&graph));
        propagation.traverse_vertices(&graph, &mut UnlimitedBudget, &mut Record::default());

        // Detour through (0, 1) and (1, 1)
        assert_eq!(propagation.reached_value(grid.vertex_at(&graph, 1, 0)?), Some(3.0));
        Ok(())
    }
}
