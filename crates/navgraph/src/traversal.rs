//! Resumable graph traversals
//!
//! A traversal explores the graph one edge or one vertex at a time. Each call
//! to [`GraphTraversal::traverse_edges`] or [`GraphTraversal::traverse_vertices`]
//! keeps going until the traversal runs out of candidates, the visitor asks it
//! to stop, or the frame budget of its task is spent. In the last case the
//! traversal is `Paused` and the next call resumes exactly where it stopped.
//!
//! ```text
//! Idle --start()--> Running --budget spent--> Paused --traverse_*()--> Running
//!   ^                  |                                                  |
//!   +----stop()--------+-------- exhausted / visitor stop --> Finished <--+
//! ```

use std::any::Any;

use super::graph::GraphManager;
use super::graph_ref::{AgentId, EdgeRef, TeamId, VertexRef};
use super::time_budget::{TaskId, TimeBudget};

/// Lifecycle state of a traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraversalState {
    /// Not started or stopped
    Idle,
    /// Started and not yet paused
    Running,
    /// Waiting for the next frame
    Paused,
    /// Exhausted, interrupted by its visitor, or invalidated
    Finished,
}

/// Who currently owns a pooled traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Requester {
    Agent(AgentId),
    Team(TeamId),
    /// Any other identity chosen by the embedding application
    Opaque(u64),
}

/// State shared by every traversal implementation
#[derive(Debug, Clone)]
pub struct TraversalCore {
    state: TraversalState,
    task: Option<TaskId>,
    current_user: Option<Requester>,
    usage_status: u32,
    processed_edges: u64,
    processed_vertices: u64,
    step_calls: u64,
}

impl TraversalCore {
    /// Core bound to an optional time-slicing task; `None` runs to completion
    pub fn new(task: Option<TaskId>) -> Self {
        Self {
            state: TraversalState::Idle,
            task,
            current_user: None,
            usage_status: 0,
            processed_edges: 0,
            processed_vertices: 0,
            step_calls: 0,
        }
    }

    pub fn state(&self) -> TraversalState {
        self.state
    }

    pub fn set_state(&mut self, state: TraversalState) {
        self.state = state;
    }

    pub fn task(&self) -> Option<TaskId> {
        self.task
    }

    pub fn set_task(&mut self, task: Option<TaskId>) {
        self.task = task;
    }

    pub fn current_user(&self) -> Option<Requester> {
        self.current_user
    }

    pub fn set_current_user(&mut self, user: Option<Requester>) {
        self.current_user = user;
        self.usage_status = 0;
    }

    /// Frames elapsed since the owner last asked for this traversal
    pub fn usage_status(&self) -> u32 {
        self.usage_status
    }

    /// Marks the traversal as used by its owner this frame
    pub fn record_computation(&mut self) {
        self.usage_status = 0;
    }

    pub(crate) fn age(&mut self) -> u32 {
        self.usage_status = self.usage_status.saturating_add(1);
        self.usage_status
    }

    /// Edges handed to `process_edge` since the last start
    pub fn processed_edges(&self) -> u64 {
        self.processed_edges
    }

    /// Vertices handed to `process_vertex` since the last start
    pub fn processed_vertices(&self) -> u64 {
        self.processed_vertices
    }

    /// Calls to `traverse_*` since the last start
    pub fn step_calls(&self) -> u64 {
        self.step_calls
    }

    pub fn reset_counters(&mut self) {
        self.processed_edges = 0;
        self.processed_vertices = 0;
        self.step_calls = 0;
    }
}

/// Work done for each edge or vertex a traversal yields
///
/// Returning false stops the traversal.
pub trait TraversalVisitor {
    fn process_edge(&mut self, _graph: &GraphManager, _edge: EdgeRef) -> bool {
        true
    }

    fn process_vertex(&mut self, _graph: &GraphManager, _vertex: VertexRef) -> bool {
        true
    }
}

/// Visitor that accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopVisitor;

impl TraversalVisitor for NoopVisitor {}

#[derive(Clone, Copy)]
enum StepKind {
    Edge,
    Vertex,
}

/// A stateful, resumable exploration strategy
pub trait GraphTraversal: Any {
    fn core(&self) -> &TraversalCore;

    fn core_mut(&mut self) -> &mut TraversalCore;

    /// Discards any previous run and starts a new one
    ///
    /// Returns false, leaving the traversal `Idle`, if it cannot start.
    fn start(&mut self, graph: &GraphManager) -> bool;

    /// Discards the current run and returns to `Idle`
    fn stop(&mut self);

    /// Next edge to hand to the visitor, `None` once exhausted
    fn edge_to_process(&mut self, graph: &GraphManager) -> Option<EdgeRef>;

    /// Next vertex to hand to the visitor, `None` once exhausted
    fn vertex_to_process(&mut self, graph: &GraphManager) -> Option<VertexRef>;

    /// Called at the beginning of every step call, before any work
    ///
    /// Implementations check here that the graph they explored is still the
    /// same and restart or finish otherwise.
    fn revalidate(&mut self, _graph: &GraphManager) {}

    /// Called when the traversal finishes because candidates ran out
    fn on_exhausted(&mut self) {}

    /// Called when the visitor stops the traversal
    fn on_interrupted(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn state(&self) -> TraversalState {
        self.core().state()
    }

    fn is_process_over(&self) -> bool {
        self.core().state() == TraversalState::Finished
    }

    /// Processes edges until exhausted, stopped, or out of budget
    fn traverse_edges(
        &mut self,
        graph: &GraphManager,
        budget: &mut dyn TimeBudget,
        visitor: &mut dyn TraversalVisitor,
    ) -> TraversalState {
        drive(self, graph, budget, visitor, StepKind::Edge)
    }

    /// Processes vertices until exhausted, stopped, or out of budget
    fn traverse_vertices(
        &mut self,
        graph: &GraphManager,
        budget: &mut dyn TimeBudget,
        visitor: &mut dyn TraversalVisitor,
    ) -> TraversalState {
        drive(self, graph, budget, visitor, StepKind::Vertex)
    }
}

fn drive<T: GraphTraversal + ?Sized>(
    traversal: &mut T,
    graph: &GraphManager,
    budget: &mut dyn TimeBudget,
    visitor: &mut dyn TraversalVisitor,
    kind: StepKind,
) -> TraversalState {
    match traversal.core().state() {
        TraversalState::Idle | TraversalState::Finished => return traversal.core().state(),
        TraversalState::Running | TraversalState::Paused => {}
    }

    traversal.core_mut().set_state(TraversalState::Running);
    traversal.core_mut().step_calls += 1;
    traversal.revalidate(graph);
    if traversal.core().state() != TraversalState::Running {
        return traversal.core().state();
    }

    loop {
        if let Some(task) = traversal.core().task() {
            if !budget.has_time_left(task) {
                traversal.core_mut().set_state(TraversalState::Paused);
                return TraversalState::Paused;
            }
        }

        let keep_going = match kind {
            StepKind::Edge => match traversal.edge_to_process(graph) {
                Some(edge) => {
                    traversal.core_mut().processed_edges += 1;
                    visitor.process_edge(graph, edge)
                }
                None => break,
            },
            StepKind::Vertex => match traversal.vertex_to_process(graph) {
                Some(vertex) => {
                    traversal.core_mut().processed_vertices += 1;
                    visitor.process_vertex(graph, vertex)
                }
                None => break,
            },
        };

        if !keep_going {
            traversal.core_mut().set_state(TraversalState::Finished);
            traversal.on_interrupted();
            return TraversalState::Finished;
        }
    }

    if traversal.core().state() == TraversalState::Running {
        traversal.core_mut().set_state(TraversalState::Finished);
        traversal.on_exhausted();
    }
    traversal.core().state()
}
