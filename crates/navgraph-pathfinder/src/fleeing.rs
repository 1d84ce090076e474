//! Fleeing destination search
//!
//! An A* search without destination closes vertices in cost order around the
//! agent. Each closed vertex is scored by how dangerous it is; the search keeps
//! the safest one and stops as soon as a vertex out of every danger radius
//! turns up.

use navgraph::{
    AstarTraversal, AstarTraversalConfig, GraphManager, GraphTraversal, TimeBudget, TraversalState,
    TraversalVisitor, UnlimitedBudget, VertexRef,
};
use navgraph_common::{distance, Error, Result, Vec3};

/// Distances below this count as this close when scoring danger
const MIN_DANGER_DISTANCE: f32 = 0.1;

/// Something to get away from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DangerPoint {
    pub position: Vec3,
    /// The point is harmless beyond this distance
    pub radius: f32,
}

impl DangerPoint {
    /// Danger felt everywhere
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            radius: f32::MAX,
        }
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }
}

/// Sum of inverse distances to the dangers in range, zero when out of every range
pub fn danger_level(dangers: &[DangerPoint], position: Vec3) -> f32 {
    dangers
        .iter()
        .map(|danger| {
            let d = distance(&danger.position, &position);
            if d < danger.radius {
                1.0 / d.max(MIN_DANGER_DISTANCE)
            } else {
                0.0
            }
        })
        .sum()
}

#[derive(Debug, Clone, Copy, Default)]
struct FleeingState {
    safest: Option<(VertexRef, f32)>,
    start_level: Option<f32>,
}

/// Scores closed vertices and stops on the first safe one
///
/// Vertices with at most one way out are dead ends and never chosen.
struct FleeingVisitor<'a> {
    dangers: &'a [DangerPoint],
    start: VertexRef,
    state: &'a mut FleeingState,
}

impl TraversalVisitor for FleeingVisitor<'_> {
    fn process_vertex(&mut self, graph: &GraphManager, vertex: VertexRef) -> bool {
        let Ok(position) = graph.vertex_position(vertex) else {
            return true;
        };
        let level = danger_level(self.dangers, position);
        // The start is closed first, again after every restart
        if vertex == self.start {
            *self.state = FleeingState {
                safest: None,
                start_level: Some(level),
            };
        }

        let exits = graph.out_edges(vertex).map(|edges| edges.count()).unwrap_or(0);
        if exits <= 1 {
            return true;
        }
        if self.state.safest.map_or(true, |(_, best)| level < best) {
            self.state.safest = Some((vertex, level));
        }
        level > 0.0
    }
}

/// Time-sliced search for the safest reachable vertex
#[derive(Debug)]
pub struct FleeingSearch {
    traversal: AstarTraversal,
    state: FleeingState,
}

impl FleeingSearch {
    /// `config` bounds how far the agent may flee
    pub fn new(config: AstarTraversalConfig) -> Result<Self> {
        Ok(Self {
            traversal: AstarTraversal::new(config)?,
            state: FleeingState::default(),
        })
    }

    /// Starts searching around `start`; false if the vertex is not loaded
    pub fn start(&mut self, graph: &GraphManager, start: VertexRef) -> bool {
        self.state = FleeingState::default();
        self.traversal.set_endpoints(start, None);
        self.traversal.start(graph)
    }

    pub fn run(&mut self, graph: &GraphManager, dangers: &[DangerPoint], budget: &mut dyn TimeBudget) -> TraversalState {
        let start = self.traversal.start_vertex();
        let mut visitor = FleeingVisitor {
            dangers,
            start,
            state: &mut self.state,
        };
        let state = self.traversal.traverse_vertices(graph, budget, &mut visitor);
        if state == TraversalState::Finished {
            log::debug!(
                "Fleeing search from {} finished, danger {:?} -> {:?}",
                start,
                self.state.start_level,
                self.min_danger_level()
            );
        }
        state
    }

    /// Safest vertex found so far
    ///
    /// `None` while nothing beats a dangerous start. A safe start is its own
    /// answer.
    pub fn safest(&self) -> Option<VertexRef> {
        let (vertex, level) = self.state.safest?;
        let start_level = self.state.start_level?;
        (level == 0.0 || level < start_level).then_some(vertex)
    }

    /// Danger level of the safest vertex found so far
    pub fn min_danger_level(&self) -> Option<f32> {
        self.state.safest.map(|(_, level)| level)
    }

    pub fn start_danger_level(&self) -> Option<f32> {
        self.state.start_level
    }

    pub fn state(&self) -> TraversalState {
        self.traversal.state()
    }

    pub fn stop(&mut self) {
        self.traversal.stop();
    }
}

/// Runs a whole fleeing search in one call
pub fn find_fleeing_destination(
    graph: &GraphManager,
    start: VertexRef,
    dangers: &[DangerPoint],
    config: AstarTraversalConfig,
) -> Result<Option<VertexRef>> {
    let mut search = FleeingSearch::new(AstarTraversalConfig { task: None, ..config })?;
    if !search.start(graph, start) {
        return Err(Error::Traversal(format!("cannot start a fleeing search from {}", start)));
    }
    search.run(graph, dangers, &mut UnlimitedBudget);
    Ok(search.safest())
}
