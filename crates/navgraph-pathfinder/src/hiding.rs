//! Hiding spot search
//!
//! A propagation from the agent's vertex yields vertices nearest first. The
//! first vertex that no threat can see is the hiding spot.

use navgraph::{
    GraphManager, GraphTraversal, PropagationTraversal, PropagationTraversalConfig, TimeBudget,
    TraversalState, TraversalVisitor, UnlimitedBudget, VertexRef,
};
use navgraph_common::{Error, Result, Vec3};

/// Line-of-sight test supplied by the embedding world
pub trait Visibility: Send + Sync {
    fn is_visible(&self, from: Vec3, to: Vec3) -> bool;
}

/// Stops the propagation on the first vertex hidden from every threat
pub struct HidingSpotVisitor<'a> {
    threats: &'a [Vec3],
    visibility: &'a dyn Visibility,
    found: Option<VertexRef>,
}

impl<'a> HidingSpotVisitor<'a> {
    pub fn new(threats: &'a [Vec3], visibility: &'a dyn Visibility) -> Self {
        Self {
            threats,
            visibility,
            found: None,
        }
    }

    pub fn found(&self) -> Option<VertexRef> {
        self.found
    }
}

impl TraversalVisitor for HidingSpotVisitor<'_> {
    fn process_vertex(&mut self, graph: &GraphManager, vertex: VertexRef) -> bool {
        let Ok(position) = graph.vertex_position(vertex) else {
            return true;
        };
        let hidden = self
            .threats
            .iter()
            .all(|threat| !self.visibility.is_visible(*threat, position));
        if hidden {
            self.found = Some(vertex);
        }
        !hidden
    }
}

/// Time-sliced hiding spot search
#[derive(Debug)]
pub struct HidingSpotSearch {
    traversal: PropagationTraversal,
    found: Option<VertexRef>,
}

impl HidingSpotSearch {
    pub fn new(config: PropagationTraversalConfig) -> Result<Self> {
        Ok(Self {
            traversal: PropagationTraversal::new(config)?,
            found: None,
        })
    }

    /// Starts searching around `start`; false if the vertex is not loaded
    pub fn start(&mut self, graph: &GraphManager, start: VertexRef) -> bool {
        self.found = None;
        self.traversal.set_start(start);
        self.traversal.start(graph)
    }

    /// Resumes the search; `Finished` either with a spot or with none in range
    pub fn run(
        &mut self,
        graph: &GraphManager,
        threats: &[Vec3],
        visibility: &dyn Visibility,
        budget: &mut dyn TimeBudget,
    ) -> TraversalState {
        let mut visitor = HidingSpotVisitor::new(threats, visibility);
        let state = self.traversal.traverse_vertices(graph, budget, &mut visitor);
        if visitor.found.is_some() {
            self.found = visitor.found;
        }
        state
    }

    pub fn found(&self) -> Option<VertexRef> {
        self.found
    }

    pub fn state(&self) -> TraversalState {
        self.traversal.state()
    }

    pub fn stop(&mut self) {
        self.traversal.stop();
    }
}

/// Runs a whole hiding spot search in one call
pub fn find_hiding_spot(
    graph: &GraphManager,
    start: VertexRef,
    threats: &[Vec3],
    visibility: &dyn Visibility,
    config: PropagationTraversalConfig,
) -> Result<Option<VertexRef>> {
    let mut search = HidingSpotSearch::new(config)?;
    if !search.start(graph, start) {
        return Err(Error::Traversal(format!("cannot start a hiding spot search from {}", start)));
    }
    search.run(graph, threats, visibility, &mut UnlimitedBudget);
    Ok(search.found())
}
