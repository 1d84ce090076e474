//! Cell-streamed spatial graph and resumable traversals
//!
//! The graph is loaded cell by cell at runtime. Searches over it are
//! time-sliced: each traversal performs a bounded amount of work per frame,
//! pauses when its task runs out of budget, and resumes later from exactly
//! where it stopped.
//!
//! # Example
//!
//! ```rust,ignore
//! use navgraph::{AstarTraversal, AstarTraversalConfig, GraphTraversal, GridGraphBuilder, StepBudget, TaskId};
//!
//! let grid = GridGraphBuilder::new(16, 16).with_cell_size(4);
//! let graph = grid.build()?;
//!
//! let mut search = AstarTraversal::new(AstarTraversalConfig::default().with_task(TaskId(0)))?;
//! search.set_endpoints(grid.vertex_at(&graph, 0, 0)?, Some(grid.vertex_at(&graph, 15, 15)?));
//! search.start(&graph);
//!
//! let mut budget = StepBudget::new(32);
//! while search.run(&graph, &mut budget) == TraversalState::Paused {
//!     budget.new_frame();
//! }
//! let path = search.build_path(&graph)?;
//! ```

mod astar_context;
mod astar_traversal;
mod cell_format;
mod constraint;
mod graph;
mod graph_ref;
mod grid;
mod path;
mod propagation_traversal;
mod status;
mod time_budget;
mod traversal;
mod traversal_manager;
mod two_bits_status;

pub use astar_context::{
    AstarContext, CandidateUpdate, ExploredCell, ResizeObserver, ResizeObserverId, NO_PREDECESSOR,
};
pub use astar_traversal::{find_path, AstarTraversal, AstarTraversalConfig, SearchOutcome};
pub use cell_format::{
    load_cell_from_binary, load_cells_from_binary, save_cell_to_binary, save_cells_to_binary,
    CELL_MAGIC, CELL_VERSION, GRAPH_MAGIC, GRAPH_VERSION,
};
pub use constraint::{
    Constraint, EdgeCostQuery, EuclideanHeuristic, ForbiddenTerrainConstraint, Heuristic,
    ShortestPathConstraint, SphereConstraint, ZeroHeuristic,
};
pub use graph::{
    EdgeData, GraphCell, GraphCellData, GraphEdge, GraphManager, GraphParams, GraphVertex,
    PathObjectLink, TerrainMask, TerrainType, VertexData, TERRAIN_ALL, TERRAIN_DEFAULT,
};
pub use graph_ref::{
    decode_ref, encode_ref, AgentId, CellRef, EdgeRef, TeamId, VertexRef, VertexUid,
    MAX_CELL_SLOTS,
};
pub use grid::GridGraphBuilder;
pub use path::{Path, PathIter, PathNode, PathNodeId};
pub use propagation_traversal::{
    AccumulatedLength, DistanceFromStart, EdgeEvaluation, EdgeEvaluator, PropagationTraversal,
    PropagationTraversalConfig,
};
pub use status::Status;
pub use time_budget::{ClockBudget, StepBudget, TaskId, TaskRegistry, TimeBudget, UnlimitedBudget};
pub use traversal::{
    GraphTraversal, NoopVisitor, Requester, TraversalCore, TraversalState, TraversalVisitor,
};
pub use traversal_manager::{
    TraversalConfigId, TraversalHandle, TraversalManager, TraversalManagerConfig,
    TraversalPoolConfig,
};
pub use two_bits_status::{TwoBitsVerticesStatus, VertexStatus};

#[cfg(test)]
mod test_graph_helpers;

#[cfg(test)]
mod astar_search_tests;
