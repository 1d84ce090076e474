//! Path planning and following for agents on a navgraph
//!
//! This crate drives agents over a cell-streamed [`navgraph`] graph. Each agent
//! owns a [`PathFinder`] that plans with a time-sliced A* search and follows
//! the resulting path through a pipeline of pluggable modifiers.
//!
//! # Features
//!
//! - **Modifier pipeline**: Every decision of the follow loop is a trait object
//!   that can be replaced per agent
//! - **Time slicing**: Searches and follow work share a per-frame budget
//! - **Streaming awareness**: Paths through unloaded cells are replanned
//! - **Taboo edges**: Blocked edges are remembered and avoided on replans
//! - **Hiding spots**: Nearest vertex hidden from a set of threats
//! - **Fleeing and wandering**: Destinations away from danger or ahead of the agent
//! - **Queueing**: Agents stop behind bodies already standing on their destination
//!
//! # Example
//!
//! ```rust,ignore
//! use navgraph::{AgentId, GridGraphBuilder, StepBudget};
//! use navgraph_pathfinder::{AgentState, FrameContext, Modifiers, NextMove, PathFinder, PathFinderConfig};
//!
//! let grid = GridGraphBuilder::new(16, 16).with_cell_size(4);
//! let graph = grid.build()?;
//!
//! let mut finder = PathFinder::new(PathFinderConfig::default(), Modifiers::default())?;
//! let mut agent = AgentState::new(AgentId(1), grid.position(0, 0));
//! let mut budget = StepBudget::new(64);
//!
//! loop {
//!     budget.new_frame();
//!     let mut frame = FrameContext::new(&graph, &mut budget, now, dt);
//!     match finder.find_next_move(&mut frame, &agent, grid.position(15, 15))? {
//!         NextMove::Move(action) => agent.apply(&action, dt),
//!         NextMove::Arrived => break,
//!         NextMove::Waiting | NextMove::NoPath => {}
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`PathFinder`]: Per-agent planning and following state
//! - [`Modifiers`]: The set of modifiers an agent uses
//! - [`ModifierRegistry`]: Builds [`Modifiers`] from named configurations
//! - [`TabooEdges`]: Edges the agent found blocked
//! - [`HidingSpotSearch`]: Resumable search for a vertex out of sight
//! - [`FleeingSearch`]: Resumable search for the safest vertex nearby
//! - [`WanderSearch`]: Resumable search for a vertex ahead of the agent
//! - [`ComputeTargetPointQueue`]: Target point modifier that queues behind [`Body`]s

pub mod agent;
pub mod detection;
pub mod edge_status;
pub mod fleeing;
pub mod following;
pub mod hiding;
pub mod modifiers;
pub mod node_selection;
pub mod pathfinder;
pub mod queue;
pub mod registry;
pub mod steering;
pub mod wander;

pub use agent::*;
pub use detection::*;
pub use edge_status::*;
pub use fleeing::*;
pub use following::*;
pub use hiding::*;
pub use modifiers::*;
pub use node_selection::*;
pub use pathfinder::*;
pub use queue::*;
pub use registry::*;
pub use steering::*;
pub use wander::*;

#[cfg(test)]
mod path_following_tests;
