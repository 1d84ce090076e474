//! Taboo edges
//!
//! Edges an agent found blocked are remembered with the time of their last
//! status change. When a search is planned, the blocked ones are excluded
//! through a [`TabooEdgeConstraint`]. An [`EdgeStatusAwareness`] modifier may
//! let the agent forget about a blocked edge after a while.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use navgraph::{Constraint, EdgeCostQuery, GraphManager, VertexRef};
use navgraph_common::{dist_point_segment_sqr_2d, Error, Result, Vec3};

use super::agent::AgentState;
use super::modifiers::EdgeStatusAwareness;

#[derive(Debug, Clone, Copy, PartialEq)]
struct EdgeStatus {
    passable: bool,
    last_change: f32,
}

/// Per-agent record of edge statuses reported while following paths
#[derive(Debug, Clone, Default)]
pub struct TabooEdges {
    edges: HashMap<(VertexRef, VertexRef), EdgeStatus>,
}

impl TabooEdges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the status of the directed edge `from -> to`
    ///
    /// Returns true if the status changed.
    pub fn set_status(&mut self, from: VertexRef, to: VertexRef, passable: bool, now: f32) -> bool {
        match self.edges.get_mut(&(from, to)) {
            Some(status) if status.passable == passable => false,
            Some(status) => {
                status.passable = passable;
                status.last_change = now;
                true
            }
            None if passable => false,
            None => {
                self.edges.insert(
                    (from, to),
                    EdgeStatus {
                        passable,
                        last_change: now,
                    },
                );
                true
            }
        }
    }

    /// Last reported status, `None` for edges never reported blocked
    pub fn status(&self, from: VertexRef, to: VertexRef) -> Option<bool> {
        self.edges.get(&(from, to)).map(|s| s.passable)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn clear(&mut self) {
        self.edges.clear();
    }

    /// Drops edges whose vertices were streamed out
    pub fn purge_stale(&mut self, graph: &GraphManager) -> usize {
        let before = self.edges.len();
        self.edges
            .retain(|(from, to), _| graph.is_valid_vertex_ref(*from) && graph.is_valid_vertex_ref(*to));
        before - self.edges.len()
    }

    /// Edges the agent should currently avoid
    pub fn blocked_edges(
        &self,
        graph: &GraphManager,
        agent: &AgentState,
        awareness: Option<&dyn EdgeStatusAwareness>,
        now: f32,
    ) -> HashSet<(VertexRef, VertexRef)> {
        self.edges
            .iter()
            .filter(|&(&(from, to), status)| {
                let (Ok(from_position), Ok(to_position)) =
                    (graph.vertex_position(from), graph.vertex_position(to))
                else {
                    return false;
                };
                let perceived = match awareness {
                    Some(awareness) => awareness.perceived_passable(
                        agent,
                        from_position,
                        to_position,
                        status.passable,
                        status.last_change,
                        now,
                    ),
                    None => status.passable,
                };
                !perceived
            })
            .map(|(edge, _)| *edge)
            .collect()
    }
}

/// A blocked edge looks passable again once it is far from the agent and its
/// status has not changed for `forget_delay` seconds
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeStatusAwarenessDistanceAndTime {
    pub min_distance: f32,
    pub forget_delay: f32,
}

impl Default for EdgeStatusAwarenessDistanceAndTime {
    fn default() -> Self {
        Self {
            min_distance: 10.0,
            forget_delay: 10.0,
        }
    }
}

impl EdgeStatusAwarenessDistanceAndTime {
    pub fn new(min_distance: f32, forget_delay: f32) -> Result<Self> {
        if !min_distance.is_finite() || min_distance < 0.0 {
            return Err(Error::Config(format!(
                "min_distance must not be negative, got {}",
                min_distance
            )));
        }
        if !forget_delay.is_finite() || forget_delay < 0.0 {
            return Err(Error::Config(format!(
                "forget_delay must not be negative, got {}",
                forget_delay
            )));
        }
        Ok(Self {
            min_distance,
            forget_delay,
        })
    }
}

impl EdgeStatusAwareness for EdgeStatusAwarenessDistanceAndTime {
    fn perceived_passable(
        &self,
        agent: &AgentState,
        edge_from: Vec3,
        edge_to: Vec3,
        real_passable: bool,
        last_change: f32,
        now: f32,
    ) -> bool {
        if real_passable {
            return true;
        }
        let far = dist_point_segment_sqr_2d(&agent.position, &edge_from, &edge_to)
            > self.min_distance * self.min_distance;
        far && now - last_change > self.forget_delay
    }
}

/// Forbids a fixed set of directed edges and prices the others with an inner constraint
pub struct TabooEdgeConstraint {
    inner: Arc<dyn Constraint>,
    blocked: HashSet<(VertexRef, VertexRef)>,
}

impl TabooEdgeConstraint {
    pub fn new(inner: Arc<dyn Constraint>, blocked: HashSet<(VertexRef, VertexRef)>) -> Self {
        Self { inner, blocked }
    }

    pub fn blocked(&self) -> &HashSet<(VertexRef, VertexRef)> {
        &self.blocked
    }
}

impl std::fmt::Debug for TabooEdgeConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabooEdgeConstraint")
            .field("blocked", &self.blocked.len())
            .finish_non_exhaustive()
    }
}

impl Constraint for TabooEdgeConstraint {
    fn cost(&self, query: &EdgeCostQuery) -> Option<f32> {
        if self.blocked.contains(&(query.from, query.to)) {
            return None;
        }
        self.inner.cost(query)
    }
}
