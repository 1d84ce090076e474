//! Resolving request positions to graph vertices

use navgraph::{GraphManager, VertexRef};
use navgraph_common::{distance, Error, Result, Vec3};

use super::agent::AgentState;
use super::modifiers::{CanGo, CheckDirectWay, FindNodesFromPositions};

/// Every straight move is possible
#[derive(Debug, Clone, Copy, Default)]
pub struct CanGoAlways;

impl CanGo for CanGoAlways {
    fn can_go(&self, _agent: &AgentState, _from: Vec3, _to: Vec3) -> bool {
        true
    }
}

/// Nearest vertex the agent can walk to, or that can walk to the destination
///
/// Candidates are the vertices within `search_radius`, nearest first; at most
/// `max_candidates` of them are checked with [`CanGo`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct FindNodesFromPositionsNearest {
    pub search_radius: f32,
    pub max_candidates: usize,
}

impl Default for FindNodesFromPositionsNearest {
    fn default() -> Self {
        Self {
            search_radius: 5.0,
            max_candidates: 128,
        }
    }
}

impl FindNodesFromPositionsNearest {
    pub fn new(search_radius: f32, max_candidates: usize) -> Result<Self> {
        let finder = Self {
            search_radius,
            max_candidates,
        };
        finder.validate()?;
        Ok(finder)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.search_radius.is_finite() || self.search_radius <= 0.0 {
            return Err(Error::Config(format!(
                "search_radius must be positive, got {}",
                self.search_radius
            )));
        }
        if self.max_candidates == 0 {
            return Err(Error::Config("max_candidates must be positive".to_string()));
        }
        Ok(())
    }

    fn find(
        &self,
        graph: &GraphManager,
        position: Vec3,
        reachable: impl Fn(Vec3) -> bool,
    ) -> Option<VertexRef> {
        graph
            .vertices_within(position, self.search_radius)
            .into_iter()
            .take(self.max_candidates)
            .find(|(vertex, _)| graph.vertex_position(*vertex).is_ok_and(&reachable))
            .map(|(vertex, _)| vertex)
    }
}

impl FindNodesFromPositions for FindNodesFromPositionsNearest {
    fn find_start_node(
        &self,
        graph: &GraphManager,
        agent: &AgentState,
        can_go: &dyn CanGo,
        position: Vec3,
    ) -> Option<VertexRef> {
        self.find(graph, position, |p| can_go.can_go(agent, position, p))
    }

    fn find_dest_node(
        &self,
        graph: &GraphManager,
        agent: &AgentState,
        can_go: &dyn CanGo,
        position: Vec3,
    ) -> Option<VertexRef> {
        self.find(graph, position, |p| can_go.can_go(agent, p, position))
    }
}

/// Goes straight to a destination closer than `max_distance` when nothing blocks it
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct CheckDirectWayDistance {
    pub max_distance: f32,
}

impl Default for CheckDirectWayDistance {
    fn default() -> Self {
        Self { max_distance: 3.0 }
    }
}

impl CheckDirectWay for CheckDirectWayDistance {
    fn check_direct_way(&self, agent: &AgentState, can_go: &dyn CanGo, start: Vec3, dest: Vec3) -> Option<f32> {
        let d = distance(&start, &dest);
        (d <= self.max_distance && can_go.can_go(agent, start, dest)).then_some(d)
    }
}
