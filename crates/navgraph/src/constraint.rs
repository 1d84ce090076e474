//! Edge cost and heuristic plug-ins
//!
//! A [`Constraint`] gives the real cost of moving along an edge and may forbid
//! it by returning `None`. A [`Heuristic`] estimates the remaining cost to the
//! destination. For A* to return optimal paths the heuristic must never exceed
//! the cost the constraint would charge; this is the caller's obligation.
//!
//! Both are shared between agents, so implementations keep no per-agent state:
//! everything a call depends on arrives through its arguments.

use std::sync::Arc;

use navgraph_common::{distance, distance_squared, Error, Result, Vec3};

use super::graph::{TerrainMask, TerrainType};
use super::graph_ref::{AgentId, EdgeRef, VertexRef};

/// Everything a constraint may look at to price one edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeCostQuery {
    pub agent: Option<AgentId>,
    pub edge: EdgeRef,
    pub from: VertexRef,
    pub to: VertexRef,
    pub from_position: Vec3,
    pub to_position: Vec3,
    pub to_terrain: TerrainType,
}

/// Real cost of traversing an edge
pub trait Constraint: Send + Sync {
    /// Non-negative cost, or `None` if the edge may not be used
    fn cost(&self, query: &EdgeCostQuery) -> Option<f32>;
}

/// Lower-bound estimate of the remaining cost
pub trait Heuristic: Send + Sync {
    fn estimate(&self, agent: Option<AgentId>, from: Vec3, to: Vec3) -> f32;
}

/// Euclidean length, optionally scaled per terrain type
#[derive(Debug, Clone, Default)]
pub struct ShortestPathConstraint {
    terrain_multipliers: Vec<(TerrainType, f32)>,
}

impl ShortestPathConstraint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Multiplies the length of edges entering `terrain` by `multiplier`
    ///
    /// Multipliers below 1 make [`EuclideanHeuristic`] inadmissible.
    pub fn with_terrain_multiplier(mut self, terrain: TerrainType, multiplier: f32) -> Result<Self> {
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(Error::Config(format!(
                "terrain multiplier must be finite and non-negative, got {}",
                multiplier
            )));
        }
        self.terrain_multipliers.retain(|(t, _)| *t != terrain);
        self.terrain_multipliers.push((terrain, multiplier));
        Ok(self)
    }

    fn multiplier(&self, terrain: TerrainType) -> f32 {
        self.terrain_multipliers
            .iter()
            .find(|(t, _)| t & terrain != 0)
            .map(|(_, m)| *m)
            .unwrap_or(1.0)
    }
}

impl Constraint for ShortestPathConstraint {
    fn cost(&self, query: &EdgeCostQuery) -> Option<f32> {
        Some(distance(&query.from_position, &query.to_position) * self.multiplier(query.to_terrain))
    }
}

/// Forbids every edge whose destination lies outside a sphere
#[derive(Clone)]
pub struct SphereConstraint {
    center: Vec3,
    radius: f32,
    inner: Arc<dyn Constraint>,
}

impl SphereConstraint {
    pub fn new(center: Vec3, radius: f32, inner: Arc<dyn Constraint>) -> Result<Self> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(Error::Config(format!("sphere radius must be positive, got {}", radius)));
        }
        Ok(Self {
            center,
            radius,
            inner,
        })
    }
}

impl std::fmt::Debug for SphereConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SphereConstraint")
            .field("center", &self.center)
            .field("radius", &self.radius)
            .finish()
    }
}

impl Constraint for SphereConstraint {
    fn cost(&self, query: &EdgeCostQuery) -> Option<f32> {
        if distance_squared(&self.center, &query.to_position) > self.radius * self.radius {
            return None;
        }
        self.inner.cost(query)
    }
}

/// Forbids edges entering any terrain of a mask
#[derive(Clone)]
pub struct ForbiddenTerrainConstraint {
    forbidden: TerrainMask,
    inner: Arc<dyn Constraint>,
}

impl ForbiddenTerrainConstraint {
    pub fn new(forbidden: TerrainMask, inner: Arc<dyn Constraint>) -> Self {
        Self { forbidden, inner }
    }
}

impl Constraint for ForbiddenTerrainConstraint {
    fn cost(&self, query: &EdgeCostQuery) -> Option<f32> {
        if query.to_terrain & self.forbidden != 0 {
            return None;
        }
        self.inner.cost(query)
    }
}

/// Straight-line distance to the destination
#[derive(Debug, Clone, Copy)]
pub struct EuclideanHeuristic {
    scale: f32,
}

impl Default for EuclideanHeuristic {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

impl EuclideanHeuristic {
    /// Scales the distance; values above 1 trade optimality for speed
    pub fn with_scale(scale: f32) -> Self {
        Self { scale }
    }
}

impl Heuristic for EuclideanHeuristic {
    fn estimate(&self, _agent: Option<AgentId>, from: Vec3, to: Vec3) -> f32 {
        distance(&from, &to) * self.scale
    }
}

/// Always zero: turns A* into Dijkstra
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroHeuristic;

impl Heuristic for ZeroHeuristic {
    fn estimate(&self, _agent: Option<AgentId>, _from: Vec3, _to: Vec3) -> f32 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(from: Vec3, to: Vec3, terrain: TerrainType) -> EdgeCostQuery {
        EdgeCostQuery {
            agent: None,
            edge: EdgeRef::NULL,
            from: VertexRef::NULL,
            to: VertexRef::NULL,
            from_position: from,
            to_position: to,
            to_terrain: terrain,
        }
    }

    #[test]
    fn test_shortest_path_cost() -> Result<()> {
        let constraint = ShortestPathConstraint::new().with_terrain_multiplier(2, 3.0)?;
        let q = query(Vec3::ZERO, Vec3::new(3.0, 0.0, 4.0), 1);
        assert_eq!(constraint.cost(&q), Some(5.0));

        let q = query(Vec3::ZERO, Vec3::new(3.0, 0.0, 4.0), 2);
        assert_eq!(constraint.cost(&q), Some(15.0));

        assert!(ShortestPathConstraint::new().with_terrain_multiplier(2, -1.0).is_err());
        Ok(())
    }

    #[test]
    fn test_sphere_constraint() -> Result<()> {
        let sphere = SphereConstraint::new(Vec3::ZERO, 2.0, Arc::new(ShortestPathConstraint::new()))?;
        assert_eq!(sphere.cost(&query(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 1)), Some(1.0));
        assert_eq!(sphere.cost(&query(Vec3::new(1.5, 0.0, 0.0), Vec3::new(2.5, 0.0, 0.0), 1)), None);
        assert!(SphereConstraint::new(Vec3::ZERO, 0.0, Arc::new(ShortestPathConstraint::new())).is_err());
        Ok(())
    }

    #[test]
    fn test_forbidden_terrain() {
        let constraint = ForbiddenTerrainConstraint::new(0b100, Arc::new(ShortestPathConstraint::new()));
        assert_eq!(constraint.cost(&query(Vec3::ZERO, Vec3::X, 0b100)), None);
        assert_eq!(constraint.cost(&query(Vec3::ZERO, Vec3::X, 0b001)), Some(1.0));
    }

    #[test]
    fn test_heuristics() {
        let h = EuclideanHeuristic::default();
        assert_eq!(h.estimate(None, Vec3::ZERO, Vec3::new(0.0, 0.0, 2.0)), 2.0);
        assert_eq!(ZeroHeuristic.estimate(None, Vec3::ZERO, Vec3::new(0.0, 0.0, 2.0)), 0.0);
    }
}
