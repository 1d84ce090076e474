//! Helpers shared by the scenario tests

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::Rng;

use crate::{Constraint, EdgeCostQuery, GraphManager, GridGraphBuilder, Path, TraversalVisitor, VertexRef};
use navgraph_common::{distance, Result, Vec3};

/// Brute-force single-source shortest paths
pub fn dijkstra(
    graph: &GraphManager,
    start: VertexRef,
    constraint: &dyn Constraint,
) -> Result<HashMap<VertexRef, f32>> {
    let mut dist: HashMap<VertexRef, f32> = HashMap::new();
    let mut done: HashSet<VertexRef> = HashSet::new();
    dist.insert(start, 0.0);

    loop {
        let next = dist
            .iter()
            .filter(|(v, _)| !done.contains(*v))
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(v, d)| (*v, *d));
        let Some((vertex, d)) = next else {
            break;
        };
        done.insert(vertex);

        let from_position = graph.vertex_position(vertex)?;
        for edge in graph.out_edges(vertex)? {
            let Some(to) = graph.edge_target(edge) else {
                continue;
            };
            let query = EdgeCostQuery {
                agent: None,
                edge,
                from: vertex,
                to,
                from_position,
                to_position: graph.vertex_position(to)?,
                to_terrain: graph.vertex_terrain(to)?,
            };
            let Some(cost) = constraint.cost(&query) else {
                continue;
            };
            let candidate = d + cost;
            let known = dist.entry(to).or_insert(f32::INFINITY);
            if candidate < *known {
                *known = candidate;
            }
        }
    }

    Ok(dist)
}

/// Grid with a random share of its edges removed and some slow terrain
pub fn random_grid(rng: &mut StdRng, width: u32, height: u32, removal_ratio: f64) -> GridGraphBuilder {
    let mut grid = GridGraphBuilder::new(width, height).with_cell_size(3);
    for y in 0..height {
        for x in 0..width {
            if x + 1 < width && rng.gen_bool(removal_ratio) {
                grid = grid.without_edge((x, y), (x + 1, y));
            }
            if y + 1 < height && rng.gen_bool(removal_ratio) {
                grid = grid.without_edge((x, y), (x, y + 1));
            }
            if rng.gen_bool(0.2) {
                grid = grid.with_terrain((x, y), 2);
            }
        }
    }
    grid
}

/// Cost of a path under `constraint`, `None` if an edge is forbidden or missing
pub fn path_cost(graph: &GraphManager, path: &Path, constraint: &dyn Constraint) -> Result<Option<f32>> {
    let vertices: Vec<VertexRef> = path.iter().filter_map(|n| n.vertex).collect();
    let mut total = 0.0;
    for pair in vertices.windows(2) {
        let Some(edge) = graph.find_edge(pair[0], pair[1]) else {
            return Ok(None);
        };
        let query = EdgeCostQuery {
            agent: None,
            edge,
            from: pair[0],
            to: pair[1],
            from_position: graph.vertex_position(pair[0])?,
            to_position: graph.vertex_position(pair[1])?,
            to_terrain: graph.vertex_terrain(pair[1])?,
        };
        match constraint.cost(&query) {
            Some(cost) => total += cost,
            None => return Ok(None),
        }
    }
    Ok(Some(total))
}

/// Counts processed vertices and tracks the farthest one from an origin
pub struct CountingVisitor {
    pub origin: Vec3,
    pub vertices: u64,
    pub edges: u64,
    pub farthest: f32,
}

impl CountingVisitor {
    pub fn new(origin: Vec3) -> Self {
        Self {
            origin,
            vertices: 0,
            edges: 0,
            farthest: 0.0,
        }
    }
}

impl TraversalVisitor for CountingVisitor {
    fn process_edge(&mut self, _graph: &GraphManager, _edge: crate::EdgeRef) -> bool {
        self.edges += 1;
        true
    }

    fn process_vertex(&mut self, graph: &GraphManager, vertex: VertexRef) -> bool {
        self.vertices += 1;
        if let Ok(position) = graph.vertex_position(vertex) {
            self.farthest = self.farthest.max(distance(&self.origin, &position));
        }
        true
    }
}
