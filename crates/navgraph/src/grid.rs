//! Grid graph construction
//!
//! Builds rectangular 4-connected grids in the xz-plane, optionally split into
//! several cells. Vertex `(x, y)` gets uid `y * width + x` and sits at
//! `origin + (x * spacing, 0, y * spacing)`.

use std::collections::{HashMap, HashSet};

use navgraph_common::{Error, Result, Vec3};

use super::graph::{
    GraphCellData, GraphManager, GraphParams, PathObjectLink, TerrainType, TERRAIN_DEFAULT,
};
use super::graph_ref::{VertexRef, VertexUid};
use super::Status;

/// Builder for grid-shaped graphs
#[derive(Debug, Clone)]
pub struct GridGraphBuilder {
    width: u32,
    height: u32,
    spacing: f32,
    origin: Vec3,
    cell_size: Option<u32>,
    removed_edges: HashSet<(u32, u32)>,
    terrains: HashMap<u32, TerrainType>,
    path_objects: HashMap<(u32, u32), PathObjectLink>,
}

impl GridGraphBuilder {
    /// Grid of `width × height` vertices with unit spacing, in a single cell
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            spacing: 1.0,
            origin: Vec3::ZERO,
            cell_size: None,
            removed_edges: HashSet::new(),
            terrains: HashMap::new(),
            path_objects: HashMap::new(),
        }
    }

    pub fn with_spacing(mut self, spacing: f32) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_origin(mut self, origin: Vec3) -> Self {
        self.origin = origin;
        self
    }

    /// Splits the grid into cells of `cell_size × cell_size` vertices
    pub fn with_cell_size(mut self, cell_size: u32) -> Self {
        self.cell_size = Some(cell_size);
        self
    }

    /// Removes the edges between two adjacent vertices in both directions
    pub fn without_edge(mut self, a: (u32, u32), b: (u32, u32)) -> Self {
        let (a, b) = (self.uid(a.0, a.1), self.uid(b.0, b.1));
        self.removed_edges.insert((a.min(b), a.max(b)));
        self
    }

    /// Sets the terrain type of one vertex
    pub fn with_terrain(mut self, at: (u32, u32), terrain: TerrainType) -> Self {
        let uid = self.uid(at.0, at.1);
        self.terrains.insert(uid, terrain);
        self
    }

    /// Puts both directions of an edge under the control of a path-object
    pub fn with_path_object(mut self, a: (u32, u32), b: (u32, u32), link: PathObjectLink) -> Self {
        let (a, b) = (self.uid(a.0, a.1), self.uid(b.0, b.1));
        self.path_objects.insert((a.min(b), a.max(b)), link);
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn uid(&self, x: u32, y: u32) -> u32 {
        y * self.width + x
    }

    /// Uid of vertex `(x, y)`
    pub fn vertex_uid(&self, x: u32, y: u32) -> VertexUid {
        VertexUid(self.uid(x, y))
    }

    /// World position of vertex `(x, y)`
    pub fn position(&self, x: u32, y: u32) -> Vec3 {
        self.origin + Vec3::new(x as f32 * self.spacing, 0.0, y as f32 * self.spacing)
    }

    /// Resolves vertex `(x, y)` in a graph built by this builder
    pub fn vertex_at(&self, graph: &GraphManager, x: u32, y: u32) -> Result<VertexRef> {
        if x >= self.width || y >= self.height {
            return Err(Error::Graph(Status::InvalidParam.to_string()));
        }
        graph
            .vertex_by_uid(self.vertex_uid(x, y))
            .ok_or(Error::Graph(Status::NotFound.to_string()))
    }

    fn cells_per_side(&self) -> (u32, u32) {
        match self.cell_size {
            Some(size) => (self.width.div_ceil(size), self.height.div_ceil(size)),
            None => (1, 1),
        }
    }

    fn cell_index(&self, x: u32, y: u32) -> u32 {
        match self.cell_size {
            Some(size) => {
                let (cells_x, _) = self.cells_per_side();
                (y / size) * cells_x + x / size
            }
            None => 0,
        }
    }

    /// Produces the cell contents without loading them
    pub fn build_cells(&self) -> Result<Vec<GraphCellData>> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config("grid must have at least one vertex".to_string()));
        }
        if self.cell_size == Some(0) {
            return Err(Error::Config("cell_size must be positive".to_string()));
        }
        if self.spacing.is_nan() || self.spacing <= 0.0 {
            return Err(Error::Config("spacing must be positive".to_string()));
        }

        let (cells_x, cells_y) = self.cells_per_side();
        let mut cells: Vec<GraphCellData> =
            (0..cells_x * cells_y).map(GraphCellData::new).collect();
        let mut local_index = HashMap::new();

        for y in 0..self.height {
            for x in 0..self.width {
                let uid = self.uid(x, y);
                let terrain = self.terrains.get(&uid).copied().unwrap_or(TERRAIN_DEFAULT);
                let cell = &mut cells[self.cell_index(x, y) as usize];
                let index = cell.add_vertex(VertexUid(uid), self.position(x, y), terrain);
                local_index.insert(uid, index);
            }
        }

        for y in 0..self.height {
            for x in 0..self.width {
                let uid = self.uid(x, y);
                let from = local_index[&uid];
                let neighbours = [
                    (x > 0).then(|| (x - 1, y)),
                    (x + 1 < self.width).then(|| (x + 1, y)),
                    (y > 0).then(|| (x, y - 1)),
                    (y + 1 < self.height).then(|| (x, y + 1)),
                ];

                for (nx, ny) in neighbours.into_iter().flatten() {
                    let other = self.uid(nx, ny);
                    let key = (uid.min(other), uid.max(other));
                    if self.removed_edges.contains(&key) {
                        continue;
                    }
                    let cell = &mut cells[self.cell_index(x, y) as usize];
                    match self.path_objects.get(&key) {
                        Some(link) => cell.add_path_object_edge(from, VertexUid(other), *link),
                        None => cell.add_edge(from, VertexUid(other)),
                    }
                }
            }
        }

        Ok(cells)
    }

    /// Builds a graph with every cell loaded
    pub fn build(&self) -> Result<GraphManager> {
        let cells = self.build_cells()?;
        let mut graph = GraphManager::new(GraphParams::default().with_max_cells(cells.len().max(1)))?;
        for cell in cells {
            graph.add_cell(cell)?;
        }
        Ok(graph)
    }
}
