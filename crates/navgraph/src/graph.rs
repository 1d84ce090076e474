//! Cell-streamed spatial graph
//!
//! The graph is made of independently loaded cells. A cell owns its vertices
//! and the edges leaving them; an edge names its destination by [`VertexUid`],
//! so an edge whose destination lives in a cell that is not loaded is simply
//! not traversable until that cell is stitched in.
//!
//! Every loaded vertex also receives a dense A* id. The ids are recycled when
//! cells are removed and [`GraphManager::astar_id_capacity`] reports the high
//! water mark an [`AstarContext`](crate::AstarContext) must be sized to.

use std::collections::{HashMap, HashSet};

use navgraph_common::{Error, Result, Vec3, dist_sqr_2d};

use super::graph_ref::{next_salt, CellRef, EdgeRef, VertexRef, VertexUid, MAX_CELL_SLOTS};
use super::Status;

/// Terrain type bits carried by vertices
pub type TerrainType = u32;
/// Set of allowed terrain types
pub type TerrainMask = u32;

/// Default terrain type assigned by builders
pub const TERRAIN_DEFAULT: TerrainType = 1;
/// Mask accepting every terrain type
pub const TERRAIN_ALL: TerrainMask = u32::MAX;

/// Link from an edge to the path-object that controls it (door, elevator, ladder)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PathObjectLink {
    /// Path-object identifier, opaque to the graph
    pub id: u32,
    /// Whether path smoothing may bypass the controlled edge
    pub smoothable: bool,
}

/// Vertex as supplied when loading a cell
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexData {
    pub uid: VertexUid,
    pub position: Vec3,
    pub terrain: TerrainType,
}

/// Edge as supplied when loading a cell
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeData {
    /// Index of the source vertex within the cell
    pub from: u32,
    /// Destination vertex, possibly in another cell
    pub to: VertexUid,
    pub path_object: Option<PathObjectLink>,
}

/// Loadable contents of one graph cell
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphCellData {
    /// User-level identifier of the cell
    pub cell_id: u32,
    pub vertices: Vec<VertexData>,
    pub edges: Vec<EdgeData>,
}

impl GraphCellData {
    /// Creates an empty cell
    pub fn new(cell_id: u32) -> Self {
        Self {
            cell_id,
            ..Default::default()
        }
    }

    /// Adds a vertex and returns its index within the cell
    pub fn add_vertex(&mut self, uid: VertexUid, position: Vec3, terrain: TerrainType) -> u32 {
        self.vertices.push(VertexData {
            uid,
            position,
            terrain,
        });
        (self.vertices.len() - 1) as u32
    }

    /// Adds an edge from the vertex at index `from` to the vertex `to`
    pub fn add_edge(&mut self, from: u32, to: VertexUid) {
        self.edges.push(EdgeData {
            from,
            to,
            path_object: None,
        });
    }

    /// Adds an edge controlled by a path-object
    pub fn add_path_object_edge(&mut self, from: u32, to: VertexUid, link: PathObjectLink) {
        self.edges.push(EdgeData {
            from,
            to,
            path_object: Some(link),
        });
    }

    /// Validates the cell contents
    pub fn validate(&self) -> Result<()> {
        let mut uids = HashSet::with_capacity(self.vertices.len());
        for vertex in &self.vertices {
            if !vertex.position.is_finite() {
                return Err(Error::InvalidGraph(format!(
                    "vertex {:?} has a non-finite position",
                    vertex.uid
                )));
            }
            if !uids.insert(vertex.uid) {
                return Err(Error::InvalidGraph(format!(
                    "duplicate vertex uid {:?} in cell {}",
                    vertex.uid, self.cell_id
                )));
            }
        }

        for edge in &self.edges {
            if edge.from as usize >= self.vertices.len() {
                return Err(Error::InvalidGraph(format!(
                    "edge source {} out of range in cell {}",
                    edge.from, self.cell_id
                )));
            }
            if self.vertices[edge.from as usize].uid == edge.to {
                return Err(Error::InvalidGraph(format!(
                    "self-loop on vertex {:?}",
                    edge.to
                )));
            }
        }

        Ok(())
    }
}

/// Graph construction parameters
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphParams {
    /// Maximum number of simultaneously loaded cells
    pub max_cells: usize,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self { max_cells: 64 }
    }
}

impl GraphParams {
    pub fn with_max_cells(mut self, max_cells: usize) -> Self {
        self.max_cells = max_cells;
        self
    }

    /// Validates the parameters
    pub fn validate(&self) -> Result<()> {
        if self.max_cells == 0 || self.max_cells > MAX_CELL_SLOTS {
            return Err(Error::Config(format!(
                "max_cells must be in 1..={}, got {}",
                MAX_CELL_SLOTS, self.max_cells
            )));
        }
        Ok(())
    }
}

/// A loaded vertex
#[derive(Debug, Clone)]
pub struct GraphVertex {
    uid: VertexUid,
    position: Vec3,
    terrain: TerrainType,
    astar_id: u32,
    first_edge: u32,
    edge_count: u32,
}

impl GraphVertex {
    pub fn uid(&self) -> VertexUid {
        self.uid
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn terrain(&self) -> TerrainType {
        self.terrain
    }

    /// Dense id used to index A* scratch arrays
    pub fn astar_id(&self) -> u32 {
        self.astar_id
    }

    /// Number of edges leaving this vertex
    pub fn edge_count(&self) -> u32 {
        self.edge_count
    }
}

/// A loaded edge
#[derive(Debug, Clone)]
pub struct GraphEdge {
    from: u32,
    to: VertexUid,
    path_object: Option<PathObjectLink>,
}

impl GraphEdge {
    /// Destination uid, resolvable only while its cell is loaded
    pub fn to_uid(&self) -> VertexUid {
        self.to
    }

    pub fn path_object(&self) -> Option<PathObjectLink> {
        self.path_object
    }
}

/// A loaded cell
#[derive(Debug, Clone)]
pub struct GraphCell {
    cell_id: u32,
    stitched_version: u32,
    vertices: Vec<GraphVertex>,
    /// Edges grouped by source vertex
    edges: Vec<GraphEdge>,
}

impl GraphCell {
    pub fn cell_id(&self) -> u32 {
        self.cell_id
    }

    /// Bumped whenever a neighbouring cell is stitched or unstitched
    pub fn stitched_version(&self) -> u32 {
        self.stitched_version
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn vertices(&self) -> impl Iterator<Item = &GraphVertex> {
        self.vertices.iter()
    }
}

/// Dense id allocator with recycling
#[derive(Debug, Default)]
struct AstarIdAllocator {
    next: u32,
    free: Vec<u32>,
}

impl AstarIdAllocator {
    fn allocate(&mut self) -> u32 {
        match self.free.pop() {
            Some(id) => id,
            None => {
                let id = self.next;
                self.next += 1;
                id
            }
        }
    }

    fn release(&mut self, id: u32) {
        self.free.push(id);
    }
}

/// Owner of all loaded cells, vertices and edges
#[derive(Debug)]
pub struct GraphManager {
    params: GraphParams,
    cells: Vec<Option<GraphCell>>,
    /// Salt of each slot, kept while the slot is empty
    salts: Vec<u32>,
    free_slots: Vec<usize>,
    uid_index: HashMap<VertexUid, VertexRef>,
    astar_ids: AstarIdAllocator,
    vertex_count: usize,
}

impl GraphManager {
    /// Creates an empty graph
    pub fn new(params: GraphParams) -> Result<Self> {
        params.validate()?;

        let max_cells = params.max_cells;
        Ok(Self {
            params,
            cells: (0..max_cells).map(|_| None).collect(),
            salts: vec![1; max_cells],
            // Lowest slot first
            free_slots: (0..max_cells).rev().collect(),
            uid_index: HashMap::new(),
            astar_ids: AstarIdAllocator::default(),
            vertex_count: 0,
        })
    }

    pub fn params(&self) -> &GraphParams {
        &self.params
    }

    /// Loads and stitches a cell
    pub fn add_cell(&mut self, data: GraphCellData) -> Result<CellRef> {
        data.validate()?;

        if data.vertices.iter().any(|v| self.uid_index.contains_key(&v.uid)) {
            return Err(Error::Graph(Status::AlreadyExists.to_string()));
        }
        if self.find_cell(data.cell_id).is_some() {
            return Err(Error::Graph(Status::AlreadyExists.to_string()));
        }

        let slot = self
            .free_slots
            .pop()
            .ok_or(Error::Graph(Status::OutOfMemory.to_string()))?;
        let salt = self.salts[slot];

        let mut edges: Vec<&EdgeData> = data.edges.iter().collect();
        edges.sort_by_key(|e| e.from);

        let mut vertices: Vec<GraphVertex> = data
            .vertices
            .iter()
            .map(|v| GraphVertex {
                uid: v.uid,
                position: v.position,
                terrain: v.terrain,
                astar_id: self.astar_ids.allocate(),
                first_edge: 0,
                edge_count: 0,
            })
            .collect();

        for (i, edge) in edges.iter().enumerate() {
            let vertex = &mut vertices[edge.from as usize];
            if vertex.edge_count == 0 {
                vertex.first_edge = i as u32;
            }
            vertex.edge_count += 1;
        }

        let cell = GraphCell {
            cell_id: data.cell_id,
            stitched_version: 0,
            vertices,
            edges: edges
                .into_iter()
                .map(|e| GraphEdge {
                    from: e.from,
                    to: e.to,
                    path_object: e.path_object,
                })
                .collect(),
        };

        for (index, vertex) in cell.vertices.iter().enumerate() {
            self.uid_index
                .insert(vertex.uid, VertexRef::encode(salt, slot as u32, index as u32));
        }
        self.vertex_count += cell.vertices.len();

        log::info!(
            "Stitched graph cell {} into slot {} ({} vertices, {} edges)",
            cell.cell_id,
            slot,
            cell.vertices.len(),
            cell.edges.len()
        );

        self.cells[slot] = Some(cell);

        for neighbour in self.neighbour_slots(slot) {
            self.bump_stitched_version(neighbour);
        }

        Ok(CellRef::encode(salt, slot as u32, 0))
    }

    /// Unstitches and unloads a cell
    ///
    /// All references into the cell become invalid.
    pub fn remove_cell(&mut self, cell_ref: CellRef) -> Result<GraphCellData> {
        let slot = self
            .cell_slot(cell_ref)
            .ok_or(Error::Graph(Status::StaleReference.to_string()))?;

        let neighbours = self.neighbour_slots(slot);

        let cell = self.cells[slot]
            .take()
            .ok_or(Error::Graph(Status::StaleReference.to_string()))?;

        for vertex in &cell.vertices {
            self.uid_index.remove(&vertex.uid);
            self.astar_ids.release(vertex.astar_id);
        }
        self.vertex_count -= cell.vertices.len();

        self.salts[slot] = next_salt(self.salts[slot]);
        self.free_slots.push(slot);

        for neighbour in neighbours {
            self.bump_stitched_version(neighbour);
        }

        log::info!("Unstitched graph cell {} from slot {}", cell.cell_id, slot);

        Ok(Self::export_cell(&cell))
    }

    /// Returns a copy of the loadable contents of a cell
    pub fn cell_data(&self, cell_ref: CellRef) -> Result<GraphCellData> {
        self.cell(cell_ref).map(Self::export_cell)
    }

    fn export_cell(cell: &GraphCell) -> GraphCellData {
        GraphCellData {
            cell_id: cell.cell_id,
            vertices: cell
                .vertices
                .iter()
                .map(|v| VertexData {
                    uid: v.uid,
                    position: v.position,
                    terrain: v.terrain,
                })
                .collect(),
            edges: cell
                .edges
                .iter()
                .map(|e| EdgeData {
                    from: e.from,
                    to: e.to,
                    path_object: e.path_object,
                })
                .collect(),
        }
    }

    /// Slots of loaded cells connected to `slot` by an edge in either direction
    fn neighbour_slots(&self, slot: usize) -> Vec<usize> {
        let Some(cell) = self.cells[slot].as_ref() else {
            return Vec::new();
        };

        let own_uids: HashSet<VertexUid> = cell.vertices.iter().map(|v| v.uid).collect();
        let mut result = HashSet::new();

        for edge in &cell.edges {
            if let Some(target) = self.uid_index.get(&edge.to) {
                let (_, target_slot, _) = target.decode();
                if target_slot as usize != slot {
                    result.insert(target_slot as usize);
                }
            }
        }

        for (other_slot, other) in self.cells.iter().enumerate() {
            if other_slot == slot {
                continue;
            }
            if let Some(other) = other {
                if other.edges.iter().any(|e| own_uids.contains(&e.to)) {
                    result.insert(other_slot);
                }
            }
        }

        let mut result: Vec<usize> = result.into_iter().collect();
        result.sort_unstable();
        result
    }

    fn bump_stitched_version(&mut self, slot: usize) {
        if let Some(cell) = self.cells[slot].as_mut() {
            cell.stitched_version = cell.stitched_version.wrapping_add(1);
        }
    }

    fn cell_slot(&self, cell_ref: CellRef) -> Option<usize> {
        if cell_ref.is_null() {
            return None;
        }
        let (salt, slot, _) = cell_ref.decode();
        let slot = slot as usize;
        if slot >= self.cells.len() || self.salts[slot] != salt {
            return None;
        }
        self.cells[slot].as_ref().map(|_| slot)
    }

    /// Checks if a cell reference is still valid
    pub fn is_valid_cell_ref(&self, cell_ref: CellRef) -> bool {
        self.cell_slot(cell_ref).is_some()
    }

    /// Resolves a cell reference
    pub fn cell(&self, cell_ref: CellRef) -> Result<&GraphCell> {
        self.cell_slot(cell_ref)
            .and_then(|slot| self.cells[slot].as_ref())
            .ok_or(Error::Graph(Status::StaleReference.to_string()))
    }

    /// Finds a loaded cell by its user-level id
    pub fn find_cell(&self, cell_id: u32) -> Option<CellRef> {
        self.cells.iter().enumerate().find_map(|(slot, cell)| {
            cell.as_ref()
                .filter(|c| c.cell_id == cell_id)
                .map(|_| CellRef::encode(self.salts[slot], slot as u32, 0))
        })
    }

    /// Iterates over the loaded cells
    pub fn cells(&self) -> impl Iterator<Item = (CellRef, &GraphCell)> {
        self.cells.iter().enumerate().filter_map(|(slot, cell)| {
            cell.as_ref()
                .map(|c| (CellRef::encode(self.salts[slot], slot as u32, 0), c))
        })
    }

    /// Stitched version of a cell, or `None` if the reference is stale
    pub fn cell_stitched_version(&self, cell_ref: CellRef) -> Option<u32> {
        self.cell(cell_ref).ok().map(|c| c.stitched_version)
    }

    /// Cell owning a vertex
    pub fn cell_of(&self, vertex: VertexRef) -> Option<CellRef> {
        self.resolve_vertex(vertex)
            .map(|_| {
                let (salt, slot, _) = vertex.decode();
                CellRef::encode(salt, slot, 0)
            })
    }

    /// Number of loaded cells
    pub fn cell_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Number of loaded vertices
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Upper bound (exclusive) of the A* ids handed out so far
    pub fn astar_id_capacity(&self) -> u32 {
        self.astar_ids.next
    }

    fn resolve_vertex(&self, vertex: VertexRef) -> Option<(&GraphCell, &GraphVertex)> {
        if vertex.is_null() {
            return None;
        }
        let (salt, slot, index) = vertex.decode();
        let slot = slot as usize;
        if slot >= self.cells.len() || self.salts[slot] != salt {
            return None;
        }
        let cell = self.cells[slot].as_ref()?;
        cell.vertices.get(index as usize).map(|v| (cell, v))
    }

    fn resolve_edge(&self, edge: EdgeRef) -> Option<(usize, &GraphCell, &GraphEdge)> {
        if edge.is_null() {
            return None;
        }
        let (salt, slot, index) = edge.decode();
        let slot = slot as usize;
        if slot >= self.cells.len() || self.salts[slot] != salt {
            return None;
        }
        let cell = self.cells[slot].as_ref()?;
        cell.edges.get(index as usize).map(|e| (slot, cell, e))
    }

    /// Checks if a vertex reference is still valid
    pub fn is_valid_vertex_ref(&self, vertex: VertexRef) -> bool {
        self.resolve_vertex(vertex).is_some()
    }

    /// Checks if an edge reference is still valid
    pub fn is_valid_edge_ref(&self, edge: EdgeRef) -> bool {
        self.resolve_edge(edge).is_some()
    }

    /// Resolves a vertex reference
    pub fn vertex(&self, vertex: VertexRef) -> Result<&GraphVertex> {
        self.resolve_vertex(vertex)
            .map(|(_, v)| v)
            .ok_or(Error::Graph(Status::StaleReference.to_string()))
    }

    pub fn vertex_position(&self, vertex: VertexRef) -> Result<Vec3> {
        self.vertex(vertex).map(|v| v.position)
    }

    pub fn vertex_terrain(&self, vertex: VertexRef) -> Result<TerrainType> {
        self.vertex(vertex).map(|v| v.terrain)
    }

    /// A* id of a vertex
    pub fn astar_id(&self, vertex: VertexRef) -> Option<u32> {
        self.resolve_vertex(vertex).map(|(_, v)| v.astar_id)
    }

    /// Looks a vertex up by uid
    pub fn vertex_by_uid(&self, uid: VertexUid) -> Option<VertexRef> {
        self.uid_index.get(&uid).copied()
    }

    /// Edges leaving a vertex, including those whose destination is not loaded
    pub fn out_edges(&self, vertex: VertexRef) -> Result<impl Iterator<Item = EdgeRef>> {
        let (_, v) = self
            .resolve_vertex(vertex)
            .ok_or(Error::Graph(Status::StaleReference.to_string()))?;
        let (salt, slot, _) = vertex.decode();
        let range = v.first_edge..v.first_edge + v.edge_count;
        Ok(range.map(move |index| EdgeRef::encode(salt, slot, index)))
    }

    /// Resolves an edge reference
    pub fn edge(&self, edge: EdgeRef) -> Result<&GraphEdge> {
        self.resolve_edge(edge)
            .map(|(_, _, e)| e)
            .ok_or(Error::Graph(Status::StaleReference.to_string()))
    }

    /// Source vertex of an edge
    pub fn edge_source(&self, edge: EdgeRef) -> Option<VertexRef> {
        let (slot, _, e) = self.resolve_edge(edge)?;
        let (salt, _, _) = edge.decode();
        Some(VertexRef::encode(salt, slot as u32, e.from))
    }

    /// Destination vertex of an edge, `None` while its cell is not stitched
    pub fn edge_target(&self, edge: EdgeRef) -> Option<VertexRef> {
        let (_, _, e) = self.resolve_edge(edge)?;
        self.uid_index.get(&e.to).copied()
    }

    /// Both endpoints of a traversable edge
    pub fn edge_endpoints(&self, edge: EdgeRef) -> Option<(VertexRef, VertexRef)> {
        Some((self.edge_source(edge)?, self.edge_target(edge)?))
    }

    /// Finds the edge going from `from` to `to`
    pub fn find_edge(&self, from: VertexRef, to: VertexRef) -> Option<EdgeRef> {
        let to_uid = self.resolve_vertex(to)?.1.uid;
        let (salt, slot, _) = from.decode();
        let (cell, v) = self.resolve_vertex(from)?;
        (v.first_edge..v.first_edge + v.edge_count)
            .find(|&index| cell.edges[index as usize].to == to_uid)
            .map(|index| EdgeRef::encode(salt, slot, index))
    }

    /// Nearest vertex within `max_dist` (horizontal) whose terrain is allowed
    pub fn nearest_vertex(
        &self,
        position: Vec3,
        max_dist: f32,
        allowed_terrain: TerrainMask,
    ) -> Option<VertexRef> {
        self.vertices_within(position, max_dist)
            .into_iter()
            .find(|(v, _)| {
                self.vertex_terrain(*v)
                    .map(|t| t & allowed_terrain != 0)
                    .unwrap_or(false)
            })
            .map(|(v, _)| v)
    }

    /// All vertices within `radius` (horizontal) of `position`, nearest first
    ///
    /// Ties in distance are broken by vertical distance, then by reference.
    pub fn vertices_within(&self, position: Vec3, radius: f32) -> Vec<(VertexRef, f32)> {
        let radius_sqr = radius * radius;
        let mut result = Vec::new();

        for (slot, cell) in self.cells.iter().enumerate() {
            let Some(cell) = cell else { continue };
            let salt = self.salts[slot];
            for (index, vertex) in cell.vertices.iter().enumerate() {
                let d = dist_sqr_2d(&position, &vertex.position);
                if d <= radius_sqr {
                    result.push((
                        VertexRef::encode(salt, slot as u32, index as u32),
                        d.sqrt(),
                        (vertex.position.y - position.y).abs(),
                    ));
                }
            }
        }

        result.sort_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then(a.2.total_cmp(&b.2))
                .then(a.0.cmp(&b.0))
        });
        result.into_iter().map(|(v, d, _)| (v, d)).collect()
    }
}
