//! Per-search A* scratch space
//!
//! All per-vertex arrays are indexed by the dense A* id handed out by the
//! [`GraphManager`]. The context is sized to `max_vertex_count` ids and only
//! ever grows; growing keeps everything already written and notifies the
//! registered resize observers with the previous size.
//!
//! The open list is ordered by `f = g + h`. Among equal `f`, the most recently
//! inserted entry comes first (LIFO). An entry whose cost improves is removed
//! and re-inserted, so it counts as the most recent insertion.

use std::collections::BTreeSet;

use super::graph::{GraphManager, TerrainMask, TERRAIN_ALL};
use super::graph_ref::{AgentId, CellRef, VertexRef};
use super::path::{Path, PathNode};
use super::two_bits_status::{TwoBitsVerticesStatus, VertexStatus};

/// Predecessor value of a vertex that has none
pub const NO_PREDECESSOR: u32 = u32::MAX;

/// Outcome of [`AstarContext::process_candidate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateUpdate {
    /// Candidate was closed or its known cost was already as good
    Ignored,
    /// Candidate was open and got a cheaper cost
    Improved,
    /// Candidate was new and has been opened
    Opened,
}

/// Handle returned by [`AstarContext::register_on_resize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResizeObserverId(u32);

/// Resize callback, called with `(new_size, old_size)`
pub type ResizeObserver = Box<dyn FnMut(u32, u32)>;

/// A cell explored by the current search and its stitched version at that time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExploredCell {
    pub cell: CellRef,
    pub stitched_version: u32,
}

#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    f: f32,
    seq: u64,
    id: u32,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Lowest f first, then newest insertion first
        self.f
            .total_cmp(&other.f)
            .then_with(|| other.seq.cmp(&self.seq))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Search state of one A* run
pub struct AstarContext {
    max_vertex_count: u32,
    predecessor: Vec<u32>,
    cost_from_start: Vec<f32>,
    estimated_cost_to_dest: Vec<f32>,
    vertex_refs: Vec<VertexRef>,
    open_seq: Vec<u64>,
    status: TwoBitsVerticesStatus,
    open_list: BTreeSet<OpenEntry>,
    next_seq: u64,

    start: VertexRef,
    dest: Option<VertexRef>,
    agent: Option<AgentId>,
    allowed_terrain: TerrainMask,
    explored_cells: Vec<ExploredCell>,

    observers: Vec<(ResizeObserverId, ResizeObserver)>,
    next_observer_id: u32,
}

impl std::fmt::Debug for AstarContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AstarContext")
            .field("max_vertex_count", &self.max_vertex_count)
            .field("open", &self.open_list.len())
            .field("start", &self.start)
            .field("dest", &self.dest)
            .field("agent", &self.agent)
            .field("explored_cells", &self.explored_cells.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Default for AstarContext {
    fn default() -> Self {
        Self::new(0)
    }
}

impl AstarContext {
    /// Creates a context able to hold `max_vertex_count` vertices
    pub fn new(max_vertex_count: u32) -> Self {
        let n = max_vertex_count as usize;
        Self {
            max_vertex_count,
            predecessor: vec![NO_PREDECESSOR; n],
            cost_from_start: vec![f32::INFINITY; n],
            estimated_cost_to_dest: vec![0.0; n],
            vertex_refs: vec![VertexRef::NULL; n],
            open_seq: vec![0; n],
            status: TwoBitsVerticesStatus::new(n),
            open_list: BTreeSet::new(),
            next_seq: 0,
            start: VertexRef::NULL,
            dest: None,
            agent: None,
            allowed_terrain: TERRAIN_ALL,
            explored_cells: Vec::new(),
            observers: Vec::new(),
            next_observer_id: 0,
        }
    }

    pub fn max_vertex_count(&self) -> u32 {
        self.max_vertex_count
    }

    /// Grows the context to `new_max_vertex_count`
    ///
    /// Existing entries are preserved and resize observers are notified with
    /// the previous size. Requests that would shrink the context are ignored.
    pub fn allocate(&mut self, new_max_vertex_count: u32) {
        if new_max_vertex_count <= self.max_vertex_count {
            return;
        }

        let old = self.max_vertex_count;
        let n = new_max_vertex_count as usize;
        self.predecessor.resize(n, NO_PREDECESSOR);
        self.cost_from_start.resize(n, f32::INFINITY);
        self.estimated_cost_to_dest.resize(n, 0.0);
        self.vertex_refs.resize(n, VertexRef::NULL);
        self.open_seq.resize(n, 0);
        self.status.allocate(n);
        self.max_vertex_count = new_max_vertex_count;

        log::debug!("A* context resized from {} to {} vertices", old, new_max_vertex_count);

        for (_, observer) in self.observers.iter_mut() {
            observer(new_max_vertex_count, old);
        }
    }

    /// Registers a callback invoked after every resize
    pub fn register_on_resize(&mut self, observer: ResizeObserver) -> ResizeObserverId {
        let id = ResizeObserverId(self.next_observer_id);
        self.next_observer_id += 1;
        self.observers.push((id, observer));
        id
    }

    /// Removes a resize callback; returns false if it was not registered
    pub fn unregister_on_resize(&mut self, id: ResizeObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    /// Forgets all per-search state
    pub fn clear(&mut self) {
        self.status.reset();
        self.open_list.clear();
        self.next_seq = 0;
        self.start = VertexRef::NULL;
        self.dest = None;
        self.agent = None;
        self.allowed_terrain = TERRAIN_ALL;
        self.explored_cells.clear();
    }

    /// Prepares a new search
    ///
    /// Grows the context if the graph handed out more ids than it can hold.
    /// Returns false when the start or destination do not resolve to live
    /// vertices, in which case the search cannot start.
    pub fn reinit_astar(
        &mut self,
        graph: &GraphManager,
        start: VertexRef,
        dest: Option<VertexRef>,
        agent: Option<AgentId>,
        allowed_terrain: TerrainMask,
    ) -> bool {
        self.clear();

        let capacity = graph.astar_id_capacity();
        if capacity > self.max_vertex_count {
            self.allocate(capacity);
        }

        self.start = start;
        self.dest = dest;
        self.agent = agent;
        self.allowed_terrain = allowed_terrain;

        self.can_start(graph)
    }

    /// Checks that the start and destination are live vertices
    pub fn can_start(&self, graph: &GraphManager) -> bool {
        if graph.cell_count() == 0 || !graph.is_valid_vertex_ref(self.start) {
            return false;
        }
        match self.dest {
            Some(dest) => graph.is_valid_vertex_ref(dest),
            None => true,
        }
    }

    pub fn start(&self) -> VertexRef {
        self.start
    }

    pub fn destination(&self) -> Option<VertexRef> {
        self.dest
    }

    pub fn agent(&self) -> Option<AgentId> {
        self.agent
    }

    pub fn allowed_terrain(&self) -> TerrainMask {
        self.allowed_terrain
    }

    /// Records a cell touched by the search together with its current version
    pub fn add_explored_cell(&mut self, graph: &GraphManager, cell: CellRef) {
        if self.explored_cells.iter().any(|c| c.cell == cell) {
            return;
        }
        if let Some(version) = graph.cell_stitched_version(cell) {
            self.explored_cells.push(ExploredCell {
                cell,
                stitched_version: version,
            });
        }
    }

    pub fn explored_cells(&self) -> &[ExploredCell] {
        &self.explored_cells
    }

    /// Checks that no explored cell was unstitched or re-stitched since
    pub fn explored_cells_still_stitched(&self, graph: &GraphManager) -> bool {
        self.explored_cells
            .iter()
            .all(|c| graph.cell_stitched_version(c.cell) == Some(c.stitched_version))
    }

    #[inline]
    fn check_id(&self, id: u32) {
        assert!(
            id < self.max_vertex_count,
            "A* id {} out of range ({})",
            id,
            self.max_vertex_count
        );
    }

    pub fn status(&self, id: u32) -> VertexStatus {
        self.check_id(id);
        self.status.get(id as usize)
    }

    pub fn cost_from_start(&self, id: u32) -> f32 {
        self.check_id(id);
        self.cost_from_start[id as usize]
    }

    pub fn estimated_cost_to_dest(&self, id: u32) -> f32 {
        self.check_id(id);
        self.estimated_cost_to_dest[id as usize]
    }

    pub fn predecessor(&self, id: u32) -> Option<u32> {
        self.check_id(id);
        match self.predecessor[id as usize] {
            NO_PREDECESSOR => None,
            p => Some(p),
        }
    }

    /// Vertex that was stored under `id` in this search
    pub fn vertex_ref(&self, id: u32) -> VertexRef {
        self.check_id(id);
        self.vertex_refs[id as usize]
    }

    /// Number of open vertices
    pub fn open_len(&self) -> usize {
        self.open_list.len()
    }

    pub fn is_open_list_empty(&self) -> bool {
        self.open_list.is_empty()
    }

    /// Open vertex with the lowest `f`, without removing it
    pub fn best_candidate(&self) -> Option<u32> {
        self.open_list.first().map(|e| e.id)
    }

    /// Removes the open vertex with the lowest `f` and closes it
    pub fn pop_best_candidate(&mut self) -> Option<u32> {
        let entry = self.open_list.pop_first()?;
        self.set_status(entry.id, VertexStatus::Closed);
        Some(entry.id)
    }

    fn set_status(&mut self, id: u32, status: VertexStatus) {
        let previous = self.status.get(id as usize);
        assert!(
            status >= previous,
            "vertex {} status regressed from {:?} to {:?}",
            id,
            previous,
            status
        );
        self.status.set(id as usize, status);
    }

    fn open_key(&self, id: u32) -> OpenEntry {
        let i = id as usize;
        OpenEntry {
            f: self.cost_from_start[i] + self.estimated_cost_to_dest[i],
            seq: self.open_seq[i],
            id,
        }
    }

    fn insert_open(&mut self, id: u32) {
        self.open_seq[id as usize] = self.next_seq;
        self.next_seq += 1;
        let key = self.open_key(id);
        self.open_list.insert(key);
    }

    /// Relaxes `candidate` reached from `predecessor` with cost `g` and estimate `h`
    ///
    /// Closed candidates are ignored. Open candidates are updated only if `g`
    /// improves their cost. New candidates are opened.
    pub fn process_candidate(
        &mut self,
        candidate: VertexRef,
        candidate_id: u32,
        h: f32,
        g: f32,
        predecessor: Option<u32>,
    ) -> CandidateUpdate {
        self.check_id(candidate_id);
        if let Some(p) = predecessor {
            self.check_id(p);
        }
        let i = candidate_id as usize;

        match self.status.get(i) {
            VertexStatus::Closed => CandidateUpdate::Ignored,
            VertexStatus::Opened => {
                if g < self.cost_from_start[i] {
                    let old_key = self.open_key(candidate_id);
                    let removed = self.open_list.remove(&old_key);
                    debug_assert!(removed, "open vertex {} missing from open list", candidate_id);
                    self.cost_from_start[i] = g;
                    self.predecessor[i] = predecessor.unwrap_or(NO_PREDECESSOR);
                    self.insert_open(candidate_id);
                    CandidateUpdate::Improved
                } else {
                    CandidateUpdate::Ignored
                }
            }
            VertexStatus::New => {
                self.vertex_refs[i] = candidate;
                self.cost_from_start[i] = g;
                self.estimated_cost_to_dest[i] = h;
                self.predecessor[i] = predecessor.unwrap_or(NO_PREDECESSOR);
                self.set_status(candidate_id, VertexStatus::Opened);
                self.insert_open(candidate_id);
                CandidateUpdate::Opened
            }
        }
    }

    /// Builds the path from `start` to `end` by walking predecessors backwards
    ///
    /// Returns false when `end` was never reached or when the chain does not
    /// reach `start` within `max_vertex_count` steps.
    pub fn construct_path(
        &self,
        graph: &GraphManager,
        path: &mut Path,
        start: VertexRef,
        end: VertexRef,
    ) -> bool {
        path.clear();

        let (Some(start_id), Some(end_id)) = (graph.astar_id(start), graph.astar_id(end)) else {
            return false;
        };
        if start_id >= self.max_vertex_count || end_id >= self.max_vertex_count {
            return false;
        }
        if self.status.get(end_id as usize) == VertexStatus::New
            || self.vertex_refs[end_id as usize] != end
        {
            return false;
        }

        let mut chain = vec![end_id];
        let mut current = end_id;
        while current != start_id {
            if chain.len() > self.max_vertex_count as usize {
                log::warn!("Predecessor chain from {} does not reach the start", end);
                return false;
            }
            current = match self.predecessor[current as usize] {
                NO_PREDECESSOR => return false,
                p => p,
            };
            chain.push(current);
        }

        let mut following: Option<VertexRef> = None;
        for id in chain {
            let vertex = self.vertex_refs[id as usize];
            let Ok(position) = graph.vertex_position(vertex) else {
                path.clear();
                return false;
            };

            let mut node = PathNode::from_vertex(vertex, position);
            if let Some(next) = following {
                node.next_edge = graph.find_edge(vertex, next);
                node.path_object = node
                    .next_edge
                    .and_then(|e| graph.edge(e).ok())
                    .and_then(|e| e.path_object());
            }
            path.push_front(node);
            following = Some(vertex);
        }

        true
    }
}
