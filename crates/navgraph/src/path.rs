//! Computed paths
//!
//! A [`Path`] is a doubly linked list of [`PathNode`]s stored in a slab.
//! Node ids stay valid until the node itself is erased, so a follower can hold
//! on to its current node while consumed nodes are removed from the front.

use navgraph_common::{polyline_length, Vec3};

use super::graph::PathObjectLink;
use super::graph_ref::{EdgeRef, VertexRef};

/// One waypoint of a path
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PathNode {
    pub position: Vec3,
    /// Graph vertex this node was built from, if any
    pub vertex: Option<VertexRef>,
    /// Graph edge leading to the next node, if any
    pub next_edge: Option<EdgeRef>,
    /// Path-object controlling the edge leading to the next node
    pub path_object: Option<PathObjectLink>,
}

impl PathNode {
    /// Node that is not tied to the graph
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            vertex: None,
            next_edge: None,
            path_object: None,
        }
    }

    /// Node built from a graph vertex
    pub fn from_vertex(vertex: VertexRef, position: Vec3) -> Self {
        Self {
            position,
            vertex: Some(vertex),
            next_edge: None,
            path_object: None,
        }
    }
}

/// Stable handle to a node of a [`Path`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathNodeId {
    index: u32,
    generation: u32,
}

const NIL: u32 = u32::MAX;

#[derive(Debug, Clone)]
struct Slot {
    node: Option<PathNode>,
    generation: u32,
    prev: u32,
    next: u32,
}

/// Ordered, mutable sequence of waypoints
#[derive(Debug, Clone)]
pub struct Path {
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: u32,
    tail: u32,
    len: usize,
}

impl Default for Path {
    fn default() -> Self {
        Self::new()
    }
}

impl Path {
    /// Creates an empty path
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    /// Straight path through the given positions
    pub fn from_positions(positions: impl IntoIterator<Item = Vec3>) -> Self {
        let mut path = Self::new();
        for position in positions {
            path.push_back(PathNode::at(position));
        }
        path
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes every node; outstanding ids become invalid
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.head = NIL;
        self.tail = NIL;
        self.len = 0;
    }

    fn allocate(&mut self, node: PathNode) -> u32 {
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].node = Some(node);
                index
            }
            None => {
                self.slots.push(Slot {
                    node: Some(node),
                    generation: 0,
                    prev: NIL,
                    next: NIL,
                });
                (self.slots.len() - 1) as u32
            }
        }
    }

    fn id_of(&self, index: u32) -> Option<PathNodeId> {
        if index == NIL {
            return None;
        }
        Some(PathNodeId {
            index,
            generation: self.slots[index as usize].generation,
        })
    }

    fn slot(&self, id: PathNodeId) -> Option<&Slot> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation && s.node.is_some())
    }

    /// Appends a node
    pub fn push_back(&mut self, node: PathNode) -> PathNodeId {
        let index = self.allocate(node);
        {
            let slot = &mut self.slots[index as usize];
            slot.prev = self.tail;
            slot.next = NIL;
        }
        if self.tail != NIL {
            self.slots[self.tail as usize].next = index;
        } else {
            self.head = index;
        }
        self.tail = index;
        self.len += 1;
        PathNodeId {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    /// Prepends a node
    pub fn push_front(&mut self, node: PathNode) -> PathNodeId {
        let index = self.allocate(node);
        {
            let slot = &mut self.slots[index as usize];
            slot.prev = NIL;
            slot.next = self.head;
        }
        if self.head != NIL {
            self.slots[self.head as usize].prev = index;
        } else {
            self.tail = index;
        }
        self.head = index;
        self.len += 1;
        PathNodeId {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    /// Removes a node, leaving every other id valid
    pub fn erase(&mut self, id: PathNodeId) -> Option<PathNode> {
        let (prev, next) = {
            let slot = self.slot(id)?;
            (slot.prev, slot.next)
        };

        if prev != NIL {
            self.slots[prev as usize].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next as usize].prev = prev;
        } else {
            self.tail = prev;
        }

        let slot = &mut self.slots[id.index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        slot.prev = NIL;
        slot.next = NIL;
        self.free.push(id.index);
        self.len -= 1;
        slot.node.take()
    }

    /// Removes every node before `id`, returning how many were removed
    pub fn erase_before(&mut self, id: PathNodeId) -> usize {
        if !self.contains(id) {
            return 0;
        }
        let mut removed = 0;
        while let Some(first) = self.first() {
            if first == id {
                break;
            }
            self.erase(first);
            removed += 1;
        }
        removed
    }

    /// Checks whether an id still designates a node of this path
    pub fn contains(&self, id: PathNodeId) -> bool {
        self.slot(id).is_some()
    }

    pub fn first(&self) -> Option<PathNodeId> {
        self.id_of(self.head)
    }

    pub fn last(&self) -> Option<PathNodeId> {
        self.id_of(self.tail)
    }

    pub fn next(&self, id: PathNodeId) -> Option<PathNodeId> {
        self.slot(id).and_then(|s| self.id_of(s.next))
    }

    pub fn prev(&self, id: PathNodeId) -> Option<PathNodeId> {
        self.slot(id).and_then(|s| self.id_of(s.prev))
    }

    pub fn get(&self, id: PathNodeId) -> Option<&PathNode> {
        self.slot(id).and_then(|s| s.node.as_ref())
    }

    pub fn get_mut(&mut self, id: PathNodeId) -> Option<&mut PathNode> {
        if !self.contains(id) {
            return None;
        }
        self.slots[id.index as usize].node.as_mut()
    }

    /// Iterates from first to last node
    pub fn iter(&self) -> PathIter<'_> {
        PathIter {
            path: self,
            cursor: self.head,
        }
    }

    /// Iterates over node ids from first to last
    pub fn ids(&self) -> impl Iterator<Item = PathNodeId> + '_ {
        std::iter::successors(self.first(), move |id| self.next(*id))
    }

    /// Node positions in order
    pub fn positions(&self) -> Vec<Vec3> {
        self.iter().map(|n| n.position).collect()
    }

    /// Sum of segment lengths
    pub fn length(&self) -> f32 {
        polyline_length(&self.positions())
    }
}

/// Iterator over the nodes of a [`Path`]
pub struct PathIter<'a> {
    path: &'a Path,
    cursor: u32,
}

impl<'a> Iterator for PathIter<'a> {
    type Item = &'a PathNode;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NIL {
            return None;
        }
        let slot = &self.path.slots[self.cursor as usize];
        self.cursor = slot.next;
        slot.node.as_ref()
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a PathNode;
    type IntoIter = PathIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
