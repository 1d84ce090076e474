//! Versioned references into the cell-streamed graph
//!
//! A reference packs `salt | cell slot | index` into a `u64`. Every cell slot
//! owns a salt that changes whenever the slot is emptied, so a reference taken
//! before a cell was unstitched no longer matches whatever occupies the slot
//! afterwards. The all-zero value is the null reference.

/// Number of bits for the vertex/edge index inside a cell
pub(crate) const REF_INDEX_BITS: u32 = 32;
/// Number of bits for the cell slot
pub(crate) const REF_CELL_BITS: u32 = 16;
/// Number of bits for the salt
pub(crate) const REF_SALT_BITS: u32 = 16;

pub(crate) const REF_INDEX_MASK: u64 = (1 << REF_INDEX_BITS) - 1;
pub(crate) const REF_CELL_MASK: u64 = (1 << REF_CELL_BITS) - 1;
pub(crate) const REF_SALT_MASK: u64 = (1 << REF_SALT_BITS) - 1;

/// Largest number of cell slots a graph can address
pub const MAX_CELL_SLOTS: usize = 1 << REF_CELL_BITS;

macro_rules! graph_ref {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        #[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(u64);

        impl $name {
            /// The null reference
            pub const NULL: Self = Self(0);

            /// Wraps a raw encoded reference
            #[inline]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Raw encoded value
            #[inline]
            pub const fn id(&self) -> u64 {
                self.0
            }

            /// Returns true for the null reference
            #[inline]
            pub const fn is_null(&self) -> bool {
                self.0 == 0
            }

            /// Encodes a reference from its parts
            #[inline]
            pub(crate) fn encode(salt: u32, cell_slot: u32, index: u32) -> Self {
                Self(encode_ref(salt, cell_slot, index))
            }

            /// Decodes into `(salt, cell slot, index)`
            #[inline]
            pub(crate) fn decode(&self) -> (u32, u32, u32) {
                decode_ref(self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let (salt, cell, index) = decode_ref(self.0);
                write!(f, "{}({}:{}:{})", stringify!($name), salt, cell, index)
            }
        }
    };
}

graph_ref!(
    /// Reference to a vertex of a loaded cell
    VertexRef
);
graph_ref!(
    /// Reference to an edge of a loaded cell
    EdgeRef
);
graph_ref!(
    /// Reference to a loaded cell
    CellRef
);

/// Packs salt, cell slot and index into a raw reference
#[inline]
pub fn encode_ref(salt: u32, cell_slot: u32, index: u32) -> u64 {
    ((salt as u64 & REF_SALT_MASK) << (REF_INDEX_BITS + REF_CELL_BITS))
        | ((cell_slot as u64 & REF_CELL_MASK) << REF_INDEX_BITS)
        | (index as u64 & REF_INDEX_MASK)
}

/// Unpacks a raw reference into `(salt, cell slot, index)`
#[inline]
pub fn decode_ref(reference: u64) -> (u32, u32, u32) {
    let salt = (reference >> (REF_INDEX_BITS + REF_CELL_BITS)) & REF_SALT_MASK;
    let cell = (reference >> REF_INDEX_BITS) & REF_CELL_MASK;
    let index = reference & REF_INDEX_MASK;
    (salt as u32, cell as u32, index as u32)
}

/// Next salt value for a slot being emptied, never zero
#[inline]
pub(crate) fn next_salt(salt: u32) -> u32 {
    let next = (salt as u64 + 1) & REF_SALT_MASK;
    if next == 0 {
        1
    } else {
        next as u32
    }
}

/// Stable user-level identifier of a vertex, unique across all cells
///
/// Edges name their destination by uid so that cells can be stitched to
/// neighbours that are streamed in later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexUid(pub u32);

/// Identity of a pathfinding agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentId(pub u32);

/// Identity of a team of agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct TeamId(pub u32);
