//! Packed per-vertex search status
//!
//! Four statuses per byte. Growing the table keeps every status already
//! written and fills the new tail with [`VertexStatus::New`].

/// Search status of a vertex within one A* run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum VertexStatus {
    /// Not yet discovered
    New = 0,
    /// In the open list
    Opened = 1,
    /// Cost is final
    Closed = 2,
}

impl VertexStatus {
    #[inline]
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => VertexStatus::New,
            1 => VertexStatus::Opened,
            _ => VertexStatus::Closed,
        }
    }
}

const STATUSES_PER_BYTE: usize = 4;

/// Two-bit packed status table indexed by A* id
#[derive(Debug, Clone, Default)]
pub struct TwoBitsVerticesStatus {
    bits: Vec<u8>,
    len: usize,
}

impl TwoBitsVerticesStatus {
    /// Creates a table holding `len` statuses, all `New`
    pub fn new(len: usize) -> Self {
        Self {
            bits: vec![0; len.div_ceil(STATUSES_PER_BYTE)],
            len,
        }
    }

    /// Number of statuses held
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Grows the table to `new_len`, preserving existing statuses
    ///
    /// Shrinking is ignored.
    pub fn allocate(&mut self, new_len: usize) {
        if new_len <= self.len {
            return;
        }
        self.bits.resize(new_len.div_ceil(STATUSES_PER_BYTE), 0);
        self.len = new_len;
    }

    /// Resets every status to `New`
    pub fn reset(&mut self) {
        self.bits.fill(0);
    }

    /// Status of entry `index`
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn get(&self, index: usize) -> VertexStatus {
        assert!(
            index < self.len,
            "vertex status index {} out of range ({})",
            index,
            self.len
        );
        let shift = (index % STATUSES_PER_BYTE) * 2;
        VertexStatus::from_bits(self.bits[index / STATUSES_PER_BYTE] >> shift)
    }

    /// Sets the status of entry `index`
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn set(&mut self, index: usize, status: VertexStatus) {
        assert!(
            index < self.len,
            "vertex status index {} out of range ({})",
            index,
            self.len
        );
        let shift = (index % STATUSES_PER_BYTE) * 2;
        let byte = &mut self.bits[index / STATUSES_PER_BYTE];
        *byte = (*byte & !(0b11 << shift)) | ((status as u8) << shift);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_neighbours_independent() {
        let mut table = TwoBitsVerticesStatus::new(9);
        table.set(4, VertexStatus::Opened);
        table.set(5, VertexStatus::Closed);
        table.set(7, VertexStatus::Closed);

        assert_eq!(table.get(3), VertexStatus::New);
        assert_eq!(table.get(4), VertexStatus::Opened);
        assert_eq!(table.get(5), VertexStatus::Closed);
        assert_eq!(table.get(6), VertexStatus::New);
        assert_eq!(table.get(7), VertexStatus::Closed);

        table.set(5, VertexStatus::Opened);
        assert_eq!(table.get(4), VertexStatus::Opened);
        assert_eq!(table.get(5), VertexStatus::Opened);
    }

    #[test]
    fn test_allocate_preserves_prefix() {
        let mut table = TwoBitsVerticesStatus::new(3);
        table.set(0, VertexStatus::Closed);
        table.set(2, VertexStatus::Opened);

        table.allocate(11);
        assert_eq!(table.len(), 11);
        assert_eq!(table.get(0), VertexStatus::Closed);
        assert_eq!(table.get(1), VertexStatus::New);
        assert_eq!(table.get(2), VertexStatus::Opened);
        assert_eq!(table.get(10), VertexStatus::New);

        table.allocate(2);
        assert_eq!(table.len(), 11);
    }

    #[test]
    fn test_reset() {
        let mut table = TwoBitsVerticesStatus::new(5);
        table.set(4, VertexStatus::Closed);
        table.reset();
        assert!((0..5).all(|i| table.get(i) == VertexStatus::New));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_panics() {
        let table = TwoBitsVerticesStatus::new(4);
        table.get(4);
    }
}
