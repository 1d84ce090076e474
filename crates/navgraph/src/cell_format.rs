//! Binary and JSON persistence of graph cells
//!
//! A cell blob starts with a five-word header followed by the vertex records and
//! the edge records, all little-endian. A graph file is a [`GRAPH_MAGIC`]
//! header and a cell count followed by that many length-prefixed cell blobs.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use navgraph_common::{Error, Result, Vec3};

use super::graph::{EdgeData, GraphCellData, GraphManager, GraphParams, PathObjectLink, VertexData};
use super::graph_ref::VertexUid;
use super::Status;

/// Magic number for cell blobs ('NGCL')
pub const CELL_MAGIC: u32 = 0x4C43_474E;

/// Current cell format version
pub const CELL_VERSION: u32 = 1;

/// Magic number for graph files ('NGRF')
pub const GRAPH_MAGIC: u32 = 0x4652_474E;

/// Current graph file version
pub const GRAPH_VERSION: u32 = 1;

const VERTEX_RECORD_SIZE: usize = 4 + 12 + 4;
const EDGE_RECORD_SIZE: usize = 4 + 4 + 1 + 4;

const EDGE_HAS_PATH_OBJECT: u8 = 0x01;
const EDGE_SMOOTHABLE: u8 = 0x02;

#[derive(Debug, Clone)]
struct CellHeader {
    magic: u32,
    version: u32,
    cell_id: u32,
    vertex_count: u32,
    edge_count: u32,
}

impl CellHeader {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.magic)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.cell_id)?;
        writer.write_u32::<LittleEndian>(self.vertex_count)?;
        writer.write_u32::<LittleEndian>(self.edge_count)?;
        Ok(())
    }

    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            magic: reader.read_u32::<LittleEndian>()?,
            version: reader.read_u32::<LittleEndian>()?,
            cell_id: reader.read_u32::<LittleEndian>()?,
            vertex_count: reader.read_u32::<LittleEndian>()?,
            edge_count: reader.read_u32::<LittleEndian>()?,
        })
    }
}

fn write_vertex<W: Write>(writer: &mut W, vertex: &VertexData) -> Result<()> {
    writer.write_u32::<LittleEndian>(vertex.uid.0)?;
    writer.write_f32::<LittleEndian>(vertex.position.x)?;
    writer.write_f32::<LittleEndian>(vertex.position.y)?;
    writer.write_f32::<LittleEndian>(vertex.position.z)?;
    writer.write_u32::<LittleEndian>(vertex.terrain)?;
    Ok(())
}

fn read_vertex<R: Read>(reader: &mut R) -> Result<VertexData> {
    let uid = VertexUid(reader.read_u32::<LittleEndian>()?);
    let x = reader.read_f32::<LittleEndian>()?;
    let y = reader.read_f32::<LittleEndian>()?;
    let z = reader.read_f32::<LittleEndian>()?;
    let terrain = reader.read_u32::<LittleEndian>()?;
    Ok(VertexData {
        uid,
        position: Vec3::new(x, y, z),
        terrain,
    })
}

fn write_edge<W: Write>(writer: &mut W, edge: &EdgeData) -> Result<()> {
    writer.write_u32::<LittleEndian>(edge.from)?;
    writer.write_u32::<LittleEndian>(edge.to.0)?;
    let (flags, id) = match edge.path_object {
        Some(link) => {
            let smoothable = if link.smoothable { EDGE_SMOOTHABLE } else { 0 };
            (EDGE_HAS_PATH_OBJECT | smoothable, link.id)
        }
        None => (0, 0),
    };
    writer.write_u8(flags)?;
    writer.write_u32::<LittleEndian>(id)?;
    Ok(())
}

fn read_edge<R: Read>(reader: &mut R) -> Result<EdgeData> {
    let from = reader.read_u32::<LittleEndian>()?;
    let to = VertexUid(reader.read_u32::<LittleEndian>()?);
    let flags = reader.read_u8()?;
    let id = reader.read_u32::<LittleEndian>()?;
    let path_object = (flags & EDGE_HAS_PATH_OBJECT != 0).then_some(PathObjectLink {
        id,
        smoothable: flags & EDGE_SMOOTHABLE != 0,
    });
    Ok(EdgeData {
        from,
        to,
        path_object,
    })
}

/// Serializes one cell
pub fn save_cell_to_binary(cell: &GraphCellData) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(
        20 + cell.vertices.len() * VERTEX_RECORD_SIZE + cell.edges.len() * EDGE_RECORD_SIZE,
    );
    cell.write_to(&mut data)?;
    Ok(data)
}

/// Deserializes and validates one cell
///
/// Record counts that do not fit in `data` are rejected before allocating.
pub fn load_cell_from_binary(data: &[u8]) -> Result<GraphCellData> {
    let mut cursor = Cursor::new(data);
    let header = CellHeader::read_from(&mut cursor)?;
    check_header(&header)?;

    let remaining = data.len().saturating_sub(cursor.position() as usize);
    let needed = (header.vertex_count as usize)
        .saturating_mul(VERTEX_RECORD_SIZE)
        .saturating_add((header.edge_count as usize).saturating_mul(EDGE_RECORD_SIZE));
    if needed > remaining {
        return Err(Error::Graph(Status::DataCorrupted.to_string()));
    }

    read_body(&header, &mut cursor)
}

fn check_header(header: &CellHeader) -> Result<()> {
    if header.magic != CELL_MAGIC {
        return Err(Error::Graph(Status::WrongMagic.to_string()));
    }
    if header.version != CELL_VERSION {
        return Err(Error::Graph(Status::WrongVersion.to_string()));
    }
    Ok(())
}

fn read_body<R: Read>(header: &CellHeader, reader: &mut R) -> Result<GraphCellData> {
    let mut cell = GraphCellData::new(header.cell_id);
    for _ in 0..header.vertex_count {
        cell.vertices.push(read_vertex(reader)?);
    }
    for _ in 0..header.edge_count {
        cell.edges.push(read_edge(reader)?);
    }
    cell.validate()?;
    Ok(cell)
}

/// Serializes a set of cells into one graph file
pub fn save_cells_to_binary(cells: &[GraphCellData]) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    data.write_u32::<LittleEndian>(GRAPH_MAGIC)?;
    data.write_u32::<LittleEndian>(GRAPH_VERSION)?;
    data.write_u32::<LittleEndian>(cells.len() as u32)?;
    for cell in cells {
        let blob = save_cell_to_binary(cell)?;
        data.write_u32::<LittleEndian>(blob.len() as u32)?;
        data.write_all(&blob)?;
    }
    Ok(data)
}

/// Deserializes a graph file into its cells
pub fn load_cells_from_binary(data: &[u8]) -> Result<Vec<GraphCellData>> {
    let mut cursor = Cursor::new(data);
    if cursor.read_u32::<LittleEndian>()? != GRAPH_MAGIC {
        return Err(Error::Graph(Status::WrongMagic.to_string()));
    }
    if cursor.read_u32::<LittleEndian>()? != GRAPH_VERSION {
        return Err(Error::Graph(Status::WrongVersion.to_string()));
    }

    let count = cursor.read_u32::<LittleEndian>()?;
    let mut cells = Vec::new();
    for _ in 0..count {
        let len = cursor.read_u32::<LittleEndian>()? as usize;
        let start = cursor.position() as usize;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= data.len())
            .ok_or(Error::Graph(Status::DataCorrupted.to_string()))?;
        cells.push(load_cell_from_binary(&data[start..end])?);
        cursor.set_position(end as u64);
    }
    Ok(cells)
}

impl GraphCellData {
    /// Writes the cell in binary form
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let header = CellHeader {
            magic: CELL_MAGIC,
            version: CELL_VERSION,
            cell_id: self.cell_id,
            vertex_count: self.vertices.len() as u32,
            edge_count: self.edges.len() as u32,
        };
        header.write_to(writer)?;
        for vertex in &self.vertices {
            write_vertex(writer, vertex)?;
        }
        for edge in &self.edges {
            write_edge(writer, edge)?;
        }
        Ok(())
    }

    /// Reads and validates a cell written by [`write_to`](Self::write_to)
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let header = CellHeader::read_from(reader)?;
        check_header(&header)?;
        read_body(&header, reader)
    }

    /// Saves the cell to a binary file
    pub fn save_to_binary<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let data = save_cell_to_binary(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Loads a cell from a binary file
    pub fn load_from_binary<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        load_cell_from_binary(&data)
    }

    /// Saves the cell to a JSON file
    #[cfg(feature = "serialization")]
    pub fn save_to_json<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|_| Error::Graph(Status::Failure.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Loads and validates a cell from a JSON file
    #[cfg(feature = "serialization")]
    pub fn load_from_json<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let cell: Self =
            serde_json::from_str(&json).map_err(|_| Error::Graph(Status::DataCorrupted.to_string()))?;
        cell.validate()?;
        Ok(cell)
    }
}

impl GraphManager {
    /// Saves every loaded cell to a graph file
    pub fn save_to_binary<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let cells = self
            .cells()
            .map(|(cell_ref, _)| self.cell_data(cell_ref))
            .collect::<Result<Vec<_>>>()?;
        let data = save_cells_to_binary(&cells)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Loads a graph file and stitches all of its cells
    pub fn load_from_binary<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        let cells = load_cells_from_binary(&data)?;
        let mut graph = GraphManager::new(GraphParams::default().with_max_cells(cells.len().max(1)))?;
        for cell in cells {
            graph.add_cell(cell)?;
        }
        Ok(graph)
    }
}
