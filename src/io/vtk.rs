//! Reading and writing datasets as VTK files.
//!
//! Linear line, triangle, quadrilateral, tetrahedral and hexahedral topologies map to VTK cells.
//! Quadrilateral and hexahedral elements store their nodes in lattice order, which differs from
//! VTK's counter-clockwise vertex order by a fixed permutation applied on both read and write.
use crate::dataset::{is_spatial_index, props, Dataset};
use crate::matrix::{IndexMatrix, RealMatrix, Vec3Matrix};
use eyre::{eyre, WrapErr};
use nalgebra::Vector3;
use std::path::Path;
use vtkio::model::{
    Attribute, Attributes, ByteOrder, CellType, Cells, DataArray, DataSet, ElementType as VtkElementType, Extent,
    FieldArray, IOBuffer, Piece, PolyDataPiece, StructuredGridPiece, UnstructuredGridPiece, Version, VertexNumbers,
    Vtk,
};

/// A cell type with its element type and lattice-to-VTK vertex order.
struct CellKind {
    cell: CellType,
    type_name: &'static str,
    matrix_name: &'static str,
    order: &'static [usize],
}

const CELL_KINDS: [CellKind; 5] = [
    CellKind {
        cell: CellType::Line,
        type_name: "Line1NL",
        matrix_name: "lines",
        order: &[0, 1],
    },
    CellKind {
        cell: CellType::Triangle,
        type_name: "Tri1NL",
        matrix_name: "tris",
        order: &[0, 1, 2],
    },
    CellKind {
        cell: CellType::Quad,
        type_name: "Quad1NL",
        matrix_name: "quads",
        order: &[0, 1, 3, 2],
    },
    CellKind {
        cell: CellType::Tetra,
        type_name: "Tet1NL",
        matrix_name: "tets",
        order: &[0, 1, 2, 3],
    },
    CellKind {
        cell: CellType::Hexahedron,
        type_name: "Hex1NL",
        matrix_name: "hexes",
        order: &[0, 1, 3, 2, 4, 5, 7, 6],
    },
];

fn kind_for_type(type_name: &str) -> Option<&'static CellKind> {
    CELL_KINDS.iter().find(|k| k.type_name == type_name)
}

/// Applies `order` to `row`. Every order in the table is its own inverse.
fn permute(row: &[usize], order: &[usize]) -> Vec<usize> {
    order.iter().map(|&i| row[i]).collect()
}

/// Values of a buffer of any numeric type as `f64`.
fn buffer_values(buffer: &IOBuffer) -> Option<Vec<f64>> {
    fn convert<T: Copy + Into<f64>>(values: &[T]) -> Option<Vec<f64>> {
        Some(values.iter().map(|&v| v.into()).collect())
    }
    match buffer {
        IOBuffer::U8(v) => convert(v),
        IOBuffer::I8(v) => convert(v),
        IOBuffer::U16(v) => convert(v),
        IOBuffer::I16(v) => convert(v),
        IOBuffer::U32(v) => convert(v),
        IOBuffer::I32(v) => convert(v),
        IOBuffer::U64(v) => Some(v.iter().map(|&x| x as f64).collect()),
        IOBuffer::I64(v) => Some(v.iter().map(|&x| x as f64).collect()),
        IOBuffer::F32(v) => convert(v),
        IOBuffer::F64(v) => Some(v.clone()),
        _ => None,
    }
}

/// Vertex lists of the cells of `numbers`.
fn cell_vertices(numbers: VertexNumbers) -> eyre::Result<Vec<Vec<usize>>> {
    match numbers {
        VertexNumbers::Legacy { num_cells, vertices } => {
            let mut cells = Vec::with_capacity(num_cells as usize);
            let mut rest = vertices.as_slice();
            while let Some((&count, tail)) = rest.split_first() {
                let count = count as usize;
                if tail.len() < count {
                    return Err(eyre!("Cell list ends inside a cell of {} vertices", count));
                }
                cells.push(tail[..count].iter().map(|&i| i as usize).collect());
                rest = &tail[count..];
            }
            if cells.len() != num_cells as usize {
                return Err(eyre!("Expected {} cells, found {}", num_cells, cells.len()));
            }
            Ok(cells)
        }
        VertexNumbers::XML { connectivity, offsets } => {
            let mut start = 0;
            offsets
                .iter()
                .map(|&end| {
                    let end = end as usize;
                    let cell = connectivity
                        .get(start..end)
                        .ok_or_else(|| eyre!("Cell offset {} outside the connectivity array", end))?;
                    start = end;
                    Ok(cell.iter().map(|&i| i as usize).collect())
                })
                .collect()
        }
    }
}

fn legacy_numbers(cells: &[Vec<usize>]) -> VertexNumbers {
    let mut vertices = Vec::with_capacity(cells.iter().map(|c| c.len() + 1).sum());
    for cell in cells {
        vertices.push(cell.len() as u32);
        vertices.extend(cell.iter().map(|&i| i as u32));
    }
    VertexNumbers::Legacy {
        num_cells: cells.len() as u32,
        vertices,
    }
}

fn xml_numbers(cells: &[Vec<usize>]) -> VertexNumbers {
    let mut offset = 0;
    let offsets = cells
        .iter()
        .map(|c| {
            offset += c.len() as u64;
            offset
        })
        .collect();
    VertexNumbers::XML {
        connectivity: cells.iter().flatten().map(|&i| i as u64).collect(),
        offsets,
    }
}

/// An attribute for a field with `cols` components per row.
fn field_attribute(name: &str, cols: usize, values: Vec<f64>) -> Attribute {
    let elem = match cols {
        1 => VtkElementType::Scalars {
            num_comp: 1,
            lookup_table: None,
        },
        3 => VtkElementType::Vectors,
        9 => VtkElementType::Tensors,
        _ => {
            return Attribute::Field {
                name: name.to_string(),
                data_array: vec![FieldArray {
                    name: name.to_string(),
                    elem: cols as u32,
                    data: IOBuffer::F64(values),
                }],
            }
        }
    };
    Attribute::DataArray(DataArray {
        name: name.to_string(),
        elem,
        data: IOBuffer::F64(values),
    })
}

fn node_buffer(nodes: &Vec3Matrix) -> IOBuffer {
    IOBuffer::F64(nodes.read().iter().flat_map(|v| [v.x, v.y, v.z]).collect())
}

/// Cells of the writable topologies of a dataset, in topology order.
struct CellTable<'a> {
    topologies: Vec<(&'a IndexMatrix, &'static CellKind)>,
    cells: Vec<Vec<usize>>,
    types: Vec<CellType>,
}

impl<'a> CellTable<'a> {
    fn new(ds: &'a Dataset, accept: impl Fn(&CellKind) -> bool) -> eyre::Result<Self> {
        let mut table = CellTable {
            topologies: Vec::new(),
            cells: Vec::new(),
            types: Vec::new(),
        };
        for inds in ds.index_sets().iter().filter(|m| is_spatial_index(m)) {
            let kind = match kind_for_type(inds.type_code()).filter(|k| accept(k)) {
                Some(kind) => kind,
                None => {
                    log::warn!(
                        "Skipping index set {:?} of type {:?}, which has no VTK cell type",
                        inds.name(),
                        inds.type_code()
                    );
                    continue;
                }
            };
            if inds.cols() != kind.order.len() {
                return Err(eyre!(
                    "Index set {:?} of type {} has {} columns",
                    inds.name(),
                    kind.type_name,
                    inds.cols()
                ));
            }
            for row in inds.index_rows()? {
                table.cells.push(permute(&row, kind.order));
                table.types.push(kind.cell);
            }
            table.topologies.push((inds, kind));
        }
        Ok(table)
    }

    /// Point and cell attributes of the fields of `ds`.
    ///
    /// Element fields of one topology are padded with zeros over the cells of the others.
    fn attributes(&self, ds: &Dataset) -> Attributes {
        let mut attributes = Attributes::new();
        for field in ds.data_fields() {
            let cols = field.cols();
            if ds.is_element_field(field) {
                let topology = ds.field_topology(field).map(|t| t.name().to_string());
                let mut values = vec![0.0; self.cells.len() * cols];
                let mut start = 0;
                let mut found = false;
                for (inds, _) in &self.topologies {
                    if Some(inds.name()) == topology.as_deref() {
                        let data = field.read();
                        values[start * cols..(start + inds.rows()) * cols].copy_from_slice(&data);
                        found = true;
                    }
                    start += inds.rows();
                }
                if found {
                    attributes.cell.push(field_attribute(field.name(), cols, values));
                } else {
                    log::warn!("Skipping element field {:?} without a written topology", field.name());
                }
            } else if field.rows() == ds.nodes().rows() {
                attributes.point.push(field_attribute(field.name(), cols, field.to_vec()));
            } else {
                log::warn!("Skipping field {:?} with {} rows", field.name(), field.rows());
            }
        }
        attributes
    }
}

fn export(vtk: Vtk, path: &Path, ascii: bool) -> eyre::Result<()> {
    let result = if ascii { vtk.export_ascii(path) } else { vtk.export(path) };
    result.map_err(|err| eyre!("Failed to write VTK file {:?}: {}", path, err))
}

/// Writes `ds` as a legacy ASCII unstructured grid.
pub fn write_dataset_legacy(path: impl AsRef<Path>, ds: &Dataset) -> eyre::Result<()> {
    let path = path.as_ref();
    let table = CellTable::new(ds, |_| true)?;
    let piece = UnstructuredGridPiece {
        points: node_buffer(ds.nodes()),
        cells: Cells {
            cell_verts: legacy_numbers(&table.cells),
            types: table.types.clone(),
        },
        data: table.attributes(ds),
    };

    log::debug!("Writing {:?} with {} cells to {:?}", ds.name(), table.cells.len(), path);
    let vtk = Vtk {
        version: Version { major: 4, minor: 2 },
        title: ds.name().to_string(),
        byte_order: ByteOrder::BigEndian,
        file_path: None,
        data: DataSet::UnstructuredGrid {
            meta: None,
            pieces: vec![Piece::Inline(Box::new(piece))],
        },
    };
    export(vtk, path, true)
}

/// Writes `ds` as a VTK XML file, polydata for a `.vtp` path and an unstructured grid otherwise.
///
/// Polydata holds only line, triangle and quadrilateral topologies.
pub fn write_dataset_xml(path: impl AsRef<Path>, ds: &Dataset) -> eyre::Result<()> {
    let path = path.as_ref();
    let is_poly = path.extension().map_or(false, |e| e.eq_ignore_ascii_case("vtp"));

    let data = if is_poly {
        let table = CellTable::new(ds, |k| matches!(k.cell, CellType::Line | CellType::Triangle | CellType::Quad))?;
        let (lines, polys): (Vec<_>, Vec<_>) = table
            .cells
            .iter()
            .zip(&table.types)
            .partition(|(_, t)| **t == CellType::Line);
        let collect = |cells: Vec<(&Vec<usize>, &CellType)>| -> Option<VertexNumbers> {
            let cells: Vec<Vec<usize>> = cells.into_iter().map(|(c, _)| c.clone()).collect();
            (!cells.is_empty()).then(|| xml_numbers(&cells))
        };
        if !lines.is_empty() && !polys.is_empty() {
            // Cell data of polydata is ordered by section, which would not follow topology order
            return Err(eyre!("Polydata file {:?} cannot mix lines and polygons", path));
        }
        let piece = PolyDataPiece {
            points: node_buffer(ds.nodes()),
            verts: None,
            lines: collect(lines),
            polys: collect(polys),
            strips: None,
            data: table.attributes(ds),
        };
        DataSet::PolyData {
            meta: None,
            pieces: vec![Piece::Inline(Box::new(piece))],
        }
    } else {
        let table = CellTable::new(ds, |_| true)?;
        let piece = UnstructuredGridPiece {
            points: node_buffer(ds.nodes()),
            cells: Cells {
                cell_verts: xml_numbers(&table.cells),
                types: table.types.clone(),
            },
            data: table.attributes(ds),
        };
        DataSet::UnstructuredGrid {
            meta: None,
            pieces: vec![Piece::Inline(Box::new(piece))],
        }
    };

    log::debug!("Writing {:?} to {:?}", ds.name(), path);
    let vtk = Vtk {
        version: Version { major: 1, minor: 0 },
        title: ds.name().to_string(),
        byte_order: ByteOrder::LittleEndian,
        file_path: None,
        data,
    };
    export(vtk, path, false)
}

/// Writes `nodes` as a legacy ASCII structured grid of `dims` points with `fields` as point data.
pub fn write_structured_grid(
    path: impl AsRef<Path>,
    name: &str,
    nodes: &Vec3Matrix,
    dims: [usize; 3],
    fields: &[&RealMatrix],
) -> eyre::Result<()> {
    let path = path.as_ref();
    if dims.iter().product::<usize>() != nodes.rows() {
        return Err(eyre!("Grid of {:?} points given {} nodes", dims, nodes.rows()));
    }

    let mut data = Attributes::new();
    for field in fields {
        if field.rows() != nodes.rows() {
            return Err(eyre!("Field {:?} has {} rows for {} nodes", field.name(), field.rows(), nodes.rows()));
        }
        data.point.push(field_attribute(field.name(), field.cols(), field.to_vec()));
    }

    let extent = Extent::Dims([dims[0] as u32, dims[1] as u32, dims[2] as u32]);
    let piece = StructuredGridPiece {
        extent: extent.clone(),
        points: node_buffer(nodes),
        data,
    };
    let vtk = Vtk {
        version: Version { major: 4, minor: 2 },
        title: name.to_string(),
        byte_order: ByteOrder::BigEndian,
        file_path: None,
        data: DataSet::StructuredGrid {
            extent,
            meta: None,
            pieces: vec![Piece::Inline(Box::new(piece))],
        },
    };
    export(vtk, path, true)
}

fn attribute_arrays(attributes: Vec<Attribute>) -> Vec<(String, usize, Vec<f64>)> {
    let mut arrays = Vec::new();
    for attribute in attributes {
        match attribute {
            Attribute::DataArray(array) => {
                let cols = match array.elem {
                    VtkElementType::Scalars { num_comp, .. } => num_comp as usize,
                    VtkElementType::Vectors | VtkElementType::Normals => 3,
                    VtkElementType::Tensors => 9,
                    VtkElementType::LookupTable => 4,
                    VtkElementType::ColorScalars(n) | VtkElementType::TCoords(n) | VtkElementType::Generic(n) => {
                        n as usize
                    }
                };
                match buffer_values(&array.data) {
                    Some(values) => arrays.push((array.name, cols.max(1), values)),
                    None => log::warn!("Skipping array {:?} of unsupported type", array.name),
                }
            }
            Attribute::Field { data_array, .. } => {
                for array in data_array {
                    match buffer_values(&array.data) {
                        Some(values) => arrays.push((array.name, (array.elem as usize).max(1), values)),
                        None => log::warn!("Skipping field array {:?} of unsupported type", array.name),
                    }
                }
            }
        }
    }
    arrays
}

/// Sorts cells into index matrices by type. Polygons become triangles or quadrilaterals, larger
/// ones are split into triangle fans.
struct CellSorter {
    rows: Vec<Vec<Vec<usize>>>,
    /// Topology and row of every cell read, for distributing cell data.
    origin: Vec<Option<(usize, usize)>>,
}

impl CellSorter {
    fn new() -> Self {
        Self {
            rows: vec![Vec::new(); CELL_KINDS.len()],
            origin: Vec::new(),
        }
    }

    fn push_kind(&mut self, kind: usize, vertices: &[usize]) -> (usize, usize) {
        let row = permute(vertices, CELL_KINDS[kind].order);
        self.rows[kind].push(row);
        (kind, self.rows[kind].len() - 1)
    }

    fn push(&mut self, cell: CellType, vertices: &[usize]) {
        let tri = 1;
        let quad = 2;
        let origin = match cell {
            CellType::Polygon | CellType::Triangle if vertices.len() == 3 => {
                Some(self.push_kind(tri, vertices))
            }
            CellType::Polygon | CellType::Quad if vertices.len() == 4 => Some(self.push_kind(quad, vertices)),
            CellType::Polygon if vertices.len() > 4 => {
                let first = vertices[1..]
                    .windows(2)
                    .map(|w| self.push_kind(tri, &[vertices[0], w[0], w[1]]))
                    .collect::<Vec<_>>();
                first.first().copied()
            }
            CellType::PolyLine if vertices.len() > 2 => {
                let first = vertices
                    .windows(2)
                    .map(|w| self.push_kind(0, w))
                    .collect::<Vec<_>>();
                first.first().copied()
            }
            cell => match CELL_KINDS.iter().position(|k| k.cell == cell) {
                Some(kind) if CELL_KINDS[kind].order.len() == vertices.len() => Some(self.push_kind(kind, vertices)),
                _ => {
                    log::debug!("Skipping VTK cell {:?} with {} vertices", cell, vertices.len());
                    None
                }
            },
        };
        self.origin.push(origin);
    }

    fn push_strip(&mut self, vertices: &[usize]) {
        let mut first = None;
        for (i, w) in vertices.windows(3).enumerate() {
            let tri = if i % 2 == 0 { [w[0], w[1], w[2]] } else { [w[1], w[0], w[2]] };
            let origin = self.push_kind(1, &tri);
            first.get_or_insert(origin);
        }
        self.origin.push(first);
    }

    /// Index matrices and cell fields assembled from the sorted cells.
    fn finish(self, cell_fields: Vec<(String, usize, Vec<f64>)>) -> eyre::Result<(Vec<IndexMatrix>, Vec<RealMatrix>)> {
        let used: Vec<usize> = (0..CELL_KINDS.len()).filter(|&k| !self.rows[k].is_empty()).collect();
        let mut indices = Vec::new();
        for &k in &used {
            let kind = &CELL_KINDS[k];
            let mut inds = IndexMatrix::from_index_rows(kind.matrix_name, kind.type_name, kind.order.len(), &self.rows[k])?;
            inds.set_meta(props::IS_SPATIAL, "True");
            indices.push(inds);
        }

        let mut fields = Vec::new();
        for (name, cols, values) in cell_fields {
            if values.len() != self.origin.len() * cols {
                return Err(eyre!(
                    "Cell array {:?} has {} values for {} cells",
                    name,
                    values.len(),
                    self.origin.len()
                ));
            }
            for &k in &used {
                let kind = &CELL_KINDS[k];
                let mut data = vec![0.0; self.rows[k].len() * cols];
                for (cell, origin) in self.origin.iter().enumerate() {
                    if let Some((kk, row)) = origin {
                        if *kk == k {
                            data[row * cols..(row + 1) * cols].copy_from_slice(&values[cell * cols..(cell + 1) * cols]);
                        }
                    }
                }
                let field_name = if used.len() == 1 {
                    name.clone()
                } else {
                    format!("{}_{}", name, kind.matrix_name)
                };
                let mut field = RealMatrix::from_vec(field_name, cols, data)?;
                field.set_meta(props::TOPOLOGY, kind.matrix_name);
                field.set_meta(props::SPATIAL, kind.matrix_name);
                field.set_meta(props::ELEMDATA, "True");
                fields.push(field);
            }
        }
        Ok((indices, fields))
    }
}

fn inline_piece<P>(piece: Piece<P>, path: &Path) -> eyre::Result<P> {
    match piece {
        Piece::Inline(piece) => Ok(*piece),
        _ => Err(eyre!("VTK file {:?} refers to external pieces", path)),
    }
}

fn single_piece<P>(pieces: Vec<Piece<P>>, path: &Path) -> eyre::Result<P> {
    if pieces.len() != 1 {
        return Err(eyre!("VTK file {:?} has {} pieces, expected one", path, pieces.len()));
    }
    pieces
        .into_iter()
        .next()
        .map(|p| inline_piece(p, path))
        .ok_or_else(|| eyre!("VTK file {:?} has no pieces", path))?
}

fn read_nodes(points: &IOBuffer, path: &Path) -> eyre::Result<Vec3Matrix> {
    let values = buffer_values(points).ok_or_else(|| eyre!("Unsupported point type in {:?}", path))?;
    if values.len() % 3 != 0 {
        return Err(eyre!("Point array of {:?} has {} values", path, values.len()));
    }
    let nodes = values.chunks(3).map(|c| Vector3::new(c[0], c[1], c[2])).collect();
    Ok(Vec3Matrix::from_vec("nodes", 1, nodes)?)
}

/// Reads a legacy or XML VTK file holding an unstructured grid, polydata or a structured grid.
///
/// Every cell type becomes its own index matrix; point and cell arrays, including FIELD arrays,
/// become fields. Cell arrays are split per index matrix when there is more than one.
pub fn read_dataset(path: impl AsRef<Path>) -> eyre::Result<Dataset> {
    let path = path.as_ref();
    let vtk = Vtk::import(path).map_err(|err| eyre!("Failed to read VTK file {:?}: {}", path, err))?;
    let name = if vtk.title.trim().is_empty() {
        path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "dataset".to_string())
    } else {
        vtk.title.trim().to_string()
    };

    let mut sorter = CellSorter::new();
    let (nodes, data) = match vtk.data {
        DataSet::UnstructuredGrid { pieces, .. } => {
            let piece = single_piece(pieces, path)?;
            let cells = cell_vertices(piece.cells.cell_verts)?;
            if cells.len() != piece.cells.types.len() {
                return Err(eyre!("{} cells but {} cell types", cells.len(), piece.cells.types.len()));
            }
            for (cell, &cell_type) in cells.iter().zip(&piece.cells.types) {
                sorter.push(cell_type, cell);
            }
            (read_nodes(&piece.points, path)?, piece.data)
        }
        DataSet::PolyData { pieces, .. } => {
            let piece = single_piece(pieces, path)?;
            // Cell data follows the order verts, lines, polys, strips
            if let Some(verts) = piece.verts {
                for _ in cell_vertices(verts)? {
                    sorter.origin.push(None);
                }
            }
            if let Some(lines) = piece.lines {
                for line in cell_vertices(lines)? {
                    sorter.push(if line.len() == 2 { CellType::Line } else { CellType::PolyLine }, &line);
                }
            }
            if let Some(polys) = piece.polys {
                for poly in cell_vertices(polys)? {
                    sorter.push(CellType::Polygon, &poly);
                }
            }
            if let Some(strips) = piece.strips {
                for strip in cell_vertices(strips)? {
                    sorter.push_strip(&strip);
                }
            }
            (read_nodes(&piece.points, path)?, piece.data)
        }
        DataSet::StructuredGrid { pieces, .. } => {
            let piece = single_piece(pieces, path)?;
            (read_nodes(&piece.points, path)?, piece.data)
        }
        _ => return Err(eyre!("Unsupported VTK dataset type in {:?}", path)),
    };

    let (indices, mut cell_fields) = sorter.finish(attribute_arrays(data.cell))?;

    let mut all_fields = Vec::new();
    for (field_name, cols, values) in attribute_arrays(data.point) {
        if values.len() != nodes.rows() * cols {
            log::warn!("Skipping point array {:?} with {} values", field_name, values.len());
            continue;
        }
        let mut field = RealMatrix::from_vec(field_name, cols, values)?;
        if let Some(first) = indices.first() {
            field.set_meta(props::TOPOLOGY, first.name());
            field.set_meta(props::SPATIAL, first.name());
        }
        all_fields.push(field);
    }
    all_fields.append(&mut cell_fields);

    log::debug!(
        "Read {:?} from {:?}: {} nodes, {} index sets, {} fields",
        name,
        path,
        nodes.rows(),
        indices.len(),
        all_fields.len()
    );
    Ok(Dataset::new(name, nodes, indices, all_fields))
}

/// Writes `nodes` as legacy ASCII polydata with one vertex cell per node.
pub fn write_poly_nodes(path: impl AsRef<Path>, nodes: &Vec3Matrix) -> eyre::Result<()> {
    let path = path.as_ref();
    let verts: Vec<Vec<usize>> = (0..nodes.rows()).map(|i| vec![i]).collect();
    let piece = PolyDataPiece {
        points: node_buffer(nodes),
        verts: Some(legacy_numbers(&verts)),
        lines: None,
        polys: None,
        strips: None,
        data: Attributes::new(),
    };
    let vtk = Vtk {
        version: Version { major: 3, minor: 0 },
        title: nodes.name().to_string(),
        byte_order: ByteOrder::BigEndian,
        file_path: None,
        data: DataSet::PolyData {
            meta: None,
            pieces: vec![Piece::Inline(Box::new(piece))],
        },
    };
    export(vtk, path, true)
}

/// Reads the points of a VTK file as a node matrix named `name`.
pub fn read_poly_nodes(path: impl AsRef<Path>, name: &str) -> eyre::Result<Vec3Matrix> {
    let path = path.as_ref();
    let vtk = Vtk::import(path).map_err(|err| eyre!("Failed to read VTK file {:?}: {}", path, err))?;
    let points = match vtk.data {
        DataSet::PolyData { pieces, .. } => single_piece(pieces, path)?.points,
        DataSet::UnstructuredGrid { pieces, .. } => single_piece(pieces, path)?.points,
        DataSet::StructuredGrid { pieces, .. } => single_piece(pieces, path)?.points,
        _ => return Err(eyre!("VTK file {:?} holds no points", path)),
    };
    let mut nodes = read_nodes(&points, path).wrap_err_with(|| format!("Invalid points in {:?}", path))?;
    nodes.set_name(name);
    Ok(nodes)
}
