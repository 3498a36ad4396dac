//! Datasets: a node matrix with index matrices describing topologies and real matrices holding fields.
use crate::element::{element_type, GeomType};
use crate::error::{Error, Result};
use crate::matrix::{IndexMatrix, RealMatrix, Vec3Matrix};
use nalgebra::Vector3;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use rustc_hash::FxHashMap;

/// Metadata keys used on index and field matrices.
pub mod props {
    /// On fields: name of the index matrix the field is defined over.
    pub const TOPOLOGY: &str = "topology";
    /// On fields: name of the spatial index matrix the field belongs to.
    pub const SPATIAL: &str = "spatial";
    /// On fields: the field is the same for every timestep.
    pub const TIMECOPY: &str = "timecopy";
    /// On fields: one row per element rather than per node.
    pub const ELEMDATA: &str = "elemdata";
    /// On index matrices: the topology defines spatial elements.
    pub const IS_SPATIAL: &str = "isspatial";
    /// On index matrices: name of the index matrix of the polygons this one was derived from.
    pub const POLYINDS: &str = "polyinds";
}

/// A named mesh: nodes, topologies and fields.
#[derive(Debug)]
pub struct Dataset {
    name: String,
    nodes: Vec3Matrix,
    indices: Vec<IndexMatrix>,
    fields: Vec<RealMatrix>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, nodes: Vec3Matrix, indices: Vec<IndexMatrix>, fields: Vec<RealMatrix>) -> Self {
        Self {
            name: name.into(),
            nodes,
            indices,
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn nodes(&self) -> &Vec3Matrix {
        &self.nodes
    }

    pub fn set_nodes(&mut self, nodes: Vec3Matrix) {
        self.nodes = nodes;
    }

    pub fn index_sets(&self) -> &[IndexMatrix] {
        &self.indices
    }

    pub fn index_set(&self, name: &str) -> Option<&IndexMatrix> {
        self.indices.iter().find(|m| m.name() == name)
    }

    /// Adds an index matrix, replacing one of the same name.
    pub fn set_index_set(&mut self, indices: IndexMatrix) {
        match self.indices.iter_mut().find(|m| m.name() == indices.name()) {
            Some(existing) => *existing = indices,
            None => self.indices.push(indices),
        }
    }

    pub fn data_fields(&self) -> &[RealMatrix] {
        &self.fields
    }

    pub fn data_field(&self, name: &str) -> Option<&RealMatrix> {
        self.fields.iter().find(|m| m.name() == name)
    }

    /// Adds a field, replacing one of the same name.
    pub fn set_data_field(&mut self, field: RealMatrix) {
        match self.fields.iter_mut().find(|m| m.name() == field.name()) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    pub fn remove_data_field(&mut self, name: &str) -> Option<RealMatrix> {
        let pos = self.fields.iter().position(|m| m.name() == name)?;
        Some(self.fields.remove(pos))
    }

    /// A copy of this dataset under `name`. Each part is either deep-copied or aliased.
    pub fn clone_with(&self, name: impl Into<String>, deep_nodes: bool, deep_indices: bool, deep_fields: bool) -> Self {
        let nodes = if deep_nodes {
            self.nodes.clone_named(self.nodes.name())
        } else {
            self.nodes.handle()
        };
        let indices = self
            .indices
            .iter()
            .map(|m| if deep_indices { m.clone_named(m.name()) } else { m.handle() })
            .collect();
        let fields = self
            .fields
            .iter()
            .map(|m| if deep_fields { m.clone_named(m.name()) } else { m.handle() })
            .collect();
        Self::new(name, nodes, indices, fields)
    }

    /// Index matrices defining spatial elements, see [`is_spatial_index`].
    pub fn spatial_index_sets(&self) -> impl Iterator<Item = &IndexMatrix> {
        self.indices.iter().filter(|m| is_spatial_index(m))
    }

    /// The index matrix a field is defined over: its `topology` metadata, then `spatial`, then the
    /// first spatial index matrix with a matching row count.
    pub fn field_topology(&self, field: &RealMatrix) -> Option<&IndexMatrix> {
        [props::TOPOLOGY, props::SPATIAL]
            .iter()
            .filter_map(|key| field.meta(key))
            .find_map(|name| self.index_set(name))
            .or_else(|| {
                self.spatial_index_sets()
                    .find(|m| m.rows() == field.rows())
            })
    }

    /// Whether `field` holds one row per element of its topology rather than one per node.
    pub fn is_element_field(&self, field: &RealMatrix) -> bool {
        if let Some(value) = field.meta(props::ELEMDATA) {
            return value.eq_ignore_ascii_case("true") || value == "1";
        }
        field.rows() != self.nodes.rows()
            && self
                .field_topology(field)
                .map_or(false, |t| t.rows() == field.rows())
    }

    /// Checks that every index refers to a node and every field matches its topology's length.
    pub fn validate(&self) -> Result<()> {
        let num_nodes = self.nodes.rows() as i64;
        for inds in &self.indices {
            if let Some(&bad) = inds.read().iter().find(|&&i| i < 0 || i >= num_nodes) {
                return Err(Error::geometry(
                    inds.name(),
                    format!("index {} out of range for {} nodes", bad, num_nodes),
                ));
            }
        }

        for field in &self.fields {
            let rows = field.rows();
            let element_rows = self.field_topology(field).map(|t| t.rows());
            if rows != self.nodes.rows() && Some(rows) != element_rows {
                return Err(Error::shape(
                    field.name(),
                    format!(
                        "field has {} rows but dataset {:?} has {} nodes and topology length {:?}",
                        rows,
                        self.name,
                        self.nodes.rows(),
                        element_rows
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Whether an index matrix defines spatial elements.
///
/// An explicit `isspatial` metadata value decides. Without it, the matrix is spatial if its type
/// names a known element type of dimension at least 1.
pub fn is_spatial_index(indices: &IndexMatrix) -> bool {
    match indices.meta(props::IS_SPATIAL) {
        Some(value) => value.eq_ignore_ascii_case("true") || value == "1",
        None => element_type(indices.type_code())
            .map(|et| et.dim() >= 1 && et.geom() != GeomType::Point)
            .unwrap_or(false),
    }
}

/// Result of merging coincident nodes.
#[derive(Debug)]
pub struct ReducedMesh {
    pub nodes: Vec3Matrix,
    pub indices: Vec<IndexMatrix>,
    /// For each original node, its index in the reduced node matrix.
    pub node_map: Vec<usize>,
}

/// Merges nodes lying within `eps` of an earlier node and rewrites the index matrices accordingly.
///
/// The first of a group of coincident nodes is kept, so the relative order of surviving nodes is
/// unchanged.
pub fn reduce_mesh(nodes: &Vec3Matrix, indices: &[IndexMatrix], eps: f64) -> Result<ReducedMesh> {
    let mut tree: RTree<GeomWithData<[f64; 3], usize>> = RTree::new();
    let mut unique: Vec<Vector3<f64>> = Vec::new();
    let mut node_map = Vec::with_capacity(nodes.rows());

    let cols = nodes.cols();
    for node in nodes.read().iter().step_by(cols) {
        let point = [node.x, node.y, node.z];
        let existing = tree
            .locate_within_distance(point, eps * eps)
            .map(|g| g.data)
            .min();
        let index = match existing {
            Some(index) => index,
            None => {
                let index = unique.len();
                unique.push(*node);
                tree.insert(GeomWithData::new(point, index));
                index
            }
        };
        node_map.push(index);
    }

    let reduced_indices = indices
        .iter()
        .map(|inds| {
            let data = inds
                .read()
                .iter()
                .map(|&i| {
                    usize::try_from(i)
                        .ok()
                        .and_then(|i| node_map.get(i))
                        .map(|&n| n as i64)
                        .ok_or_else(|| Error::geometry(inds.name(), format!("index {} out of range", i)))
                })
                .collect::<Result<Vec<i64>>>()?;
            let mut m = IndexMatrix::from_vec(inds.name(), inds.cols(), data)?;
            m.set_type_code(inds.type_code());
            for (k, v) in inds.meta_map() {
                m.set_meta(k.clone(), v.clone());
            }
            Ok(m)
        })
        .collect::<Result<Vec<_>>>()?;

    log::debug!("Reduced {} nodes to {}", nodes.rows(), unique.len());
    Ok(ReducedMesh {
        nodes: Vec3Matrix::from_vec(nodes.name(), 1, unique)?,
        indices: reduced_indices,
        node_map,
    })
}

/// A sub-mesh extracted from a time series of datasets.
#[derive(Debug)]
pub struct DividedMesh {
    /// One dataset per input dataset, sharing the chosen topology.
    pub datasets: Vec<Dataset>,
    /// Original indices of the chosen elements.
    pub chosen: Vec<usize>,
    /// Original node index to new node index.
    pub node_map: FxHashMap<usize, usize>,
}

/// Extracts the elements of `indices` for which `choose` returns true into new datasets, one for
/// each dataset of `datasets`.
///
/// Nodes are renumbered in order of first use. Fields of the first dataset with one row per element
/// or per node are carried over.
pub fn divide_mesh_by_elem_func(
    datasets: &[Dataset],
    indices: &IndexMatrix,
    mut choose: impl FnMut(usize) -> bool,
) -> Result<DividedMesh> {
    let first = datasets
        .first()
        .ok_or_else(|| Error::geometry(indices.name(), "no datasets to divide"))?;
    let old_nodes = first.nodes();

    let mut node_map = FxHashMap::default();
    let mut node_order = Vec::new();
    let mut chosen = Vec::new();
    let mut new_inds = Vec::new();

    for n in 0..indices.rows() {
        if !choose(n) {
            continue;
        }
        chosen.push(n);
        for i in indices.index_row(n)? {
            let next = node_order.len();
            let mapped = *node_map.entry(i).or_insert_with(|| {
                node_order.push(i);
                next
            });
            new_inds.push(mapped as i64);
        }
    }

    let mut inds = IndexMatrix::from_vec(indices.name(), indices.cols(), new_inds)?;
    inds.set_type_code(indices.type_code());
    inds.set_meta(props::IS_SPATIAL, "True");

    let gather_nodes = |nodes: &Vec3Matrix| -> Result<Vec3Matrix> {
        let points = node_order
            .iter()
            .map(|&i| nodes.get(i, 0))
            .collect::<Result<Vec<_>>>()?;
        Vec3Matrix::from_vec("nodes", 1, points)
    };

    let mut fields = Vec::new();
    for old in first.data_fields() {
        let rows: Option<&[usize]> = if old.rows() == indices.rows() {
            Some(&chosen)
        } else if old.rows() == old_nodes.rows() {
            Some(&node_order)
        } else {
            None
        };
        if let Some(rows) = rows {
            let mut data = Vec::with_capacity(rows.len() * old.cols());
            for &r in rows {
                data.extend(old.row(r)?);
            }
            let mut field = RealMatrix::from_vec(old.name(), old.cols(), data)?;
            for (k, v) in old.meta_map() {
                field.set_meta(k.clone(), v.clone());
            }
            fields.push(field);
        }
    }

    let mut out = Vec::with_capacity(datasets.len());
    out.push(Dataset::new(
        format!("{}Div", first.name()),
        gather_nodes(old_nodes)?,
        vec![inds.handle()],
        fields.iter().map(|f| f.handle()).collect(),
    ));
    for ds in &datasets[1..] {
        out.push(Dataset::new(
            format!("{}Div", ds.name()),
            gather_nodes(ds.nodes())?,
            vec![inds.handle()],
            fields.iter().map(|f| f.handle()).collect(),
        ));
    }

    Ok(DividedMesh {
        datasets: out,
        chosen,
        node_map,
    })
}
