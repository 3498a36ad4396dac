//! Element types and their basis functions.
//!
//! An [`ElementType`] describes the reference geometry of an element, the xi coordinates of its
//! control nodes, its faces and the basis function mapping a xi coordinate to per-node
//! coefficients. Types are named `<Geom><Order><Basis>`, for example `Tet1NL` for a linear nodal
//! Lagrange tetrahedron or `Hex3PCR` for a piecewise Catmull-Rom hexahedron, and are generated on
//! first request by [`element_type`].
//!
//! Node ordering follows the CHeart convention: corner nodes come first, the remaining nodes are
//! ordered with the last xi component most significant.
use crate::error::{Error, Result};
use nalgebra::Vector3;
use num::Zero;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul};
use std::sync::Arc;

mod lagrange;
mod line;
mod search;
mod spline;

/// A xi coordinate. Components beyond the dimension of the element are zero.
pub type Xi = [f64; 3];

/// Offset applied to face xi values to reach the interior of an element.
const FACE_XI_OFFSET: f64 = 0.01;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeomType {
    Point,
    Line,
    Tri,
    Quad,
    Tet,
    Hex,
}

impl GeomType {
    pub const ALL: [GeomType; 6] = [Self::Point, Self::Line, Self::Tri, Self::Quad, Self::Tet, Self::Hex];

    pub fn abbrev(&self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::Line => "Line",
            Self::Tri => "Tri",
            Self::Quad => "Quad",
            Self::Tet => "Tet",
            Self::Hex => "Hex",
        }
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::Line => "Line",
            Self::Tri => "Triangle",
            Self::Quad => "Quadrilateral",
            Self::Tet => "Tetrahedron",
            Self::Hex => "Hexahedron",
        }
    }

    pub fn dim(&self) -> usize {
        match self {
            Self::Point => 0,
            Self::Line => 1,
            Self::Tri | Self::Quad => 2,
            Self::Tet | Self::Hex => 3,
        }
    }

    pub fn is_simplex(&self) -> bool {
        matches!(self, Self::Tri | Self::Tet)
    }

    /// Number of corner vertices of the reference shape.
    pub fn num_vertices(&self) -> usize {
        match self {
            Self::Point => 1,
            Self::Line => 2,
            Self::Tri => 3,
            Self::Quad | Self::Tet => 4,
            Self::Hex => 8,
        }
    }

    pub fn from_abbrev(abbrev: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|g| g.abbrev() == abbrev)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasisFamily {
    NodalLagrange,
    ModalPolyLine,
    SpectralLine,
    BezierLine,
    CubicHermite,
    CatmullRom,
    PiecewiseCatmullRom,
}

impl BasisFamily {
    pub const ALL: [BasisFamily; 7] = [
        Self::NodalLagrange,
        Self::ModalPolyLine,
        Self::SpectralLine,
        Self::BezierLine,
        Self::CubicHermite,
        Self::CatmullRom,
        Self::PiecewiseCatmullRom,
    ];

    pub fn abbrev(&self) -> &'static str {
        match self {
            Self::NodalLagrange => "NL",
            Self::ModalPolyLine => "MPL",
            Self::SpectralLine => "SL",
            Self::BezierLine => "BL",
            Self::CubicHermite => "CH",
            Self::CatmullRom => "CR",
            Self::PiecewiseCatmullRom => "PCR",
        }
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            Self::NodalLagrange => "Nodal Lagrange",
            Self::ModalPolyLine => "Modal Poly Line",
            Self::SpectralLine => "Spectral 1D Line",
            Self::BezierLine => "Bezier 1D Line",
            Self::CubicHermite => "Cubic Hermite",
            Self::CatmullRom => "Catmull Rom",
            Self::PiecewiseCatmullRom => "Piecewise Catmull Rom",
        }
    }

    pub fn from_abbrev(abbrev: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.abbrev() == abbrev)
    }
}

/// Dimensions and boundary behavior of the control point grid of a piecewise element.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlGrid {
    /// Grid size per axis, unused axes are 1.
    pub dims: [usize; 3],
    /// Per axis, the number of layers at the start and end of the grid which are only control points.
    /// `None` means `(1, 1)` on every axis.
    pub limits: Option<[(i64, i64); 3]>,
    /// Axes along which indices wrap around instead of being clamped.
    pub circular: [bool; 3],
}

impl ControlGrid {
    pub fn new(dims: [usize; 3]) -> Self {
        Self {
            dims,
            limits: None,
            circular: [false; 3],
        }
    }

    pub fn with_limits(mut self, limits: [(i64, i64); 3]) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn with_circular(mut self, circular: [bool; 3]) -> Self {
        self.circular = circular;
        self
    }

    /// Number of control points in the grid.
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Values which can be interpolated by basis coefficients.
pub trait Interpolant: Copy + Zero + Add<Output = Self> + Mul<f64, Output = Self> {}

impl<V> Interpolant for V where V: Copy + Zero + Add<Output = V> + Mul<f64, Output = V> {}

#[derive(Debug)]
enum BasisEvaluator {
    Point,
    Polynomial(lagrange::PolynomialBasis),
    Modal { order: usize },
    Bezier { order: usize },
    Hermite { dim: usize },
    CatmullRom { dim: usize },
    Piecewise { base: Arc<ElementType> },
}

/// Node layout of an element type.
#[derive(Debug, Clone, Default)]
pub(crate) struct NodeLayout {
    pub xis: Vec<Xi>,
    pub vertices: Vec<usize>,
    /// For 3D types each face ends with the index of a vertex not on the face.
    pub faces: Vec<Vec<usize>>,
    pub internal_xis: Vec<Xi>,
}

/// An immutable element type record.
pub struct ElementType {
    geom: GeomType,
    family: BasisFamily,
    order: usize,
    description: String,
    layout: NodeLayout,
    face_vertices: Vec<usize>,
    edges: Vec<Vec<usize>>,
    face_type: Option<Arc<ElementType>>,
    evaluator: BasisEvaluator,
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.description)
    }
}

/// Serializable summary of an element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    pub name: String,
    pub description: String,
    pub geom: GeomType,
    pub family: BasisFamily,
    pub order: usize,
    pub dim: usize,
    pub xis: Vec<Xi>,
    pub vertices: Vec<usize>,
    pub faces: Vec<Vec<usize>>,
    pub internal_xis: Vec<Xi>,
    pub edges: Vec<Vec<usize>>,
    pub face_type: Option<String>,
}

fn order_name(order: usize) -> String {
    const NAMES: [&str; 10] = [
        "Linear",
        "Quadratic",
        "Cubic",
        "Quartic",
        "Quintic",
        "Hextic",
        "Heptic",
        "Octic",
        "Nonic",
        "Decic",
    ];
    match order {
        1..=10 => NAMES[order - 1].to_string(),
        _ => format!("Order {}", order),
    }
}

/// The `<Geom><Order><Basis>` name of an element type, `Point` for point geometry.
pub fn type_name(geom: GeomType, family: BasisFamily, order: usize) -> String {
    match geom {
        GeomType::Point => "Point".to_string(),
        _ => format!("{}{}{}", geom.abbrev(), order, family.abbrev()),
    }
}

impl ElementType {
    fn assemble(
        geom: GeomType,
        family: BasisFamily,
        order: usize,
        layout: NodeLayout,
        face_type: Option<Arc<ElementType>>,
        evaluator: BasisEvaluator,
    ) -> Self {
        let description = match geom {
            GeomType::Point => "Point".to_string(),
            _ => format!("{}, {} {}", geom.full_name(), order_name(order), family.full_name()),
        };

        let dim = geom.dim();
        let face_vertices = (0..layout.faces.len())
            .map(|f| {
                let face = face_slice(&layout.faces, dim, f);
                face.iter().filter(|i| layout.vertices.contains(i)).count()
            })
            .collect();

        let edges = if layout.xis.is_empty() {
            Vec::new()
        } else if dim == 1 {
            vec![(0..layout.xis.len()).collect()]
        } else if dim == 2 {
            lagrange::find_edges(&layout.xis, &layout.vertices, geom.is_simplex())
        } else {
            Vec::new()
        };

        Self {
            geom,
            family,
            order,
            description,
            layout,
            face_vertices,
            edges,
            face_type,
            evaluator,
        }
    }

    pub(crate) fn point() -> Self {
        Self::assemble(
            GeomType::Point,
            BasisFamily::NodalLagrange,
            0,
            NodeLayout::default(),
            None,
            BasisEvaluator::Point,
        )
    }

    pub fn name(&self) -> String {
        type_name(self.geom, self.family, self.order)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn geom(&self) -> GeomType {
        self.geom
    }

    pub fn family(&self) -> BasisFamily {
        self.family
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn dim(&self) -> usize {
        self.geom.dim()
    }

    pub fn is_simplex(&self) -> bool {
        self.geom.is_simplex()
    }

    /// Whether the basis is defined for a fixed number of control nodes, false for piecewise types.
    pub fn is_fixed_node_count(&self) -> bool {
        !self.layout.xis.is_empty()
    }

    pub fn xis(&self) -> &[Xi] {
        &self.layout.xis
    }

    pub fn vertices(&self) -> &[usize] {
        &self.layout.vertices
    }

    /// Edges of 1D and 2D types, vertices first followed by the nodes between them.
    pub fn edges(&self) -> &[Vec<usize>] {
        &self.edges
    }

    pub fn num_nodes(&self) -> usize {
        self.layout.xis.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.layout.vertices.len()
    }

    pub fn num_faces(&self) -> usize {
        self.layout.faces.len()
    }

    /// Node indices of a face, empty if there is no such face.
    pub fn face_indices(&self, face: usize) -> &[usize] {
        if face >= self.layout.faces.len() {
            &[]
        } else {
            face_slice(&self.layout.faces, self.dim(), face)
        }
    }

    pub fn num_face_vertices(&self, face: usize) -> usize {
        self.face_vertices.get(face).copied().unwrap_or(0)
    }

    /// The leading vertex indices of a face.
    pub fn face_vertex_indices(&self, face: usize) -> &[usize] {
        let indices = self.face_indices(face);
        &indices[..self.num_face_vertices(face).min(indices.len())]
    }

    /// Index of a vertex which is not on the given face, only defined for 3D types.
    pub fn face_far_index(&self, face: usize) -> Option<usize> {
        if self.dim() == 3 {
            self.layout.faces.get(face).and_then(|f| f.last().copied())
        } else {
            None
        }
    }

    /// Value subtracted from a xi on the given face to get an internal xi.
    pub fn internal_face_xi_sub(&self, face: usize) -> Option<Xi> {
        self.layout.internal_xis.get(face).copied()
    }

    /// The element type used to parametrize the faces of 3D types.
    pub fn face_type(&self) -> Option<&Arc<ElementType>> {
        self.face_type.as_ref()
    }

    /// The type with the same geometry and basis family but linear order. Spline families have a
    /// single order per geometry and return the type itself.
    pub fn linear_type(&self) -> Result<Arc<ElementType>> {
        match self.family {
            BasisFamily::CubicHermite | BasisFamily::CatmullRom | BasisFamily::PiecewiseCatmullRom => {
                element_type(&self.name())
            }
            _ => element_type(&type_name(self.geom, self.family, 1)),
        }
    }

    pub fn descriptor(&self) -> ElementDescriptor {
        ElementDescriptor {
            name: self.name(),
            description: self.description.clone(),
            geom: self.geom,
            family: self.family,
            order: self.order,
            dim: self.dim(),
            xis: self.layout.xis.clone(),
            vertices: self.layout.vertices.clone(),
            faces: self.layout.faces.clone(),
            internal_xis: self.layout.internal_xis.clone(),
            edges: self.edges.clone(),
            face_type: self.face_type.as_ref().map(|t| t.name()),
        }
    }

    /// Evaluates the basis at `xi`, giving one coefficient per node.
    ///
    /// Piecewise types need a control grid, see [`piecewise_basis`](Self::piecewise_basis).
    pub fn basis(&self, xi: Xi) -> Result<Vec<f64>> {
        match &self.evaluator {
            BasisEvaluator::Point => Ok(vec![1.0]),
            BasisEvaluator::Polynomial(poly) => Ok(poly.evaluate(&xi)),
            BasisEvaluator::Modal { order } => Ok(line::modal_coeffs(*order, xi[0])),
            BasisEvaluator::Bezier { order } => Ok(line::bezier_coeffs(*order, xi[0])),
            BasisEvaluator::Hermite { dim } => Ok(spline::tensor_coeffs(spline::hermite_coeffs_1d, *dim, &xi)),
            BasisEvaluator::CatmullRom { dim } => Ok(spline::tensor_coeffs(spline::catmull_rom_coeffs_1d, *dim, &xi)),
            BasisEvaluator::Piecewise { .. } => Err(Error::basis(
                self.name(),
                "piecewise basis must be evaluated with a control grid",
            )),
        }
    }

    /// Evaluates the basis at a xi coordinate spanning the whole control grid, giving one
    /// coefficient per grid point. For fixed-size types the grid is ignored.
    pub fn piecewise_basis(&self, xi: Xi, grid: &ControlGrid) -> Result<Vec<f64>> {
        match &self.evaluator {
            BasisEvaluator::Piecewise { base } => spline::piecewise_coeffs(base, &xi, grid),
            _ => self.basis(xi),
        }
    }

    fn check_values<V>(&self, values: &[V]) -> Result<()> {
        if self.is_fixed_node_count() && values.len() != self.num_nodes() {
            Err(Error::basis(
                self.name(),
                format!(
                    "number of values ({}) does not match control point count ({})",
                    values.len(),
                    self.num_nodes()
                ),
            ))
        } else {
            Ok(())
        }
    }

    /// Interpolates `values` at `xi`.
    pub fn apply_basis<V: Interpolant>(&self, values: &[V], xi: Xi) -> Result<V> {
        self.check_values(values)?;
        let coeffs = self.basis(xi)?;
        self.apply_coeffs(values, &coeffs)
    }

    /// Interpolates the control grid `values` at a xi spanning the whole grid.
    pub fn apply_piecewise_basis<V: Interpolant>(&self, values: &[V], xi: Xi, grid: &ControlGrid) -> Result<V> {
        self.check_values(values)?;
        let coeffs = self.piecewise_basis(xi, grid)?;
        self.apply_coeffs(values, &coeffs)
    }

    /// The sum of `values` weighted by `coeffs`.
    pub fn apply_coeffs<V: Interpolant>(&self, values: &[V], coeffs: &[f64]) -> Result<V> {
        apply_coeffs(values, coeffs).ok_or_else(|| {
            Error::basis(
                self.name(),
                format!("{} values given for {} coefficients", values.len(), coeffs.len()),
            )
        })
    }

    /// Maps the xi `(u, v)` on a face to the element xi by interpolating the xis of the face nodes
    /// with the face type's basis. 1D and 2D types give `(u, v, 0)`.
    pub fn face_xi_to_elem_xi(&self, face: usize, u: f64, v: f64) -> Result<Xi> {
        if self.dim() < 3 {
            return Ok([u, v, 0.0]);
        }
        let face_type = self
            .face_type
            .as_ref()
            .ok_or_else(|| Error::basis(self.name(), "type has no face type"))?;
        let indices = self.face_indices(face);
        if indices.is_empty() {
            return Err(Error::basis(self.name(), format!("no face {}", face)));
        }
        let coeffs = face_type.basis([u, v, 0.0])?;
        let xis: Vec<Vector3<f64>> = indices.iter().map(|&i| Vector3::from(self.layout.xis[i])).collect();
        let xi = self.apply_coeffs(&xis, &coeffs)?;
        Ok([xi.x, xi.y, xi.z])
    }

    /// Finds the xi coordinate at which the element defined by `elem_nodes` passes through `point`.
    ///
    /// The search is seeded from a grid of `refine + 1` samples per axis. Returns `None` if the point
    /// is not within the element.
    pub fn point_search(&self, elem_nodes: &[Vector3<f64>], point: &Vector3<f64>, refine: usize) -> Result<Option<Xi>> {
        search::point_search(self, elem_nodes, point, refine)
    }
}

fn face_slice(faces: &[Vec<usize>], dim: usize, face: usize) -> &[usize] {
    let f = &faces[face];
    if dim < 3 || f.is_empty() {
        f
    } else {
        &f[..f.len() - 1]
    }
}

/// The sum of `values` weighted by `coeffs`, `None` if the lengths differ.
pub fn apply_coeffs<V: Interpolant>(values: &[V], coeffs: &[f64]) -> Option<V> {
    if values.len() != coeffs.len() {
        return None;
    }
    Some(
        values
            .iter()
            .zip(coeffs)
            .fold(V::zero(), |acc, (v, c)| acc + *v * *c),
    )
}

static CATALOG: Lazy<RwLock<FxHashMap<String, Arc<ElementType>>>> = Lazy::new(|| {
    let mut map = FxHashMap::default();
    map.insert("Point".to_string(), Arc::new(ElementType::point()));
    RwLock::new(map)
});

fn parse_name(name: &str) -> Result<(GeomType, usize, BasisFamily)> {
    let bad_name = || Error::basis(name, "expected a name of the form <Geom><Order><Basis>");
    let geom_end = name.find(|c: char| !c.is_ascii_alphabetic()).ok_or_else(bad_name)?;
    let rest = &name[geom_end..];
    let order_end = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(bad_name)?;
    if geom_end == 0 || order_end == 0 {
        return Err(bad_name());
    }

    let (geom, order, basis) = (&name[..geom_end], &rest[..order_end], &rest[order_end..]);
    let geom = GeomType::from_abbrev(geom)
        .ok_or_else(|| Error::basis(name, format!("element geometry {:?} not recognized", geom)))?;
    let family = BasisFamily::from_abbrev(basis)
        .ok_or_else(|| Error::basis(name, format!("basis function type {:?} not recognized", basis)))?;
    let order: usize = order.parse().map_err(|_| bad_name())?;
    if order == 0 {
        return Err(Error::basis(name, "order must be positive"));
    }
    Ok((geom, order, family))
}

pub(crate) fn generate(geom: GeomType, family: BasisFamily, order: usize) -> Result<ElementType> {
    let name = type_name(geom, family, order);
    match family {
        BasisFamily::NodalLagrange => lagrange::nodal_lagrange_type(geom, order),
        BasisFamily::ModalPolyLine => line::modal_poly_line_type(&name, geom, order),
        BasisFamily::SpectralLine => line::spectral_line_type(&name, geom, order),
        BasisFamily::BezierLine => line::bezier_line_type(&name, geom, order),
        BasisFamily::CubicHermite | BasisFamily::CatmullRom => spline::fixed_grid_type(&name, geom, family),
        BasisFamily::PiecewiseCatmullRom => spline::piecewise_catmull_rom_type(&name, geom),
    }
}

/// Looks up an element type by name, generating and registering it on first request.
///
/// The face type of a 3D type is registered along with it.
pub fn element_type(name: &str) -> Result<Arc<ElementType>> {
    if let Some(t) = CATALOG.read().get(name) {
        return Ok(Arc::clone(t));
    }

    let (geom, order, family) = parse_name(name)?;
    let generated = Arc::new(generate(geom, family, order)?);
    // Spline families fix their order to the geometry's dimension
    if generated.name() != name {
        return Err(Error::basis(
            name,
            format!("{} elements of this geometry are named {}", family.full_name(), generated.name()),
        ));
    }
    log::trace!("Generated element type {}: {}", name, generated.description());

    let mut catalog = CATALOG.write();
    if let Some(face_type) = &generated.face_type {
        catalog
            .entry(face_type.name())
            .or_insert_with(|| Arc::clone(face_type));
    }
    Ok(Arc::clone(catalog.entry(name.to_string()).or_insert(generated)))
}

/// Looks up the element type for a geometry, basis family and order.
pub fn element_type_for(geom: GeomType, family: BasisFamily, order: usize) -> Result<Arc<ElementType>> {
    element_type(&type_name(geom, family, order))
}

/// Names of all types generated so far, sorted.
pub fn registered_types() -> Vec<String> {
    let mut names: Vec<String> = CATALOG.read().keys().cloned().collect();
    names.sort();
    names
}
