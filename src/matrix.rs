//! Typed dense row-major matrices with shared, reference-counted storage.
//!
//! A [`Matrix`] owns a handle to a buffer which may be aliased by further handles (see
//! [`Matrix::handle`]) and by row views (see [`Matrix::sub_matrix_rows`]). All element access goes
//! through the buffer's read/write lock, so a matrix can be handed by reference to several workers
//! which each write their own row range.
use crate::error::{Error, Result};
use nalgebra::{Affine3, Point3, Vector3};
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

/// The element type tag of a matrix.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Real,
    Int,
    Vec3,
    Rgba8,
}

impl ElementKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Int => "int",
            Self::Vec3 => "vec3",
            Self::Rgba8 => "rgba8",
        }
    }

    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Real | Self::Int => 8,
            Self::Vec3 => 24,
            Self::Rgba8 => 4,
        }
    }
}

/// A type that can be stored in a [`Matrix`].
pub trait Element: Copy + Send + Sync + Debug + PartialEq + 'static {
    const KIND: ElementKind;

    fn zero() -> Self;
}

/// An 8-bit RGBA color.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba8(pub [u8; 4]);

impl Element for f64 {
    const KIND: ElementKind = ElementKind::Real;

    fn zero() -> Self {
        0.0
    }
}

impl Element for i64 {
    const KIND: ElementKind = ElementKind::Int;

    fn zero() -> Self {
        0
    }
}

impl Element for Vector3<f64> {
    const KIND: ElementKind = ElementKind::Vec3;

    fn zero() -> Self {
        Vector3::zeros()
    }
}

impl Element for Rgba8 {
    const KIND: ElementKind = ElementKind::Rgba8;

    fn zero() -> Self {
        Rgba8::default()
    }
}

/// Element-wise arithmetic used by the in-place matrix operations.
///
/// Vectors are combined component-wise. Division returns `None` where it is undefined for the type.
pub trait Arithmetic: Element {
    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    fn div(self, rhs: Self) -> Option<Self>;
}

impl Arithmetic for f64 {
    fn add(self, rhs: Self) -> Self {
        self + rhs
    }

    fn sub(self, rhs: Self) -> Self {
        self - rhs
    }

    fn mul(self, rhs: Self) -> Self {
        self * rhs
    }

    fn div(self, rhs: Self) -> Option<Self> {
        Some(self / rhs)
    }
}

impl Arithmetic for i64 {
    fn add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }

    fn sub(self, rhs: Self) -> Self {
        self.wrapping_sub(rhs)
    }

    fn mul(self, rhs: Self) -> Self {
        self.wrapping_mul(rhs)
    }

    fn div(self, rhs: Self) -> Option<Self> {
        self.checked_div(rhs)
    }
}

impl Arithmetic for Vector3<f64> {
    fn add(self, rhs: Self) -> Self {
        self + rhs
    }

    fn sub(self, rhs: Self) -> Self {
        self - rhs
    }

    fn mul(self, rhs: Self) -> Self {
        self.component_mul(&rhs)
    }

    fn div(self, rhs: Self) -> Option<Self> {
        Some(self.component_div(&rhs))
    }
}

/// Right-hand side of an in-place arithmetic operation.
pub enum Operand<'a, T: Element> {
    /// Applied to every element.
    Scalar(T),
    /// Applied element by element, shapes must match.
    Matrix(&'a Matrix<T>),
}

impl<'a> From<f64> for Operand<'a, f64> {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl<'a> From<i64> for Operand<'a, i64> {
    fn from(value: i64) -> Self {
        Self::Scalar(value)
    }
}

impl<'a> From<Vector3<f64>> for Operand<'a, Vector3<f64>> {
    fn from(value: Vector3<f64>) -> Self {
        Self::Scalar(value)
    }
}

impl<'a> From<f64> for Operand<'a, Vector3<f64>> {
    fn from(value: f64) -> Self {
        Self::Scalar(Vector3::repeat(value))
    }
}

impl<'a, T: Element> From<&'a Matrix<T>> for Operand<'a, T> {
    fn from(matrix: &'a Matrix<T>) -> Self {
        Self::Matrix(matrix)
    }
}

#[derive(Debug)]
struct Buffer<T> {
    data: Vec<T>,
    cols: usize,
    shared: bool,
}

/// A named, typed, row-major matrix.
///
/// Cloning is deliberately not derived: [`handle`](Self::handle) creates an alias of the same
/// buffer and [`clone_named`](Self::clone_named) makes an independent deep copy.
pub struct Matrix<T: Element> {
    name: String,
    type_code: String,
    meta: BTreeMap<String, String>,
    buffer: Arc<RwLock<Buffer<T>>>,
    /// Row offset and row count of a view into the buffer.
    view: Option<(usize, usize)>,
    lock: Arc<Mutex<()>>,
}

pub type RealMatrix = Matrix<f64>;
pub type IndexMatrix = Matrix<i64>;
pub type Vec3Matrix = Matrix<Vector3<f64>>;
pub type ColorMatrix = Matrix<Rgba8>;

impl<T: Element> Debug for Matrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matrix")
            .field("name", &self.name)
            .field("kind", &T::KIND)
            .field("type_code", &self.type_code)
            .field("rows", &self.rows())
            .field("cols", &self.cols())
            .field("shared", &self.is_shared())
            .field("meta", &self.meta)
            .finish()
    }
}

impl<T: Element> Matrix<T> {
    /// A zero-filled matrix.
    ///
    /// # Panics
    ///
    /// Panics if `cols` is zero.
    pub fn new(name: impl Into<String>, rows: usize, cols: usize) -> Self {
        assert!(cols > 0, "Matrix must have at least one column");
        Self::from_buffer(name.into(), vec![T::zero(); rows * cols], cols)
    }

    /// A zero-filled matrix tagged with an element type name such as `Tri1NL`.
    pub fn with_type(name: impl Into<String>, type_code: impl Into<String>, rows: usize, cols: usize) -> Self {
        let mut m = Self::new(name, rows, cols);
        m.type_code = type_code.into();
        m
    }

    /// Builds a matrix from row-major data.
    pub fn from_vec(name: impl Into<String>, cols: usize, data: Vec<T>) -> Result<Self> {
        let name = name.into();
        if cols == 0 || data.len() % cols != 0 {
            return Err(Error::shape(
                name,
                format!("{} elements cannot be arranged in {} columns", data.len(), cols),
            ));
        }
        Ok(Self::from_buffer(name, data, cols))
    }

    /// Builds a matrix from fixed-size rows.
    pub fn from_rows<const N: usize>(name: impl Into<String>, rows: &[[T; N]]) -> Self {
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Self::from_buffer(name.into(), data, N.max(1))
    }

    fn from_buffer(name: String, data: Vec<T>, cols: usize) -> Self {
        Self {
            name,
            type_code: String::new(),
            meta: BTreeMap::new(),
            buffer: Arc::new(RwLock::new(Buffer {
                data,
                cols,
                shared: false,
            })),
            view: None,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn type_code(&self) -> &str {
        &self.type_code
    }

    pub fn set_type_code(&mut self, type_code: impl Into<String>) {
        self.type_code = type_code.into();
    }

    pub fn kind(&self) -> ElementKind {
        T::KIND
    }

    pub fn rows(&self) -> usize {
        match self.view {
            Some((_, rows)) => rows,
            None => {
                let buffer = self.buffer.read();
                buffer.data.len() / buffer.cols
            }
        }
    }

    pub fn cols(&self) -> usize {
        self.buffer.read().cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    pub fn is_view(&self) -> bool {
        self.view.is_some()
    }

    pub fn is_shared(&self) -> bool {
        self.buffer.read().shared
    }

    /// Number of other handles and views referring to the same buffer.
    pub fn references(&self) -> usize {
        Arc::strong_count(&self.buffer) - 1
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.meta.insert(key.into(), value.into());
    }

    pub fn remove_meta(&mut self, key: &str) -> Option<String> {
        self.meta.remove(key)
    }

    pub fn meta_map(&self) -> &BTreeMap<String, String> {
        &self.meta
    }

    /// Interprets the metadata value for `key` as a boolean flag, absent keys are `false`.
    pub fn meta_flag(&self, key: &str) -> bool {
        matches!(self.meta(key), Some(v) if v.eq_ignore_ascii_case("true") || v == "1")
    }

    fn row_offset(&self) -> usize {
        self.view.map(|(offset, _)| offset).unwrap_or(0)
    }

    fn index_error(&self, row: usize, col: usize) -> Error {
        Error::Index {
            name: self.name.clone(),
            row,
            col,
            rows: self.rows(),
            cols: self.cols(),
        }
    }

    fn flat_index(&self, buffer: &Buffer<T>, n: usize, m: usize) -> Result<usize> {
        let rows = self.view.map(|(_, r)| r).unwrap_or(buffer.data.len() / buffer.cols);
        let idx = (self.row_offset() + n) * buffer.cols + m;
        if n >= rows || m >= buffer.cols || idx >= buffer.data.len() {
            Err(Error::Index {
                name: self.name.clone(),
                row: n,
                col: m,
                rows,
                cols: buffer.cols,
            })
        } else {
            Ok(idx)
        }
    }

    pub fn get(&self, n: usize, m: usize) -> Result<T> {
        let buffer = self.buffer.read();
        let idx = self.flat_index(&buffer, n, m)?;
        Ok(buffer.data[idx])
    }

    pub fn set(&self, value: T, n: usize, m: usize) -> Result<()> {
        let mut buffer = self.buffer.write();
        let idx = self.flat_index(&buffer, n, m)?;
        buffer.data[idx] = value;
        Ok(())
    }

    pub fn row(&self, n: usize) -> Result<Vec<T>> {
        let buffer = self.buffer.read();
        let start = self.flat_index(&buffer, n, 0)?;
        Ok(buffer.data[start..start + buffer.cols].to_vec())
    }

    pub fn set_row(&self, n: usize, values: &[T]) -> Result<()> {
        let mut buffer = self.buffer.write();
        if values.len() != buffer.cols {
            return Err(Error::shape(
                self.name.clone(),
                format!("row of length {} given for {} columns", values.len(), buffer.cols),
            ));
        }
        let start = self.flat_index(&buffer, n, 0)?;
        let cols = buffer.cols;
        buffer.data[start..start + cols].copy_from_slice(values);
        Ok(())
    }

    /// Appends a row, growing capacity geometrically.
    pub fn append(&self, values: &[T]) -> Result<()> {
        if self.is_view() {
            return Err(Error::shape(self.name.clone(), "cannot append to a row view"));
        }
        let mut buffer = self.buffer.write();
        if values.len() != buffer.cols {
            return Err(Error::shape(
                self.name.clone(),
                format!("row of length {} appended to {} columns", values.len(), buffer.cols),
            ));
        }
        buffer.data.extend_from_slice(values);
        Ok(())
    }

    /// Reserves room for at least `rows` rows in total without changing the row count.
    pub fn reserve(&self, rows: usize) {
        let mut buffer = self.buffer.write();
        let wanted = rows * buffer.cols;
        let len = buffer.data.len();
        if wanted > len {
            buffer.data.reserve(wanted - len);
        }
    }

    /// Resizes to `rows` rows, filling new rows with zero.
    pub fn set_rows(&self, rows: usize) -> Result<()> {
        if self.is_view() {
            return Err(Error::shape(self.name.clone(), "cannot resize a row view"));
        }
        let mut buffer = self.buffer.write();
        let cols = buffer.cols;
        buffer.data.resize(rows * cols, T::zero());
        Ok(())
    }

    /// Removes all rows.
    pub fn clear(&self) -> Result<()> {
        self.set_rows(0)
    }

    /// A view of `rows` rows starting at `start`, aliasing this matrix's buffer.
    pub fn sub_matrix_rows(&self, name: impl Into<String>, start: usize, rows: usize) -> Result<Self> {
        let total = self.rows();
        if start + rows > total {
            return Err(self.index_error(start + rows, 0));
        }
        Ok(Self {
            name: name.into(),
            type_code: self.type_code.clone(),
            meta: self.meta.clone(),
            buffer: Arc::clone(&self.buffer),
            view: Some((self.row_offset() + start, rows)),
            lock: Arc::clone(&self.lock),
        })
    }

    /// Another handle to the same buffer. Writes through either handle are visible to both.
    pub fn handle(&self) -> Self {
        Self {
            name: self.name.clone(),
            type_code: self.type_code.clone(),
            meta: self.meta.clone(),
            buffer: Arc::clone(&self.buffer),
            view: self.view,
            lock: Arc::clone(&self.lock),
        }
    }

    /// An independent deep copy under a new name, keeping type code and metadata.
    pub fn clone_named(&self, name: impl Into<String>) -> Self {
        let data = self.read().to_vec();
        let mut result = Self::from_buffer(name.into(), data, self.cols());
        result.type_code = self.type_code.clone();
        result.meta = self.meta.clone();
        result
    }

    /// Marks the buffer as shared with workers. Sharing an already shared buffer does nothing.
    pub fn share(&self) {
        self.buffer.write().shared = true;
    }

    /// Returns the buffer to private use. Fails while other handles still refer to it.
    pub fn unshare(&self) -> Result<()> {
        let references = self.references();
        if references > 0 {
            return Err(Error::ResourceBusy {
                name: self.name.clone(),
                references,
            });
        }
        self.buffer.write().shared = false;
        Ok(())
    }

    /// Changes the column count, keeping the element order. Not allowed on shared buffers or views.
    pub fn reshape(&self, cols: usize) -> Result<()> {
        if self.is_view() {
            return Err(Error::shape(self.name.clone(), "cannot reshape a row view"));
        }
        let mut buffer = self.buffer.write();
        if buffer.shared {
            return Err(Error::shape(self.name.clone(), "cannot reshape a shared matrix"));
        }
        if cols == 0 || buffer.data.len() % cols != 0 {
            return Err(Error::shape(
                self.name.clone(),
                format!("{} elements cannot be arranged in {} columns", buffer.data.len(), cols),
            ));
        }
        buffer.cols = cols;
        Ok(())
    }

    pub fn fill(&self, value: T) {
        self.write().fill(value);
    }

    /// Read access to the elements of this matrix (or view) in row-major order.
    pub fn read(&self) -> MappedRwLockReadGuard<'_, [T]> {
        let (offset, rows) = (self.row_offset(), self.view.map(|(_, r)| r));
        RwLockReadGuard::map(self.buffer.read(), move |b| {
            let rows = rows.unwrap_or(b.data.len() / b.cols);
            let end = ((offset + rows) * b.cols).min(b.data.len());
            &b.data[(offset * b.cols).min(end)..end]
        })
    }

    /// Write access to the elements of this matrix (or view) in row-major order.
    pub fn write(&self) -> MappedRwLockWriteGuard<'_, [T]> {
        let (offset, rows) = (self.row_offset(), self.view.map(|(_, r)| r));
        RwLockWriteGuard::map(self.buffer.write(), move |b| {
            let rows = rows.unwrap_or(b.data.len() / b.cols);
            let end = ((offset + rows) * b.cols).min(b.data.len());
            let cols = b.cols;
            &mut b.data[(offset * cols).min(end)..end]
        })
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.read().to_vec()
    }

    /// Rows as owned vectors.
    pub fn to_rows(&self) -> Vec<Vec<T>> {
        let cols = self.cols();
        self.read().chunks(cols).map(|c| c.to_vec()).collect()
    }

    /// The advisory object lock, for algorithms that choose to serialize access.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }

    fn check_same_shape<U: Element>(&self, other: &Matrix<U>) -> Result<()> {
        if self.rows() != other.rows() || self.cols() != other.cols() {
            Err(Error::shape(
                self.name.clone(),
                format!(
                    "operand {:?} has shape {}x{}, expected {}x{}",
                    other.name(),
                    other.rows(),
                    other.cols(),
                    self.rows(),
                    self.cols()
                ),
            ))
        } else {
            Ok(())
        }
    }
}

impl<T: Arithmetic> Matrix<T> {
    fn apply<'a>(&self, rhs: Operand<'a, T>, op: impl Fn(T, T) -> T) -> Result<&Self> {
        self.try_apply(rhs, |v, w| Some(op(v, w)))
    }

    /// Applies `op` to every element, leaving the matrix unchanged if any element fails.
    fn try_apply<'a>(&self, rhs: Operand<'a, T>, op: impl Fn(T, T) -> Option<T>) -> Result<&Self> {
        // Aliasing handles share one lock, copy the operand first to avoid re-entrant locking
        let (scalar, values) = match rhs {
            Operand::Scalar(value) => (Some(value), Vec::new()),
            Operand::Matrix(other) => {
                self.check_same_shape(other)?;
                (None, other.to_vec())
            }
        };
        let mut data = self.write();
        let updated: Option<Vec<T>> = match scalar {
            Some(value) => data.iter().map(|v| op(*v, value)).collect(),
            None => data.iter().zip(values).map(|(v, w)| op(*v, w)).collect(),
        };
        let updated = updated.ok_or_else(|| Error::shape(self.name(), "integer division by zero or overflow"))?;
        data.copy_from_slice(&updated);
        Ok(self)
    }

    pub fn add<'a>(&self, rhs: impl Into<Operand<'a, T>>) -> Result<&Self> {
        self.apply(rhs.into(), T::add)
    }

    pub fn sub<'a>(&self, rhs: impl Into<Operand<'a, T>>) -> Result<&Self> {
        self.apply(rhs.into(), T::sub)
    }

    pub fn mul<'a>(&self, rhs: impl Into<Operand<'a, T>>) -> Result<&Self> {
        self.apply(rhs.into(), T::mul)
    }

    pub fn div<'a>(&self, rhs: impl Into<Operand<'a, T>>) -> Result<&Self> {
        self.try_apply(rhs.into(), T::div)
    }
}

impl Matrix<f64> {
    /// Minimum and maximum element, `None` for empty matrices.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        crate::util::min_max(self.read().iter().copied())
    }

    pub fn sum(&self) -> f64 {
        self.read().iter().sum()
    }
}

impl Matrix<i64> {
    /// Row `n` as node indices.
    pub fn index_row(&self, n: usize) -> Result<Vec<usize>> {
        let row = self.row(n)?;
        row.into_iter()
            .enumerate()
            .map(|(m, v)| usize::try_from(v).map_err(|_| self.index_error(n, m)))
            .collect()
    }

    /// All rows as node indices.
    pub fn index_rows(&self) -> Result<Vec<Vec<usize>>> {
        (0..self.rows()).map(|n| self.index_row(n)).collect()
    }

    /// Gathers the rows of `values` named by the indices in row `n`.
    pub fn map_index_row<U: Element>(&self, n: usize, values: &Matrix<U>) -> Result<Vec<U>> {
        self.index_row(n)?
            .into_iter()
            .map(|i| values.get(i, 0))
            .collect()
    }

    pub fn from_index_rows(name: impl Into<String>, type_code: impl Into<String>, cols: usize, rows: &[Vec<usize>]) -> Result<Self> {
        let data = rows.iter().flatten().map(|&i| i as i64).collect();
        let mut m = Self::from_vec(name, cols, data)?;
        m.set_type_code(type_code);
        Ok(m)
    }
}

impl Matrix<Vector3<f64>> {
    pub fn from_points(name: impl Into<String>, points: &[Point3<f64>]) -> Self {
        Self::from_buffer(name.into(), points.iter().map(|p| p.coords).collect(), 1)
    }

    pub fn point(&self, n: usize) -> Result<Point3<f64>> {
        self.get(n, 0).map(Point3::from)
    }

    /// Column 0 as points.
    pub fn points(&self) -> Vec<Point3<f64>> {
        let cols = self.cols();
        self.read().iter().step_by(cols).map(|v| Point3::from(*v)).collect()
    }

    /// Applies an affine transform to every element in place.
    pub fn transform(&self, transform: &Affine3<f64>) -> &Self {
        for v in self.write().iter_mut() {
            *v = transform.transform_point(&Point3::from(*v)).coords;
        }
        self
    }
}

/// Matrices whose buffer can be marked shared with workers, independent of element type.
pub trait Shareable {
    fn matrix_name(&self) -> &str;
    fn is_shared(&self) -> bool;
    fn share(&self);
    fn unshare(&self) -> Result<()>;
}

impl<T: Element> Shareable for Matrix<T> {
    fn matrix_name(&self) -> &str {
        self.name()
    }

    fn is_shared(&self) -> bool {
        Matrix::is_shared(self)
    }

    fn share(&self) {
        Matrix::share(self)
    }

    fn unshare(&self) -> Result<()> {
        Matrix::unshare(self)
    }
}
