//! Grid Geometry
//!
//! Dots, edges and cells of a Dots and Boxes board.
//! Everything here is a pure value or a pure function.
//!
//! ## Coordinates
//!
//! ```text
//!   col 0   col 1   col 2
//!    •───────•───────•      row 0
//!    │ (0,0) │ (0,1) │
//!    •───────•───────•      row 1
//!    │ (1,0) │ (1,1) │
//!    •───────•───────•      row 2
//! ```
//!
//! A cell is named by its top-left dot. An edge joins two dots at
//! Manhattan distance 1 and is stored with its endpoints in `(row, col)`
//! order, so the same edge proposed in either direction has one identity.

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_COLS, DEFAULT_ROWS};

// =============================================================================
// ERRORS
// =============================================================================

/// Grid construction errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    /// Fewer than two dot rows or columns.
    #[error("Grid needs at least 2x2 dots, got {rows}x{cols}")]
    TooSmall {
        /// Requested dot rows.
        rows: u32,
        /// Requested dot columns.
        cols: u32,
    },
}

// =============================================================================
// DOT / EDGE / CELL
// =============================================================================

/// A grid vertex.
///
/// The derived ordering is lexicographic on `(row, col)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dot {
    /// Row index (0 = top).
    pub row: u32,
    /// Column index (0 = left).
    pub col: u32,
}

impl Dot {
    /// Create a dot.
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

/// A normalized edge between two dots.
///
/// Only constructible through [`Edge::new`] / [`normalize`], so `start <= end`
/// always holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    start: Dot,
    end: Dot,
}

impl Edge {
    /// Create a normalized edge from two endpoints in any order.
    pub fn new(a: Dot, b: Dot) -> Self {
        normalize(a, b)
    }

    /// Lower endpoint.
    pub fn start(&self) -> Dot {
        self.start
    }

    /// Upper endpoint.
    pub fn end(&self) -> Dot {
        self.end
    }

    /// Whether both endpoints share a row.
    pub fn is_horizontal(&self) -> bool {
        self.start.row == self.end.row
    }

    /// Whether both endpoints share a column.
    pub fn is_vertical(&self) -> bool {
        self.start.col == self.end.col
    }
}

/// A unit square, named by its top-left dot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// Row of the top-left dot.
    pub row: u32,
    /// Column of the top-left dot.
    pub col: u32,
}

impl Cell {
    /// Create a cell.
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

// =============================================================================
// GRID SIZE
// =============================================================================

/// Board dimensions, counted in dots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridSize {
    rows: u32,
    cols: u32,
}

impl GridSize {
    /// Smallest allowed dot count per axis.
    pub const MIN_DOTS: u32 = 2;

    /// Create a grid of `rows` x `cols` dots.
    pub fn new(rows: u32, cols: u32) -> Result<Self, GridError> {
        if rows < Self::MIN_DOTS || cols < Self::MIN_DOTS {
            return Err(GridError::TooSmall { rows, cols });
        }
        Ok(Self { rows, cols })
    }

    /// Dot rows.
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Dot columns.
    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Cell rows (`rows - 1`).
    pub fn cell_rows(&self) -> u32 {
        self.rows - 1
    }

    /// Cell columns (`cols - 1`).
    pub fn cell_cols(&self) -> u32 {
        self.cols - 1
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        self.cell_rows() as usize * self.cell_cols() as usize
    }

    /// Total number of drawable edges.
    pub fn edge_count(&self) -> usize {
        let (rows, cols) = (self.rows as usize, self.cols as usize);
        rows * (cols - 1) + cols * (rows - 1)
    }

    /// Whether a dot lies on this grid.
    pub fn contains(&self, dot: Dot) -> bool {
        dot.row < self.rows && dot.col < self.cols
    }

    /// Whether a cell lies on this grid.
    pub fn contains_cell(&self, cell: Cell) -> bool {
        cell.row < self.cell_rows() && cell.col < self.cell_cols()
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> {
        let cols = self.cell_cols();
        (0..self.cell_rows()).flat_map(move |r| (0..cols).map(move |c| Cell::new(r, c)))
    }

    /// All drawable edges: horizontal ones first, then vertical, row-major.
    pub fn edges(&self) -> impl Iterator<Item = Edge> {
        let (rows, cols) = (self.rows, self.cols);
        let horizontal = (0..rows).flat_map(move |r| {
            (0..cols - 1).map(move |c| Edge::new(Dot::new(r, c), Dot::new(r, c + 1)))
        });
        let vertical = (0..rows - 1).flat_map(move |r| {
            (0..cols).map(move |c| Edge::new(Dot::new(r, c), Dot::new(r + 1, c)))
        });
        horizontal.chain(vertical)
    }
}

impl Default for GridSize {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
        }
    }
}

// =============================================================================
// GEOMETRY
// =============================================================================

/// Canonicalize an edge: the lexicographically smaller dot comes first.
pub fn normalize(a: Dot, b: Dot) -> Edge {
    if a <= b {
        Edge { start: a, end: b }
    } else {
        Edge { start: b, end: a }
    }
}

/// Two dots are adjacent iff their Manhattan distance is exactly 1.
pub fn is_adjacent(a: Dot, b: Dot) -> bool {
    u64::from(a.row.abs_diff(b.row)) + u64::from(a.col.abs_diff(b.col)) == 1
}

/// The four edges bounding a cell: top, bottom, left, right.
pub fn cell_edges(cell: Cell) -> [Edge; 4] {
    let Cell { row: r, col: c } = cell;
    [
        Edge::new(Dot::new(r, c), Dot::new(r, c + 1)),
        Edge::new(Dot::new(r + 1, c), Dot::new(r + 1, c + 1)),
        Edge::new(Dot::new(r, c), Dot::new(r + 1, c)),
        Edge::new(Dot::new(r, c + 1), Dot::new(r + 1, c + 1)),
    ]
}

/// Cells on either side of an edge that lie inside `size`.
///
/// Horizontal edges yield the cell above then below; vertical edges the cell
/// to the left then right. Non-unit edges have no neighbours.
pub fn adjacent_cells(edge: Edge, size: GridSize) -> Vec<Cell> {
    let mut cells = Vec::with_capacity(2);
    if !is_adjacent(edge.start, edge.end) {
        return cells;
    }

    let Dot { row, col } = edge.start;
    if edge.is_horizontal() {
        if let Some(above) = row.checked_sub(1) {
            cells.push(Cell::new(above, col));
        }
        cells.push(Cell::new(row, col));
    } else {
        if let Some(left) = col.checked_sub(1) {
            cells.push(Cell::new(row, left));
        }
        cells.push(Cell::new(row, col));
    }

    cells.retain(|cell| size.contains_cell(*cell));
    cells
}
