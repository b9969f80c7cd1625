//! Core geometry primitives.
//!
//! Pure functions over dots, edges and cells. Nothing here knows about
//! players or connections.

pub mod grid;

// Re-export core types
pub use grid::{adjacent_cells, cell_edges, is_adjacent, normalize, Cell, Dot, Edge, GridError, GridSize};
