//! Core domain types for tic-tac-toe.

use serde::{Deserialize, Serialize};

/// Mark a participant plays as.
///
/// `X` belongs to the first participant and always moves first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
pub enum Mark {
    /// First mover.
    X,
    /// Second mover.
    O,
}

impl Mark {
    /// Returns the opposing mark.
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

/// 3x3 tic-tac-toe board, cells in row-major order (indices 0-8).
///
/// Serializes as a flat array of `null`/`"X"`/`"O"`, which is the shape
/// observer clients expect in event frames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    cells: [Option<Mark>; 9],
}

impl Board {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the cell at the given index, `None` when out of range.
    pub fn get(&self, cell: usize) -> Option<Option<Mark>> {
        self.cells.get(cell).copied()
    }

    /// Returns all cells as a slice.
    pub fn cells(&self) -> &[Option<Mark>; 9] {
        &self.cells
    }

    /// Number of occupied cells.
    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub(super) fn set(&mut self, cell: usize, mark: Mark) {
        self.cells[cell] = Some(mark);
    }

    /// Renders the board as a human-readable 3x3 grid.
    ///
    /// Empty cells are labeled with their index so a model can name its
    /// move directly:
    ///
    /// ```text
    /// X | 1 | 2
    /// ---------
    /// 3 | O | 5
    /// ---------
    /// 6 | 7 | 8
    /// ```
    pub fn render(&self) -> String {
        let mut out = String::new();
        for row in 0..3 {
            for col in 0..3 {
                let cell = row * 3 + col;
                match self.cells[cell] {
                    Some(mark) => out.push_str(&mark.to_string()),
                    None => out.push_str(&cell.to_string()),
                }
                if col < 2 {
                    out.push_str(" | ");
                }
            }
            if row < 2 {
                out.push_str("\n---------\n");
            }
        }
        out
    }
}
