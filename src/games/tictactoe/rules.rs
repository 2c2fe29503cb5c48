//! Move legality and terminal detection.

use super::types::{Board, Mark};
use derive_more::{Display, Error};

/// The 8 winning lines: 3 rows, 3 columns, 2 diagonals.
const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Rejection reasons for an attempted move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum RulesError {
    /// Cell index is outside 0-8.
    #[display("cell index {_0} is out of bounds")]
    OutOfBounds(#[error(not(source))] usize),
    /// Target cell already holds a mark.
    #[display("cell {_0} is already occupied")]
    CellOccupied(#[error(not(source))] usize),
}

/// Terminal evaluation of a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Mark with three in a row, if any.
    pub winner: Option<Mark>,
    /// Board is full with no winner.
    pub is_draw: bool,
    /// Game has ended, by win or draw.
    pub is_over: bool,
}

impl Board {
    /// Places `mark` at `cell`.
    ///
    /// # Errors
    ///
    /// Rejects an out-of-range index or an occupied cell. An occupied
    /// cell is never overwritten.
    pub fn apply_move(&mut self, cell: usize, mark: Mark) -> Result<(), RulesError> {
        match self.get(cell) {
            None => Err(RulesError::OutOfBounds(cell)),
            Some(Some(_)) => Err(RulesError::CellOccupied(cell)),
            Some(None) => {
                self.set(cell, mark);
                Ok(())
            }
        }
    }

    /// Empty cell indices in ascending order.
    ///
    /// Recomputed on every call; the result is used both to prompt a
    /// model and to validate its answer, so it must never go stale.
    pub fn valid_moves(&self) -> Vec<usize> {
        self.cells()
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| cell.is_none().then_some(i))
            .collect()
    }

    /// Evaluates the board for a winner or draw.
    ///
    /// All 8 lines are checked; under legal alternating play at most one
    /// mark can hold a completed line, so line order carries no
    /// ambiguity.
    pub fn evaluate(&self) -> Outcome {
        let mut winner = None;
        for [a, b, c] in LINES {
            if let Some(mark) = self.cells()[a] {
                if self.cells()[b] == Some(mark) && self.cells()[c] == Some(mark) {
                    winner = winner.or(Some(mark));
                }
            }
        }

        let is_draw = winner.is_none() && self.occupied_count() == 9;
        Outcome {
            winner,
            is_draw,
            is_over: winner.is_some() || is_draw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_from(moves: &[(usize, Mark)]) -> Board {
        let mut board = Board::new();
        for &(cell, mark) in moves {
            board.apply_move(cell, mark).expect("legal move");
        }
        board
    }

    #[test]
    fn empty_board_has_all_moves() {
        let board = Board::new();
        assert_eq!(board.valid_moves(), vec![0, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(!board.evaluate().is_over);
    }

    #[test]
    fn occupied_cell_is_never_overwritten() {
        let mut board = Board::new();
        board.apply_move(4, Mark::X).unwrap();
        let err = board.apply_move(4, Mark::O).unwrap_err();
        assert_eq!(err, RulesError::CellOccupied(4));
        assert_eq!(board.get(4), Some(Some(Mark::X)));
    }

    #[test]
    fn out_of_bounds_rejected() {
        let mut board = Board::new();
        assert_eq!(
            board.apply_move(9, Mark::X),
            Err(RulesError::OutOfBounds(9))
        );
    }

    #[test]
    fn occupied_count_tracks_moves() {
        let board = board_from(&[(0, Mark::X), (4, Mark::O), (8, Mark::X)]);
        assert_eq!(board.occupied_count(), 3);
        assert_eq!(board.valid_moves(), vec![1, 2, 3, 5, 6, 7]);
    }

    #[test]
    fn all_eight_lines_detect_a_winner() {
        for line in [
            [0, 1, 2],
            [3, 4, 5],
            [6, 7, 8],
            [0, 3, 6],
            [1, 4, 7],
            [2, 5, 8],
            [0, 4, 8],
            [2, 4, 6],
        ] {
            let mut board = Board::new();
            for cell in line {
                board.apply_move(cell, Mark::O).unwrap();
            }
            let outcome = board.evaluate();
            assert_eq!(outcome.winner, Some(Mark::O), "line {line:?}");
            assert!(outcome.is_over);
            assert!(!outcome.is_draw);
        }
    }

    #[test]
    fn full_board_without_line_is_draw() {
        // X: 0, 8, 7, 2, 3 / O: 4, 1, 6, 5 - no completed line.
        let board = board_from(&[
            (0, Mark::X),
            (4, Mark::O),
            (8, Mark::X),
            (1, Mark::O),
            (7, Mark::X),
            (6, Mark::O),
            (2, Mark::X),
            (5, Mark::O),
            (3, Mark::X),
        ]);
        let outcome = board.evaluate();
        assert_eq!(outcome.winner, None);
        assert!(outcome.is_draw);
        assert!(outcome.is_over);
        assert!(board.valid_moves().is_empty());
    }

    #[test]
    fn render_labels_empty_cells_with_indices() {
        let board = board_from(&[(0, Mark::X), (4, Mark::O)]);
        assert_eq!(
            board.render(),
            "X | 1 | 2\n---------\n3 | O | 5\n---------\n6 | 7 | 8"
        );
    }
}
