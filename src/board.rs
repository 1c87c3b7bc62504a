//! Board derivation and outcome detection.
//!
//! The board is never stored. It is a pure function of a turn log prefix:
//! replaying the same placements always derives the same cells, and the mark
//! in each cell is decided by the ply parity of the placing turn (even plies
//! belong to the host). Keeping the board derived rather than materialized
//! means persistence, reconciliation and event replay cannot disagree about
//! cell contents.

use std::fmt;

use crate::{turns::TurnLog, Mark};

/// All eight winning lines, as cell indices into the row-major 3x3 grid.
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

/// The number of cells on the board.
pub const CELL_COUNT: usize = 9;

/// A derived 3x3 board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Board {
    cells: [Option<Mark>; CELL_COUNT],
}

/// The state of play a derived board describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// No line is complete and free cells remain.
    InProgress,
    /// One party completed a line.
    Won(Mark),
    /// All nine cells are filled and no line is complete.
    Draw,
}

impl Board {
    /// An empty board.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            cells: [None; CELL_COUNT],
        }
    }

    /// Derives the board from the first `upto` turns of the log.
    ///
    /// `upto` is clamped to the log length, so callers can pass the finalized
    /// turn count even when the local log lags behind it.
    #[must_use]
    pub fn derive(log: &TurnLog, upto: usize) -> Self {
        let mut board = Self::empty();
        for turn in log.iter().take(upto) {
            let placement = turn.placement();
            board.place(placement.row(), placement.col(), placement.ply().mark());
        }
        board
    }

    /// The mark occupying the given cell, if any.
    ///
    /// Out-of-range coordinates read as empty.
    #[must_use]
    pub fn mark_at(&self, row: u8, col: u8) -> Option<Mark> {
        Self::index_of(row, col).and_then(|idx| self.cells[idx])
    }

    /// Whether the given cell holds a mark.
    #[must_use]
    pub fn is_occupied(&self, row: u8, col: u8) -> bool {
        self.mark_at(row, col).is_some()
    }

    /// Whether every cell holds a mark.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// The party that completed a line, if any.
    #[must_use]
    pub fn winner(&self) -> Option<Mark> {
        for line in &LINES {
            let Some(first) = self.cells[line[0]] else {
                continue;
            };
            if line.iter().all(|&idx| self.cells[idx] == Some(first)) {
                return Some(first);
            }
        }
        None
    }

    /// Classifies the board.
    ///
    /// [`Outcome::Draw`] requires a full board; a partially filled board with
    /// no line is still [`Outcome::InProgress`].
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        if let Some(mark) = self.winner() {
            Outcome::Won(mark)
        } else if self.is_full() {
            Outcome::Draw
        } else {
            Outcome::InProgress
        }
    }

    fn place(&mut self, row: u8, col: u8, mark: Mark) {
        if let Some(idx) = Self::index_of(row, col) {
            self.cells[idx] = Some(mark);
        }
    }

    fn index_of(row: u8, col: u8) -> Option<usize> {
        (row <= 2 && col <= 2).then(|| usize::from(row) * 3 + usize::from(col))
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..3 {
            if row > 0 {
                writeln!(f)?;
            }
            for col in 0..3 {
                if col > 0 {
                    write!(f, "|")?;
                }
                let glyph = match self.cells[row * 3 + col] {
                    Some(Mark::Host) => 'x',
                    Some(Mark::Challenger) => 'o',
                    None => '.',
                };
                write!(f, "{glyph}")?;
            }
        }
        Ok(())
    }
}
