use crate::core::error::{ErrorContext, ErrorKind, Res};
use std::ops::{Index, IndexMut};

/// Mutable row-major 2-D view. Rows are `pitch` elements apart, the
/// trailing `pitch - width` elements of each row are not part of the view.
#[derive(Debug)]
pub struct Array2DRef<'a, T> {
    data: &'a mut [T],
    width: usize,
    height: usize,
    pitch: usize,
}

impl<T> ErrorContext for Array2DRef<'_, T> {
    fn describe(&self) -> Option<String> {
        Some(format!(
            "Array2DRef {}x{} (pitch {})",
            self.width, self.height, self.pitch
        ))
    }
}

impl<'a, T> Array2DRef<'a, T> {
    pub fn new(data: &'a mut [T], width: usize, height: usize, pitch: usize) -> Res<Self> {
        let view = Self {
            data,
            width,
            height,
            pitch,
        };
        if pitch < width {
            view.invalid(format!("pitch {} is below width {}", pitch, width))?
        }
        let needed = match height {
            0 => 0,
            h => (h - 1)
                .checked_mul(pitch)
                .and_then(|n| n.checked_add(width))
                .unwrap_or(usize::MAX),
        };
        if view.data.len() < needed {
            view.raise_kind(
                ErrorKind::OutOfBounds,
                format!("{} elements cannot hold {}", view.data.len(), needed),
            )?
        }
        Ok(view)
    }

    /// A dense view, `pitch == width`.
    pub fn with_width(data: &'a mut [T], width: usize) -> Res<Self> {
        let height = if width == 0 { 0 } else { data.len() / width };
        Self::new(data, width, height, width)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if row < self.height && col < self.width {
            self.data.get(row * self.pitch + col)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut T> {
        if row < self.height && col < self.width {
            self.data.get_mut(row * self.pitch + col)
        } else {
            None
        }
    }

    /// Bounds-checked write.
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Res<()> {
        match self.get_mut(row, col) {
            Some(cell) => *cell = value,
            None => self.raise_kind(
                ErrorKind::OutOfBounds,
                format!("write to ({}, {}) is outside of the view", row, col),
            )?,
        }
        Ok(())
    }

    pub fn row_mut(&mut self, row: usize) -> Option<&mut [T]> {
        if row < self.height {
            let start = row * self.pitch;
            self.data.get_mut(start..start + self.width)
        } else {
            None
        }
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut [T]> {
        let width = self.width;
        self.data
            .chunks_mut(self.pitch.max(1))
            .take(self.height)
            .map(move |r| &mut r[..width])
    }

    /// Splits every row into the given disjoint column ranges `(offset, width)`,
    /// which must be sorted by offset.
    pub fn split_columns(&mut self, ranges: &[(usize, usize)]) -> Res<Vec<Array2DTile<'_, T>>> {
        let mut end = 0;
        for &(offset, width) in ranges {
            if offset < end || offset.saturating_add(width) > self.width {
                self.raise_kind(
                    ErrorKind::OutOfBounds,
                    format!("column range {}+{} overlaps or leaves the view", offset, width),
                )?
            }
            end = offset + width;
        }

        let height = self.height;
        let mut tiles: Vec<Array2DTile<T>> = ranges
            .iter()
            .map(|&(offset, width)| Array2DTile {
                offset,
                width,
                rows: Vec::with_capacity(height),
            })
            .collect();
        for row in self.rows_mut() {
            let mut rest = row;
            let mut pos = 0;
            for tile in tiles.iter_mut() {
                let (_, tail) = std::mem::take(&mut rest).split_at_mut(tile.offset - pos);
                let (cells, tail) = tail.split_at_mut(tile.width);
                tile.rows.push(cells);
                rest = tail;
                pos = tile.offset + tile.width;
            }
        }
        Ok(tiles)
    }
}

impl<T> Index<(usize, usize)> for Array2DRef<'_, T> {
    type Output = T;

    fn index(&self, (row, col): (usize, usize)) -> &T {
        debug_assert!(col < self.width);
        &self.data[row * self.pitch + col]
    }
}

impl<T> IndexMut<(usize, usize)> for Array2DRef<'_, T> {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut T {
        debug_assert!(col < self.width);
        &mut self.data[row * self.pitch + col]
    }
}

/// A column range of an `Array2DRef`, owning mutable access to its cells.
#[derive(Debug)]
pub struct Array2DTile<'a, T> {
    offset: usize,
    width: usize,
    rows: Vec<&'a mut [T]>,
}

impl<T> ErrorContext for Array2DTile<'_, T> {
    fn describe(&self) -> Option<String> {
        Some(format!(
            "Array2DTile at column {}, {}x{}",
            self.offset,
            self.width,
            self.rows.len()
        ))
    }
}

impl<T> Array2DTile<'_, T> {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut T> {
        self.rows.get_mut(row).and_then(|r| r.get_mut(col))
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) -> Res<()> {
        match self.get_mut(row, col) {
            Some(cell) => *cell = value,
            None => self.raise_kind(
                ErrorKind::OutOfBounds,
                format!("write to ({}, {}) is outside of the tile", row, col),
            )?,
        }
        Ok(())
    }
}

impl<T> Index<(usize, usize)> for Array2DTile<'_, T> {
    type Output = T;

    fn index(&self, (row, col): (usize, usize)) -> &T {
        &self.rows[row][col]
    }
}
