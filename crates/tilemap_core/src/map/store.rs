use crate::geometry::{MapSize, TileCoord};

/// Result of writing into a [`TileStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement<T> {
    /// The coordinate is outside the grid; nothing was stored.
    Rejected,
    Placed { previous: Option<T> },
}

/// Dense row-major grid of optional cells.
///
/// Grid origin convention:
/// - cell (0,0) is the top-left cell of the map.
/// - cell (x,y) lives at index `y * width + x`.
#[derive(Debug, Clone, PartialEq)]
pub struct TileStore<T> {
    size: MapSize,
    cells: Vec<Option<T>>,
    occupied: usize,
}

impl<T> TileStore<T> {
    pub fn new(size: MapSize) -> Self {
        let mut cells = Vec::with_capacity(size.cell_count());
        cells.resize_with(size.cell_count(), || None);
        Self {
            size,
            cells,
            occupied: 0,
        }
    }

    pub fn size(&self) -> MapSize {
        self.size
    }

    pub fn is_valid(&self, coord: TileCoord) -> bool {
        self.size.contains(coord)
    }

    pub fn index_of(&self, coord: TileCoord) -> Option<usize> {
        if !self.is_valid(coord) {
            return None;
        }
        Some(coord.y as usize * self.size.width as usize + coord.x as usize)
    }

    pub fn coord_of(&self, index: usize) -> Option<TileCoord> {
        if index >= self.cells.len() {
            return None;
        }
        let width = self.size.width as usize;
        Some(TileCoord::new((index % width) as i32, (index / width) as i32))
    }

    pub fn get(&self, coord: TileCoord) -> Option<&T> {
        self.index_of(coord)
            .and_then(|index| self.cells[index].as_ref())
    }

    pub fn get_mut(&mut self, coord: TileCoord) -> Option<&mut T> {
        let index = self.index_of(coord)?;
        self.cells[index].as_mut()
    }

    pub fn set(&mut self, coord: TileCoord, value: T) -> Placement<T> {
        let Some(index) = self.index_of(coord) else {
            return Placement::Rejected;
        };
        let previous = self.cells[index].replace(value);
        if previous.is_none() {
            self.occupied += 1;
        }
        Placement::Placed { previous }
    }

    pub fn remove(&mut self, coord: TileCoord) -> Option<T> {
        let index = self.index_of(coord)?;
        let removed = self.cells[index].take();
        if removed.is_some() {
            self.occupied -= 1;
        }
        removed
    }

    /// Empties every cell and hands back what was stored, in row-major order.
    pub fn clear(&mut self) -> Vec<T> {
        self.occupied = 0;
        self.cells.iter_mut().filter_map(Option::take).collect()
    }

    /// Number of occupied cells.
    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileCoord, &T)> + '_ {
        let width = self.size.width.max(1) as usize;
        self.cells.iter().enumerate().filter_map(move |(index, cell)| {
            cell.as_ref().map(|value| {
                (
                    TileCoord::new((index % width) as i32, (index / width) as i32),
                    value,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (TileCoord, &mut T)> + '_ {
        let width = self.size.width.max(1) as usize;
        self.cells
            .iter_mut()
            .enumerate()
            .filter_map(move |(index, cell)| {
                cell.as_mut().map(|value| {
                    (
                        TileCoord::new((index % width) as i32, (index / width) as i32),
                        value,
                    )
                })
            })
    }
}
