// Copyright 2022 Platebench Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Plate canvases track the free locations of one preparation plate while
//! containers are distributed onto it. Allocation never overwrites; running
//! out of space or placing onto an occupied location is an explicit error.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use common_exception::ErrorCode;
use common_exception::Result;
use common_layouts::Pool;
use common_layouts::RackPosition;
use common_layouts::RackShape;

use crate::container::PlateLocation;

/// A canvas of sector slots. `allocate` takes the smallest free index.
#[derive(Clone, Debug)]
pub struct SectorCanvas {
    free: BTreeSet<usize>,
}

impl SectorCanvas {
    pub fn new(number_sectors: usize) -> Self {
        SectorCanvas {
            free: (0..number_sectors).collect(),
        }
    }

    fn take(&mut self, sector: usize) -> Result<PlateLocation> {
        if !self.free.remove(&sector) {
            return Err(ErrorCode::OccupiedLocation(format!(
                "sector {} is already occupied",
                sector
            )));
        }
        Ok(PlateLocation::Sector(sector))
    }

    fn allocate(&mut self) -> Result<PlateLocation> {
        let sector = *self
            .free
            .iter()
            .next()
            .ok_or_else(|| ErrorCode::NoFreeLocation("no empty sector left".to_string()))?;
        self.take(sector)
    }
}

/// A canvas of well positions. Allocation prefers to keep positions of the
/// same pool within the rows that pool already uses; new pools consume the
/// lowest fully empty row.
#[derive(Clone, Debug)]
pub struct PositionCanvas {
    shape: RackShape,
    free: BTreeSet<RackPosition>,
    pool_rows: BTreeMap<Pool, BTreeSet<usize>>,
    row_free: BTreeMap<usize, BTreeSet<RackPosition>>,
    empty_rows: BTreeSet<usize>,
}

impl PositionCanvas {
    pub fn new(shape: RackShape) -> Self {
        let mut free = BTreeSet::new();
        let mut row_free: BTreeMap<usize, BTreeSet<RackPosition>> = BTreeMap::new();
        for position in shape.positions() {
            free.insert(position);
            row_free.entry(position.row).or_default().insert(position);
        }
        let empty_rows = row_free.keys().copied().collect();
        PositionCanvas {
            shape,
            free,
            pool_rows: BTreeMap::new(),
            row_free,
            empty_rows,
        }
    }

    fn take(&mut self, position: RackPosition, pool: Option<Pool>) -> Result<PlateLocation> {
        if !self.shape.contains(position) {
            return Err(ErrorCode::BadArguments(format!(
                "position {} is outside the {} shape",
                position, self.shape
            )));
        }
        if !self.free.remove(&position) {
            return Err(ErrorCode::OccupiedLocation(format!(
                "location {} is already occupied",
                position
            )));
        }
        let row = position.row;
        if let Some(positions) = self.row_free.get_mut(&row) {
            positions.remove(&position);
            if positions.is_empty() {
                self.row_free.remove(&row);
            }
        }
        self.empty_rows.remove(&row);
        if let Some(pool) = pool {
            self.pool_rows.entry(pool).or_default().insert(row);
        }
        Ok(PlateLocation::Well(position))
    }

    fn allocate(&mut self, pool: Option<Pool>) -> Result<PlateLocation> {
        if let Some(pool) = pool {
            if let Some(rows) = self.pool_rows.get(&pool) {
                for &row in rows {
                    if let Some(positions) = self.row_free.get(&row) {
                        if let Some(&position) = positions.iter().next() {
                            return self.take(position, Some(pool));
                        }
                    }
                }
            }
        }
        // A fresh row for the pool, or any free well once no empty row is
        // left.
        let position = match self.empty_rows.iter().next() {
            Some(&row) => *self.row_free[&row]
                .iter()
                .next()
                .expect("an empty row has free positions"),
            None => *self.free.iter().next().ok_or_else(|| {
                ErrorCode::NoFreeLocation("no empty well left".to_string())
            })?,
        };
        self.take(position, pool)
    }
}

/// The two canvas kinds behind one dispatch surface.
#[derive(Clone, Debug)]
pub enum Canvas {
    Sector(SectorCanvas),
    Position(PositionCanvas),
}

impl Canvas {
    pub fn new_sector(number_sectors: usize) -> Self {
        Canvas::Sector(SectorCanvas::new(number_sectors))
    }

    pub fn new_position(shape: RackShape) -> Self {
        Canvas::Position(PositionCanvas::new(shape))
    }

    pub fn capacity(&self) -> usize {
        match self {
            Canvas::Sector(c) => c.free.len(),
            Canvas::Position(c) => c.free.len(),
        }
    }

    pub fn has_empty_locations(&self) -> bool {
        self.capacity() > 0
    }

    pub fn is_empty_location(&self, location: PlateLocation) -> bool {
        match (self, location) {
            (Canvas::Sector(c), PlateLocation::Sector(sector)) => c.free.contains(&sector),
            (Canvas::Position(c), PlateLocation::Well(position)) => c.free.contains(&position),
            _ => false,
        }
    }

    /// Takes the explicit location when given, otherwise lets the canvas
    /// pick one.
    pub fn place(
        &mut self,
        pool: Option<Pool>,
        explicit: Option<PlateLocation>,
    ) -> Result<PlateLocation> {
        match (self, explicit) {
            (Canvas::Sector(c), Some(PlateLocation::Sector(sector))) => c.take(sector),
            (Canvas::Sector(c), None) => c.allocate(),
            (Canvas::Position(c), Some(PlateLocation::Well(position))) => c.take(position, pool),
            (Canvas::Position(c), None) => c.allocate(pool),
            (_, Some(location)) => Err(ErrorCode::BadArguments(format!(
                "location {:?} does not fit this canvas kind",
                location
            ))),
        }
    }
}
