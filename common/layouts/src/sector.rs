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

//! Rack sector (quadrant) arithmetic. A 384-well plate decomposes into four
//! interleaved 96-well subgrids; rack-at-once pipetting moves one subgrid
//! per step. 96-well plates have a single trivial sector.

use std::collections::BTreeMap;

use common_exception::ErrorCode;
use common_exception::Result;

use crate::shape::RackPosition;
use crate::shape::RackShape;

/// Number of sectors for a final plate shape: 4 for 384, 1 otherwise.
pub fn number_of_sectors(shape: &RackShape) -> usize {
    if shape.size() == 384 {
        4
    } else {
        1
    }
}

/// Row and column offset of a sector within its 2x2 block.
pub fn sector_offsets(sector_index: usize) -> (usize, usize) {
    (sector_index / 2, sector_index % 2)
}

/// The sector a position belongs to.
pub fn sector_of(position: RackPosition, number_sectors: usize) -> usize {
    if number_sectors == 1 {
        0
    } else {
        (position.row % 2) * 2 + position.column % 2
    }
}

/// The 2x2 block coordinate of a position (its position on a quarter sized
/// plate).
pub fn base_position(position: RackPosition) -> RackPosition {
    RackPosition::new(position.row / 2, position.column / 2)
}

/// Groups positions by sector index. Sectors without positions are not
/// included.
pub fn sort_into_sectors(
    positions: &[RackPosition],
    number_sectors: usize,
) -> BTreeMap<usize, Vec<RackPosition>> {
    let mut sector_map: BTreeMap<usize, Vec<RackPosition>> = BTreeMap::new();
    for &position in positions {
        sector_map
            .entry(sector_of(position, number_sectors))
            .or_default()
            .push(position);
    }
    sector_map
}

/// How rack positions translate between a source and a target plate when
/// moving one sector of samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranslationBehaviour {
    /// Equally shaped plates, single sector: positions map onto themselves.
    OneToOne,
    /// Quarter shape to full shape: the source position spreads into the
    /// target sector.
    OneToMany,
    /// Full shape to quarter shape: the source sector condenses onto the
    /// quarter plate.
    ManyToOne,
    /// Full shape to full shape: source sector positions map onto the
    /// corresponding target sector positions.
    ManyToMany,
}

/// Translates rack positions for one (source sector, target sector) pair.
#[derive(Clone, Copy, Debug)]
pub struct RackSectorTranslator {
    pub number_sectors: usize,
    pub source_sector: usize,
    pub target_sector: usize,
    pub behaviour: TranslationBehaviour,
}

impl RackSectorTranslator {
    pub fn new(
        number_sectors: usize,
        source_sector: usize,
        target_sector: usize,
        behaviour: TranslationBehaviour,
    ) -> Self {
        RackSectorTranslator {
            number_sectors,
            source_sector,
            target_sector,
            behaviour,
        }
    }

    /// The behaviour for moving one sector between the given shapes.
    pub fn get_translation_behaviour(
        number_sectors: usize,
        source_shape: &RackShape,
        target_shape: &RackShape,
    ) -> TranslationBehaviour {
        if number_sectors == 1 {
            TranslationBehaviour::OneToOne
        } else if source_shape.size() == 384 && target_shape.size() == 384 {
            TranslationBehaviour::ManyToMany
        } else if source_shape.size() == 384 {
            TranslationBehaviour::ManyToOne
        } else if target_shape.size() == 384 {
            TranslationBehaviour::OneToMany
        } else {
            TranslationBehaviour::OneToOne
        }
    }

    pub fn translate(&self, position: RackPosition) -> Result<RackPosition> {
        match self.behaviour {
            TranslationBehaviour::OneToOne => Ok(position),
            TranslationBehaviour::OneToMany => {
                let (row_offset, column_offset) = sector_offsets(self.target_sector);
                Ok(RackPosition::new(
                    position.row * 2 + row_offset,
                    position.column * 2 + column_offset,
                ))
            }
            TranslationBehaviour::ManyToOne => {
                self.check_source_sector(position)?;
                Ok(RackPosition::new(position.row / 2, position.column / 2))
            }
            TranslationBehaviour::ManyToMany => {
                self.check_source_sector(position)?;
                let (source_row, source_column) = sector_offsets(self.source_sector);
                let (target_row, target_column) = sector_offsets(self.target_sector);
                Ok(RackPosition::new(
                    position.row - source_row + target_row,
                    position.column - source_column + target_column,
                ))
            }
        }
    }

    fn check_source_sector(&self, position: RackPosition) -> Result<()> {
        let (row_offset, column_offset) = sector_offsets(self.source_sector);
        if position.row % 2 != row_offset || position.column % 2 != column_offset {
            return Err(ErrorCode::BadArguments(format!(
                "position {} is not part of sector {}",
                position, self.source_sector
            )));
        }
        Ok(())
    }
}
