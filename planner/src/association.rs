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

//! Quadrant association. Rack-at-once pipetting requires that every sector
//! is internally uniform (one volume, one concentration) and that the pool
//! pattern repeats across the 2x2 blocks. Sectors holding the same pools
//! are associated: they can be derived from each other on the final plate.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use common_exception::ErrorCode;
use common_exception::Result;
use common_layouts::are_equal_values;
use common_layouts::base_position;
use common_layouts::number_of_sectors;
use common_layouts::sector_of;
use common_layouts::IsoRequestPosition;
use common_layouts::Pool;
use common_layouts::RackPosition;
use common_layouts::RackShape;
use itertools::Itertools;

/// The result of a successful quadrant association.
#[derive(Clone, Debug, PartialEq)]
pub struct AssociationData {
    pub number_sectors: usize,
    /// Groups of sectors holding the same pools; members of a group may
    /// share preparation routes.
    pub associated_sectors: Vec<Vec<usize>>,
    /// The final plate sector each sector is filled from; `None` for
    /// sectors filled from stock or preparation plates.
    pub parent_sectors: BTreeMap<usize, Option<usize>>,
    pub sector_concentrations: BTreeMap<usize, f64>,
    pub sector_volumes: BTreeMap<usize, f64>,
}

/// Attempts the association. Returns the data and whether fixed (control)
/// positions are part of the quadrant handling. Mock and library positions
/// never take part.
pub fn find_association(
    shape: &RackShape,
    positions: &[IsoRequestPosition],
) -> Result<(AssociationData, bool)> {
    let number_sectors = number_of_sectors(shape);
    let eligible: Vec<&IsoRequestPosition> = positions
        .iter()
        .filter(|p| p.pool.is_fixed() || p.pool.is_floating())
        .collect();

    if number_sectors == 1 {
        return match associate(&eligible, 1) {
            Some(data) => Ok((data, true)),
            None => Err(ErrorCode::SectorAssociationFailed(
                "the position values do not comply to one-sector pipetting".to_string(),
            )),
        };
    }

    if let Some(data) = associate(&eligible, number_sectors) {
        return Ok((data, true));
    }
    let floatings: Vec<&IsoRequestPosition> = eligible
        .iter()
        .copied()
        .filter(|p| p.pool.is_floating())
        .collect();
    match associate(&floatings, number_sectors) {
        Some(data) => Ok((data, false)),
        None => Err(ErrorCode::SectorAssociationFailed(
            "the volumes and concentrations of the floating positions do not \
             comply to the rack sectors"
                .to_string(),
        )),
    }
}

fn associate(
    positions: &[&IsoRequestPosition],
    number_sectors: usize,
) -> Option<AssociationData> {
    if positions.is_empty() {
        return None;
    }

    let mut sector_volumes: BTreeMap<usize, f64> = BTreeMap::new();
    let mut sector_concentrations: BTreeMap<usize, f64> = BTreeMap::new();
    let mut base_pools: BTreeMap<RackPosition, BTreeMap<usize, Pool>> = BTreeMap::new();
    let mut occupied_sectors: BTreeSet<usize> = BTreeSet::new();

    for position in positions {
        let sector = sector_of(position.rack_position, number_sectors);
        let concentration = position.iso_concentration?;
        occupied_sectors.insert(sector);
        match sector_volumes.get(&sector) {
            Some(&volume) if !are_equal_values(volume, position.iso_volume) => return None,
            Some(_) => {}
            None => {
                sector_volumes.insert(sector, position.iso_volume);
            }
        }
        match sector_concentrations.get(&sector) {
            Some(&conc) if !are_equal_values(conc, concentration) => return None,
            Some(_) => {}
            None => {
                sector_concentrations.insert(sector, concentration);
            }
        }
        base_pools
            .entry(base_position(position.rack_position))
            .or_default()
            .insert(sector, position.pool);
    }

    // Every occupied 2x2 block must occupy the same sectors.
    if !base_pools
        .values()
        .map(|pools| pools.keys().copied().collect::<Vec<usize>>())
        .all_equal()
    {
        return None;
    }

    // Sectors are associated when they hold the same pool in every block.
    let sectors: Vec<usize> = occupied_sectors.iter().copied().collect();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for &sector in &sectors {
        let matching = groups.iter().position(|group| {
            let representative = group[0];
            base_pools
                .values()
                .all(|pools| pools[&sector] == pools[&representative])
        });
        match matching {
            Some(index) => groups[index].push(sector),
            None => groups.push(vec![sector]),
        }
    }

    // Within a group, weaker sectors are filled from the next stronger one.
    let mut parent_sectors: BTreeMap<usize, Option<usize>> = BTreeMap::new();
    for group in &mut groups {
        group.sort_by(|&a, &b| {
            sector_concentrations[&b]
                .partial_cmp(&sector_concentrations[&a])
                .expect("sector concentrations are finite")
                .then(a.cmp(&b))
        });
        let mut previous: Option<usize> = None;
        for &sector in group.iter() {
            parent_sectors.insert(sector, previous);
            previous = Some(sector);
        }
    }

    Some(AssociationData {
        number_sectors,
        associated_sectors: groups,
        parent_sectors,
        sector_concentrations,
        sector_volumes,
    })
}
