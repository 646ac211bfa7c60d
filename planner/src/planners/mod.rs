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

//! Group planners. One planner handles one batch of related request
//! positions (a sector group, a per-well group or a job group): it
//! simulates all candidate reservoir specs with independent location
//! assigners, picks the cheapest spec with sufficient capacity, and emits
//! layout positions and planned transfers to the builder.

mod rack_position;
mod sector;

use std::collections::BTreeMap;

use common_exception::ErrorCode;
use common_exception::Result;
use common_layouts::are_equal_values;
use common_layouts::get_reservoir_specs;
use common_layouts::is_larger_than;
use common_layouts::labels::ROLE_FINAL;
use common_layouts::round_to;
use common_layouts::IsoRequestPosition;
use common_layouts::Pool;
use common_layouts::PositionType;
use common_layouts::RackPosition;
use common_layouts::PREPARATION_RESERVOIR_SPECS_NAMES;
use common_worklists::PlannedRackSampleTransfer;
use common_worklists::PlannedSampleDilution;
use common_worklists::PlannedSampleTransfer;
use common_worklists::PlannedTransfer;

pub(crate) use rack_position::RackPositionPlanner;
pub(crate) use sector::SectorPlanner;

use crate::assigner::AssignerKind;
use crate::assigner::LocationAssigner;
use crate::builder::LabIsoBuilder;
use crate::container::ContainerArena;
use crate::container::ContainerId;
use crate::container::PlateLocation;

/// An already planned starting well, on the final plate or a preparation
/// plate. Job groups for sector covered controls start from these.
#[derive(Clone, Debug)]
pub(crate) struct PlatePosition {
    pub plate_marker: String,
    pub rack_position: RackPosition,
    pub pool: Pool,
    pub volume: f64,
    pub concentration: f64,
}

/// A request position or an already planned plate position.
#[derive(Clone, Debug)]
pub(crate) enum PoolPosition {
    Request(IsoRequestPosition),
    Plate(PlatePosition),
}

/// All positions of one pool, with the shared stock concentration.
#[derive(Clone, Debug)]
pub(crate) struct PoolContainer {
    pub pool: Pool,
    pub position_type: PositionType,
    pub stock_concentration: f64,
    pub positions: Vec<PoolPosition>,
}

/// The planner side of one group: container registration, coupling and
/// emission. The driver below owns the spec search.
pub(crate) trait GroupPlanner {
    fn assigner_kind(&self) -> AssignerKind;
    fn number_copies(&self) -> usize;
    fn final_plate_dead_volume(&self) -> f64;
    /// Creates the requested containers and returns nothing; ids are kept
    /// by the implementation.
    fn register_requested(&mut self, arena: &mut ContainerArena) -> Result<()>;
    /// Containers that may share preparation routes, keyed by a sortable
    /// batch identifier.
    fn coupled_sets(&self) -> Vec<(String, Vec<ContainerId>)>;
    /// Emits final positions, preparation layouts and planned transfers for
    /// the picked assigner. `clone_map` maps registered containers to the
    /// assigner's clones.
    fn emit(
        &mut self,
        arena: &ContainerArena,
        assigner: &LocationAssigner,
        clone_map: &BTreeMap<ContainerId, ContainerId>,
        builder: &mut LabIsoBuilder,
    ) -> Result<()>;
}

/// Runs one group planner: simulate every candidate reservoir spec, pick
/// the assigner with full capacity and the fewest plates (desirability
/// breaking ties), distribute the preparation containers and emit.
pub(crate) fn run_group_planner(
    planner: &mut dyn GroupPlanner,
    arena: &mut ContainerArena,
    builder: &mut LabIsoBuilder,
) -> Result<()> {
    planner.register_requested(arena)?;
    let coupled = planner.coupled_sets();

    let mut tried: Vec<(LocationAssigner, BTreeMap<ContainerId, ContainerId>)> = Vec::new();
    let mut picked: Option<usize> = None;
    for (index, name) in PREPARATION_RESERVOIR_SPECS_NAMES.iter().enumerate() {
        let specs = get_reservoir_specs(*name);
        let mut assigner = LocationAssigner::new(
            planner.assigner_kind(),
            specs,
            planner.final_plate_dead_volume(),
        );
        let mut clone_map: BTreeMap<ContainerId, ContainerId> = BTreeMap::new();
        for (identifier, containers) in &coupled {
            let mut clones = Vec::with_capacity(containers.len());
            for &container in containers {
                let clone = arena.clone_subtree(container)?;
                clone_map.insert(container, clone);
                clones.push(clone);
            }
            assigner.add_batch(arena, clones, identifier, planner.number_copies())?;
        }
        assigner.finalize(arena)?;
        let no_preps = !assigner.has_preparation_containers();
        tried.push((assigner, clone_map));
        // Direct stock-to-final works: nothing a larger plate could
        // improve.
        if index == 0 && no_preps {
            picked = Some(0);
            break;
        }
    }

    if picked.is_none() {
        let mut best: Option<(usize, usize)> = None;
        for (index, (assigner, _)) in tried.iter().enumerate() {
            let max_volume = assigner.max_preparation_volume();
            if is_larger_than(max_volume, assigner.prep_specs().max_volume) {
                continue;
            }
            let plates = assigner.number_preparation_plates();
            match best {
                Some((best_plates, _)) if plates >= best_plates => {}
                _ => best = Some((plates, index)),
            }
        }
        picked = match best {
            Some((_, index)) => Some(index),
            None => {
                let names = PREPARATION_RESERVOIR_SPECS_NAMES
                    .iter()
                    .map(|n| n.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(ErrorCode::PrepVolumeExceedsAllSpecs(format!(
                    "the volumes for some preparation containers exceed the \
                     capacity of all available plate types ({})",
                    names
                )));
            }
        };
    }

    let (mut assigner, clone_map) = tried.swap_remove(picked.expect("an assigner was picked"));
    assigner.distribute(arena)?;
    planner.emit(arena, &assigner, &clone_map, builder)
}

/// Looks up the assigner clone for a registered container.
pub(crate) fn picked_clone(
    clone_map: &BTreeMap<ContainerId, ContainerId>,
    container: ContainerId,
) -> Result<ContainerId> {
    clone_map.get(&container).copied().ok_or_else(|| {
        ErrorCode::BadArguments("a registered container has no assigner clone".to_string())
    })
}

/// Records dilutions and planned transfers for the primary requested
/// containers and every placed preparation container. `positions_for`
/// resolves a container to the rack positions its dilution applies to (a
/// sector container expands to all its wells).
pub(crate) fn record_planned_transfers(
    arena: &ContainerArena,
    assigner: &LocationAssigner,
    builder: &mut LabIsoBuilder,
    primary: &[ContainerId],
    number_sectors: usize,
    positions_for: &dyn Fn(ContainerId) -> Vec<RackPosition>,
) -> Result<()> {
    let mut containers: Vec<ContainerId> = primary.to_vec();
    for placed in assigner.plate_assignments().values() {
        containers.extend(placed.iter().copied());
    }
    for container in containers {
        let marker = container_marker(arena, container)?;

        let buffer = arena.buffer_volume(container);
        if !are_equal_values(buffer, 0.0) {
            for position in positions_for(container) {
                builder.add_dilution(&marker, PlannedSampleDilution::new(position, buffer));
            }
        }

        for (&child, &volume) in arena.targets(container) {
            let child_marker = container_marker(arena, child)?;
            let volume = round_to(volume, 2);
            let transfer = match (arena.location(container), arena.location(child)) {
                (Some(PlateLocation::Sector(source)), Some(PlateLocation::Sector(target))) => {
                    PlannedTransfer::Rack(PlannedRackSampleTransfer {
                        source_sector: source,
                        target_sector: target,
                        number_sectors,
                        volume,
                    })
                }
                (Some(PlateLocation::Well(source)), Some(PlateLocation::Well(target))) => {
                    PlannedTransfer::Sample(PlannedSampleTransfer {
                        source_position: source,
                        target_position: target,
                        volume,
                    })
                }
                _ => {
                    return Err(ErrorCode::BadArguments(
                        "a planned transfer requires located containers".to_string(),
                    ))
                }
            };
            if marker == child_marker {
                let depth = arena.intraplate_ancestor_count(container);
                builder.add_intraplate_transfer(&marker, depth, transfer);
            } else {
                builder.add_interplate_transfer(&marker, &child_marker, transfer);
            }
        }
    }
    Ok(())
}

fn container_marker(arena: &ContainerArena, container: ContainerId) -> Result<String> {
    if arena.is_final(container) {
        return Ok(ROLE_FINAL.to_string());
    }
    arena
        .plate_marker(container)
        .map(|m| m.to_string())
        .ok_or_else(|| {
            ErrorCode::BadArguments("a planned container has no plate marker".to_string())
        })
}
