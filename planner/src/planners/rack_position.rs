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

//! The rack position planner prepares independent single wells. It serves
//! two roles: per-ISO routes for positions outside the sector preparation,
//! and job routes for controls shared by all ISOs of a job (then with a
//! copy per ISO and aliquot, onto job preparation plates).

use std::collections::BTreeMap;

use common_exception::ErrorCode;
use common_exception::Result;
use common_layouts::get_pipetting_specs;
use common_layouts::labels::ROLE_FINAL;
use common_layouts::round_to;
use common_layouts::FinalIsoPosition;
use common_layouts::PipettingSpecsName;
use common_layouts::Pool;
use common_layouts::PrepIsoLayout;
use common_layouts::PrepIsoPosition;
use common_layouts::RackPosition;
use common_layouts::TransferTarget;
use common_layouts::TEMP_STOCK_DATA;

use crate::assigner::AssignerKind;
use crate::assigner::LocationAssigner;
use crate::builder::LabIsoBuilder;
use crate::container::ContainerArena;
use crate::container::ContainerId;
use crate::container::PlateLocation;
use crate::planners::picked_clone;
use crate::planners::record_planned_transfers;
use crate::planners::GroupPlanner;
use crate::planners::PoolContainer;
use crate::planners::PoolPosition;

pub(crate) struct RackPositionPlanner {
    kind: AssignerKind,
    from_job: bool,
    number_copies: usize,
    final_plate_dead_volume: f64,
    pool_containers: Vec<PoolContainer>,
    /// Whether the requested containers must be added to the final layout.
    /// False when the group starts from already planned plate positions.
    record_requested: Option<bool>,
    /// (source plate marker, position, registered container).
    requested: Vec<(String, RackPosition, ContainerId)>,
}

impl RackPositionPlanner {
    /// Per-ISO routes; each aliquot is one copy.
    pub fn new_iso(
        pool_containers: Vec<PoolContainer>,
        number_aliquots: usize,
        final_plate_dead_volume: f64,
    ) -> Self {
        RackPositionPlanner {
            kind: AssignerKind::RackPosition,
            from_job: false,
            number_copies: number_aliquots,
            final_plate_dead_volume,
            pool_containers,
            record_requested: None,
            requested: Vec::new(),
        }
    }

    /// Job routes for controls shared by all ISOs of the job.
    pub fn new_job(
        pool_containers: Vec<PoolContainer>,
        number_copies: usize,
        final_plate_dead_volume: f64,
    ) -> Self {
        RackPositionPlanner {
            kind: AssignerKind::Job,
            from_job: true,
            number_copies,
            final_plate_dead_volume,
            pool_containers,
            record_requested: None,
            requested: Vec::new(),
        }
    }

    fn set_record_requested(&mut self, record: bool) -> Result<()> {
        match self.record_requested {
            None => {
                self.record_requested = Some(record);
                Ok(())
            }
            Some(current) if current == record => Ok(()),
            Some(_) => Err(ErrorCode::BadArguments(
                "the position classes in the pool containers are inconsistent".to_string(),
            )),
        }
    }

    fn store_final_positions(
        &self,
        arena: &ContainerArena,
        clone_map: &BTreeMap<ContainerId, ContainerId>,
        builder: &mut LabIsoBuilder,
    ) -> Result<()> {
        for &(_, rack_position, original) in &self.requested {
            let container = picked_clone(clone_map, original)?;
            let mut transfer_targets = Vec::new();
            for (&child, &volume) in arena.targets(container) {
                transfer_targets.push(TransferTarget {
                    rack_position: well_location(arena, child)?,
                    transfer_volume: round_to(volume, 2),
                    target_rack_marker: marker_of(arena, child)?,
                });
            }
            let pool = container_pool(arena, container)?;
            let stock_tube_barcode = if arena.from_stock(container) {
                Some(TEMP_STOCK_DATA.to_string())
            } else {
                None
            };
            builder.add_final_iso_position(FinalIsoPosition {
                rack_position,
                pool,
                position_type: pool.position_type(),
                concentration: Some(arena.target_concentration(container)),
                volume: round_to(arena.full_volume(container), 2),
                from_job: self.from_job,
                sector_index: None,
                transfer_targets,
                stock_tube_barcode,
                stock_rack_marker: None,
            })?;
        }
        Ok(())
    }

    /// For job groups built from already planned plate positions: positions
    /// whose route now runs through a job preparation plate stop being
    /// starting wells.
    fn strip_replaced_stock_routes(
        &self,
        arena: &ContainerArena,
        clone_map: &BTreeMap<ContainerId, ContainerId>,
        builder: &mut LabIsoBuilder,
    ) -> Result<()> {
        for (plate_marker, rack_position, original) in &self.requested {
            let container = picked_clone(clone_map, *original)?;
            // The group's own transfer recording emits the authoritative
            // dilution for these wells.
            builder.remove_dilutions_at(plate_marker, *rack_position);
            if !arena.from_stock(container) {
                builder.clear_stock_data(plate_marker, *rack_position)?;
            }
        }
        Ok(())
    }

    fn store_preparation_layouts(
        &self,
        arena: &ContainerArena,
        assigner: &LocationAssigner,
        builder: &mut LabIsoBuilder,
    ) -> Result<()> {
        let prep_shape = assigner.prep_specs().rack_shape;
        for (marker, containers) in assigner.plate_assignments() {
            let mut layout = PrepIsoLayout::new(prep_shape);
            for &container in containers {
                let mut prep_targets = Vec::new();
                let mut external_targets = Vec::new();
                for (&child, &volume) in arena.targets(container) {
                    let target = TransferTarget {
                        rack_position: well_location(arena, child)?,
                        transfer_volume: round_to(volume, 2),
                        target_rack_marker: marker_of(arena, child)?,
                    };
                    if arena.is_final(child) {
                        external_targets.push(target);
                    } else {
                        prep_targets.push(target);
                    }
                }
                let pool = container_pool(arena, container)?;
                let stock_tube_barcode = if arena.from_stock(container) {
                    Some(TEMP_STOCK_DATA.to_string())
                } else {
                    None
                };
                layout.add_position(PrepIsoPosition {
                    rack_position: well_location(arena, container)?,
                    pool,
                    position_type: pool.position_type(),
                    concentration: arena.target_concentration(container),
                    volume: round_to(arena.full_volume(container), 2),
                    sector_index: None,
                    prep_targets,
                    external_targets,
                    stock_tube_barcode,
                    stock_rack_marker: None,
                })?;
            }
            match self.kind {
                AssignerKind::Job => {
                    builder.add_job_preparation_layout(marker, layout, assigner.prep_specs().name)?
                }
                _ => builder.add_preparation_layout(marker, layout, assigner.prep_specs().name)?,
            }
        }
        Ok(())
    }
}

impl GroupPlanner for RackPositionPlanner {
    fn assigner_kind(&self) -> AssignerKind {
        self.kind
    }

    fn number_copies(&self) -> usize {
        self.number_copies
    }

    fn final_plate_dead_volume(&self) -> f64 {
        self.final_plate_dead_volume
    }

    fn register_requested(&mut self, arena: &mut ContainerArena) -> Result<()> {
        let min_transfer =
            get_pipetting_specs(PipettingSpecsName::PerPosition).min_transfer_volume;
        let pool_containers = std::mem::take(&mut self.pool_containers);
        for pool_container in &pool_containers {
            for position in &pool_container.positions {
                let (plate_marker, rack_position, container) = match position {
                    PoolPosition::Request(p) => {
                        self.set_record_requested(true)?;
                        let concentration = p.iso_concentration.ok_or_else(|| {
                            ErrorCode::BadArguments(format!(
                                "position {} has no concentration",
                                p.rack_position
                            ))
                        })?;
                        let container = arena.new_final_well(
                            p.rack_position,
                            p.pool,
                            p.iso_volume,
                            concentration,
                            pool_container.stock_concentration,
                            min_transfer,
                        );
                        (ROLE_FINAL.to_string(), p.rack_position, container)
                    }
                    PoolPosition::Plate(p) => {
                        self.set_record_requested(false)?;
                        let container = arena.new_frozen_well(
                            p.rack_position,
                            p.pool,
                            p.volume,
                            p.concentration,
                            pool_container.stock_concentration,
                            min_transfer,
                            &p.plate_marker,
                        );
                        (p.plate_marker.clone(), p.rack_position, container)
                    }
                };
                self.requested.push((plate_marker, rack_position, container));
            }
        }
        self.pool_containers = pool_containers;
        Ok(())
    }

    fn coupled_sets(&self) -> Vec<(String, Vec<ContainerId>)> {
        let mut sets = Vec::new();
        let mut cursor = 0;
        for (index, pool_container) in self.pool_containers.iter().enumerate() {
            let count = pool_container.positions.len();
            let containers: Vec<ContainerId> = self.requested[cursor..cursor + count]
                .iter()
                .map(|(_, _, container)| *container)
                .collect();
            cursor += count;
            sets.push((format!("{:03}", index + 1), containers));
        }
        sets
    }

    fn emit(
        &mut self,
        arena: &ContainerArena,
        assigner: &LocationAssigner,
        clone_map: &BTreeMap<ContainerId, ContainerId>,
        builder: &mut LabIsoBuilder,
    ) -> Result<()> {
        if self.record_requested.unwrap_or(true) {
            self.store_final_positions(arena, clone_map, builder)?;
        } else {
            self.strip_replaced_stock_routes(arena, clone_map, builder)?;
        }
        if assigner.has_preparation_containers() {
            self.store_preparation_layouts(arena, assigner, builder)?;
        }
        let primary: Vec<ContainerId> = self
            .requested
            .iter()
            .map(|(_, _, original)| picked_clone(clone_map, *original))
            .collect::<Result<Vec<_>>>()?;
        record_planned_transfers(arena, assigner, builder, &primary, 1, &|container| {
            match arena.location(container) {
                Some(PlateLocation::Well(position)) => vec![position],
                _ => vec![],
            }
        })
    }
}

fn well_location(arena: &ContainerArena, container: ContainerId) -> Result<RackPosition> {
    match arena.location(container) {
        Some(PlateLocation::Well(position)) => Ok(position),
        _ => Err(ErrorCode::BadArguments(
            "expected a well location".to_string(),
        )),
    }
}

fn marker_of(arena: &ContainerArena, container: ContainerId) -> Result<String> {
    if arena.is_final(container) {
        return Ok(ROLE_FINAL.to_string());
    }
    arena
        .plate_marker(container)
        .map(|m| m.to_string())
        .ok_or_else(|| ErrorCode::BadArguments("the container has no plate marker".to_string()))
}

fn container_pool(arena: &ContainerArena, container: ContainerId) -> Result<Pool> {
    arena.pool(container).ok_or_else(|| {
        ErrorCode::BadArguments("a rack position container carries a pool".to_string())
    })
}
