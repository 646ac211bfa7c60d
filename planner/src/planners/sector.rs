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

//! The sector planner prepares whole rack sectors at once. Requested
//! containers are the final plate sectors from the association data; one
//! request layout position expands into translated wells on every involved
//! plate.

use std::collections::BTreeMap;

use common_exception::ErrorCode;
use common_exception::Result;
use common_layouts::get_pipetting_specs;
use common_layouts::labels::ROLE_FINAL;
use common_layouts::round_to;
use common_layouts::FinalIsoPosition;
use common_layouts::IsoRequestPosition;
use common_layouts::PipettingSpecsName;
use common_layouts::PrepIsoLayout;
use common_layouts::PrepIsoPosition;
use common_layouts::RackShape;
use common_layouts::RackSectorTranslator;
use common_layouts::TransferTarget;
use common_layouts::TEMP_STOCK_DATA;

use crate::assigner::AssignerKind;
use crate::assigner::LocationAssigner;
use crate::association::AssociationData;
use crate::builder::LabIsoBuilder;
use crate::container::ContainerArena;
use crate::container::ContainerId;
use crate::container::PlateLocation;
use crate::planners::picked_clone;
use crate::planners::record_planned_transfers;
use crate::planners::GroupPlanner;

pub(crate) struct SectorPlanner {
    association: AssociationData,
    /// The request positions covered by the sector preparation, by sector.
    sector_positions: BTreeMap<usize, Vec<IsoRequestPosition>>,
    stock_concentration: f64,
    number_copies: usize,
    aliquot_shape: RackShape,
    final_plate_dead_volume: f64,
    /// Registered final sector containers by sector index.
    requested: BTreeMap<usize, ContainerId>,
    /// Rack positions per assigner container, for dilution emission.
    container_positions: BTreeMap<ContainerId, Vec<common_layouts::RackPosition>>,
}

impl SectorPlanner {
    pub fn new(
        association: AssociationData,
        sector_positions: BTreeMap<usize, Vec<IsoRequestPosition>>,
        stock_concentration: f64,
        number_copies: usize,
        aliquot_shape: RackShape,
        final_plate_dead_volume: f64,
    ) -> Self {
        SectorPlanner {
            association,
            sector_positions,
            stock_concentration,
            number_copies,
            aliquot_shape,
            final_plate_dead_volume,
            requested: BTreeMap::new(),
            container_positions: BTreeMap::new(),
        }
    }

    fn number_sectors(&self) -> usize {
        self.association.number_sectors
    }

    fn final_to_final_translator(&self, source: usize, target: usize) -> RackSectorTranslator {
        let behaviour = RackSectorTranslator::get_translation_behaviour(
            self.number_sectors(),
            &self.aliquot_shape,
            &self.aliquot_shape,
        );
        RackSectorTranslator::new(self.number_sectors(), source, target, behaviour)
    }

    fn store_final_positions(
        &mut self,
        arena: &ContainerArena,
        clone_map: &BTreeMap<ContainerId, ContainerId>,
        builder: &mut LabIsoBuilder,
    ) -> Result<()> {
        let sectors: Vec<usize> = self.requested.keys().copied().collect();
        for sector in sectors {
            let container = picked_clone(clone_map, self.requested[&sector])?;
            let positions = self.sector_positions[&sector].clone();
            for ir_pos in positions {
                let mut transfer_targets = Vec::new();
                for (&child, &volume) in arena.targets(container) {
                    let child_sector = sector_location(arena, child)?;
                    let translator = self.final_to_final_translator(sector, child_sector);
                    transfer_targets.push(TransferTarget {
                        rack_position: translator.translate(ir_pos.rack_position)?,
                        transfer_volume: round_to(volume, 2),
                        target_rack_marker: ROLE_FINAL.to_string(),
                    });
                }
                let stock_tube_barcode = if arena.from_stock(container) {
                    Some(TEMP_STOCK_DATA.to_string())
                } else {
                    None
                };
                builder.add_final_iso_position(FinalIsoPosition {
                    rack_position: ir_pos.rack_position,
                    pool: ir_pos.pool,
                    position_type: ir_pos.position_type(),
                    concentration: Some(arena.target_concentration(container)),
                    volume: round_to(arena.full_volume(container), 2),
                    from_job: ir_pos.pool.is_fixed(),
                    sector_index: Some(sector),
                    transfer_targets,
                    stock_tube_barcode,
                    stock_rack_marker: None,
                })?;
                self.container_positions
                    .entry(container)
                    .or_default()
                    .push(ir_pos.rack_position);
            }
        }
        Ok(())
    }

    fn store_preparation_layouts(
        &mut self,
        arena: &ContainerArena,
        assigner: &LocationAssigner,
        builder: &mut LabIsoBuilder,
    ) -> Result<()> {
        let prep_shape = assigner.prep_specs().rack_shape;
        let number_sectors = self.number_sectors();
        let aliquot_to_prep = RackSectorTranslator::get_translation_behaviour(
            number_sectors,
            &self.aliquot_shape,
            &prep_shape,
        );
        let prep_to_aliquot = RackSectorTranslator::get_translation_behaviour(
            number_sectors,
            &prep_shape,
            &self.aliquot_shape,
        );
        let prep_to_prep = RackSectorTranslator::get_translation_behaviour(
            number_sectors,
            &prep_shape,
            &prep_shape,
        );

        for (marker, containers) in assigner.plate_assignments() {
            let mut layout = PrepIsoLayout::new(prep_shape);
            for &container in containers {
                let prep_sector = sector_location(arena, container)?;
                let anchor = arena
                    .descendants(container)
                    .into_iter()
                    .filter(|&d| arena.is_final(d))
                    .map(|d| sector_location(arena, d))
                    .collect::<Result<Vec<usize>>>()?
                    .into_iter()
                    .min()
                    .ok_or_else(|| {
                        ErrorCode::BadArguments(
                            "a preparation sector has no final descendant".to_string(),
                        )
                    })?;
                let translator_in = RackSectorTranslator::new(
                    number_sectors,
                    anchor,
                    prep_sector,
                    aliquot_to_prep,
                );
                for ir_pos in &self.sector_positions[&anchor] {
                    let source_position = translator_in.translate(ir_pos.rack_position)?;
                    let mut prep_targets = Vec::new();
                    let mut external_targets = Vec::new();
                    for (&child, &volume) in arena.targets(container) {
                        let child_sector = sector_location(arena, child)?;
                        let (behaviour, target_marker) = if arena.is_final(child) {
                            (prep_to_aliquot, ROLE_FINAL.to_string())
                        } else {
                            (prep_to_prep, marker_of(arena, child)?)
                        };
                        let translator = RackSectorTranslator::new(
                            number_sectors,
                            prep_sector,
                            child_sector,
                            behaviour,
                        );
                        let target = TransferTarget {
                            rack_position: translator.translate(source_position)?,
                            transfer_volume: round_to(volume, 2),
                            target_rack_marker: target_marker,
                        };
                        if arena.is_final(child) {
                            external_targets.push(target);
                        } else {
                            prep_targets.push(target);
                        }
                    }
                    let stock_tube_barcode = if arena.from_stock(container) {
                        Some(TEMP_STOCK_DATA.to_string())
                    } else {
                        None
                    };
                    layout.add_position(PrepIsoPosition {
                        rack_position: source_position,
                        pool: ir_pos.pool,
                        position_type: ir_pos.position_type(),
                        concentration: arena.target_concentration(container),
                        volume: round_to(arena.full_volume(container), 2),
                        sector_index: Some(anchor),
                        prep_targets,
                        external_targets,
                        stock_tube_barcode,
                        stock_rack_marker: None,
                    })?;
                    self.container_positions
                        .entry(container)
                        .or_default()
                        .push(source_position);
                }
            }
            builder.add_preparation_layout(marker, layout, assigner.prep_specs().name)?;
        }
        Ok(())
    }
}

impl GroupPlanner for SectorPlanner {
    fn assigner_kind(&self) -> AssignerKind {
        AssignerKind::Sector {
            number_sectors: self.number_sectors(),
        }
    }

    fn number_copies(&self) -> usize {
        self.number_copies
    }

    fn final_plate_dead_volume(&self) -> f64 {
        self.final_plate_dead_volume
    }

    fn register_requested(&mut self, arena: &mut ContainerArena) -> Result<()> {
        let min_transfer =
            get_pipetting_specs(PipettingSpecsName::Sector).min_transfer_volume;
        for (&sector, parent) in &self.association.parent_sectors {
            if !self.sector_positions.contains_key(&sector) {
                continue;
            }
            let concentration = self.association.sector_concentrations[&sector];
            let volume = self.association.sector_volumes[&sector];
            let parent_concentration = match parent {
                Some(parent_sector) => self.association.sector_concentrations[parent_sector],
                None => self.stock_concentration,
            };
            let container = arena.new_final_sector(
                sector,
                volume,
                concentration,
                parent_concentration,
                min_transfer,
            );
            self.requested.insert(sector, container);
        }
        Ok(())
    }

    fn coupled_sets(&self) -> Vec<(String, Vec<ContainerId>)> {
        let mut sets = Vec::new();
        for (index, sectors) in self.association.associated_sectors.iter().enumerate() {
            let containers: Vec<ContainerId> = sectors
                .iter()
                .filter_map(|sector| self.requested.get(sector).copied())
                .collect();
            if containers.is_empty() {
                continue;
            }
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
        self.store_final_positions(arena, clone_map, builder)?;
        if assigner.has_preparation_containers() {
            self.store_preparation_layouts(arena, assigner, builder)?;
        }
        let primary: Vec<ContainerId> = self
            .requested
            .values()
            .map(|&original| picked_clone(clone_map, original))
            .collect::<Result<Vec<_>>>()?;
        let positions = self.container_positions.clone();
        record_planned_transfers(
            arena,
            assigner,
            builder,
            &primary,
            self.number_sectors(),
            &move |container| positions.get(&container).cloned().unwrap_or_default(),
        )
    }
}

fn sector_location(arena: &ContainerArena, container: ContainerId) -> Result<usize> {
    match arena.location(container) {
        Some(PlateLocation::Sector(sector)) => Ok(sector),
        _ => Err(ErrorCode::BadArguments(
            "expected a sector location".to_string(),
        )),
    }
}

fn marker_of(arena: &ContainerArena, container: ContainerId) -> Result<String> {
    arena
        .plate_marker(container)
        .map(|m| m.to_string())
        .ok_or_else(|| ErrorCode::BadArguments("the container has no plate marker".to_string()))
}
