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

//! The top planner. It analyses the request layout, decides between sector
//! and per-position pipetting, runs the group planners, picks stock tubes
//! and hands out a completed builder. Errors are collected per phase;
//! later phases are skipped once an error exists and the run never returns
//! a partially filled builder.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use common_exception::ErrorCode;
use common_exception::Result;
use common_layouts::are_equal_values;
use common_layouts::final_reservoir_specs_for_shape;
use common_layouts::get_pipetting_specs;
use common_layouts::get_stock_takeout_volume;
use common_layouts::is_larger_than;
use common_layouts::is_smaller_than;
use common_layouts::labels::ROLE_FINAL;
use common_layouts::round_to;
use common_layouts::sector_of;
use common_layouts::FinalIsoPosition;
use common_layouts::FloatingSlot;
use common_layouts::IsoRequestPosition;
use common_layouts::PipettingSpecsName;
use common_layouts::Pool;
use common_layouts::PoolId;
use common_layouts::PositionType;
use common_layouts::RackShape;
use common_layouts::TubeCandidate;
use common_layouts::MIN_SECTOR_TRANSFER_COUNT;
use common_tracing::tracing::debug;
use common_tracing::tracing::warn;
use common_worklists::PlannedSampleDilution;

use crate::association::find_association;
use crate::association::AssociationData;
use crate::builder::LabIsoBuilder;
use crate::container::ContainerArena;
use crate::planners::run_group_planner;
use crate::planners::PlatePosition;
use crate::planners::PoolContainer;
use crate::planners::PoolPosition;
use crate::planners::RackPositionPlanner;
use crate::planners::SectorPlanner;
use crate::tube_picking::TubePicker;
use crate::tube_picking::TubePickingQuery;

/// The request as delivered by the (external) layout reader and entity
/// layer.
#[derive(Clone, Debug)]
pub struct LabIsoRequest {
    pub ticket_number: u32,
    /// Shape of the final (aliquot) plates.
    pub shape: RackShape,
    pub number_aliquots: usize,
    pub process_job_first: bool,
    pub positions: Vec<IsoRequestPosition>,
    /// The floating pool set; required when the layout has floating
    /// positions.
    pub molecule_design_pool_set: Option<BTreeSet<PoolId>>,
    /// The stock concentration shared by all floating pools, in nM.
    pub default_stock_concentration: Option<f64>,
    /// Pools already consumed by earlier, non-cancelled ISOs.
    pub pools_used_by_existing_isos: BTreeSet<PoolId>,
    pub number_existing_isos: usize,
}

#[derive(Debug)]
pub struct PlanningOutput {
    pub builder: LabIsoBuilder,
    pub warnings: Vec<String>,
    /// The processing order actually planned; sector association may
    /// overwrite the requested order.
    pub process_job_first: bool,
}

pub struct LabIsoPlanner<'a> {
    request: LabIsoRequest,
    number_isos: usize,
    excluded_racks: Vec<String>,
    requested_tubes: Vec<String>,
    tube_picker: &'a dyn TubePicker,

    arena: ContainerArena,
    errors: Vec<ErrorCode>,
    warnings: Vec<String>,
    positions: Vec<IsoRequestPosition>,
    analysis: Analysis,
    has_floatings: bool,
    floating_stock_concentration: Option<f64>,
    queued_pools: BTreeSet<PoolId>,
    association: Option<AssociationData>,
    controls_in_quadrants: Option<bool>,
    process_job_first: bool,
    real_number_isos: Option<usize>,
}

/// The per-pool view of the request layout.
#[derive(Default)]
pub(crate) struct Analysis {
    pub pool_containers: Vec<PoolContainer>,
    pub mock_positions: Vec<IsoRequestPosition>,
    pub floating_slot_count: usize,
    pub fixed_stock_concentrations: BTreeMap<PoolId, f64>,
}

impl<'a> LabIsoPlanner<'a> {
    pub fn new(
        request: LabIsoRequest,
        number_isos: usize,
        excluded_racks: Vec<String>,
        requested_tubes: Vec<String>,
        tube_picker: &'a dyn TubePicker,
    ) -> Self {
        let process_job_first = request.process_job_first;
        LabIsoPlanner {
            request,
            number_isos,
            excluded_racks,
            requested_tubes,
            tube_picker,
            arena: ContainerArena::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            positions: Vec::new(),
            analysis: Analysis::default(),
            has_floatings: false,
            floating_stock_concentration: None,
            queued_pools: BTreeSet::new(),
            association: None,
            controls_in_quadrants: None,
            process_job_first,
            real_number_isos: None,
        }
    }

    pub fn run(mut self) -> Result<PlanningOutput> {
        let mut builder = LabIsoBuilder::new(
            self.request.ticket_number,
            self.request.shape,
            self.request.number_aliquots,
            self.request.number_existing_isos,
            self.excluded_racks.clone(),
            self.requested_tubes.clone(),
        );

        self.analyse();
        if self.errors.is_empty() {
            self.find_queued_pools();
        }
        if self.errors.is_empty() {
            self.assign_sectors(&mut builder);
        }
        if self.errors.is_empty() {
            self.assign_iso_specific_positions(&mut builder);
        }
        if self.errors.is_empty() {
            self.find_floating_candidates(&mut builder);
        }
        if self.errors.is_empty() {
            self.assign_job_positions(&mut builder);
        }
        if self.errors.is_empty() {
            add_mock_positions(&mut builder, &self.analysis.mock_positions, &mut self.errors);
        }
        if self.errors.is_empty() {
            pick_fixed_candidates(
                &mut builder,
                self.tube_picker,
                &self.analysis.fixed_stock_concentrations,
                &self.excluded_racks,
                &self.requested_tubes,
                &mut self.errors,
            );
        }

        if !self.errors.is_empty() {
            return Err(bundle_errors(self.errors));
        }
        debug!("ISO builder completed");
        Ok(PlanningOutput {
            builder,
            warnings: self.warnings,
            process_job_first: self.process_job_first,
        })
    }

    fn record_error(&mut self, error: ErrorCode) {
        self.errors.push(error);
    }

    fn record_warning(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    fn analyse(&mut self) {
        debug!("analyse ISO request");
        if self.request.positions.is_empty() {
            self.record_error(ErrorCode::LayoutParseFailed(
                "the request layout contains no positions".to_string(),
            ));
            return;
        }
        let mut positions = self.request.positions.clone();
        positions.sort_by_key(|p| p.rack_position);
        self.positions = positions;

        self.has_floatings = self
            .positions
            .iter()
            .any(|p| p.pool.is_floating());
        if self.has_floatings {
            match &self.request.molecule_design_pool_set {
                Some(pool_set) if !pool_set.is_empty() => {}
                _ => {
                    self.record_error(ErrorCode::BadArguments(
                        "there are no molecule design pools in the molecule design \
                         pool set although there are floating positions"
                            .to_string(),
                    ));
                    return;
                }
            }
            match self.request.default_stock_concentration {
                Some(concentration) => {
                    self.floating_stock_concentration = Some(round_to(concentration, 1));
                }
                None => {
                    self.record_error(ErrorCode::BadArguments(
                        "the stock concentration for the floating pools is missing".to_string(),
                    ));
                    return;
                }
            }
        } else {
            if self.number_isos > 1 {
                self.record_warning(format!(
                    "You have requested {} ISOs. The system will only generate 1 \
                     ISO though, because there are no floating positions for this \
                     ISO request.",
                    self.number_isos
                ));
            }
            self.real_number_isos = Some(1);
        }

        match collect_pool_containers(&self.positions, self.floating_stock_concentration) {
            Ok(analysis) => self.analysis = analysis,
            Err(error) => {
                self.record_error(error);
                return;
            }
        }
        if let Err(error) = validate_concentrations(&self.analysis) {
            self.record_error(error);
        }
    }

    fn find_queued_pools(&mut self) {
        if !self.has_floatings {
            return;
        }
        let pool_set = self
            .request
            .molecule_design_pool_set
            .as_ref()
            .expect("checked during analysis");
        self.queued_pools = pool_set
            .difference(&self.request.pools_used_by_existing_isos)
            .copied()
            .collect();
        if self.queued_pools.is_empty() {
            self.record_error(ErrorCode::NoQueuedPools(
                "there are no unused molecule design pools left".to_string(),
            ));
        }
    }

    /// The stock concentration driving the sector preparation. It must be
    /// uniform across all pools the sector handling covers: the floating
    /// pools, plus the fixed ones when controls sit in the quadrants.
    fn sector_stock_concentration(&self, regard_controls: bool) -> Option<f64> {
        let mut uniform: Option<f64> = self.floating_stock_concentration;
        for container in &self.analysis.pool_containers {
            if container.position_type == PositionType::Fixed && !regard_controls {
                continue;
            }
            match uniform {
                None => uniform = Some(container.stock_concentration),
                Some(existing) if are_equal_values(existing, container.stock_concentration) => {}
                Some(_) => return None,
            }
        }
        uniform
    }

    fn assign_sectors(&mut self, builder: &mut LabIsoBuilder) {
        debug!("assign ISO sectors");
        if self.request.shape.size() == 384 {
            if self.has_floatings {
                match find_association(&self.request.shape, &self.positions) {
                    Ok((data, regard_controls)) => self.maybe_enable_sectors(data, regard_controls),
                    Err(error) => {
                        self.record_error(error);
                        return;
                    }
                }
            }
        } else {
            let single_occurrence = self
                .analysis
                .pool_containers
                .iter()
                .all(|c| c.positions.len() == 1);
            if single_occurrence && self.sector_stock_concentration(true).is_some() {
                if let Ok((data, regard_controls)) =
                    find_association(&self.request.shape, &self.positions)
                {
                    self.maybe_enable_sectors(data, regard_controls);
                }
            }
        }

        let association = match &self.association {
            Some(association) => association.clone(),
            None => return,
        };
        let regard_controls = self.controls_in_quadrants.unwrap_or(false);
        let stock_concentration = match self.sector_stock_concentration(regard_controls) {
            Some(concentration) => concentration,
            None => {
                self.record_error(ErrorCode::SectorAssociationFailed(
                    "the stock concentrations are not uniform across the sector \
                     positions"
                        .to_string(),
                ));
                return;
            }
        };
        let number_sectors = association.number_sectors;
        let mut sector_positions: BTreeMap<usize, Vec<IsoRequestPosition>> = BTreeMap::new();
        for position in &self.positions {
            if position.pool.is_floating() || (position.pool.is_fixed() && regard_controls) {
                sector_positions
                    .entry(sector_of(position.rack_position, number_sectors))
                    .or_default()
                    .push(position.clone());
            }
        }

        let mut planner = SectorPlanner::new(
            association,
            sector_positions,
            stock_concentration,
            self.request.number_aliquots,
            self.request.shape,
            final_reservoir_specs_for_shape(&self.request.shape).min_dead_volume,
        );
        if let Err(error) = run_group_planner(&mut planner, &mut self.arena, builder) {
            self.record_error(error.add_message_back("; error when trying to plan sector routes"));
        }
    }

    fn maybe_enable_sectors(&mut self, data: AssociationData, regard_controls: bool) {
        let number_pools = if regard_controls {
            self.analysis.pool_containers.len()
        } else {
            self.analysis
                .pool_containers
                .iter()
                .filter(|c| c.position_type == PositionType::Floating)
                .count()
        };
        if number_pools < MIN_SECTOR_TRANSFER_COUNT {
            self.record_warning(format!(
                "It would be possible to transfer {} pools by rack sector, but \
                 the use of sector pipetting is disabled below {} pools.",
                number_pools, MIN_SECTOR_TRANSFER_COUNT
            ));
            return;
        }
        if self.process_job_first != regard_controls {
            self.record_warning(format!(
                "The order of job and ISO processing has been changed (from {} \
                 to {}).",
                self.process_job_first, regard_controls
            ));
            self.process_job_first = regard_controls;
        }
        self.association = Some(data);
        self.controls_in_quadrants = Some(regard_controls);
    }

    /// Positions covered by neither the sector preparation nor the job:
    /// fixed positions when there are no floatings, floating positions when
    /// sector pipetting is off.
    fn assign_iso_specific_positions(&mut self, builder: &mut LabIsoBuilder) {
        debug!("assign ISO rack positions");
        let wanted = if self.has_floatings {
            if self.association.is_some() {
                return;
            }
            PositionType::Floating
        } else {
            if self.association.is_some() && self.controls_in_quadrants == Some(true) {
                return;
            }
            PositionType::Fixed
        };
        let containers: Vec<PoolContainer> = self
            .analysis
            .pool_containers
            .iter()
            .filter(|c| c.position_type == wanted)
            .cloned()
            .collect();
        if containers.is_empty() {
            return;
        }
        let mut planner = RackPositionPlanner::new_iso(
            containers,
            self.request.number_aliquots,
            final_reservoir_specs_for_shape(&self.request.shape).min_dead_volume,
        );
        if let Err(error) = run_group_planner(&mut planner, &mut self.arena, builder) {
            self.record_error(
                error.add_message_back("; error when trying to plan rack position routes"),
            );
        }
    }

    fn find_floating_candidates(&mut self, builder: &mut LabIsoBuilder) {
        if !self.has_floatings {
            if let Err(error) =
                builder.set_number_of_isos(self.real_number_isos.unwrap_or(1))
            {
                self.record_error(error);
            }
            return;
        }
        debug!("find candidates for floating pools");
        let takeout_volume = match self.determine_floating_takeout_volume(builder) {
            Ok(volume) => volume,
            Err(error) => {
                self.record_error(error);
                return;
            }
        };
        let stock_concentration = self
            .floating_stock_concentration
            .expect("checked during analysis");
        let query = TubePickingQuery {
            pools: self.queued_pools.clone(),
            stock_concentration,
            takeout_volume: Some(takeout_volume),
            excluded_racks: self.excluded_racks.clone(),
            requested_tubes: self.requested_tubes.clone(),
        };
        let result = match self.tube_picker.pick(&query) {
            Ok(result) => result,
            Err(error) => {
                self.record_error(
                    error.add_message_back("; error when trying to find floating tube candidates"),
                );
                return;
            }
        };
        if result.sorted_candidates.is_empty() {
            self.record_error(ErrorCode::NoTubeCandidates(
                "no stock tubes could be found for the floating positions".to_string(),
            ));
            return;
        }
        let slot_count = self.analysis.floating_slot_count.max(1);
        let coverable =
            (result.sorted_candidates.len() + slot_count - 1) / slot_count;
        let real_number_isos = coverable.min(self.number_isos);
        if real_number_isos < self.number_isos {
            self.record_warning(format!(
                "You have requested {} ISOs. The system will only generate {} \
                 ISOs though, because there are no more floating pools left for \
                 this ISO request.",
                self.number_isos, real_number_isos
            ));
        }
        self.real_number_isos = Some(real_number_isos);
        if let Err(error) = builder.set_floating_candidates(result.unsorted_candidates) {
            self.record_error(error);
            return;
        }
        if let Err(error) = builder.set_number_of_isos(real_number_isos) {
            self.record_error(error);
        }
    }

    /// The volume to draw from the stock for one floating pool, without the
    /// stock dead volume. All floating pools must request the same volume.
    fn determine_floating_takeout_volume(&self, builder: &LabIsoBuilder) -> Result<f64> {
        let stock_concentration = self
            .floating_stock_concentration
            .expect("checked during analysis");
        let min_transfer = if self.association.is_some() {
            get_pipetting_specs(PipettingSpecsName::Sector).min_transfer_volume
        } else {
            get_pipetting_specs(PipettingSpecsName::PerPositionStock).min_transfer_volume
        };
        let mut slot_volumes: BTreeMap<FloatingSlot, f64> = BTreeMap::new();
        let mut record = |pool: Pool, volume: f64, concentration: f64, starting: bool| {
            if !starting {
                return;
            }
            if let Some(slot) = pool.floating_slot() {
                let takeout = get_stock_takeout_volume(
                    stock_concentration,
                    volume,
                    concentration,
                    min_transfer,
                );
                *slot_volumes.entry(slot).or_insert(0.0) += takeout;
            }
        };
        for position in builder.final_iso_layout.positions.values() {
            if let Some(concentration) = position.concentration {
                record(
                    position.pool,
                    position.volume,
                    concentration,
                    position.is_starting_well(),
                );
            }
        }
        for layout in builder.preparation_layouts.values() {
            for position in layout.positions.values() {
                record(
                    position.pool,
                    position.volume,
                    position.concentration,
                    position.is_starting_well(),
                );
            }
        }

        let mut volumes: Vec<f64> = slot_volumes.values().copied().collect();
        volumes.sort_by(|a, b| a.partial_cmp(b).expect("take-out volumes are finite"));
        match (volumes.first(), volumes.last()) {
            (Some(&first), Some(&last)) if are_equal_values(first, last) => Ok(first),
            (Some(_), Some(_)) => Err(ErrorCode::FloatingTakeoutMismatch(
                "there are different volumes to be taken from the stock for the \
                 floating positions; this is a programming error"
                    .to_string(),
            )),
            _ => Err(ErrorCode::FloatingTakeoutMismatch(
                "no floating starting wells were planned".to_string(),
            )),
        }
    }

    /// Preparation routes for fixed (control) positions shared by all ISOs
    /// of the job. Only used when floating positions exist.
    fn assign_job_positions(&mut self, builder: &mut LabIsoBuilder) {
        if !self.has_floatings {
            return;
        }
        debug!("assign ISO job rack positions");
        let real_number_isos = self.real_number_isos.unwrap_or(1);
        let (containers, number_copies) = if self.controls_in_quadrants == Some(true) {
            (
                collect_fixed_starting_wells(builder, &self.analysis),
                real_number_isos,
            )
        } else {
            let containers: Vec<PoolContainer> = self
                .analysis
                .pool_containers
                .iter()
                .filter(|c| c.position_type == PositionType::Fixed)
                .cloned()
                .collect();
            (containers, real_number_isos * self.request.number_aliquots)
        };
        if containers.is_empty() {
            return;
        }
        let mut planner = RackPositionPlanner::new_job(
            containers,
            number_copies,
            final_reservoir_specs_for_shape(&self.request.shape).min_dead_volume,
        );
        if let Err(error) = run_group_planner(&mut planner, &mut self.arena, builder) {
            self.record_error(error.add_message_back(
                "; error when trying to plan rack position routes for the ISO job \
                 preparation; if the problem is caused by too low volume \
                 capacities, try reducing the number of ISOs for the job",
            ));
        }
    }
}

/// Groups the layout positions by pool. Library positions are skipped,
/// mock positions are collected separately.
pub(crate) fn collect_pool_containers(
    positions: &[IsoRequestPosition],
    floating_stock_concentration: Option<f64>,
) -> Result<Analysis> {
    let mut analysis = Analysis::default();
    let mut index_of: BTreeMap<Pool, usize> = BTreeMap::new();
    let mut floating_slots: BTreeSet<FloatingSlot> = BTreeSet::new();
    for position in positions {
        match position.pool {
            Pool::Library => continue,
            Pool::Mock => {
                analysis.mock_positions.push(position.clone());
                continue;
            }
            Pool::Floating(slot) => {
                floating_slots.insert(slot);
            }
            Pool::Fixed(_) => {}
        }
        let stock_concentration = match position.pool {
            Pool::Floating(_) => floating_stock_concentration.ok_or_else(|| {
                ErrorCode::BadArguments(
                    "the stock concentration for the floating pools is missing".to_string(),
                )
            })?,
            _ => position.stock_concentration.ok_or_else(|| {
                ErrorCode::BadArguments(format!(
                    "fixed position {} has no stock concentration",
                    position.rack_position
                ))
            })?,
        };
        if let Some(pool_id) = position.pool.fixed_id() {
            analysis
                .fixed_stock_concentrations
                .insert(pool_id, stock_concentration);
        }
        match index_of.get(&position.pool) {
            Some(&index) => analysis.pool_containers[index]
                .positions
                .push(PoolPosition::Request(position.clone())),
            None => {
                index_of.insert(position.pool, analysis.pool_containers.len());
                analysis.pool_containers.push(PoolContainer {
                    pool: position.pool,
                    position_type: position.position_type(),
                    stock_concentration,
                    positions: vec![PoolPosition::Request(position.clone())],
                });
            }
        }
    }
    analysis.floating_slot_count = floating_slots.len();
    Ok(analysis)
}

/// Fails with the full position list when any requested concentration
/// exceeds the pool's stock concentration.
pub(crate) fn validate_concentrations(analysis: &Analysis) -> Result<()> {
    let mut too_high: Vec<String> = Vec::new();
    for container in &analysis.pool_containers {
        for position in &container.positions {
            let position = match position {
                PoolPosition::Request(position) => position,
                PoolPosition::Plate(_) => continue,
            };
            if let Some(concentration) = position.iso_concentration {
                if is_larger_than(concentration, container.stock_concentration) {
                    too_high.push(format!(
                        "{} (ISO: {} nM, stock: {} nM)",
                        position.rack_position, concentration, container.stock_concentration
                    ));
                }
            }
        }
    }
    if too_high.is_empty() {
        Ok(())
    } else {
        Err(ErrorCode::ConcentrationExceedsStock(format!(
            "the ISO concentration for some positions is larger than the stock \
             concentration for the pool: {}",
            too_high.join(", ")
        )))
    }
}

/// Fixed starting wells already planned into the builder layouts, grouped
/// by pool. Used for job planning when controls are covered by the sector
/// preparation.
pub(crate) fn collect_fixed_starting_wells(
    builder: &LabIsoBuilder,
    analysis: &Analysis,
) -> Vec<PoolContainer> {
    let mut containers: BTreeMap<Pool, PoolContainer> = BTreeMap::new();
    let mut push = |pool: Pool,
                    plate_marker: &str,
                    rack_position,
                    volume: f64,
                    concentration: f64| {
        let pool_id = match pool.fixed_id() {
            Some(pool_id) => pool_id,
            None => return,
        };
        let stock_concentration = match analysis.fixed_stock_concentrations.get(&pool_id) {
            Some(&concentration) => concentration,
            None => return,
        };
        containers
            .entry(pool)
            .or_insert_with(|| PoolContainer {
                pool,
                position_type: PositionType::Fixed,
                stock_concentration,
                positions: Vec::new(),
            })
            .positions
            .push(PoolPosition::Plate(PlatePosition {
                plate_marker: plate_marker.to_string(),
                rack_position,
                pool,
                volume,
                concentration,
            }));
    };
    for position in builder.final_iso_layout.positions.values() {
        if position.position_type == PositionType::Fixed && position.is_starting_well() {
            if let Some(concentration) = position.concentration {
                push(
                    position.pool,
                    ROLE_FINAL,
                    position.rack_position,
                    position.volume,
                    concentration,
                );
            }
        }
    }
    for (marker, layout) in &builder.preparation_layouts {
        for position in layout.positions.values() {
            if position.position_type == PositionType::Fixed && position.is_starting_well() {
                push(
                    position.pool,
                    marker,
                    position.rack_position,
                    position.volume,
                    position.concentration,
                );
            }
        }
    }
    containers.into_values().collect()
}

/// Adds the mock positions (diluent only) to the final layout, each with
/// its buffer dilution.
pub(crate) fn add_mock_positions(
    builder: &mut LabIsoBuilder,
    mock_positions: &[IsoRequestPosition],
    errors: &mut Vec<ErrorCode>,
) {
    for position in mock_positions {
        let mock =
            FinalIsoPosition::create_mock_position(position.rack_position, position.iso_volume);
        if let Err(error) = builder.add_final_iso_position(mock) {
            errors.push(error);
            return;
        }
        builder.add_dilution(
            ROLE_FINAL,
            PlannedSampleDilution::new(position.rack_position, round_to(position.iso_volume, 2)),
        );
    }
}

/// Picks one stock tube per fixed pool: aggregate the take-out volumes over
/// all starting wells, query per stock concentration and take the smallest
/// tube that covers the requirement (ties broken by the rack optimized
/// query order).
pub(crate) fn pick_fixed_candidates(
    builder: &mut LabIsoBuilder,
    tube_picker: &dyn TubePicker,
    fixed_stock_concentrations: &BTreeMap<PoolId, f64>,
    excluded_racks: &[String],
    requested_tubes: &[String],
    errors: &mut Vec<ErrorCode>,
) {
    debug!("find candidates for fixed pools");
    let stock_min_transfer =
        get_pipetting_specs(PipettingSpecsName::PerPositionStock).min_transfer_volume;
    let sector_min_transfer =
        get_pipetting_specs(PipettingSpecsName::Sector).min_transfer_volume;

    let mut volume_map: BTreeMap<PoolId, f64> = BTreeMap::new();
    {
        let mut record = |pool: Pool, volume: f64, concentration: f64, sector: Option<usize>| {
            let pool_id = match pool.fixed_id() {
                Some(pool_id) => pool_id,
                None => return,
            };
            let stock_concentration = match fixed_stock_concentrations.get(&pool_id) {
                Some(&concentration) => concentration,
                None => return,
            };
            let min_transfer = if sector.is_some() {
                sector_min_transfer
            } else {
                stock_min_transfer
            };
            let takeout =
                get_stock_takeout_volume(stock_concentration, volume, concentration, min_transfer);
            *volume_map.entry(pool_id).or_insert(0.0) += takeout;
        };
        for position in builder.final_iso_layout.positions.values() {
            if position.position_type == PositionType::Fixed && position.is_starting_well() {
                if let Some(concentration) = position.concentration {
                    record(
                        position.pool,
                        position.volume,
                        concentration,
                        position.sector_index,
                    );
                }
            }
        }
        for layout in builder
            .preparation_layouts
            .values()
            .chain(builder.job_layouts.values())
        {
            for position in layout.positions.values() {
                if position.position_type == PositionType::Fixed && position.is_starting_well() {
                    record(
                        position.pool,
                        position.volume,
                        position.concentration,
                        position.sector_index,
                    );
                }
            }
        }
    }
    if volume_map.is_empty() {
        return;
    }

    let mut concentration_groups: BTreeMap<u64, BTreeSet<PoolId>> = BTreeMap::new();
    for pool_id in volume_map.keys() {
        let concentration = fixed_stock_concentrations[pool_id];
        let key = (concentration * 10.0).round() as u64;
        concentration_groups.entry(key).or_default().insert(*pool_id);
    }

    let mut picked: BTreeMap<PoolId, TubeCandidate> = BTreeMap::new();
    for (key, pools) in concentration_groups {
        let stock_concentration = key as f64 / 10.0;
        let query = TubePickingQuery {
            pools: pools.clone(),
            stock_concentration,
            takeout_volume: None,
            excluded_racks: excluded_racks.to_vec(),
            requested_tubes: requested_tubes.to_vec(),
        };
        let result = match tube_picker.pick(&query) {
            Ok(result) => result,
            Err(error) => {
                errors.push(error.add_message_back(
                    "; error when trying to find tube candidates for fixed pools",
                ));
                return;
            }
        };
        for (pool_id, candidates) in &result.sorted_candidates {
            let required = volume_map[pool_id];
            let mut best: Option<(&TubeCandidate, usize)> = None;
            for candidate in candidates {
                if is_smaller_than(candidate.available_volume, required) {
                    continue;
                }
                let order = result
                    .unsorted_candidates
                    .iter()
                    .position(|c| c.tube_barcode == candidate.tube_barcode)
                    .unwrap_or(usize::MAX);
                let better = match best {
                    None => true,
                    Some((current, current_order)) => {
                        is_smaller_than(candidate.available_volume, current.available_volume)
                            || (are_equal_values(
                                candidate.available_volume,
                                current.available_volume,
                            ) && order < current_order)
                    }
                };
                if better {
                    best = Some((candidate, order));
                }
            }
            if let Some((candidate, _)) = best {
                picked.insert(*pool_id, candidate.clone());
            }
        }
    }

    let missing: Vec<String> = volume_map
        .iter()
        .filter(|(pool_id, _)| !picked.contains_key(pool_id))
        .map(|(pool_id, volume)| format!("{} ({} ul)", pool_id, round_to(*volume, 1)))
        .collect();
    if !missing.is_empty() {
        errors.push(ErrorCode::NoTubeCandidates(format!(
            "could not find stock tubes for the following fixed (control) pools: {}",
            missing.join(", ")
        )));
        return;
    }
    if let Err(error) = builder.set_fixed_candidates(picked) {
        errors.push(error);
    }
}

/// Collapses the collected phase errors: a single error is returned as is,
/// several are bundled.
pub(crate) fn bundle_errors(errors: Vec<ErrorCode>) -> ErrorCode {
    if errors.len() == 1 {
        return errors.into_iter().next().expect("one error is present");
    }
    let messages: Vec<String> = errors.iter().map(|e| e.message()).collect();
    ErrorCode::PlanningFailed(messages.join("; "))
}
