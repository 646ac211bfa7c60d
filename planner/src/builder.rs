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

//! The builder collects all layouts, dilutions and planned transfers of a
//! planning run and materializes concrete ISO value records on demand. A
//! builder is only handed out for fully successful runs.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use common_exception::ErrorCode;
use common_exception::Result;
use common_layouts::final_reservoir_specs_for_shape;
use common_layouts::labels;
use common_layouts::labels::ROLE_FINAL;
use common_layouts::labels::ROLE_STOCK;
use common_layouts::FinalIsoLayout;
use common_layouts::FinalIsoPosition;
use common_layouts::FloatingSlot;
use common_layouts::Pool;
use common_layouts::PoolId;
use common_layouts::PositionType;
use common_layouts::PrepIsoLayout;
use common_layouts::RackPosition;
use common_layouts::RackShape;
use common_layouts::ReservoirSpecsName;
use common_layouts::TubeCandidate;
use common_worklists::PlannedSampleDilution;
use common_worklists::PlannedTransfer;
use common_worklists::WorklistSeries;
use serde::Serialize;

/// One physical plate of a materialized ISO.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IsoPlate {
    pub label: String,
    pub rack_marker: String,
    pub reservoir_specs: ReservoirSpecsName,
    /// Preparation plates carry their completed layout; aliquot plates
    /// share the ISO's final layout.
    pub layout: Option<PrepIsoLayout>,
}

/// One materialized ISO.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LabIso {
    pub label: String,
    pub number_stock_racks: usize,
    /// The floating pools consumed by this ISO.
    pub pool_set: Option<BTreeSet<PoolId>>,
    pub final_layout: FinalIsoLayout,
    pub aliquot_plates: Vec<IsoPlate>,
    pub preparation_plates: Vec<IsoPlate>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LabIsoBuilder {
    pub ticket_number: u32,
    pub final_shape: RackShape,
    pub number_aliquots: usize,
    pub number_existing_isos: usize,
    pub excluded_racks: Vec<String>,
    pub requested_tubes: Vec<String>,
    /// The request wide final layout template; floating positions still
    /// carry their placeholder slots.
    pub final_iso_layout: FinalIsoLayout,
    pub preparation_layouts: BTreeMap<String, PrepIsoLayout>,
    pub job_layouts: BTreeMap<String, PrepIsoLayout>,
    pub plate_specs: BTreeMap<String, ReservoirSpecsName>,
    pub planned_dilutions: BTreeMap<String, Vec<PlannedSampleDilution>>,
    /// Intra-plate transfers by plate marker and serial dilution depth.
    pub intraplate_transfers: BTreeMap<String, BTreeMap<usize, Vec<PlannedTransfer>>>,
    /// Inter-plate transfers by source and target plate marker.
    pub interplate_transfers: BTreeMap<String, BTreeMap<String, Vec<PlannedTransfer>>>,
    fixed_candidates: Option<BTreeMap<PoolId, TubeCandidate>>,
    floating_candidates: Option<Vec<TubeCandidate>>,
    number_isos_to_generate: Option<usize>,
}

impl LabIsoBuilder {
    pub fn new(
        ticket_number: u32,
        final_shape: RackShape,
        number_aliquots: usize,
        number_existing_isos: usize,
        excluded_racks: Vec<String>,
        requested_tubes: Vec<String>,
    ) -> Self {
        let mut plate_specs = BTreeMap::new();
        plate_specs.insert(
            ROLE_FINAL.to_string(),
            final_reservoir_specs_for_shape(&final_shape).name,
        );
        LabIsoBuilder {
            ticket_number,
            final_shape,
            number_aliquots,
            number_existing_isos,
            excluded_racks,
            requested_tubes,
            final_iso_layout: FinalIsoLayout::new(final_shape),
            preparation_layouts: BTreeMap::new(),
            job_layouts: BTreeMap::new(),
            plate_specs,
            planned_dilutions: BTreeMap::new(),
            intraplate_transfers: BTreeMap::new(),
            interplate_transfers: BTreeMap::new(),
            fixed_candidates: None,
            floating_candidates: None,
            number_isos_to_generate: None,
        }
    }

    pub fn add_final_iso_position(&mut self, position: FinalIsoPosition) -> Result<()> {
        self.final_iso_layout.add_position(position)
    }

    pub fn add_preparation_layout(
        &mut self,
        plate_marker: &str,
        layout: PrepIsoLayout,
        specs_name: ReservoirSpecsName,
    ) -> Result<()> {
        if self.preparation_layouts.contains_key(plate_marker) {
            return Err(ErrorCode::ImmutableAttribute(format!(
                "a preparation layout for plate {} has been stored before",
                plate_marker
            )));
        }
        self.preparation_layouts
            .insert(plate_marker.to_string(), layout);
        self.plate_specs.insert(plate_marker.to_string(), specs_name);
        Ok(())
    }

    pub fn add_job_preparation_layout(
        &mut self,
        plate_marker: &str,
        layout: PrepIsoLayout,
        specs_name: ReservoirSpecsName,
    ) -> Result<()> {
        if self.job_layouts.contains_key(plate_marker) {
            return Err(ErrorCode::ImmutableAttribute(format!(
                "a job preparation layout for plate {} has been stored before",
                plate_marker
            )));
        }
        self.job_layouts.insert(plate_marker.to_string(), layout);
        self.plate_specs.insert(plate_marker.to_string(), specs_name);
        Ok(())
    }

    pub fn add_dilution(&mut self, plate_marker: &str, dilution: PlannedSampleDilution) {
        self.planned_dilutions
            .entry(plate_marker.to_string())
            .or_default()
            .push(dilution);
    }

    pub fn remove_dilutions_at(&mut self, plate_marker: &str, position: RackPosition) {
        if let Some(dilutions) = self.planned_dilutions.get_mut(plate_marker) {
            dilutions.retain(|d| d.target_position != position);
            if dilutions.is_empty() {
                self.planned_dilutions.remove(plate_marker);
            }
        }
    }

    pub fn add_intraplate_transfer(
        &mut self,
        plate_marker: &str,
        depth: usize,
        transfer: PlannedTransfer,
    ) {
        self.intraplate_transfers
            .entry(plate_marker.to_string())
            .or_default()
            .entry(depth)
            .or_default()
            .push(transfer);
    }

    pub fn add_interplate_transfer(
        &mut self,
        source_plate_marker: &str,
        target_plate_marker: &str,
        transfer: PlannedTransfer,
    ) {
        self.interplate_transfers
            .entry(source_plate_marker.to_string())
            .or_default()
            .entry(target_plate_marker.to_string())
            .or_default()
            .push(transfer);
    }

    /// Removes the stock route annotations from a layout position (its
    /// sample now arrives from a job preparation plate).
    pub fn clear_stock_data(&mut self, plate_marker: &str, position: RackPosition) -> Result<()> {
        let missing = || {
            ErrorCode::BadArguments(format!(
                "no layout position at {} on plate {}",
                position, plate_marker
            ))
        };
        if plate_marker == ROLE_FINAL {
            let entry = self
                .final_iso_layout
                .positions
                .get_mut(&position)
                .ok_or_else(missing)?;
            entry.stock_tube_barcode = None;
            entry.stock_rack_marker = None;
        } else {
            let entry = self
                .preparation_layouts
                .get_mut(plate_marker)
                .and_then(|layout| layout.positions.get_mut(&position))
                .ok_or_else(missing)?;
            entry.stock_tube_barcode = None;
            entry.stock_rack_marker = None;
        }
        Ok(())
    }

    pub fn set_fixed_candidates(
        &mut self,
        candidates: BTreeMap<PoolId, TubeCandidate>,
    ) -> Result<()> {
        if self.fixed_candidates.is_some() {
            return Err(ErrorCode::ImmutableAttribute(
                "the fixed candidates have been set before".to_string(),
            ));
        }
        self.fixed_candidates = Some(candidates);
        Ok(())
    }

    pub fn set_floating_candidates(&mut self, candidates: Vec<TubeCandidate>) -> Result<()> {
        if self.floating_candidates.is_some() {
            return Err(ErrorCode::ImmutableAttribute(
                "the floating candidates have been set before".to_string(),
            ));
        }
        self.floating_candidates = Some(candidates);
        Ok(())
    }

    pub fn set_number_of_isos(&mut self, number_isos: usize) -> Result<()> {
        if self.number_isos_to_generate.is_some() {
            return Err(ErrorCode::ImmutableAttribute(
                "the number of ISOs has been set before".to_string(),
            ));
        }
        self.number_isos_to_generate = Some(number_isos);
        Ok(())
    }

    pub fn number_isos_to_generate(&self) -> Option<usize> {
        self.number_isos_to_generate
    }

    pub fn fixed_candidates(&self) -> Option<&BTreeMap<PoolId, TubeCandidate>> {
        self.fixed_candidates.as_ref()
    }

    /// Materializes the planned number of ISOs. Floating slots are resolved
    /// by consuming the candidate queue; the slot mapping of the final
    /// layout keeps the preparation plates of the same ISO consistent.
    /// Call `materialize_job_plates` first so shared job stock racks are
    /// reflected in the final layouts.
    pub fn materialize_isos(&mut self) -> Result<Vec<LabIso>> {
        let to_generate = self.number_isos_to_generate.ok_or_else(|| {
            ErrorCode::BadArguments("the number of ISOs has not been set".to_string())
        })?;
        let mut isos = Vec::with_capacity(to_generate);
        for index in 0..to_generate {
            let iso_number = (self.number_existing_isos + index + 1) as u32;
            let iso_label = labels::create_iso_label(self.ticket_number, iso_number);

            let mut final_layout = FinalIsoLayout::new(self.final_shape);
            for position in self.final_iso_layout.positions.values() {
                let copy = match position.position_type {
                    PositionType::Fixed => {
                        let candidate = self.lookup_fixed_candidate(&position.pool)?;
                        position.completed_copy(Some(candidate))
                    }
                    PositionType::Mock | PositionType::Library => position.clone(),
                    PositionType::Floating => continue,
                };
                final_layout.add_position(copy)?;
            }

            let mut floating_map: BTreeMap<FloatingSlot, TubeCandidate> = BTreeMap::new();
            let mut pools: BTreeSet<PoolId> = BTreeSet::new();
            for position in self.final_iso_layout.sorted_floating_positions() {
                let slot = match position.pool.floating_slot() {
                    Some(slot) => slot,
                    None => continue,
                };
                let candidate = match floating_map.get(&slot) {
                    Some(candidate) => Some(candidate.clone()),
                    None => match &mut self.floating_candidates {
                        Some(queue) if !queue.is_empty() => {
                            let candidate = queue.remove(0);
                            pools.insert(candidate.pool);
                            floating_map.insert(slot, candidate.clone());
                            Some(candidate)
                        }
                        // The candidate queue ran dry; the remaining
                        // floating positions of this ISO stay empty.
                        _ => None,
                    },
                };
                if let Some(candidate) = candidate {
                    final_layout.add_position(position.completed_copy(Some(&candidate)))?;
                }
            }
            let pool_set = if pools.is_empty() { None } else { Some(pools) };

            let single_prep = self.preparation_layouts.len() == 1;
            let mut prep_layouts: BTreeMap<String, (String, PrepIsoLayout)> = BTreeMap::new();
            for (marker, layout) in &self.preparation_layouts {
                let use_marker = if single_prep {
                    labels::strip_rack_number(marker)?
                } else {
                    marker.clone()
                };
                let mut copy = PrepIsoLayout::new(layout.shape);
                for position in layout.positions.values() {
                    match position.position_type {
                        PositionType::Fixed => {
                            let candidate = self.lookup_fixed_candidate(&position.pool)?;
                            copy.add_position(position.completed_copy(Some(candidate)))?;
                        }
                        PositionType::Floating => {
                            let slot = match position.pool.floating_slot() {
                                Some(slot) => slot,
                                None => continue,
                            };
                            if let Some(candidate) = floating_map.get(&slot) {
                                copy.add_position(position.completed_copy(Some(candidate)))?;
                            }
                        }
                        _ => copy.add_position(position.clone())?,
                    }
                }
                prep_layouts.insert(use_marker, (marker.clone(), copy));
            }

            let number_stock_racks = {
                let mut layouts: Vec<&mut dyn StockRackLayout> = vec![&mut final_layout];
                for (_, (_, layout)) in prep_layouts.iter_mut() {
                    layouts.push(layout);
                }
                assign_stock_racks(layouts, false)
            };

            let mut aliquot_plates = Vec::with_capacity(self.number_aliquots);
            for aliquot in 1..=self.number_aliquots {
                let rack_number = if self.number_aliquots == 1 {
                    None
                } else {
                    Some(aliquot)
                };
                let marker = labels::create_rack_marker(ROLE_FINAL, rack_number);
                aliquot_plates.push(IsoPlate {
                    label: labels::create_rack_label(&iso_label, &marker),
                    rack_marker: marker,
                    reservoir_specs: self.plate_specs[ROLE_FINAL],
                    layout: None,
                });
            }
            let mut preparation_plates = Vec::with_capacity(prep_layouts.len());
            for (use_marker, (original_marker, layout)) in prep_layouts {
                preparation_plates.push(IsoPlate {
                    label: labels::create_rack_label(&iso_label, &use_marker),
                    rack_marker: use_marker,
                    reservoir_specs: self.plate_specs[&original_marker],
                    layout: Some(layout),
                });
            }

            isos.push(LabIso {
                label: iso_label,
                number_stock_racks,
                pool_set,
                final_layout,
                aliquot_plates,
                preparation_plates,
            });
        }
        Ok(isos)
    }

    /// Materializes the job preparation plates and assigns the job's stock
    /// racks. Job starting wells on the final layout template receive their
    /// rack markers here (they are shared by all ISOs of the job).
    pub fn materialize_job_plates(&mut self, job_label: &str) -> Result<(Vec<IsoPlate>, usize)> {
        let single = self.job_layouts.len() == 1;
        let mut completed: BTreeMap<String, (String, PrepIsoLayout)> = BTreeMap::new();
        for (marker, layout) in &self.job_layouts {
            let use_marker = if single {
                labels::strip_rack_number(marker)?
            } else {
                marker.clone()
            };
            let mut copy = PrepIsoLayout::new(layout.shape);
            for position in layout.positions.values() {
                match position.position_type {
                    PositionType::Fixed => {
                        let candidate = self.lookup_fixed_candidate(&position.pool)?;
                        copy.add_position(position.completed_copy(Some(candidate)))?;
                    }
                    _ => copy.add_position(position.clone())?,
                }
            }
            completed.insert(use_marker, (marker.clone(), copy));
        }

        let number_stock_racks = {
            let mut layouts: Vec<&mut dyn StockRackLayout> = vec![&mut self.final_iso_layout];
            for (_, (_, layout)) in completed.iter_mut() {
                layouts.push(layout);
            }
            assign_stock_racks(layouts, true)
        };

        let mut plates = Vec::with_capacity(completed.len());
        for (use_marker, (original_marker, layout)) in completed {
            plates.push(IsoPlate {
                label: labels::create_rack_label(job_label, &use_marker),
                rack_marker: use_marker,
                reservoir_specs: self.plate_specs[&original_marker],
                layout: Some(layout),
            });
        }
        Ok((plates, number_stock_racks))
    }

    /// Assembles the worklist series: buffer dilutions per plate, then
    /// intra-plate transfers in serial dilution order, then inter-plate
    /// transfers by source and target plate.
    pub fn worklist_series(&self) -> WorklistSeries {
        let mut series = WorklistSeries::new();
        for (marker, dilutions) in &self.planned_dilutions {
            series.add_dilution_worklist(self.ticket_number, marker, dilutions.clone());
        }
        for (marker, by_depth) in &self.intraplate_transfers {
            for transfers in by_depth.values() {
                series.add_transfer_worklist(self.ticket_number, marker, marker, transfers.clone());
            }
        }
        for (source, targets) in &self.interplate_transfers {
            for (target, transfers) in targets {
                series.add_transfer_worklist(self.ticket_number, source, target, transfers.clone());
            }
        }
        series
    }

    fn lookup_fixed_candidate(&self, pool: &Pool) -> Result<&TubeCandidate> {
        let pool_id = pool.fixed_id().ok_or_else(|| {
            ErrorCode::BadArguments("a fixed position carries a fixed pool".to_string())
        })?;
        self.fixed_candidates
            .as_ref()
            .and_then(|candidates| candidates.get(&pool_id))
            .ok_or_else(|| {
                ErrorCode::NoTubeCandidates(format!(
                    "no stock tube candidate for pool {}",
                    pool_id
                ))
            })
    }
}

/// A starting well as seen by the stock rack assignment.
pub(crate) struct StockEntry {
    position: RackPosition,
    pool: Pool,
    position_type: PositionType,
    is_starting: bool,
    from_job: bool,
    sector_index: Option<usize>,
}

pub(crate) trait StockRackLayout {
    fn is_final_plate(&self) -> bool;
    fn entries(&self) -> Vec<StockEntry>;
    fn set_stock_rack_marker(&mut self, position: RackPosition, marker: &str);
}

impl StockRackLayout for FinalIsoLayout {
    fn is_final_plate(&self) -> bool {
        true
    }

    fn entries(&self) -> Vec<StockEntry> {
        self.positions
            .values()
            .map(|p| StockEntry {
                position: p.rack_position,
                pool: p.pool,
                position_type: p.position_type,
                is_starting: p.is_starting_well(),
                from_job: p.from_job,
                sector_index: p.sector_index,
            })
            .collect()
    }

    fn set_stock_rack_marker(&mut self, position: RackPosition, marker: &str) {
        if let Some(p) = self.positions.get_mut(&position) {
            p.stock_rack_marker = Some(marker.to_string());
        }
    }
}

impl StockRackLayout for PrepIsoLayout {
    fn is_final_plate(&self) -> bool {
        false
    }

    fn entries(&self) -> Vec<StockEntry> {
        self.positions
            .values()
            .map(|p| StockEntry {
                position: p.rack_position,
                pool: p.pool,
                position_type: p.position_type,
                is_starting: p.is_starting_well(),
                from_job: false,
                sector_index: p.sector_index,
            })
            .collect()
    }

    fn set_stock_rack_marker(&mut self, position: RackPosition, marker: &str) {
        if let Some(p) = self.positions.get_mut(&position) {
            p.stock_rack_marker = Some(marker.to_string());
        }
    }
}

/// Attaches stock rack markers to starting wells. Positions moved by
/// sector transfers get one rack per (layout, sector, pool set) since the
/// whole rack is pipetted at once; sectors with an identical pool set share
/// their rack. All other starting wells are packed into 96 position racks.
pub(crate) fn assign_stock_racks(mut layouts: Vec<&mut dyn StockRackLayout>, for_job: bool) -> usize {
    let mut rack_count = 0usize;

    if !for_job {
        for layout in layouts.iter_mut() {
            let is_final = layout.is_final_plate();
            let mut sector_map: BTreeMap<usize, Vec<StockEntry>> = BTreeMap::new();
            for entry in layout.entries() {
                if let Some(sector) = entry.sector_index {
                    sector_map.entry(sector).or_default().push(entry);
                }
            }
            let mut sector_hash: BTreeMap<Vec<Pool>, String> = BTreeMap::new();
            for entries in sector_map.values() {
                let has_floatings = entries
                    .iter()
                    .any(|e| e.position_type == PositionType::Floating);
                let accepted: Vec<&StockEntry> = entries
                    .iter()
                    .filter(|e| {
                        e.is_starting
                            && !(has_floatings && e.position_type == PositionType::Fixed)
                            && (!is_final || !e.from_job)
                    })
                    .collect();
                if accepted.is_empty() {
                    continue;
                }
                let mut key: Vec<Pool> = accepted.iter().map(|e| e.pool).collect();
                key.sort();
                key.dedup();
                let marker = sector_hash
                    .entry(key)
                    .or_insert_with(|| {
                        rack_count += 1;
                        labels::create_rack_marker(ROLE_STOCK, Some(rack_count))
                    })
                    .clone();
                for entry in accepted {
                    layout.set_stock_rack_marker(entry.position, &marker);
                }
            }
        }
    }

    let mut pool_map: BTreeMap<Pool, Vec<(usize, RackPosition)>> = BTreeMap::new();
    for (layout_index, layout) in layouts.iter().enumerate() {
        let is_final = layout.is_final_plate();
        for entry in layout.entries() {
            let accepted = if for_job {
                entry.is_starting
                    && entry.position_type == PositionType::Fixed
                    && (!is_final || entry.from_job)
            } else {
                entry.is_starting
                    && entry.sector_index.is_none()
                    && (!is_final || !entry.from_job)
            };
            if accepted {
                pool_map
                    .entry(entry.pool)
                    .or_default()
                    .push((layout_index, entry.position));
            }
        }
    }

    let mut rack_capacities: BTreeMap<String, usize> = BTreeMap::new();
    for (_, positions) in pool_map {
        let available = rack_capacities
            .iter()
            .find(|(_, &capacity)| capacity > 0)
            .map(|(marker, _)| marker.clone());
        let marker = match available {
            Some(marker) => marker,
            None => {
                rack_count += 1;
                let marker = labels::create_rack_marker(ROLE_STOCK, Some(rack_count));
                rack_capacities.insert(marker.clone(), 96);
                marker
            }
        };
        for (layout_index, position) in positions {
            layouts[layout_index].set_stock_rack_marker(position, &marker);
        }
        *rack_capacities.get_mut(&marker).expect("rack was registered") -= 1;
    }

    rack_count
}
