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

//! Library screening ISOs. No aliquot or ISO preparation plates are
//! generated: pre-existing library plates serve as final plates, consumed
//! in layout number order. Only the shared controls need planning, via job
//! preparation routes.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use common_exception::ErrorCode;
use common_exception::Result;
use common_layouts::final_reservoir_specs_for_shape;
use common_layouts::labels;
use common_layouts::FinalIsoLayout;
use common_layouts::FinalIsoPosition;
use common_layouts::IsoRequestPosition;
use common_layouts::PositionType;
use common_tracing::tracing::debug;
use common_tracing::tracing::warn;
use serde::Serialize;

use crate::builder::assign_stock_racks;
use crate::builder::IsoPlate;
use crate::builder::LabIso;
use crate::builder::LabIsoBuilder;
use crate::builder::StockRackLayout;
use crate::container::ContainerArena;
use crate::planners::run_group_planner;
use crate::planners::PoolContainer;
use crate::planners::RackPositionPlanner;
use crate::top::add_mock_positions;
use crate::top::bundle_errors;
use crate::top::collect_pool_containers;
use crate::top::pick_fixed_candidates;
use crate::top::validate_concentrations;
use crate::top::LabIsoRequest;
use crate::tube_picking::TubePicker;

/// One pre-existing library plate.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LibraryPlate {
    pub layout_number: u32,
    pub barcode: String,
    pub has_been_used: bool,
}

/// The molecule design library backing the screen.
#[derive(Clone, Debug)]
pub struct LibraryInfo {
    pub number_layouts: u32,
    pub plates: Vec<LibraryPlate>,
    /// Layout numbers consumed by earlier, non-cancelled ISOs.
    pub used_layout_numbers: BTreeSet<u32>,
}

/// A lab ISO builder extended with the picked library plates and the
/// library positions of the request.
#[derive(Debug)]
pub struct LibraryIsoBuilder {
    pub base: LabIsoBuilder,
    library_positions: Vec<IsoRequestPosition>,
    library_plates: BTreeMap<u32, Vec<LibraryPlate>>,
}

impl LibraryIsoBuilder {
    /// Materializes the ISOs, attaching the library plates of the next
    /// unused layout number to each.
    pub fn materialize_isos(&mut self) -> Result<Vec<LabIso>> {
        let to_generate = self.base.number_isos_to_generate().ok_or_else(|| {
            ErrorCode::BadArguments("the number of ISOs has not been set".to_string())
        })?;
        let mut isos = Vec::with_capacity(to_generate);
        for index in 0..to_generate {
            let layout_number = *self.library_plates.keys().next().ok_or_else(|| {
                ErrorCode::NoLibraryPlates(
                    "no library plates are left although more ISOs were planned".to_string(),
                )
            })?;
            let plates = self
                .library_plates
                .remove(&layout_number)
                .expect("the layout number was just read");

            let iso_number = (self.base.number_existing_isos + index + 1) as u32;
            let iso_label = labels::create_iso_label(self.base.ticket_number, iso_number);

            let mut final_layout = FinalIsoLayout::new(self.base.final_shape);
            for position in self.base.final_iso_layout.positions.values() {
                let copy = match position.position_type {
                    PositionType::Fixed => {
                        let pool_id = position.pool.fixed_id().ok_or_else(|| {
                            ErrorCode::BadArguments(
                                "a fixed position carries a fixed pool".to_string(),
                            )
                        })?;
                        let candidate = self
                            .base
                            .fixed_candidates()
                            .and_then(|candidates| candidates.get(&pool_id));
                        position.completed_copy(candidate)
                    }
                    _ => position.clone(),
                };
                final_layout.add_position(copy)?;
            }
            for position in &self.library_positions {
                let concentration = position.iso_concentration.ok_or_else(|| {
                    ErrorCode::BadArguments(format!(
                        "library position {} has no concentration",
                        position.rack_position
                    ))
                })?;
                final_layout.add_position(FinalIsoPosition::create_library_position(
                    position.rack_position,
                    concentration,
                    position.iso_volume,
                ))?;
            }

            let number_stock_racks = {
                let layouts: Vec<&mut dyn StockRackLayout> = vec![&mut final_layout];
                assign_stock_racks(layouts, false)
            };

            let final_specs = final_reservoir_specs_for_shape(&self.base.final_shape).name;
            let aliquot_plates: Vec<IsoPlate> = plates
                .iter()
                .enumerate()
                .map(|(aliquot, plate)| {
                    let rack_number = if plates.len() == 1 {
                        None
                    } else {
                        Some(aliquot + 1)
                    };
                    IsoPlate {
                        label: plate.barcode.clone(),
                        rack_marker: labels::create_rack_marker(labels::ROLE_FINAL, rack_number),
                        reservoir_specs: final_specs,
                        layout: None,
                    }
                })
                .collect();

            isos.push(LabIso {
                label: iso_label,
                number_stock_racks,
                pool_set: None,
                final_layout,
                aliquot_plates,
                preparation_plates: Vec::new(),
            });
        }
        Ok(isos)
    }

    pub fn materialize_job_plates(&mut self, job_label: &str) -> Result<(Vec<IsoPlate>, usize)> {
        self.base.materialize_job_plates(job_label)
    }
}

#[derive(Debug)]
pub struct LibraryPlanningOutput {
    pub builder: LibraryIsoBuilder,
    pub warnings: Vec<String>,
}

/// Plans library screening ISOs: picks unused library layouts, plans job
/// routes for the controls and reserves stock tubes.
pub struct LibraryIsoPlanner<'a> {
    request: LabIsoRequest,
    library: LibraryInfo,
    number_isos: usize,
    excluded_racks: Vec<String>,
    requested_tubes: Vec<String>,
    tube_picker: &'a dyn TubePicker,
}

impl<'a> LibraryIsoPlanner<'a> {
    pub fn new(
        request: LabIsoRequest,
        library: LibraryInfo,
        number_isos: usize,
        excluded_racks: Vec<String>,
        requested_tubes: Vec<String>,
        tube_picker: &'a dyn TubePicker,
    ) -> Self {
        LibraryIsoPlanner {
            request,
            library,
            number_isos,
            excluded_racks,
            requested_tubes,
            tube_picker,
        }
    }

    pub fn run(self) -> Result<LibraryPlanningOutput> {
        debug!("analyse library ISO request");
        let mut errors: Vec<ErrorCode> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut arena = ContainerArena::new();
        let mut builder = LabIsoBuilder::new(
            self.request.ticket_number,
            self.request.shape,
            self.request.number_aliquots,
            self.request.number_existing_isos,
            self.excluded_racks.clone(),
            self.requested_tubes.clone(),
        );

        if self.request.positions.iter().any(|p| p.pool.is_floating()) {
            return Err(ErrorCode::BadArguments(
                "there are both library and floating positions in the ISO request \
                 layout"
                    .to_string(),
            ));
        }
        let mut positions = self.request.positions.clone();
        positions.sort_by_key(|p| p.rack_position);
        let library_positions: Vec<IsoRequestPosition> = positions
            .iter()
            .filter(|p| p.pool.is_library())
            .cloned()
            .collect();

        let analysis = collect_pool_containers(&positions, None)?;
        validate_concentrations(&analysis)?;

        let library_plates = match self.find_library_plates(&mut warnings) {
            Ok(plates) => plates,
            Err(error) => return Err(error),
        };
        let real_number_isos = library_plates.len();
        builder.set_number_of_isos(real_number_isos)?;

        let fixed_containers: Vec<PoolContainer> = analysis
            .pool_containers
            .iter()
            .filter(|c| c.position_type == PositionType::Fixed)
            .cloned()
            .collect();
        if !fixed_containers.is_empty() {
            let mut planner = RackPositionPlanner::new_job(
                fixed_containers,
                real_number_isos * self.request.number_aliquots,
                final_reservoir_specs_for_shape(&self.request.shape).min_dead_volume,
            );
            if let Err(error) = run_group_planner(&mut planner, &mut arena, &mut builder) {
                errors.push(error.add_message_back(
                    "; error when trying to plan rack position routes for the ISO \
                     job preparation",
                ));
            }
        }
        if errors.is_empty() {
            add_mock_positions(&mut builder, &analysis.mock_positions, &mut errors);
        }
        if errors.is_empty() {
            pick_fixed_candidates(
                &mut builder,
                self.tube_picker,
                &analysis.fixed_stock_concentrations,
                &self.excluded_racks,
                &self.requested_tubes,
                &mut errors,
            );
        }
        if !errors.is_empty() {
            return Err(bundle_errors(errors));
        }

        Ok(LibraryPlanningOutput {
            builder: LibraryIsoBuilder {
                base: builder,
                library_positions,
                library_plates,
            },
            warnings,
        })
    }

    /// Layout numbers not yet covered by earlier ISOs, in order, each with
    /// `number_aliquots` unused plates. Layouts with missing or short plate
    /// stocks are skipped with a warning.
    fn find_library_plates(
        &self,
        warnings: &mut Vec<String>,
    ) -> Result<BTreeMap<u32, Vec<LibraryPlate>>> {
        let queued: BTreeSet<u32> = (1..=self.library.number_layouts)
            .filter(|number| !self.library.used_layout_numbers.contains(number))
            .collect();
        if queued.is_empty() {
            return Err(ErrorCode::NoLibraryPlates(
                "there are no unused library layouts left for this ISO request".to_string(),
            ));
        }

        let mut available: BTreeMap<u32, Vec<LibraryPlate>> = BTreeMap::new();
        for plate in &self.library.plates {
            if plate.has_been_used || !queued.contains(&plate.layout_number) {
                continue;
            }
            available
                .entry(plate.layout_number)
                .or_default()
                .push(plate.clone());
        }

        let number_aliquots = self.request.number_aliquots;
        let mut no_plates_left: Vec<String> = Vec::new();
        let mut not_enough_plates: Vec<String> = Vec::new();
        let mut usable: Vec<u32> = Vec::new();
        for &layout_number in &queued {
            match available.get(&layout_number) {
                None => no_plates_left.push(layout_number.to_string()),
                Some(plates) if plates.len() < number_aliquots => {
                    not_enough_plates
                        .push(format!("{} ({} plates)", layout_number, plates.len()));
                }
                Some(_) => usable.push(layout_number),
            }
        }
        if !no_plates_left.is_empty() {
            let message = format!(
                "There are no unused library plates left for some layout numbers \
                 that are still in the queue: {}.",
                no_plates_left.join(", ")
            );
            warn!("{}", message);
            warnings.push(message);
        }
        if !not_enough_plates.is_empty() {
            let message = format!(
                "There are not enough unused library plates left for some layout \
                 numbers that are still in the queue: {}.",
                not_enough_plates.join(", ")
            );
            warn!("{}", message);
            warnings.push(message);
        }
        if usable.is_empty() {
            return Err(ErrorCode::NoLibraryPlates(
                "cannot generate ISOs because there is no sufficient number of \
                 library plates left for any layout still in the queue"
                    .to_string(),
            ));
        }

        let mut selected: BTreeMap<u32, Vec<LibraryPlate>> = BTreeMap::new();
        for layout_number in usable {
            if selected.len() == self.number_isos {
                break;
            }
            let mut plates = available.remove(&layout_number).expect("layout is usable");
            plates.truncate(number_aliquots);
            selected.insert(layout_number, plates);
        }
        if selected.len() < self.number_isos {
            let message = format!(
                "You have requested {} ISOs. The system will only generate {} \
                 ISOs though, because there are no more library layouts left for \
                 this ISO request.",
                self.number_isos,
                selected.len()
            );
            warn!("{}", message);
            warnings.push(message);
        }
        Ok(selected)
    }
}
