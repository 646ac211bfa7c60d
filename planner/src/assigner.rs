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

//! The location assigner builds the preparation route DAG for batches of
//! requested containers under one fixed reservoir spec, and afterwards
//! distributes the created preparation containers onto plates.
//!
//! One assigner exists per candidate reservoir spec per planning group; the
//! group planner simulates all candidates and picks the cheapest one.

use std::collections::BTreeMap;
use std::collections::VecDeque;

use common_exception::ErrorCode;
use common_exception::Result;
use common_layouts::get_dynamic_dead_volume;
use common_layouts::get_pipetting_specs;
use common_layouts::get_stock_takeout_volume;
use common_layouts::is_larger_than;
use common_layouts::is_smaller_than;
use common_layouts::labels;
use common_layouts::labels::ROLE_PREPARATION;
use common_layouts::labels::ROLE_PREPARATION_JOB;
use common_layouts::round_up;
use common_layouts::PipettingSpecs;
use common_layouts::PipettingSpecsName;
use common_layouts::ReservoirSpecs;

use crate::canvas::Canvas;
use crate::container::ContainerArena;
use crate::container::ContainerId;
use crate::container::PlateLocation;

/// Which pipetting regime and plate role the assigner works under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignerKind {
    /// Rack-at-once pipetting of whole sectors.
    Sector { number_sectors: usize },
    /// Independent single-well pipetting.
    RackPosition,
    /// Single-well pipetting onto job preparation plates.
    Job,
}

impl AssignerKind {
    fn std_specs(&self) -> &'static PipettingSpecs {
        match self {
            AssignerKind::Sector { .. } => get_pipetting_specs(PipettingSpecsName::Sector),
            _ => get_pipetting_specs(PipettingSpecsName::PerPosition),
        }
    }

    fn stock_specs(&self) -> &'static PipettingSpecs {
        match self {
            AssignerKind::Sector { .. } => get_pipetting_specs(PipettingSpecsName::Sector),
            _ => get_pipetting_specs(PipettingSpecsName::PerPositionStock),
        }
    }

    fn prep_plate_role(&self) -> &'static str {
        match self {
            AssignerKind::Job => ROLE_PREPARATION_JOB,
            _ => ROLE_PREPARATION,
        }
    }
}

pub struct LocationAssigner {
    kind: AssignerKind,
    prep_specs: &'static ReservoirSpecs,
    final_plate_dead_volume: f64,
    std_specs: &'static PipettingSpecs,
    stock_specs: &'static PipettingSpecs,
    /// Initial dead volume for preparation containers.
    prep_dead_volume: f64,
    /// All requested containers in registration order, copies included.
    requested: Vec<ContainerId>,
    /// Requested and preparation containers per batch identifier.
    identifier_map: BTreeMap<String, Vec<ContainerId>>,
    prep_containers: Vec<ContainerId>,
    preferred_locations: BTreeMap<ContainerId, Option<PlateLocation>>,
    sorted_preps: Vec<ContainerId>,
    max_prep_volume: f64,
    finalized: bool,
    /// Containers per preparation plate marker, filled by `distribute`.
    plate_assignments: BTreeMap<String, Vec<ContainerId>>,
}

impl LocationAssigner {
    pub fn new(
        kind: AssignerKind,
        prep_specs: &'static ReservoirSpecs,
        final_plate_dead_volume: f64,
    ) -> Self {
        LocationAssigner {
            kind,
            prep_specs,
            final_plate_dead_volume,
            std_specs: kind.std_specs(),
            stock_specs: kind.stock_specs(),
            prep_dead_volume: prep_specs.min_dead_volume,
            requested: Vec::new(),
            identifier_map: BTreeMap::new(),
            prep_containers: Vec::new(),
            preferred_locations: BTreeMap::new(),
            sorted_preps: Vec::new(),
            max_prep_volume: 0.0,
            finalized: false,
            plate_assignments: BTreeMap::new(),
        }
    }

    pub fn prep_specs(&self) -> &'static ReservoirSpecs {
        self.prep_specs
    }

    pub fn requested_containers(&self) -> &[ContainerId] {
        &self.requested
    }

    pub fn preparation_containers(&self) -> &[ContainerId] {
        &self.prep_containers
    }

    pub fn plate_assignments(&self) -> &BTreeMap<String, Vec<ContainerId>> {
        &self.plate_assignments
    }

    /// Registers one batch of requested containers and resolves their
    /// preparation routes. With `number_copies > 1` each stock rooted
    /// container is multiplied (descendants included) before resolution.
    pub fn add_batch(
        &mut self,
        arena: &mut ContainerArena,
        requested: Vec<ContainerId>,
        identifier: &str,
        number_copies: usize,
    ) -> Result<()> {
        let mut requested = requested;
        if number_copies > 1 {
            let mut multiplied = Vec::new();
            for &container in &requested {
                if arena.parent(container).is_some() {
                    // Covered as a descendant of its stock rooted root.
                    continue;
                }
                for clone in arena.get_clones(container, number_copies)? {
                    multiplied.push(clone);
                    multiplied.extend(arena.descendants(clone));
                }
            }
            requested = multiplied;
        }

        let mut from_stock: Vec<ContainerId> = Vec::new();
        let mut not_from_stock: Vec<ContainerId> = Vec::new();
        for &container in &requested {
            if arena.from_stock(container) {
                from_stock.push(container);
            } else {
                not_from_stock.push(container);
            }
        }
        // Weak concentrations first: they may reuse stronger requested
        // containers as sources.
        not_from_stock.sort_by(|&a, &b| arena.compare_by_target_concentration(a, b));
        from_stock.sort_by(|&a, &b| arena.compare_by_target_concentration(b, a));

        let mut batch_preps: Vec<ContainerId> = Vec::new();
        for &container in &not_from_stock {
            self.resolve_source(arena, container, &requested, &mut batch_preps)?;
        }
        for &container in &from_stock {
            self.resolve_source(arena, container, &requested, &mut batch_preps)?;
        }

        let mut batch_containers = requested.clone();
        batch_containers.extend(batch_preps.iter().copied());
        self.identifier_map
            .insert(identifier.to_string(), batch_containers);
        self.requested.extend(requested);
        self.prep_containers.extend(batch_preps);
        Ok(())
    }

    /// Walks up the concentration ladder for `container`: reuse a stronger
    /// container from the batch, stay stock rooted when a direct transfer is
    /// feasible, or insert preparation containers until it is.
    fn resolve_source(
        &mut self,
        arena: &mut ContainerArena,
        container: ContainerId,
        batch_requested: &[ContainerId],
        batch_preps: &mut Vec<ContainerId>,
    ) -> Result<()> {
        if let Some(source) = self.find_suitable_source(arena, container, batch_requested)? {
            self.attach_with_adjustment(arena, container, source)?;
            return Ok(());
        }
        let mut current = container;
        loop {
            if let Some(source) = self.find_suitable_source(arena, current, batch_preps)? {
                self.attach_with_adjustment(arena, current, source)?;
                return Ok(());
            }
            if !self.requires_intermediate(arena, current, None)? {
                return Ok(());
            }
            let preferred = arena.location(current);
            let prep = self.create_prep(arena, current)?;
            arena.attach_parent(current, prep)?;
            self.preferred_locations.insert(prep, preferred);
            batch_preps.push(prep);
            current = prep;
        }
    }

    /// A candidate source must be at least as concentrated as the target
    /// and the direct transfer must be feasible. Candidates are examined
    /// strongest first.
    fn find_suitable_source(
        &self,
        arena: &ContainerArena,
        container: ContainerId,
        candidates: &[ContainerId],
    ) -> Result<Option<ContainerId>> {
        let descendants = arena.descendants(container);
        let mut sorted: Vec<ContainerId> = candidates
            .iter()
            .copied()
            .filter(|&c| c != container && !descendants.contains(&c))
            .collect();
        sorted.sort_by(|&a, &b| arena.compare_by_target_concentration(b, a));
        for source in sorted {
            if is_smaller_than(
                arena.target_concentration(source),
                arena.target_concentration(container),
            ) {
                continue;
            }
            if !self.requires_intermediate(arena, container, Some(source))? {
                return Ok(Some(source));
            }
        }
        Ok(None)
    }

    /// Attaches the source and, for mutable targets, raises the target
    /// volume when the resulting transfer would fall below the regime
    /// minimum. The raise cascades up the new chain.
    fn attach_with_adjustment(
        &self,
        arena: &mut ContainerArena,
        container: ContainerId,
        source: ContainerId,
    ) -> Result<()> {
        arena.attach_parent(container, source)?;
        if arena.allows_modification(container) {
            let dilution_factor = arena.target_concentration(source)
                / arena.target_concentration(container);
            let transfer = arena.full_volume(container) / dilution_factor;
            let min_transfer = self.std_specs.min_transfer_volume;
            if is_smaller_than(transfer, min_transfer) {
                let correction = min_transfer / transfer;
                self.scale_up_target(arena, container, correction, transfer, dilution_factor)?;
            }
        }
        Ok(())
    }

    /// True when the dilution from the source (or the stock) down to the
    /// container cannot be done in one step. The dilution factor is always
    /// checked; for frozen targets transfer and buffer volumes are checked
    /// as well. Stock take-out volumes are evaluated in their widened form.
    fn requires_intermediate(
        &self,
        arena: &ContainerArena,
        container: ContainerId,
        source: Option<ContainerId>,
    ) -> Result<bool> {
        let target_conc = arena.target_concentration(container);
        let parent_conc = match source {
            Some(source) => arena.target_concentration(source),
            None => arena.parent_concentration(container),
        };
        if is_smaller_than(parent_conc, target_conc) {
            return Err(ErrorCode::ParentConcentrationTooLow(format!(
                "the parent concentration ({} nM) is smaller than the target \
                 concentration ({} nM)",
                parent_conc, target_conc
            )));
        }
        let specs = match source {
            Some(_) => self.std_specs,
            None => self.stock_specs,
        };
        let dilution_factor = parent_conc / target_conc;
        if is_larger_than(dilution_factor, specs.max_dilution_factor) {
            return Ok(true);
        }
        if !arena.allows_modification(container) {
            if let Some(source) = source {
                if !arena.allows_modification(source)
                    && is_smaller_than(arena.volume(source), self.final_plate_dead_volume)
                {
                    return Ok(true);
                }
            }
            let full_volume = arena.full_volume(container);
            let transfer = match source {
                Some(_) => full_volume / dilution_factor,
                None => get_stock_takeout_volume(
                    parent_conc,
                    full_volume,
                    target_conc,
                    specs.min_transfer_volume,
                ),
            };
            if is_smaller_than(transfer, specs.min_transfer_volume) {
                return Ok(true);
            }
            if is_smaller_than(full_volume - transfer, specs.min_transfer_volume) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Determines concentration and constraints for a new preparation
    /// container serving `target`. Mutable targets may grow instead; frozen
    /// targets push the constraint into the parent concentration, falling
    /// back to a same-concentration passthrough when nothing else fits.
    fn create_prep(
        &self,
        arena: &mut ContainerArena,
        target: ContainerId,
    ) -> Result<ContainerId> {
        let min_transfer = self.std_specs.min_transfer_volume;
        let max_dilution = self.std_specs.max_dilution_factor;

        let mut parent_conc = arena.parent_concentration(target);
        let target_conc = arena.target_concentration(target);
        if is_smaller_than(parent_conc, target_conc) {
            return Err(ErrorCode::ParentConcentrationTooLow(format!(
                "the parent concentration ({} nM) is smaller than the target \
                 concentration ({} nM)",
                parent_conc, target_conc
            )));
        }
        let mut target_volume = arena.full_volume(target);
        let mut dilution_factor = (parent_conc / target_conc).min(max_dilution);
        let mut transfer = target_volume / dilution_factor;

        if is_smaller_than(transfer, min_transfer) {
            if arena.allows_modification(target) {
                let correction = min_transfer / transfer;
                let (new_transfer, new_volume) =
                    self.scale_up_target(arena, target, correction, transfer, dilution_factor)?;
                transfer = new_transfer;
                target_volume = new_volume;
            } else {
                dilution_factor = target_volume / min_transfer;
                parent_conc = dilution_factor * target_conc;
                transfer = min_transfer;
            }
        }

        let buffer = target_volume - transfer;
        if is_smaller_than(buffer, min_transfer) {
            if !is_larger_than(buffer, 0.0) {
                // No room for buffer at all: the step degenerates to a
                // same-concentration passthrough.
                parent_conc = target_conc;
            } else if arena.allows_modification(target) {
                let correction = min_transfer / buffer;
                self.scale_up_target(arena, target, correction, transfer, dilution_factor)?;
            } else {
                let widened_parent = parent_conc * (min_transfer / buffer);
                if is_larger_than(widened_parent / target_conc, max_dilution) {
                    parent_conc = target_conc;
                } else {
                    parent_conc = widened_parent;
                }
            }
        }

        Ok(arena.new_prep_from(target, parent_conc, self.prep_dead_volume))
    }

    /// Raises the target's minimum full volume so that the transfer into it
    /// reaches the regime minimum, on the 0.1 ul grid.
    fn scale_up_target(
        &self,
        arena: &mut ContainerArena,
        target: ContainerId,
        correction: f64,
        transfer: f64,
        dilution_factor: f64,
    ) -> Result<(f64, f64)> {
        let new_transfer = correction * transfer;
        let new_volume = round_up(new_transfer, 1) * dilution_factor;
        if is_larger_than(new_volume, arena.full_volume(target)) {
            arena.increase_min_full_volume(target, new_volume)?;
        }
        Ok((new_transfer, new_volume))
    }

    pub fn has_preparation_containers(&self) -> bool {
        !self.prep_containers.is_empty()
    }

    /// Sorts the preparation containers by generation, applies dynamic dead
    /// volumes and records the largest preparation volume. Must run before
    /// the assigner is judged or distributed.
    pub fn finalize(&mut self, arena: &mut ContainerArena) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.sort_preps_by_generation(arena);
        self.adjust_container_dead_volumes(arena)?;
        self.max_prep_volume = self
            .sorted_preps
            .iter()
            .map(|&c| arena.full_volume(c))
            .fold(0.0, f64::max);
        self.finalized = true;
        Ok(())
    }

    /// Generation of a preparation container: the smallest ancestor depth
    /// at which it appears above a requested container. Children sort
    /// before parents so that dead volume adjustments see final target
    /// counts before the extra volume propagates upwards.
    fn sort_preps_by_generation(&mut self, arena: &ContainerArena) {
        let mut generations: BTreeMap<ContainerId, usize> = BTreeMap::new();
        let mut first_seen: Vec<ContainerId> = Vec::new();
        for &requested in &self.requested {
            for (depth, ancestor) in arena.ancestors(requested).into_iter().enumerate() {
                if !arena.allows_modification(ancestor) {
                    continue;
                }
                match generations.get_mut(&ancestor) {
                    Some(generation) => *generation = (*generation).min(depth),
                    None => {
                        generations.insert(ancestor, depth);
                        first_seen.push(ancestor);
                    }
                }
            }
        }
        let mut sorted = first_seen;
        sorted.sort_by_key(|c| generations[c]);
        self.sorted_preps = sorted;
    }

    fn adjust_container_dead_volumes(&self, arena: &mut ContainerArena) -> Result<()> {
        for &container in &self.sorted_preps {
            let specs = if arena.from_stock(container) {
                self.stock_specs
            } else {
                self.std_specs
            };
            if !specs.has_dynamic_dead_volume {
                continue;
            }
            let number_targets = arena.targets(container).len();
            let new_dead_volume = get_dynamic_dead_volume(number_targets, self.prep_specs);
            let current = arena.dead_volume(container);
            if is_larger_than(new_dead_volume, current) {
                arena.adjust_dead_volume_by(container, new_dead_volume - current)?;
            }
        }
        Ok(())
    }

    /// The largest preparation container volume, zero when the assigner
    /// needs no preparation at all.
    pub fn max_preparation_volume(&self) -> f64 {
        self.max_prep_volume
    }

    fn locations_per_plate(&self) -> usize {
        match self.kind {
            AssignerKind::Sector { number_sectors } => {
                if self.prep_specs.rack_shape.size() == 384 {
                    number_sectors
                } else {
                    1
                }
            }
            _ => self.prep_specs.rack_shape.size(),
        }
    }

    pub fn number_preparation_plates(&self) -> usize {
        let locations = self.locations_per_plate();
        (self.prep_containers.len() + locations - 1) / locations
    }

    fn new_canvas(&self) -> Canvas {
        match self.kind {
            AssignerKind::Sector { .. } => Canvas::new_sector(self.locations_per_plate()),
            _ => Canvas::new_position(self.prep_specs.rack_shape),
        }
    }

    /// Finds plate locations for all preparation containers. Stock rooted
    /// containers are placed first, then containers with a location
    /// preference; preferred locations are honored when free.
    pub fn distribute(&mut self, arena: &mut ContainerArena) -> Result<()> {
        if !self.has_preparation_containers() {
            return Ok(());
        }
        let role = self.kind.prep_plate_role();
        let mut canvases: BTreeMap<String, Canvas> = BTreeMap::new();
        let mut markers: VecDeque<String> = VecDeque::new();
        for plate_number in 1..=self.number_preparation_plates() {
            let marker = labels::create_rack_marker(role, Some(plate_number));
            canvases.insert(marker.clone(), self.new_canvas());
            markers.push_back(marker);
        }

        let mut scores: BTreeMap<i32, Vec<ContainerId>> = BTreeMap::new();
        for containers in self.identifier_map.values() {
            for &container in containers {
                if !self.preferred_locations.contains_key(&container) {
                    continue;
                }
                let mut score = 0;
                if arena.from_stock(container) {
                    score += 2;
                }
                if self.preferred_locations[&container].is_some() {
                    score += 1;
                }
                scores.entry(score).or_default().push(container);
            }
        }

        for (_, containers) in scores.iter().rev() {
            for &container in containers {
                let marker = loop {
                    let marker = markers.pop_front().ok_or_else(|| {
                        ErrorCode::NoFreeLocation(
                            "ran out of preparation plate locations".to_string(),
                        )
                    })?;
                    if canvases[&marker].has_empty_locations() {
                        break marker;
                    }
                };
                let canvas = canvases.get_mut(&marker).expect("canvas exists for marker");
                let explicit = self.preferred_locations[&container]
                    .filter(|&location| canvas.is_empty_location(location));
                let location = canvas.place(arena.pool(container), explicit)?;
                arena.set_location(container, location, &marker)?;
                self.plate_assignments
                    .entry(marker.clone())
                    .or_default()
                    .push(container);
                if canvas.has_empty_locations() {
                    markers.push_front(marker);
                }
            }
        }

        // Keep each plate's containers in location order for deterministic
        // layout emission.
        for containers in self.plate_assignments.values_mut() {
            containers.sort_by_key(|&c| arena.location(c));
        }
        Ok(())
    }
}
