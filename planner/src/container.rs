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

//! The container DAG. A location container represents one sample slot (a
//! well or a whole rack sector) on a final or preparation plate. Containers
//! link into preparation routes: every non-stock container has exactly one
//! parent it is diluted from, and attaching children propagates the required
//! volumes up the chain.
//!
//! Containers live in an arena and reference each other by handle. The
//! arena is created per planning run; handles double as the run local
//! identity that keeps otherwise equal clones distinguishable.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use common_exception::ErrorCode;
use common_exception::Result;
use common_layouts::get_transfer_volume;
use common_layouts::is_larger_than;
use common_layouts::is_smaller_than;
use common_layouts::labels::ROLE_FINAL;
use common_layouts::round_to;
use common_layouts::Pool;
use common_layouts::RackPosition;

pub type ContainerId = usize;

/// Where a container sits on its plate: a whole quadrant for rack-at-once
/// pipetting, or a single well.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PlateLocation {
    Sector(usize),
    Well(RackPosition),
}

#[derive(Clone, Debug)]
pub struct LocationContainer {
    /// The volume the container holds after all outgoing transfers, in ul.
    volume: f64,
    /// The concentration after all transfers, in nM.
    target_concentration: f64,
    /// The concentration of the source (parent container or stock), in nM.
    parent_concentration: f64,
    /// Final plate containers never change volume, concentration or
    /// location.
    is_final: bool,
    allows_modification: bool,
    /// Lower clamp for transfer volumes into this container.
    min_transfer_volume: f64,
    parent: Option<ContainerId>,
    /// Transfer volume for each child container.
    targets: BTreeMap<ContainerId, f64>,
    location: Option<PlateLocation>,
    plate_marker: Option<String>,
    dead_volume: f64,
    min_full_volume: f64,
    /// Pool payload for single-well containers; sector containers carry no
    /// pool of their own.
    pool: Option<Pool>,
}

#[derive(Clone, Debug, Default)]
pub struct ContainerArena {
    containers: Vec<LocationContainer>,
}

impl ContainerArena {
    pub fn new() -> Self {
        ContainerArena::default()
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    fn alloc(&mut self, container: LocationContainer) -> ContainerId {
        self.containers.push(container);
        self.containers.len() - 1
    }

    fn get(&self, id: ContainerId) -> &LocationContainer {
        &self.containers[id]
    }

    fn get_mut(&mut self, id: ContainerId) -> &mut LocationContainer {
        &mut self.containers[id]
    }

    /// A frozen container on a final plate, at a known sector.
    pub fn new_final_sector(
        &mut self,
        sector_index: usize,
        volume: f64,
        target_concentration: f64,
        parent_concentration: f64,
        min_transfer_volume: f64,
    ) -> ContainerId {
        self.alloc(LocationContainer {
            volume,
            target_concentration,
            parent_concentration,
            is_final: true,
            allows_modification: false,
            min_transfer_volume,
            parent: None,
            targets: BTreeMap::new(),
            location: Some(PlateLocation::Sector(sector_index)),
            plate_marker: Some(ROLE_FINAL.to_string()),
            dead_volume: 0.0,
            min_full_volume: 0.0,
            pool: None,
        })
    }

    /// A frozen container on a final plate, at a known well.
    pub fn new_final_well(
        &mut self,
        rack_position: RackPosition,
        pool: Pool,
        volume: f64,
        target_concentration: f64,
        parent_concentration: f64,
        min_transfer_volume: f64,
    ) -> ContainerId {
        self.alloc(LocationContainer {
            volume,
            target_concentration,
            parent_concentration,
            is_final: true,
            allows_modification: false,
            min_transfer_volume,
            parent: None,
            targets: BTreeMap::new(),
            location: Some(PlateLocation::Well(rack_position)),
            plate_marker: Some(ROLE_FINAL.to_string()),
            dead_volume: 0.0,
            min_full_volume: 0.0,
            pool: Some(pool),
        })
    }

    /// A frozen container for an already planned starting well on the
    /// plate named by `plate_marker`.
    #[allow(clippy::too_many_arguments)]
    pub fn new_frozen_well(
        &mut self,
        rack_position: RackPosition,
        pool: Pool,
        volume: f64,
        target_concentration: f64,
        parent_concentration: f64,
        min_transfer_volume: f64,
        plate_marker: &str,
    ) -> ContainerId {
        self.alloc(LocationContainer {
            volume,
            target_concentration,
            parent_concentration,
            is_final: plate_marker == ROLE_FINAL,
            allows_modification: false,
            min_transfer_volume,
            parent: None,
            targets: BTreeMap::new(),
            location: Some(PlateLocation::Well(rack_position)),
            plate_marker: Some(plate_marker.to_string()),
            dead_volume: 0.0,
            min_full_volume: 0.0,
            pool: Some(pool),
        })
    }

    /// A mutable preparation container derived from `source`. The volume
    /// starts at zero and grows as children are attached; the location is
    /// assigned later.
    pub fn new_prep_from(
        &mut self,
        source: ContainerId,
        target_concentration: f64,
        dead_volume: f64,
    ) -> ContainerId {
        let src = self.get(source);
        let parent_concentration = src.parent_concentration;
        let min_transfer_volume = src.min_transfer_volume;
        let pool = src.pool;
        self.alloc(LocationContainer {
            volume: 0.0,
            target_concentration,
            parent_concentration,
            is_final: false,
            allows_modification: true,
            min_transfer_volume,
            parent: None,
            targets: BTreeMap::new(),
            location: None,
            plate_marker: None,
            dead_volume,
            min_full_volume: 0.0,
            pool,
        })
    }

    pub fn volume(&self, id: ContainerId) -> f64 {
        self.get(id).volume
    }

    pub fn target_concentration(&self, id: ContainerId) -> f64 {
        self.get(id).target_concentration
    }

    pub fn parent_concentration(&self, id: ContainerId) -> f64 {
        self.get(id).parent_concentration
    }

    pub fn parent(&self, id: ContainerId) -> Option<ContainerId> {
        self.get(id).parent
    }

    pub fn targets(&self, id: ContainerId) -> &BTreeMap<ContainerId, f64> {
        &self.get(id).targets
    }

    pub fn is_final(&self, id: ContainerId) -> bool {
        self.get(id).is_final
    }

    pub fn allows_modification(&self, id: ContainerId) -> bool {
        self.get(id).allows_modification
    }

    pub fn from_stock(&self, id: ContainerId) -> bool {
        self.get(id).parent.is_none()
    }

    pub fn location(&self, id: ContainerId) -> Option<PlateLocation> {
        self.get(id).location
    }

    pub fn plate_marker(&self, id: ContainerId) -> Option<&str> {
        self.get(id).plate_marker.as_deref()
    }

    pub fn pool(&self, id: ContainerId) -> Option<Pool> {
        self.get(id).pool
    }

    pub fn dead_volume(&self, id: ContainerId) -> f64 {
        self.get(id).dead_volume
    }

    /// The maximum volume the container holds, including dead volume and
    /// outgoing transfers.
    pub fn full_volume(&self, id: ContainerId) -> f64 {
        let c = self.get(id);
        let full = c.volume + c.dead_volume + c.targets.values().sum::<f64>();
        full.max(c.min_full_volume)
    }

    /// The stock concentration of the chain (the parent concentration of
    /// the earliest ancestor).
    pub fn stock_concentration(&self, id: ContainerId) -> f64 {
        match self.get(id).parent {
            None => self.get(id).parent_concentration,
            Some(parent) => self.stock_concentration(parent),
        }
    }

    /// The buffer volume needed on top of the incoming transfer to reach
    /// the full volume. For stock rooted containers the incoming transfer
    /// is derived from the concentrations (unwidened).
    pub fn buffer_volume(&self, id: ContainerId) -> f64 {
        let c = self.get(id);
        let transfer_in = match c.parent {
            Some(parent) => self.get(parent).targets[&id],
            None => get_transfer_volume(
                c.parent_concentration,
                c.target_concentration,
                self.full_volume(id),
                None,
            ),
        };
        round_to(self.full_volume(id) - transfer_in, 2)
    }

    /// Links `child` to `parent` and recomputes the transfer volumes up the
    /// chain. Fails when the parent is weaker than the child.
    pub fn attach_parent(&mut self, child: ContainerId, parent: ContainerId) -> Result<()> {
        let parent_conc = self.get(parent).target_concentration;
        let child_conc = self.get(child).target_concentration;
        if is_smaller_than(parent_conc, child_conc) {
            return Err(ErrorCode::ParentConcentrationTooLow(format!(
                "the parent concentration ({} nM) is smaller than the target \
                 concentration ({} nM)",
                parent_conc, child_conc
            )));
        }
        self.adjust_transfer_data(child, parent);
        let c = self.get_mut(child);
        c.parent = Some(parent);
        c.parent_concentration = parent_conc;
        Ok(())
    }

    /// Recomputes the transfer volume on the `parent -> child` edge from the
    /// child's current full volume, clamped below by the child's minimum
    /// transfer volume, and propagates the change to all older edges of the
    /// chain (a grown child may raise the parent's full volume, which may
    /// raise the grandparent's transfer, and so on).
    pub fn adjust_transfer_data(&mut self, child: ContainerId, parent: ContainerId) {
        let mut child = child;
        let mut parent = parent;
        loop {
            let transfer = get_transfer_volume(
                self.get(parent).target_concentration,
                self.get(child).target_concentration,
                self.full_volume(child),
                None,
            );
            let transfer = transfer.max(self.get(child).min_transfer_volume);
            self.get_mut(parent).targets.insert(child, transfer);
            match self.get(parent).parent {
                Some(grandparent) => {
                    child = parent;
                    parent = grandparent;
                }
                None => break,
            }
        }
    }

    /// Raises the minimum full volume. Only allowed on mutable containers
    /// and only upwards.
    pub fn increase_min_full_volume(&mut self, id: ContainerId, new_volume: f64) -> Result<()> {
        if !self.get(id).allows_modification {
            return Err(ErrorCode::ContainerFrozen(
                "volume adjustments for this container are blocked".to_string(),
            ));
        }
        if !is_larger_than(new_volume, self.get(id).min_full_volume) {
            return Err(ErrorCode::BadArguments(format!(
                "the new minimum full volume ({} ul) must be larger than the \
                 current one ({} ul)",
                new_volume,
                self.get(id).min_full_volume
            )));
        }
        self.get_mut(id).min_full_volume = new_volume;
        if let Some(parent) = self.get(id).parent {
            self.adjust_transfer_data(id, parent);
        }
        Ok(())
    }

    /// Raises the dead volume by `delta`. Only allowed on mutable
    /// containers and only upwards.
    pub fn adjust_dead_volume_by(&mut self, id: ContainerId, delta: f64) -> Result<()> {
        if !self.get(id).allows_modification {
            return Err(ErrorCode::ContainerFrozen(
                "adjusting the dead volume for this container is not allowed".to_string(),
            ));
        }
        if !is_larger_than(delta, 0.0) {
            return Err(ErrorCode::BadArguments(format!(
                "the dead volume increase must be positive (got {} ul)",
                delta
            )));
        }
        self.get_mut(id).dead_volume += delta;
        if let Some(parent) = self.get(id).parent {
            self.adjust_transfer_data(id, parent);
        }
        Ok(())
    }

    /// Assigns a plate location. Frozen containers keep the location they
    /// were constructed with.
    pub fn set_location(
        &mut self,
        id: ContainerId,
        location: PlateLocation,
        plate_marker: &str,
    ) -> Result<()> {
        if !self.get(id).allows_modification {
            return Err(ErrorCode::ContainerFrozen(
                "the location of this container must not be altered".to_string(),
            ));
        }
        let c = self.get_mut(id);
        c.location = Some(location);
        c.plate_marker = Some(plate_marker.to_string());
        Ok(())
    }

    /// Deep copies the container and its descendants. Both the original and
    /// the clone are frozen afterwards; they describe the same intended
    /// sample and further mutation would desync them.
    pub fn clone_subtree(&mut self, id: ContainerId) -> Result<ContainerId> {
        let clone = self.clone_subtree_inner(id)?;
        self.get_mut(id).allows_modification = false;
        self.get_mut(clone).allows_modification = false;
        Ok(clone)
    }

    fn clone_subtree_inner(&mut self, id: ContainerId) -> Result<ContainerId> {
        let mut copy = self.get(id).clone();
        copy.parent = None;
        copy.targets = BTreeMap::new();
        let clone = self.alloc(copy);
        let children: Vec<ContainerId> = self.get(id).targets.keys().copied().collect();
        for child in children {
            let child_clone = self.clone_subtree_inner(child)?;
            self.attach_parent(child_clone, clone)?;
        }
        Ok(clone)
    }

    /// Returns `copy_number` containers (including `id` itself) with equal
    /// descendant structure.
    pub fn get_clones(&mut self, id: ContainerId, copy_number: usize) -> Result<Vec<ContainerId>> {
        if copy_number <= 1 {
            return Err(ErrorCode::InvalidCopyNumber(
                "the number of copies must be larger than 1".to_string(),
            ));
        }
        let mut clones = vec![id];
        while clones.len() < copy_number {
            clones.push(self.clone_subtree(id)?);
        }
        Ok(clones)
    }

    /// The ancestor line, parent first.
    pub fn ancestors(&self, id: ContainerId) -> Vec<ContainerId> {
        let mut ancestors = Vec::new();
        let mut current = self.get(id).parent;
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.get(parent).parent;
        }
        ancestors
    }

    /// All transitive children, depth first in handle order.
    pub fn descendants(&self, id: ContainerId) -> Vec<ContainerId> {
        let mut descendants = Vec::new();
        for &child in self.get(id).targets.keys() {
            descendants.push(child);
            descendants.extend(self.descendants(child));
        }
        descendants
    }

    /// Length of the ancestor line that sits on the same plate. Keeps
    /// serial dilutions on one plate in execution order.
    pub fn intraplate_ancestor_count(&self, id: ContainerId) -> usize {
        match self.get(id).parent {
            None => 0,
            Some(parent) => {
                if self.get(parent).plate_marker == self.get(id).plate_marker {
                    self.intraplate_ancestor_count(parent) + 1
                } else {
                    0
                }
            }
        }
    }

    /// Order by target concentration, ties broken by location.
    pub fn compare_by_target_concentration(&self, a: ContainerId, b: ContainerId) -> Ordering {
        let ta = self.get(a).target_concentration;
        let tb = self.get(b).target_concentration;
        if is_smaller_than(ta, tb) {
            Ordering::Less
        } else if is_larger_than(ta, tb) {
            Ordering::Greater
        } else {
            self.get(a).location.cmp(&self.get(b).location)
        }
    }
}
