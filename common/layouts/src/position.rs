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

//! Layout position value records. The planner consumes request positions
//! through a reader and emits final and preparation positions; the entity
//! layer turns them into database rows.

use std::collections::BTreeMap;

use common_exception::ErrorCode;
use common_exception::Result;
use serde::Deserialize;
use serde::Serialize;

use crate::pool::Pool;
use crate::pool::PositionType;
use crate::pool::TubeCandidate;
use crate::shape::RackPosition;
use crate::shape::RackShape;

/// Placeholder barcode for starting wells until tube picking resolves them.
pub const TEMP_STOCK_DATA: &str = "to be determined";

/// One occupied well of the request layout, as delivered by the (external)
/// layout reader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IsoRequestPosition {
    pub rack_position: RackPosition,
    pub pool: Pool,
    pub iso_volume: f64,
    /// Mock positions have no concentration.
    pub iso_concentration: Option<f64>,
    /// Carried by fixed positions; floating positions share the request wide
    /// floating stock concentration.
    pub stock_concentration: Option<f64>,
}

impl IsoRequestPosition {
    pub fn position_type(&self) -> PositionType {
        self.pool.position_type()
    }
}

/// One planned transfer out of a container, addressed by target well and
/// target plate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferTarget {
    pub rack_position: RackPosition,
    pub transfer_volume: f64,
    pub target_rack_marker: String,
}

/// A well of a final (aliquot) ISO plate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalIsoPosition {
    pub rack_position: RackPosition,
    pub pool: Pool,
    pub position_type: PositionType,
    /// Mock positions have no concentration.
    pub concentration: Option<f64>,
    pub volume: f64,
    /// True if the position is prepared by job processing (shared controls).
    pub from_job: bool,
    pub sector_index: Option<usize>,
    pub transfer_targets: Vec<TransferTarget>,
    pub stock_tube_barcode: Option<String>,
    pub stock_rack_marker: Option<String>,
}

impl FinalIsoPosition {
    pub fn create_mock_position(rack_position: RackPosition, volume: f64) -> Self {
        FinalIsoPosition {
            rack_position,
            pool: Pool::Mock,
            position_type: PositionType::Mock,
            concentration: None,
            volume,
            from_job: false,
            sector_index: None,
            transfer_targets: vec![],
            stock_tube_barcode: None,
            stock_rack_marker: None,
        }
    }

    pub fn create_library_position(
        rack_position: RackPosition,
        concentration: f64,
        volume: f64,
    ) -> Self {
        FinalIsoPosition {
            rack_position,
            pool: Pool::Library,
            position_type: PositionType::Library,
            concentration: Some(concentration),
            volume,
            from_job: false,
            sector_index: None,
            transfer_targets: vec![],
            stock_tube_barcode: None,
            stock_rack_marker: None,
        }
    }

    /// A starting well receives its sample directly from a stock tube.
    pub fn is_starting_well(&self) -> bool {
        self.stock_tube_barcode.is_some()
    }

    /// Copy with the floating slot and the stock tube placeholder resolved.
    pub fn completed_copy(&self, candidate: Option<&TubeCandidate>) -> Self {
        let mut copy = self.clone();
        if let Some(candidate) = candidate {
            if copy.position_type == PositionType::Floating {
                copy.pool = Pool::Fixed(candidate.pool);
            }
            if copy.is_starting_well() {
                copy.stock_tube_barcode = Some(candidate.tube_barcode.clone());
            }
        }
        copy
    }
}

/// A well of a preparation (or job preparation) plate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrepIsoPosition {
    pub rack_position: RackPosition,
    pub pool: Pool,
    pub position_type: PositionType,
    pub concentration: f64,
    pub volume: f64,
    /// The final plate sector served by this well, in sector pipetting.
    pub sector_index: Option<usize>,
    /// Targets on preparation plates.
    pub prep_targets: Vec<TransferTarget>,
    /// Targets on final plates.
    pub external_targets: Vec<TransferTarget>,
    pub stock_tube_barcode: Option<String>,
    pub stock_rack_marker: Option<String>,
}

impl PrepIsoPosition {
    pub fn is_starting_well(&self) -> bool {
        self.stock_tube_barcode.is_some()
    }

    pub fn completed_copy(&self, candidate: Option<&TubeCandidate>) -> Self {
        let mut copy = self.clone();
        if let Some(candidate) = candidate {
            if copy.position_type == PositionType::Floating {
                copy.pool = Pool::Fixed(candidate.pool);
            }
            if copy.is_starting_well() {
                copy.stock_tube_barcode = Some(candidate.tube_barcode.clone());
            }
        }
        copy
    }
}

/// The final plate layout of an ISO (or the request wide template for it).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalIsoLayout {
    pub shape: RackShape,
    pub positions: BTreeMap<RackPosition, FinalIsoPosition>,
}

impl FinalIsoLayout {
    pub fn new(shape: RackShape) -> Self {
        FinalIsoLayout {
            shape,
            positions: BTreeMap::new(),
        }
    }

    pub fn add_position(&mut self, position: FinalIsoPosition) -> Result<()> {
        check_and_insert(&self.shape, &mut self.positions, position.rack_position, position)
    }

    pub fn get_position(&self, rack_position: RackPosition) -> Option<&FinalIsoPosition> {
        self.positions.get(&rack_position)
    }

    /// Floating positions in rack position order.
    pub fn sorted_floating_positions(&self) -> Vec<&FinalIsoPosition> {
        self.positions
            .values()
            .filter(|p| p.position_type == PositionType::Floating)
            .collect()
    }
}

/// A preparation plate layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrepIsoLayout {
    pub shape: RackShape,
    pub positions: BTreeMap<RackPosition, PrepIsoPosition>,
}

impl PrepIsoLayout {
    pub fn new(shape: RackShape) -> Self {
        PrepIsoLayout {
            shape,
            positions: BTreeMap::new(),
        }
    }

    pub fn add_position(&mut self, position: PrepIsoPosition) -> Result<()> {
        check_and_insert(&self.shape, &mut self.positions, position.rack_position, position)
    }

    pub fn sorted_floating_positions(&self) -> Vec<&PrepIsoPosition> {
        self.positions
            .values()
            .filter(|p| p.position_type == PositionType::Floating)
            .collect()
    }
}

fn check_and_insert<T>(
    shape: &RackShape,
    positions: &mut BTreeMap<RackPosition, T>,
    rack_position: RackPosition,
    position: T,
) -> Result<()> {
    if !shape.contains(rack_position) {
        return Err(ErrorCode::BadArguments(format!(
            "position {} is outside the {} shape",
            rack_position, shape
        )));
    }
    if positions.contains_key(&rack_position) {
        return Err(ErrorCode::OccupiedLocation(format!(
            "layout position {} is already occupied",
            rack_position
        )));
    }
    positions.insert(rack_position, position);
    Ok(())
}
