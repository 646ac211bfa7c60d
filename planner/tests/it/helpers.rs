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

use std::collections::BTreeSet;

use common_layouts::FloatingSlot;
use common_layouts::IsoRequestPosition;
use common_layouts::Pool;
use common_layouts::PoolId;
use common_layouts::RackPosition;
use common_layouts::RackShape;
use common_layouts::TubeCandidate;
use common_layouts::SHAPE_384;
use common_layouts::SHAPE_96;
use platebench_planner::LabIsoRequest;

pub fn pos(label: &str) -> RackPosition {
    label.parse().unwrap()
}

pub fn fixed_position(
    label: &str,
    pool: u32,
    volume: f64,
    concentration: f64,
    stock_concentration: f64,
) -> IsoRequestPosition {
    IsoRequestPosition {
        rack_position: pos(label),
        pool: Pool::Fixed(PoolId(pool)),
        iso_volume: volume,
        iso_concentration: Some(concentration),
        stock_concentration: Some(stock_concentration),
    }
}

pub fn floating_position_at(
    rack_position: RackPosition,
    slot: u32,
    volume: f64,
    concentration: f64,
) -> IsoRequestPosition {
    IsoRequestPosition {
        rack_position,
        pool: Pool::Floating(FloatingSlot(slot)),
        iso_volume: volume,
        iso_concentration: Some(concentration),
        stock_concentration: None,
    }
}

pub fn mock_position(label: &str, volume: f64) -> IsoRequestPosition {
    IsoRequestPosition {
        rack_position: pos(label),
        pool: Pool::Mock,
        iso_volume: volume,
        iso_concentration: None,
        stock_concentration: None,
    }
}

pub fn library_position(label: &str, volume: f64, concentration: f64) -> IsoRequestPosition {
    IsoRequestPosition {
        rack_position: pos(label),
        pool: Pool::Library,
        iso_volume: volume,
        iso_concentration: Some(concentration),
        stock_concentration: None,
    }
}

fn request(shape: RackShape, positions: Vec<IsoRequestPosition>) -> LabIsoRequest {
    LabIsoRequest {
        ticket_number: 1024,
        shape,
        number_aliquots: 1,
        process_job_first: false,
        positions,
        molecule_design_pool_set: None,
        default_stock_concentration: None,
        pools_used_by_existing_isos: BTreeSet::new(),
        number_existing_isos: 0,
    }
}

pub fn request_96(positions: Vec<IsoRequestPosition>) -> LabIsoRequest {
    request(SHAPE_96, positions)
}

pub fn request_384(positions: Vec<IsoRequestPosition>) -> LabIsoRequest {
    request(SHAPE_384, positions)
}

pub fn tube(
    pool: u32,
    tube_barcode: &str,
    rack_barcode: &str,
    available_volume: f64,
    concentration: f64,
) -> TubeCandidate {
    TubeCandidate {
        pool: PoolId(pool),
        tube_barcode: tube_barcode.to_string(),
        rack_barcode: rack_barcode.to_string(),
        available_volume,
        concentration,
    }
}

/// A 384 layout with 20 floating slots in a quadrant pattern: five 2x2
/// blocks in the top row, four distinct slots per block.
pub fn quadrant_floating_positions(volume: f64, concentration: f64) -> Vec<IsoRequestPosition> {
    let mut positions = Vec::new();
    for sector in 0..4usize {
        for base_column in 0..5usize {
            let row_offset = sector / 2;
            let column_offset = sector % 2;
            let rack_position =
                RackPosition::new(row_offset, base_column * 2 + column_offset);
            let slot = (sector * 5 + base_column + 1) as u32;
            positions.push(floating_position_at(rack_position, slot, volume, concentration));
        }
    }
    positions
}

pub fn pool_set(first: u32, count: u32) -> BTreeSet<PoolId> {
    (first..first + count).map(PoolId).collect()
}

pub fn tubes_for_pools(first: u32, count: u32, concentration: f64) -> Vec<TubeCandidate> {
    (first..first + count)
        .map(|pool| {
            tube(
                pool,
                &format!("T{}", pool),
                &format!("R{}", pool / 10),
                100.0,
                concentration,
            )
        })
        .collect()
}
