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

//! The tube picker contract. The production picker queries the stock
//! database; the planner only depends on this trait. `InMemoryTubePicker`
//! serves embedding into tests and tools with a fixed tube inventory.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use common_exception::Result;
use common_layouts::are_equal_values;
use common_layouts::is_smaller_than;
use common_layouts::PoolId;
use common_layouts::TubeCandidate;

#[derive(Clone, Debug, PartialEq)]
pub struct TubePickingQuery {
    pub pools: BTreeSet<PoolId>,
    pub stock_concentration: f64,
    /// Minimum volume a tube must provide; `None` leaves the volume check
    /// to the caller.
    pub takeout_volume: Option<f64>,
    pub excluded_racks: Vec<String>,
    pub requested_tubes: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TubePickingResult {
    /// Candidates per pool, each list in rack optimized order.
    pub sorted_candidates: BTreeMap<PoolId, Vec<TubeCandidate>>,
    /// All candidates in the rack optimized query order.
    pub unsorted_candidates: Vec<TubeCandidate>,
}

pub trait TubePicker {
    fn pick(&self, query: &TubePickingQuery) -> Result<TubePickingResult>;
}

/// A deterministic picker over a fixed inventory. Requested tubes come
/// first; the remainder is ordered to minimize the number of source racks
/// (racks with many matches first, ties by barcode).
#[derive(Clone, Debug, Default)]
pub struct InMemoryTubePicker {
    tubes: Vec<TubeCandidate>,
}

impl InMemoryTubePicker {
    pub fn new(tubes: Vec<TubeCandidate>) -> Self {
        InMemoryTubePicker { tubes }
    }
}

impl TubePicker for InMemoryTubePicker {
    fn pick(&self, query: &TubePickingQuery) -> Result<TubePickingResult> {
        let mut matching: Vec<TubeCandidate> = self
            .tubes
            .iter()
            .filter(|tube| query.pools.contains(&tube.pool))
            .filter(|tube| are_equal_values(tube.concentration, query.stock_concentration))
            .filter(|tube| !query.excluded_racks.contains(&tube.rack_barcode))
            .filter(|tube| match query.takeout_volume {
                Some(volume) => !is_smaller_than(tube.available_volume, volume),
                None => true,
            })
            .cloned()
            .collect();

        let mut rack_sizes: BTreeMap<String, usize> = BTreeMap::new();
        for tube in &matching {
            *rack_sizes.entry(tube.rack_barcode.clone()).or_default() += 1;
        }
        matching.sort_by(|a, b| {
            let a_requested = query.requested_tubes.contains(&a.tube_barcode);
            let b_requested = query.requested_tubes.contains(&b.tube_barcode);
            b_requested
                .cmp(&a_requested)
                .then(rack_sizes[&b.rack_barcode].cmp(&rack_sizes[&a.rack_barcode]))
                .then(a.rack_barcode.cmp(&b.rack_barcode))
                .then(a.tube_barcode.cmp(&b.tube_barcode))
        });

        let mut sorted_candidates: BTreeMap<PoolId, Vec<TubeCandidate>> = BTreeMap::new();
        for tube in &matching {
            sorted_candidates
                .entry(tube.pool)
                .or_default()
                .push(tube.clone());
        }
        Ok(TubePickingResult {
            sorted_candidates,
            unsorted_candidates: matching,
        })
    }
}
