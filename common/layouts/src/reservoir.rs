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

//! Pipetting and reservoir semiconstants. The production system loads these
//! from a device database; here they are static tables.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::Deserialize;
use serde::Serialize;

use crate::numeric::round_up;
use crate::shape::RackShape;
use crate::shape::SHAPE_384;
use crate::shape::SHAPE_96;

/// Rack-at-once pipetting is only worthwhile from this many pools upwards.
pub const MIN_SECTOR_TRANSFER_COUNT: usize = 20;

/// The three transfer regimes. `PerPositionStock` governs single-well
/// transfers drawn directly from stock tubes: it is not dilution capped
/// because the take-out volume is widened to the 0.1 ul granularity instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipettingSpecsName {
    Sector,
    PerPosition,
    PerPositionStock,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipettingSpecs {
    pub name: PipettingSpecsName,
    pub min_transfer_volume: f64,
    pub max_dilution_factor: f64,
    pub has_dynamic_dead_volume: bool,
}

const SECTOR_PIPETTING_SPECS: PipettingSpecs = PipettingSpecs {
    name: PipettingSpecsName::Sector,
    min_transfer_volume: 1.0,
    max_dilution_factor: 500.0,
    has_dynamic_dead_volume: false,
};

const PER_POSITION_PIPETTING_SPECS: PipettingSpecs = PipettingSpecs {
    name: PipettingSpecsName::PerPosition,
    min_transfer_volume: 1.0,
    max_dilution_factor: 100.0,
    has_dynamic_dead_volume: true,
};

const PER_POSITION_STOCK_PIPETTING_SPECS: PipettingSpecs = PipettingSpecs {
    name: PipettingSpecsName::PerPositionStock,
    min_transfer_volume: 0.1,
    max_dilution_factor: 100_000.0,
    has_dynamic_dead_volume: true,
};

pub fn get_pipetting_specs(name: PipettingSpecsName) -> &'static PipettingSpecs {
    match name {
        PipettingSpecsName::Sector => &SECTOR_PIPETTING_SPECS,
        PipettingSpecsName::PerPosition => &PER_POSITION_PIPETTING_SPECS,
        PipettingSpecsName::PerPositionStock => &PER_POSITION_STOCK_PIPETTING_SPECS,
    }
}

/// Plate types. The first three are the preparation plate candidates, the
/// aliquot entries describe final plates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReservoirSpecsName {
    Standard96,
    Standard384,
    Deep96,
    Aliquot96,
    Aliquot384,
}

impl fmt::Display for ReservoirSpecsName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ReservoirSpecsName::Standard96 => "standard 96",
            ReservoirSpecsName::Standard384 => "standard 384",
            ReservoirSpecsName::Deep96 => "deep 96",
            ReservoirSpecsName::Aliquot96 => "aliquot 96",
            ReservoirSpecsName::Aliquot384 => "aliquot 384",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReservoirSpecs {
    pub name: ReservoirSpecsName,
    pub rack_shape: RackShape,
    pub max_volume: f64,
    pub min_dead_volume: f64,
    pub max_dead_volume: f64,
}

/// Candidate preparation plate types in order of desirability.
pub const PREPARATION_RESERVOIR_SPECS_NAMES: [ReservoirSpecsName; 3] = [
    ReservoirSpecsName::Standard96,
    ReservoirSpecsName::Standard384,
    ReservoirSpecsName::Deep96,
];

static RESERVOIR_SPECS: Lazy<BTreeMap<ReservoirSpecsName, ReservoirSpecs>> = Lazy::new(|| {
    let specs = [
        ReservoirSpecs {
            name: ReservoirSpecsName::Standard96,
            rack_shape: SHAPE_96,
            max_volume: 250.0,
            min_dead_volume: 10.0,
            max_dead_volume: 30.0,
        },
        ReservoirSpecs {
            name: ReservoirSpecsName::Standard384,
            rack_shape: SHAPE_384,
            max_volume: 80.0,
            min_dead_volume: 4.0,
            max_dead_volume: 12.0,
        },
        ReservoirSpecs {
            name: ReservoirSpecsName::Deep96,
            rack_shape: SHAPE_96,
            max_volume: 500.0,
            min_dead_volume: 10.0,
            max_dead_volume: 30.0,
        },
        ReservoirSpecs {
            name: ReservoirSpecsName::Aliquot96,
            rack_shape: SHAPE_96,
            max_volume: 250.0,
            min_dead_volume: 10.0,
            max_dead_volume: 10.0,
        },
        ReservoirSpecs {
            name: ReservoirSpecsName::Aliquot384,
            rack_shape: SHAPE_384,
            max_volume: 80.0,
            min_dead_volume: 4.0,
            max_dead_volume: 4.0,
        },
    ];
    specs.into_iter().map(|s| (s.name, s)).collect()
});

pub fn get_reservoir_specs(name: ReservoirSpecsName) -> &'static ReservoirSpecs {
    RESERVOIR_SPECS
        .get(&name)
        .expect("the reservoir specs table covers all names")
}

/// The final plate specs implied by the request layout shape.
pub fn final_reservoir_specs_for_shape(shape: &RackShape) -> &'static ReservoirSpecs {
    if shape.size() == 384 {
        get_reservoir_specs(ReservoirSpecsName::Aliquot384)
    } else {
        get_reservoir_specs(ReservoirSpecsName::Aliquot96)
    }
}

/// Dead volume for a well that serves `number_targets` transfer targets,
/// linear in the target count and capped by the reservoir specs.
pub fn get_dynamic_dead_volume(number_targets: usize, specs: &ReservoirSpecs) -> f64 {
    let extra = number_targets.saturating_sub(1) as f64;
    (specs.min_dead_volume + extra).min(specs.max_dead_volume)
}

/// The volume to draw from a stock tube for a well of `final_volume` at
/// `concentration`. Widened to the pipetting granularity, never below the
/// given minimum transfer volume.
pub fn get_stock_takeout_volume(
    stock_concentration: f64,
    final_volume: f64,
    concentration: f64,
    min_transfer_volume: f64,
) -> f64 {
    let dilution_factor = stock_concentration / concentration;
    let takeout = round_up(final_volume / dilution_factor, 1);
    takeout.max(min_transfer_volume)
}
