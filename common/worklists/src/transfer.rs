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

use common_layouts::RackPosition;
use serde::Deserialize;
use serde::Serialize;

/// The diluent annotation for planned buffer dilutions.
pub const DILUENT_INFO: &str = "buffer";

/// Buffer addition into one well.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannedSampleDilution {
    pub target_position: RackPosition,
    pub volume: f64,
    pub diluent_info: String,
}

impl PlannedSampleDilution {
    pub fn new(target_position: RackPosition, volume: f64) -> Self {
        PlannedSampleDilution {
            target_position,
            volume,
            diluent_info: DILUENT_INFO.to_string(),
        }
    }
}

/// Well-to-well sample move.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannedSampleTransfer {
    pub source_position: RackPosition,
    pub target_position: RackPosition,
    pub volume: f64,
}

/// Sector-to-sector rack-at-once move.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannedRackSampleTransfer {
    pub source_sector: usize,
    pub target_sector: usize,
    pub number_sectors: usize,
    pub volume: f64,
}

/// Any planned sample movement between containers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PlannedTransfer {
    Sample(PlannedSampleTransfer),
    Rack(PlannedRackSampleTransfer),
}

impl PlannedTransfer {
    pub fn volume(&self) -> f64 {
        match self {
            PlannedTransfer::Sample(t) => t.volume,
            PlannedTransfer::Rack(t) => t.volume,
        }
    }

    pub fn is_rack_transfer(&self) -> bool {
        matches!(self, PlannedTransfer::Rack(_))
    }
}
