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

pub mod labels;
mod numeric;
mod pool;
mod position;
mod reservoir;
mod sector;
mod shape;

pub use numeric::are_equal_values;
pub use numeric::get_transfer_volume;
pub use numeric::is_larger_than;
pub use numeric::is_smaller_than;
pub use numeric::round_to;
pub use numeric::round_up;
pub use numeric::EPSILON;
pub use pool::FloatingSlot;
pub use pool::Pool;
pub use pool::PoolId;
pub use pool::PositionType;
pub use pool::TubeCandidate;
pub use position::FinalIsoLayout;
pub use position::FinalIsoPosition;
pub use position::IsoRequestPosition;
pub use position::PrepIsoLayout;
pub use position::PrepIsoPosition;
pub use position::TransferTarget;
pub use position::TEMP_STOCK_DATA;
pub use reservoir::final_reservoir_specs_for_shape;
pub use reservoir::get_dynamic_dead_volume;
pub use reservoir::get_pipetting_specs;
pub use reservoir::get_reservoir_specs;
pub use reservoir::get_stock_takeout_volume;
pub use reservoir::PipettingSpecs;
pub use reservoir::PipettingSpecsName;
pub use reservoir::ReservoirSpecs;
pub use reservoir::ReservoirSpecsName;
pub use reservoir::MIN_SECTOR_TRANSFER_COUNT;
pub use reservoir::PREPARATION_RESERVOIR_SPECS_NAMES;
pub use sector::base_position;
pub use sector::number_of_sectors;
pub use sector::sector_of;
pub use sector::sector_offsets;
pub use sector::sort_into_sectors;
pub use sector::RackSectorTranslator;
pub use sector::TranslationBehaviour;
pub use shape::RackPosition;
pub use shape::RackShape;
pub use shape::SHAPE_384;
pub use shape::SHAPE_96;
