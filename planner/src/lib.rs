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

//! Planning of lab ISO plate production. Given a request layout the planner
//! decides which preparation plates are needed to bridge the dilution from
//! stock to the requested concentrations, assigns locations, reserves stock
//! tubes and emits the planned liquid transfers.

mod assigner;
mod association;
mod builder;
mod canvas;
mod container;
mod library;
mod planners;
mod top;
mod tube_picking;

pub use assigner::AssignerKind;
pub use assigner::LocationAssigner;
pub use association::find_association;
pub use association::AssociationData;
pub use builder::IsoPlate;
pub use builder::LabIso;
pub use builder::LabIsoBuilder;
pub use canvas::Canvas;
pub use container::ContainerArena;
pub use container::ContainerId;
pub use container::PlateLocation;
pub use library::LibraryInfo;
pub use library::LibraryIsoBuilder;
pub use library::LibraryIsoPlanner;
pub use library::LibraryPlanningOutput;
pub use library::LibraryPlate;
pub use top::LabIsoPlanner;
pub use top::LabIsoRequest;
pub use top::PlanningOutput;
pub use tube_picking::InMemoryTubePicker;
pub use tube_picking::TubePicker;
pub use tube_picking::TubePickingQuery;
pub use tube_picking::TubePickingResult;
