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

use crate::exception::ErrorCode;

macro_rules! build_exceptions {
    ($($(#[$meta:meta])* $body:ident($code:expr)),*$(,)*) => {
        impl ErrorCode {
            $(
                $(#[$meta])*
                #[allow(non_snake_case)]
                pub fn $body(display_text: impl Into<String>) -> ErrorCode {
                    ErrorCode::create($code, display_text.into())
                }
            )*
        }
    };
}

build_exceptions! {
    Ok(0),

    /// The request layout could not be read.
    LayoutParseFailed(1001),
    /// A requested concentration is larger than the pool stock concentration.
    ConcentrationExceedsStock(1002),
    /// All floating pools of the request have already been used.
    NoQueuedPools(1003),
    /// A 384-well layout with floating positions cannot be sorted into
    /// rack sectors.
    SectorAssociationFailed(1004),
    /// The tube picker did not return candidates for some pools.
    NoTubeCandidates(1005),
    /// Floating positions request differing stock take-out volumes.
    FloatingTakeoutMismatch(1006),
    /// No candidate reservoir spec can host all preparation containers.
    PrepVolumeExceedsAllSpecs(1007),
    /// A source concentration is smaller than the target concentration.
    ParentConcentrationTooLow(1008),
    /// Mutation of a frozen (final or cloned) container.
    ContainerFrozen(1009),
    /// Explicit placement on an already occupied plate location.
    OccupiedLocation(1010),
    /// A plate canvas ran out of empty locations.
    NoFreeLocation(1011),
    /// A single-set builder attribute was set twice.
    ImmutableAttribute(1012),
    /// Container cloning with a copy number smaller than 2.
    InvalidCopyNumber(1013),
    /// No unused library layouts or plates are left.
    NoLibraryPlates(1014),
    /// Aggregate of the errors collected during a planning run.
    PlanningFailed(1015),
    /// An input contract was violated.
    BadArguments(1016),
}
