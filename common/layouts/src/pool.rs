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

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Identity of a molecule design pool in the stock database.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PoolId(pub u32);

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A floating placeholder slot. The slot is resolved to a concrete pool when
/// an ISO is materialized.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FloatingSlot(pub u32);

impl fmt::Display for FloatingSlot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "md_{}", self.0)
    }
}

/// What a request layout well holds. Exactly one kind per occupied well.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Pool {
    /// A control pool with a pre-assigned identity.
    Fixed(PoolId),
    /// A placeholder filled from the candidate queue at materialization.
    Floating(FloatingSlot),
    /// Diluent only.
    Mock,
    /// Lives on a pre-existing library plate; the planner does not touch it.
    Library,
}

/// The position kind is kept separate from the pool value because floating
/// slots turn into concrete pools at materialization while the position
/// stays a floating position.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PositionType {
    Fixed,
    Floating,
    Mock,
    Library,
}

impl Pool {
    pub fn position_type(&self) -> PositionType {
        match self {
            Pool::Fixed(_) => PositionType::Fixed,
            Pool::Floating(_) => PositionType::Floating,
            Pool::Mock => PositionType::Mock,
            Pool::Library => PositionType::Library,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, Pool::Fixed(_))
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, Pool::Floating(_))
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, Pool::Mock)
    }

    pub fn is_library(&self) -> bool {
        matches!(self, Pool::Library)
    }

    pub fn fixed_id(&self) -> Option<PoolId> {
        match self {
            Pool::Fixed(id) => Some(*id),
            _ => None,
        }
    }

    pub fn floating_slot(&self) -> Option<FloatingSlot> {
        match self {
            Pool::Floating(slot) => Some(*slot),
            _ => None,
        }
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Pool::Fixed(id) => write!(f, "{}", id),
            Pool::Floating(slot) => write!(f, "{}", slot),
            Pool::Mock => write!(f, "mock"),
            Pool::Library => write!(f, "library"),
        }
    }
}

/// One pickable stock tube as reported by the tube picker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TubeCandidate {
    pub pool: PoolId,
    pub tube_barcode: String,
    pub rack_barcode: String,
    pub available_volume: f64,
    pub concentration: f64,
}
