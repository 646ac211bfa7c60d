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
use std::str::FromStr;

use common_exception::ErrorCode;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

/// The grid of a microplate or tube rack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RackShape {
    pub rows: usize,
    pub columns: usize,
}

pub const SHAPE_96: RackShape = RackShape {
    rows: 8,
    columns: 12,
};

pub const SHAPE_384: RackShape = RackShape {
    rows: 16,
    columns: 24,
};

impl RackShape {
    pub fn size(&self) -> usize {
        self.rows * self.columns
    }

    pub fn contains(&self, position: RackPosition) -> bool {
        position.row < self.rows && position.column < self.columns
    }

    /// All positions of the shape in row-major order.
    pub fn positions(&self) -> Vec<RackPosition> {
        let mut positions = Vec::with_capacity(self.size());
        for row in 0..self.rows {
            for column in 0..self.columns {
                positions.push(RackPosition::new(row, column));
            }
        }
        positions
    }
}

impl fmt::Display for RackShape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.columns)
    }
}

/// A single well position, zero based. The display form is the lab form
/// (`A1` .. `P24`), which is also the serialized form so positions can key
/// serialized maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RackPosition {
    pub row: usize,
    pub column: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid rack position label `{label}`")]
pub struct InvalidRackPosition {
    label: String,
}

impl From<InvalidRackPosition> for ErrorCode {
    fn from(error: InvalidRackPosition) -> Self {
        ErrorCode::BadArguments(error.to_string())
    }
}

impl RackPosition {
    pub fn new(row: usize, column: usize) -> Self {
        RackPosition { row, column }
    }

    pub fn label(&self) -> String {
        format!("{}{}", (b'A' + self.row as u8) as char, self.column + 1)
    }
}

impl FromStr for RackPosition {
    type Err = InvalidRackPosition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidRackPosition {
            label: s.to_string(),
        };
        let mut chars = s.chars();
        let row_char = chars.next().ok_or_else(invalid)?;
        if !row_char.is_ascii_uppercase() {
            return Err(invalid());
        }
        let row = (row_char as u8 - b'A') as usize;
        let column: usize = chars.as_str().parse().map_err(|_| invalid())?;
        if column < 1 {
            return Err(invalid());
        }
        Ok(RackPosition::new(row, column - 1))
    }
}

impl fmt::Display for RackPosition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl Serialize for RackPosition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for RackPosition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(serde::de::Error::custom)
    }
}
