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

//! Plate and worklist label grammar. Plate labels are
//! `{ticket}_iso-{n}_{role}[-{k}]`; the rack marker is the `{role}[-{k}]`
//! part. Single plates of a role omit the number.

use common_exception::ErrorCode;
use common_exception::Result;

pub const ROLE_FINAL: &str = "a";
pub const ROLE_PREPARATION: &str = "p";
pub const ROLE_PREPARATION_JOB: &str = "jp";
pub const ROLE_STOCK: &str = "s";

const NUMBER_SEPARATOR: char = '-';
const SECTION_SEPARATOR: char = '_';

#[derive(Debug, thiserror::Error)]
#[error("invalid rack marker `{marker}`")]
pub struct InvalidRackMarker {
    marker: String,
}

impl From<InvalidRackMarker> for ErrorCode {
    fn from(error: InvalidRackMarker) -> Self {
        ErrorCode::BadArguments(error.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RackMarkerParts {
    pub role: String,
    pub rack_number: Option<usize>,
}

pub fn create_rack_marker(role: &str, rack_number: Option<usize>) -> String {
    match rack_number {
        Some(number) => format!("{}{}{}", role, NUMBER_SEPARATOR, number),
        None => role.to_string(),
    }
}

pub fn parse_rack_marker(marker: &str) -> Result<RackMarkerParts> {
    let invalid = || InvalidRackMarker {
        marker: marker.to_string(),
    };
    let (role, rack_number) = match marker.split_once(NUMBER_SEPARATOR) {
        Some((role, number)) => {
            let number: usize = number.parse().map_err(|_| invalid())?;
            (role, Some(number))
        }
        None => (marker, None),
    };
    match role {
        ROLE_FINAL | ROLE_PREPARATION | ROLE_PREPARATION_JOB | ROLE_STOCK => {
            Ok(RackMarkerParts {
                role: role.to_string(),
                rack_number,
            })
        }
        _ => Err(invalid().into()),
    }
}

/// Removes the rack number from a marker carrying number 1. Used when only
/// one plate of a role exists.
pub fn strip_rack_number(marker: &str) -> Result<String> {
    let parts = parse_rack_marker(marker)?;
    if parts.rack_number == Some(1) {
        Ok(create_rack_marker(&parts.role, None))
    } else {
        Ok(marker.to_string())
    }
}

pub fn create_iso_label(ticket_number: u32, iso_number: u32) -> String {
    format!(
        "{}{}iso{}{}",
        ticket_number, SECTION_SEPARATOR, NUMBER_SEPARATOR, iso_number
    )
}

pub fn create_rack_label(entity_label: &str, rack_marker: &str) -> String {
    format!("{}{}{}", entity_label, SECTION_SEPARATOR, rack_marker)
}

pub fn create_worklist_label(ticket_number: u32, sequence_number: usize, kind: &str) -> String {
    format!(
        "{}{}{}{}{}",
        ticket_number, SECTION_SEPARATOR, sequence_number, SECTION_SEPARATOR, kind
    )
}
