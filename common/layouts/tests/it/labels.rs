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

use common_layouts::labels;
use pretty_assertions::assert_eq;

#[test]
fn test_rack_marker_round_trip() -> common_exception::Result<()> {
    let marker = labels::create_rack_marker(labels::ROLE_PREPARATION, Some(2));
    assert_eq!(marker, "p-2");
    let parts = labels::parse_rack_marker(&marker)?;
    assert_eq!(parts.role, "p");
    assert_eq!(parts.rack_number, Some(2));

    let marker = labels::create_rack_marker(labels::ROLE_PREPARATION_JOB, None);
    assert_eq!(marker, "jp");
    let parts = labels::parse_rack_marker(&marker)?;
    assert_eq!(parts.role, "jp");
    assert_eq!(parts.rack_number, None);
    Ok(())
}

#[test]
fn test_rack_marker_rejects_unknown_role() {
    let result = labels::parse_rack_marker("x-1");
    assert!(result.is_err());
}

#[test]
fn test_strip_rack_number_only_for_single_plates() -> common_exception::Result<()> {
    assert_eq!(labels::strip_rack_number("p-1")?, "p");
    assert_eq!(labels::strip_rack_number("p-2")?, "p-2");
    assert_eq!(labels::strip_rack_number("jp")?, "jp");
    Ok(())
}

#[test]
fn test_plate_labels() {
    let iso_label = labels::create_iso_label(1024, 3);
    assert_eq!(iso_label, "1024_iso-3");
    assert_eq!(labels::create_rack_label(&iso_label, "p-2"), "1024_iso-3_p-2");
    assert_eq!(labels::create_worklist_label(1024, 2, "buffer"), "1024_2_buffer");
}
