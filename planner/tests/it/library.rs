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

use std::collections::BTreeSet;

use common_exception::Result;
use common_layouts::PositionType;
use platebench_planner::InMemoryTubePicker;
use platebench_planner::LibraryInfo;
use platebench_planner::LibraryIsoPlanner;
use platebench_planner::LibraryPlate;
use pretty_assertions::assert_eq;

use crate::helpers;
use crate::helpers::pos;

fn library_plate(layout_number: u32, barcode: &str) -> LibraryPlate {
    LibraryPlate {
        layout_number,
        barcode: barcode.to_string(),
        has_been_used: false,
    }
}

#[test]
fn test_library_isos_use_preexisting_plates() -> Result<()> {
    let request = helpers::request_96(vec![
        helpers::fixed_position("A1", 9, 40.0, 500.0, 50_000.0),
        helpers::library_position("B1", 25.0, 1000.0),
        helpers::library_position("B2", 25.0, 1000.0),
    ]);
    let library = LibraryInfo {
        number_layouts: 2,
        plates: vec![
            library_plate(1, "08880001"),
            library_plate(2, "08880002"),
        ],
        used_layout_numbers: BTreeSet::new(),
    };
    let picker = InMemoryTubePicker::new(vec![helpers::tube(9, "T9", "R9", 100.0, 50_000.0)]);

    let output =
        LibraryIsoPlanner::new(request, library, 2, vec![], vec![], &picker).run()?;
    let mut builder = output.builder;

    // The control is planned as a job route, directly from stock.
    assert!(builder.base.job_layouts.is_empty());
    let control = builder.base.final_iso_layout.get_position(pos("A1")).unwrap();
    assert!(control.from_job);
    assert!(control.is_starting_well());

    let (job_plates, job_racks) = builder.materialize_job_plates("1024_job")?;
    assert!(job_plates.is_empty());
    assert_eq!(job_racks, 1);

    let isos = builder.materialize_isos()?;
    assert_eq!(isos.len(), 2);
    assert_eq!(isos[0].label, "1024_iso-1");
    assert_eq!(isos[0].aliquot_plates[0].label, "08880001");
    assert_eq!(isos[1].aliquot_plates[0].label, "08880002");
    for iso in &isos {
        assert!(iso.preparation_plates.is_empty());
        // Library wells are carried, not planned.
        let library_position = iso.final_layout.get_position(pos("B1")).unwrap();
        assert_eq!(library_position.position_type, PositionType::Library);
        assert!(library_position.transfer_targets.is_empty());
        let control = iso.final_layout.get_position(pos("A1")).unwrap();
        assert_eq!(control.stock_tube_barcode.as_deref(), Some("T9"));
        assert_eq!(control.stock_rack_marker.as_deref(), Some("s-1"));
        // The control rack belongs to the job, not to the ISO.
        assert_eq!(iso.number_stock_racks, 0);
    }
    Ok(())
}

#[test]
fn test_missing_library_plates_are_an_error() {
    let request = helpers::request_96(vec![helpers::library_position("B1", 25.0, 1000.0)]);
    let library = LibraryInfo {
        number_layouts: 1,
        plates: vec![],
        used_layout_numbers: BTreeSet::new(),
    };
    let picker = InMemoryTubePicker::default();
    let error = LibraryIsoPlanner::new(request, library, 1, vec![], vec![], &picker)
        .run()
        .unwrap_err();
    assert_eq!(error.code(), 1014);
}

#[test]
fn test_floating_positions_are_rejected_for_library_requests() {
    let request = helpers::request_96(vec![
        helpers::library_position("B1", 25.0, 1000.0),
        helpers::floating_position_at(pos("C1"), 1, 10.0, 50.0),
    ]);
    let library = LibraryInfo {
        number_layouts: 1,
        plates: vec![library_plate(1, "08880001")],
        used_layout_numbers: BTreeSet::new(),
    };
    let picker = InMemoryTubePicker::default();
    let error = LibraryIsoPlanner::new(request, library, 1, vec![], vec![], &picker)
        .run()
        .unwrap_err();
    assert_eq!(error.code(), 1016);
}
