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

//! End to end planning runs over small request layouts.

use common_exception::Result;
use common_layouts::are_equal_values;
use common_layouts::get_stock_takeout_volume;
use common_layouts::PositionType;
use common_layouts::ReservoirSpecsName;
use common_layouts::TEMP_STOCK_DATA;
use common_worklists::PlannedTransfer;
use common_worklists::WorklistKind;
use platebench_planner::InMemoryTubePicker;
use platebench_planner::LabIsoPlanner;
use pretty_assertions::assert_eq;

use crate::helpers;
use crate::helpers::pos;

#[test]
fn test_single_fixed_pool_direct_from_stock() -> Result<()> {
    let request = helpers::request_96(vec![helpers::fixed_position(
        "A1", 1, 10.0, 50.0, 50_000.0,
    )]);
    let picker = InMemoryTubePicker::new(vec![helpers::tube(1, "T1", "R1", 120.0, 50_000.0)]);
    let output = LabIsoPlanner::new(request, 1, vec![], vec![], &picker).run()?;
    let mut builder = output.builder;

    // A thousandfold dilution, still feasible in one widened stock
    // transfer: no preparation plate.
    assert!(builder.preparation_layouts.is_empty());
    let dilutions = &builder.planned_dilutions["a"];
    assert_eq!(dilutions.len(), 1);
    assert_eq!(dilutions[0].target_position, pos("A1"));
    assert!(are_equal_values(dilutions[0].volume, 9.99));

    let position = builder.final_iso_layout.get_position(pos("A1")).unwrap();
    assert_eq!(position.stock_tube_barcode.as_deref(), Some(TEMP_STOCK_DATA));
    // The derived 0.01 ul take-out is widened to the regime minimum.
    assert!(are_equal_values(
        get_stock_takeout_volume(50_000.0, 10.0, 50.0, 0.1),
        0.1
    ));

    let isos = builder.materialize_isos()?;
    assert_eq!(isos.len(), 1);
    assert_eq!(isos[0].number_stock_racks, 1);
    let materialized = isos[0].final_layout.get_position(pos("A1")).unwrap();
    assert_eq!(materialized.stock_tube_barcode.as_deref(), Some("T1"));
    assert_eq!(materialized.stock_rack_marker.as_deref(), Some("s-1"));
    Ok(())
}

#[test]
fn test_two_fixed_pools_share_one_stock_rack() -> Result<()> {
    let request = helpers::request_96(vec![
        helpers::fixed_position("A1", 1, 40.0, 500.0, 50_000.0),
        helpers::fixed_position("B1", 2, 40.0, 500.0, 50_000.0),
    ]);
    let picker = InMemoryTubePicker::new(vec![
        helpers::tube(1, "T1", "R1", 100.0, 50_000.0),
        helpers::tube(2, "T2", "R1", 100.0, 50_000.0),
    ]);
    let output = LabIsoPlanner::new(request, 1, vec![], vec![], &picker).run()?;
    let mut builder = output.builder;

    assert!(builder.preparation_layouts.is_empty());
    let dilutions = &builder.planned_dilutions["a"];
    assert_eq!(dilutions.len(), 2);
    for dilution in dilutions {
        assert!(are_equal_values(dilution.volume, 39.6));
    }
    // The 0.4 ul take-outs stay untouched by the widening.
    assert!(are_equal_values(
        get_stock_takeout_volume(50_000.0, 40.0, 500.0, 0.1),
        0.4
    ));

    let isos = builder.materialize_isos()?;
    assert_eq!(isos[0].number_stock_racks, 1);
    for label in ["A1", "B1"] {
        let position = isos[0].final_layout.get_position(pos(label)).unwrap();
        assert_eq!(position.stock_rack_marker.as_deref(), Some("s-1"));
    }
    Ok(())
}

#[test]
fn test_stock_concentration_targets_get_passthrough_preparations() -> Result<()> {
    let positions = (0..5)
        .map(|index| {
            let label = format!("{}1", (b'A' + index as u8) as char);
            helpers::fixed_position(&label, index as u32 + 1, 10.0, 50_000.0, 50_000.0)
        })
        .collect();
    let request = helpers::request_96(positions);
    let tubes = (1..=5)
        .map(|pool| helpers::tube(pool, &format!("T{}", pool), "R1", 100.0, 50_000.0))
        .collect();
    let picker = InMemoryTubePicker::new(tubes);
    let output = LabIsoPlanner::new(request, 1, vec![], vec![], &picker).run()?;
    let mut builder = output.builder;

    // Direct transfers would leave no room for buffer: every position gets
    // a same-concentration passthrough preparation.
    assert_eq!(builder.preparation_layouts.len(), 1);
    assert_eq!(builder.plate_specs["p-1"], ReservoirSpecsName::Standard96);
    let layout = &builder.preparation_layouts["p-1"];
    assert_eq!(layout.positions.len(), 5);
    for position in layout.positions.values() {
        assert!(are_equal_values(position.concentration, 50_000.0));
        assert_eq!(position.stock_tube_barcode.as_deref(), Some(TEMP_STOCK_DATA));
        assert_eq!(position.external_targets.len(), 1);
        // The passthrough hands over the complete final volume.
        assert!(are_equal_values(
            position.external_targets[0].transfer_volume,
            10.0
        ));
    }

    // Pure passthroughs need no buffer anywhere.
    assert!(builder.planned_dilutions.is_empty());
    let transfers = &builder.interplate_transfers["p-1"]["a"];
    assert_eq!(transfers.len(), 5);
    for transfer in transfers {
        assert!(are_equal_values(transfer.volume(), 10.0));
    }

    let isos = builder.materialize_isos()?;
    assert_eq!(isos[0].preparation_plates.len(), 1);
    // A single preparation plate drops the rack number from its marker.
    assert_eq!(isos[0].preparation_plates[0].rack_marker, "p");
    assert_eq!(isos[0].number_stock_racks, 1);
    Ok(())
}

#[test]
fn test_mock_positions_receive_only_buffer() -> Result<()> {
    let request = helpers::request_96(vec![helpers::mock_position("C3", 25.0)]);
    let picker = InMemoryTubePicker::default();
    let output = LabIsoPlanner::new(request, 1, vec![], vec![], &picker).run()?;
    let mut builder = output.builder;

    let position = builder.final_iso_layout.get_position(pos("C3")).unwrap();
    assert_eq!(position.position_type, PositionType::Mock);
    assert_eq!(position.concentration, None);
    assert!(are_equal_values(position.volume, 25.0));
    let dilutions = &builder.planned_dilutions["a"];
    assert_eq!(dilutions.len(), 1);
    assert!(are_equal_values(dilutions[0].volume, 25.0));

    let isos = builder.materialize_isos()?;
    assert_eq!(isos[0].number_stock_racks, 0);
    let materialized = isos[0].final_layout.get_position(pos("C3")).unwrap();
    assert_eq!(materialized.stock_rack_marker, None);
    assert_eq!(materialized.stock_tube_barcode, None);
    Ok(())
}

fn sector_request(pool_count: u32) -> (platebench_planner::LabIsoRequest, InMemoryTubePicker) {
    let mut request = helpers::request_384(helpers::quadrant_floating_positions(20.0, 50.0));
    request.molecule_design_pool_set = Some(helpers::pool_set(1001, pool_count));
    request.default_stock_concentration = Some(50_000.0);
    request.process_job_first = true;
    let picker = InMemoryTubePicker::new(helpers::tubes_for_pools(1001, pool_count, 50_000.0));
    (request, picker)
}

#[test]
fn test_sector_mode_builds_one_prep_plate_with_four_sector_preps() -> Result<()> {
    common_tracing::init_default_tracing();
    let (request, picker) = sector_request(60);
    let output = LabIsoPlanner::new(request, 3, vec![], vec![], &picker).run()?;
    let mut builder = output.builder;

    // One 384 preparation plate hosts all four sector preparations.
    assert_eq!(
        builder
            .preparation_layouts
            .keys()
            .map(|k| k.as_str())
            .collect::<Vec<_>>(),
        vec!["p-1"]
    );
    assert_eq!(builder.plate_specs["p-1"], ReservoirSpecsName::Standard384);
    let layout = &builder.preparation_layouts["p-1"];
    assert_eq!(layout.positions.len(), 20);
    for position in layout.positions.values() {
        assert!(are_equal_values(position.concentration, 1000.0));
        assert_eq!(position.stock_tube_barcode.as_deref(), Some(TEMP_STOCK_DATA));
    }

    // One rack transfer per sector feeds the aliquot plate.
    let transfers = &builder.interplate_transfers["p-1"]["a"];
    assert_eq!(transfers.len(), 4);
    for transfer in transfers {
        match transfer {
            PlannedTransfer::Rack(rack) => {
                assert_eq!(rack.source_sector, rack.target_sector);
                assert_eq!(rack.number_sectors, 4);
                assert!(are_equal_values(rack.volume, 1.0));
            }
            PlannedTransfer::Sample(_) => panic!("expected rack transfers"),
        }
    }

    // Final wells are fed from the preparation plate, not from stock.
    for position in builder.final_iso_layout.positions.values() {
        assert!(!position.is_starting_well());
        assert!(are_equal_values(position.volume, 20.0));
    }

    let series = builder.worklist_series();
    let kinds: Vec<WorklistKind> = series.worklists.iter().map(|w| w.kind).collect();
    assert_eq!(
        kinds,
        vec![
            WorklistKind::Buffer,
            WorklistKind::Buffer,
            WorklistKind::RackTransfer
        ]
    );

    let isos = builder.materialize_isos()?;
    assert_eq!(isos.len(), 3);
    let mut seen_pools = std::collections::BTreeSet::new();
    for iso in &isos {
        // One stock rack per sector: rack contents move together.
        assert_eq!(iso.number_stock_racks, 4);
        assert_eq!(iso.preparation_plates.len(), 1);
        assert_eq!(iso.preparation_plates[0].rack_marker, "p");
        let pool_set = iso.pool_set.as_ref().unwrap();
        assert_eq!(pool_set.len(), 20);
        for pool in pool_set {
            // ISOs consume disjoint parts of the queue.
            assert!(seen_pools.insert(*pool));
        }
        let prep_layout = iso.preparation_plates[0].layout.as_ref().unwrap();
        for position in prep_layout.positions.values() {
            assert!(position.stock_rack_marker.is_some());
            assert!(position.stock_tube_barcode.as_deref() != Some(TEMP_STOCK_DATA));
        }
    }
    Ok(())
}

#[test]
fn test_candidate_shortage_reduces_the_iso_count() -> Result<()> {
    let (request, picker) = sector_request(30);
    let output = LabIsoPlanner::new(request, 3, vec![], vec![], &picker).run()?;
    assert!(output
        .warnings
        .iter()
        .any(|w| w.contains("only generate 2")));
    let mut builder = output.builder;
    assert_eq!(builder.number_isos_to_generate(), Some(2));

    let isos = builder.materialize_isos()?;
    assert_eq!(isos.len(), 2);
    let floats = |iso: &platebench_planner::LabIso| {
        iso.final_layout
            .positions
            .values()
            .filter(|p| p.position_type == PositionType::Floating)
            .count()
    };
    assert_eq!(floats(&isos[0]), 20);
    // The last ISO runs on the remaining ten candidates.
    assert_eq!(floats(&isos[1]), 10);
    Ok(())
}

#[test]
fn test_identical_runs_build_identical_plans() -> Result<()> {
    let run = || -> Result<String> {
        let (request, picker) = sector_request(60);
        let output = LabIsoPlanner::new(request, 3, vec![], vec![], &picker).run()?;
        serde_json::to_string(&output.builder)
            .map_err(|e| common_exception::ErrorCode::BadArguments(e.to_string()))
    };
    assert_eq!(run()?, run()?);
    Ok(())
}

#[test]
fn test_concentration_above_stock_is_rejected() {
    let request = helpers::request_96(vec![helpers::fixed_position(
        "A1", 1, 10.0, 100_000.0, 50_000.0,
    )]);
    let picker = InMemoryTubePicker::default();
    let error = LabIsoPlanner::new(request, 1, vec![], vec![], &picker)
        .run()
        .unwrap_err();
    assert_eq!(error.code(), 1002);
}

#[test]
fn test_prep_volume_can_exceed_every_plate_type() {
    // A passthrough preparation for 600 ul does not fit any candidate spec.
    let request = helpers::request_96(vec![helpers::fixed_position(
        "A1", 1, 600.0, 50_000.0, 50_000.0,
    )]);
    let picker = InMemoryTubePicker::new(vec![helpers::tube(1, "T1", "R1", 900.0, 50_000.0)]);
    let error = LabIsoPlanner::new(request, 1, vec![], vec![], &picker)
        .run()
        .unwrap_err();
    assert_eq!(error.code(), 1007);
}

#[test]
fn test_exhausted_floating_queue_is_an_error() {
    let (mut request, picker) = sector_request(20);
    request.pools_used_by_existing_isos = helpers::pool_set(1001, 20);
    let error = LabIsoPlanner::new(request, 1, vec![], vec![], &picker)
        .run()
        .unwrap_err();
    assert_eq!(error.code(), 1003);
}

#[test]
fn test_inconsistent_sector_values_are_rejected() {
    let mut request = helpers::request_384(vec![
        helpers::floating_position_at(pos("A1"), 1, 10.0, 50.0),
        helpers::floating_position_at(pos("A3"), 2, 20.0, 50.0),
    ]);
    request.molecule_design_pool_set = Some(helpers::pool_set(1001, 4));
    request.default_stock_concentration = Some(50_000.0);
    let picker = InMemoryTubePicker::default();
    let error = LabIsoPlanner::new(request, 1, vec![], vec![], &picker)
        .run()
        .unwrap_err();
    assert_eq!(error.code(), 1004);
}

#[test]
fn test_controls_are_planned_by_the_job_when_floatings_exist() -> Result<()> {
    let mut request = helpers::request_96(vec![
        helpers::fixed_position("A1", 9, 40.0, 500.0, 50_000.0),
        helpers::floating_position_at(pos("B1"), 1, 40.0, 500.0),
        helpers::floating_position_at(pos("C1"), 2, 40.0, 500.0),
    ]);
    request.molecule_design_pool_set = Some(helpers::pool_set(1001, 4));
    request.default_stock_concentration = Some(50_000.0);
    let mut tubes = helpers::tubes_for_pools(1001, 4, 50_000.0);
    tubes.push(helpers::tube(9, "T9", "R9", 100.0, 50_000.0));
    let picker = InMemoryTubePicker::new(tubes);

    let output = LabIsoPlanner::new(request, 2, vec![], vec![], &picker).run()?;
    let mut builder = output.builder;

    let control = builder.final_iso_layout.get_position(pos("A1")).unwrap();
    assert!(control.from_job);
    assert!(control.is_starting_well());
    for label in ["B1", "C1"] {
        let floating = builder.final_iso_layout.get_position(pos(label)).unwrap();
        assert!(!floating.from_job);
    }

    // Job stock racks are assigned once, shared by all ISOs.
    let (job_plates, job_racks) = builder.materialize_job_plates("1024_job")?;
    assert!(job_plates.is_empty());
    assert_eq!(job_racks, 1);

    let isos = builder.materialize_isos()?;
    assert_eq!(isos.len(), 2);
    for iso in &isos {
        // The per-ISO rack covers the two floating pools only.
        assert_eq!(iso.number_stock_racks, 1);
        let control = iso.final_layout.get_position(pos("A1")).unwrap();
        assert_eq!(control.stock_rack_marker.as_deref(), Some("s-1"));
    }
    Ok(())
}

#[test]
fn test_builder_attributes_are_single_set() -> Result<()> {
    let request = helpers::request_96(vec![helpers::mock_position("A1", 10.0)]);
    let picker = InMemoryTubePicker::default();
    let output = LabIsoPlanner::new(request, 1, vec![], vec![], &picker).run()?;
    let mut builder = output.builder;
    // The planner has set the count already.
    assert_eq!(builder.set_number_of_isos(2).unwrap_err().code(), 1012);
    // The candidates were never needed, so the first set succeeds and only
    // a second one is rejected.
    builder.set_floating_candidates(vec![])?;
    assert_eq!(
        builder.set_floating_candidates(vec![]).unwrap_err().code(),
        1012
    );
    Ok(())
}
