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

use common_layouts::are_equal_values;
use common_layouts::Pool;
use common_layouts::PoolId;
use platebench_planner::ContainerArena;
use platebench_planner::PlateLocation;

use crate::helpers::pos;

#[test]
fn test_volume_propagation_through_the_chain() -> common_exception::Result<()> {
    let mut arena = ContainerArena::new();
    let final_a = arena.new_final_well(pos("A1"), Pool::Fixed(PoolId(1)), 10.0, 100.0, 1000.0, 1.0);
    let final_b = arena.new_final_well(pos("B1"), Pool::Fixed(PoolId(1)), 50.0, 500.0, 1000.0, 1.0);

    let prep = arena.new_prep_from(final_a, 1000.0, 10.0);
    arena.attach_parent(final_a, prep)?;
    // 10 ul at a tenth of the source concentration: 1 ul transfer.
    assert!(are_equal_values(arena.targets(prep)[&final_a], 1.0));
    assert!(are_equal_values(arena.full_volume(prep), 11.0));

    arena.attach_parent(final_b, prep)?;
    assert!(are_equal_values(arena.targets(prep)[&final_b], 25.0));
    assert!(are_equal_values(arena.full_volume(prep), 36.0));

    // A grandparent sees the grown child volume.
    let grand = arena.new_prep_from(prep, 10_000.0, 10.0);
    arena.attach_parent(prep, grand)?;
    assert!(are_equal_values(arena.targets(grand)[&prep], 3.6));
    // The chain still reports the stock it started from.
    assert!(are_equal_values(arena.stock_concentration(final_a), 1000.0));

    // Raising the child's dead volume re-propagates upwards.
    arena.adjust_dead_volume_by(prep, 5.0)?;
    assert!(are_equal_values(arena.full_volume(prep), 41.0));
    assert!(are_equal_values(arena.targets(grand)[&prep], 4.1));
    Ok(())
}

#[test]
fn test_transfers_are_clamped_to_the_minimum() -> common_exception::Result<()> {
    let mut arena = ContainerArena::new();
    // The derived transfer would be 0.1 ul; the clamp widens it to 2 ul.
    let target = arena.new_final_well(pos("A1"), Pool::Fixed(PoolId(7)), 10.0, 10.0, 1000.0, 2.0);
    let prep = arena.new_prep_from(target, 1000.0, 10.0);
    arena.attach_parent(target, prep)?;
    assert!(are_equal_values(arena.targets(prep)[&target], 2.0));
    Ok(())
}

#[test]
fn test_attach_rejects_weaker_parents() {
    let mut arena = ContainerArena::new();
    let target = arena.new_final_well(pos("A1"), Pool::Fixed(PoolId(1)), 10.0, 100.0, 1000.0, 1.0);
    let weaker = arena.new_prep_from(target, 50.0, 10.0);
    let result = arena.attach_parent(target, weaker);
    assert_eq!(result.unwrap_err().code(), 1008);
}

#[test]
fn test_cloning_freezes_both_sides() -> common_exception::Result<()> {
    let mut arena = ContainerArena::new();
    let target = arena.new_final_well(pos("A1"), Pool::Fixed(PoolId(1)), 10.0, 100.0, 1000.0, 1.0);
    let prep = arena.new_prep_from(target, 1000.0, 10.0);
    arena.attach_parent(target, prep)?;

    let clone = arena.clone_subtree(prep)?;
    assert!(!arena.allows_modification(prep));
    assert!(!arena.allows_modification(clone));
    // The clone replicates the descendant structure.
    assert_eq!(arena.descendants(clone).len(), 1);
    let cloned_child = arena.descendants(clone)[0];
    assert!(are_equal_values(arena.targets(clone)[&cloned_child], 1.0));

    let result = arena.adjust_dead_volume_by(prep, 1.0);
    assert_eq!(result.unwrap_err().code(), 1009);
    Ok(())
}

#[test]
fn test_get_clones_needs_a_real_copy_number() {
    let mut arena = ContainerArena::new();
    let target = arena.new_final_well(pos("A1"), Pool::Fixed(PoolId(1)), 10.0, 100.0, 1000.0, 1.0);
    assert_eq!(arena.get_clones(target, 1).unwrap_err().code(), 1013);
}

#[test]
fn test_intraplate_ancestor_depth() -> common_exception::Result<()> {
    let mut arena = ContainerArena::new();
    let target = arena.new_final_well(pos("A1"), Pool::Fixed(PoolId(1)), 10.0, 10.0, 1000.0, 1.0);
    let prep = arena.new_prep_from(target, 100.0, 10.0);
    let grand = arena.new_prep_from(target, 1000.0, 10.0);
    arena.attach_parent(target, prep)?;
    arena.attach_parent(prep, grand)?;
    arena.set_location(grand, PlateLocation::Well(pos("A2")), "p-1")?;
    arena.set_location(prep, PlateLocation::Well(pos("A3")), "p-1")?;

    assert_eq!(arena.intraplate_ancestor_count(grand), 0);
    // Serial dilution on one plate: the child runs one step after its
    // parent.
    assert_eq!(arena.intraplate_ancestor_count(prep), 1);
    // The final plate well starts a new plate.
    assert_eq!(arena.intraplate_ancestor_count(target), 0);
    Ok(())
}
