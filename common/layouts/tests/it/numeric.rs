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
use common_layouts::get_stock_takeout_volume;
use common_layouts::get_transfer_volume;
use common_layouts::is_larger_than;
use common_layouts::is_smaller_than;
use common_layouts::round_to;
use common_layouts::round_up;

#[test]
fn test_tolerant_comparisons() {
    assert!(are_equal_values(0.1 + 0.2, 0.3));
    assert!(!is_larger_than(0.1 + 0.2, 0.3));
    assert!(!is_smaller_than(0.1 + 0.2, 0.3));
    assert!(is_larger_than(0.31, 0.3));
    assert!(is_smaller_than(0.29, 0.3));
}

#[test]
fn test_round_up_keeps_grid_values() {
    assert!(are_equal_values(round_up(0.4, 1), 0.4));
    assert!(are_equal_values(round_up(0.01, 1), 0.1));
    assert!(are_equal_values(round_up(1.23, 1), 1.3));
    assert!(are_equal_values(round_to(9.987, 2), 9.99));
}

#[test]
fn test_transfer_volume() {
    assert!(are_equal_values(
        get_transfer_volume(50_000.0, 50.0, 10.0, None),
        0.01
    ));
    assert!(are_equal_values(
        get_transfer_volume(1000.0, 50.0, 20.0, Some(20.0)),
        1.0
    ));
}

#[test]
fn test_stock_takeout_is_widened_to_the_grid() {
    // 10 ul at 50 nM from a 50 uM stock derives to 0.01 ul and is widened.
    assert!(are_equal_values(
        get_stock_takeout_volume(50_000.0, 10.0, 50.0, 0.1),
        0.1
    ));
    // 40 ul at 500 nM derives to 0.4 ul and stays untouched.
    assert!(are_equal_values(
        get_stock_takeout_volume(50_000.0, 40.0, 500.0, 0.1),
        0.4
    ));
    // The regime minimum binds last.
    assert!(are_equal_values(
        get_stock_takeout_volume(50_000.0, 10.0, 50.0, 1.0),
        1.0
    ));
}
