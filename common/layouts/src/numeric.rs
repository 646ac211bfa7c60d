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

//! Volume and concentration arithmetic. All volumes are in ul, all
//! concentrations in nM. Comparisons are tolerance based because the values
//! are the result of chained divisions.

pub const EPSILON: f64 = 1e-6;

pub fn are_equal_values(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

pub fn is_larger_than(a: f64, b: f64) -> bool {
    a - b > EPSILON
}

pub fn is_smaller_than(a: f64, b: f64) -> bool {
    b - a > EPSILON
}

/// Rounds to the given number of decimal places (half away from zero).
pub fn round_to(value: f64, decimal_places: u32) -> f64 {
    let factor = 10f64.powi(decimal_places as i32);
    (value * factor).round() / factor
}

/// Rounds up to the given number of decimal places. Values already on the
/// grid stay untouched.
pub fn round_up(value: f64, decimal_places: u32) -> f64 {
    let factor = 10f64.powi(decimal_places as i32);
    ((value - EPSILON) * factor).ceil() / factor
}

/// The volume that has to be transferred from a source with
/// `source_concentration` to obtain `target_volume` at
/// `target_concentration`.
pub fn get_transfer_volume(
    source_concentration: f64,
    target_concentration: f64,
    target_volume: f64,
    dilution_factor: Option<f64>,
) -> f64 {
    let dilution_factor =
        dilution_factor.unwrap_or(source_concentration / target_concentration);
    target_volume / dilution_factor
}
