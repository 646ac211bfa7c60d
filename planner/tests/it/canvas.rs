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

use common_layouts::Pool;
use common_layouts::PoolId;
use common_layouts::SHAPE_96;
use platebench_planner::Canvas;
use platebench_planner::PlateLocation;
use pretty_assertions::assert_eq;

use crate::helpers::pos;

#[test]
fn test_position_canvas_keeps_pools_in_their_rows() -> common_exception::Result<()> {
    let mut canvas = Canvas::new_position(SHAPE_96);
    let pool_a = Some(Pool::Fixed(PoolId(1)));
    let pool_b = Some(Pool::Fixed(PoolId(2)));

    assert_eq!(canvas.place(pool_a, None)?, PlateLocation::Well(pos("A1")));
    assert_eq!(canvas.place(pool_a, None)?, PlateLocation::Well(pos("A2")));
    // A new pool consumes the lowest fully empty row.
    assert_eq!(canvas.place(pool_b, None)?, PlateLocation::Well(pos("B1")));
    // The first pool returns to its row.
    assert_eq!(canvas.place(pool_a, None)?, PlateLocation::Well(pos("A3")));
    Ok(())
}

#[test]
fn test_position_canvas_rejects_occupied_locations() -> common_exception::Result<()> {
    let mut canvas = Canvas::new_position(SHAPE_96);
    canvas.place(None, Some(PlateLocation::Well(pos("A1"))))?;
    let result = canvas.place(None, Some(PlateLocation::Well(pos("A1"))));
    assert_eq!(result.unwrap_err().code(), 1010);
    Ok(())
}

#[test]
fn test_sector_canvas_takes_the_smallest_free_sector() -> common_exception::Result<()> {
    let mut canvas = Canvas::new_sector(4);
    assert_eq!(canvas.place(None, None)?, PlateLocation::Sector(0));
    assert_eq!(
        canvas.place(None, Some(PlateLocation::Sector(2)))?,
        PlateLocation::Sector(2)
    );
    assert_eq!(canvas.place(None, None)?, PlateLocation::Sector(1));
    assert_eq!(canvas.place(None, None)?, PlateLocation::Sector(3));
    assert!(!canvas.has_empty_locations());
    assert_eq!(canvas.place(None, None).unwrap_err().code(), 1011);
    Ok(())
}

#[test]
fn test_preferred_location_check() -> common_exception::Result<()> {
    let mut canvas = Canvas::new_sector(4);
    assert!(canvas.is_empty_location(PlateLocation::Sector(2)));
    canvas.place(None, Some(PlateLocation::Sector(2)))?;
    assert!(!canvas.is_empty_location(PlateLocation::Sector(2)));
    // Locations of the wrong kind are never empty.
    assert!(!canvas.is_empty_location(PlateLocation::Well(pos("A1"))));
    Ok(())
}
