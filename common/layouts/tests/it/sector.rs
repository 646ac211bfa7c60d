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

use common_layouts::base_position;
use common_layouts::sector_of;
use common_layouts::RackPosition;
use common_layouts::RackSectorTranslator;
use common_layouts::TranslationBehaviour;
use common_layouts::SHAPE_384;
use common_layouts::SHAPE_96;
use pretty_assertions::assert_eq;

#[test]
fn test_sector_arithmetic() {
    // B2 of a 384 plate: row 1, column 1 -> sector 3, block A1.
    let position = RackPosition::new(1, 1);
    assert_eq!(sector_of(position, 4), 3);
    assert_eq!(base_position(position), RackPosition::new(0, 0));
    assert_eq!(sector_of(position, 1), 0);
}

#[test]
fn test_translation_behaviours() {
    assert_eq!(
        RackSectorTranslator::get_translation_behaviour(4, &SHAPE_384, &SHAPE_96),
        TranslationBehaviour::ManyToOne
    );
    assert_eq!(
        RackSectorTranslator::get_translation_behaviour(4, &SHAPE_96, &SHAPE_384),
        TranslationBehaviour::OneToMany
    );
    assert_eq!(
        RackSectorTranslator::get_translation_behaviour(4, &SHAPE_384, &SHAPE_384),
        TranslationBehaviour::ManyToMany
    );
    assert_eq!(
        RackSectorTranslator::get_translation_behaviour(1, &SHAPE_96, &SHAPE_96),
        TranslationBehaviour::OneToOne
    );
}

#[test]
fn test_sector_to_sector_translation() -> common_exception::Result<()> {
    // Sector 0 position C5 (row 2, column 4) moved to sector 3.
    let translator = RackSectorTranslator::new(4, 0, 3, TranslationBehaviour::ManyToMany);
    let translated = translator.translate(RackPosition::new(2, 4))?;
    assert_eq!(translated, RackPosition::new(3, 5));
    Ok(())
}

#[test]
fn test_condense_and_spread_translations() -> common_exception::Result<()> {
    // 384 sector 1 well A2 condenses onto the 96 well A1.
    let condense = RackSectorTranslator::new(4, 1, 0, TranslationBehaviour::ManyToOne);
    assert_eq!(
        condense.translate(RackPosition::new(0, 1))?,
        RackPosition::new(0, 0)
    );
    // 96 well B3 spreads into 384 sector 2 well D5.
    let spread = RackSectorTranslator::new(4, 0, 2, TranslationBehaviour::OneToMany);
    assert_eq!(
        spread.translate(RackPosition::new(1, 2))?,
        RackPosition::new(3, 4)
    );
    Ok(())
}

#[test]
fn test_translation_rejects_foreign_sector_positions() {
    let translator = RackSectorTranslator::new(4, 0, 1, TranslationBehaviour::ManyToMany);
    // B2 belongs to sector 3, not sector 0.
    assert!(translator.translate(RackPosition::new(1, 1)).is_err());
}
