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

use common_layouts::labels::create_worklist_label;
use serde::Deserialize;
use serde::Serialize;

use crate::transfer::PlannedSampleDilution;
use crate::transfer::PlannedTransfer;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorklistKind {
    /// Buffer dilutions for one plate.
    Buffer,
    /// Well-to-well transfers, within one plate or between two plates.
    SampleTransfer,
    /// Sector moves executed rack-at-once.
    RackTransfer,
}

impl WorklistKind {
    fn label_part(&self) -> &'static str {
        match self {
            WorklistKind::Buffer => "buffer",
            WorklistKind::SampleTransfer => "transfer",
            WorklistKind::RackTransfer => "rack-transfer",
        }
    }
}

/// One executable worklist. Dilution worklists carry dilutions, the other
/// kinds carry transfers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannedWorklist {
    pub label: String,
    pub kind: WorklistKind,
    /// The plate the worklist writes into.
    pub target_plate_marker: String,
    /// The plate the worklist reads from; equal to the target for dilutions
    /// and intra-plate transfers.
    pub source_plate_marker: String,
    pub dilutions: Vec<PlannedSampleDilution>,
    pub transfers: Vec<PlannedTransfer>,
}

/// The ordered series of worklists for a planning run. Entries are appended
/// in execution order; the sequence number is part of each label.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorklistSeries {
    pub worklists: Vec<PlannedWorklist>,
}

impl WorklistSeries {
    pub fn new() -> Self {
        WorklistSeries::default()
    }

    pub fn add_dilution_worklist(
        &mut self,
        ticket_number: u32,
        plate_marker: &str,
        dilutions: Vec<PlannedSampleDilution>,
    ) {
        let label =
            create_worklist_label(ticket_number, self.worklists.len() + 1, "buffer");
        self.worklists.push(PlannedWorklist {
            label,
            kind: WorklistKind::Buffer,
            target_plate_marker: plate_marker.to_string(),
            source_plate_marker: plate_marker.to_string(),
            dilutions,
            transfers: vec![],
        });
    }

    pub fn add_transfer_worklist(
        &mut self,
        ticket_number: u32,
        source_plate_marker: &str,
        target_plate_marker: &str,
        transfers: Vec<PlannedTransfer>,
    ) {
        let kind = if transfers.iter().any(PlannedTransfer::is_rack_transfer) {
            WorklistKind::RackTransfer
        } else {
            WorklistKind::SampleTransfer
        };
        let label = create_worklist_label(
            ticket_number,
            self.worklists.len() + 1,
            kind.label_part(),
        );
        self.worklists.push(PlannedWorklist {
            label,
            kind,
            target_plate_marker: target_plate_marker.to_string(),
            source_plate_marker: source_plate_marker.to_string(),
            dilutions: vec![],
            transfers,
        });
    }
}
