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

mod transfer;
mod worklist;

pub use transfer::PlannedRackSampleTransfer;
pub use transfer::PlannedSampleDilution;
pub use transfer::PlannedSampleTransfer;
pub use transfer::PlannedTransfer;
pub use transfer::DILUENT_INFO;
pub use worklist::PlannedWorklist;
pub use worklist::WorklistKind;
pub use worklist::WorklistSeries;
