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

use std::fmt;

pub type Result<T> = std::result::Result<T, ErrorCode>;

/// A structured error with a stable numeric code and a human readable
/// message. Constructors for the individual codes are generated by the
/// `build_exceptions!` macro in `exception_code.rs`.
#[derive(Clone, PartialEq, Eq)]
pub struct ErrorCode {
    code: u16,
    display_text: String,
}

impl ErrorCode {
    pub fn create(code: u16, display_text: String) -> ErrorCode {
        ErrorCode { code, display_text }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> String {
        self.display_text.clone()
    }

    /// Appends context to the message, keeping the code.
    pub fn add_message_back(mut self, msg: impl AsRef<str>) -> Self {
        self.display_text = format!("{}{}", self.display_text, msg.as_ref());
        self
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Code: {}, displayText = {}.",
            self.code, self.display_text
        )
    }
}

impl fmt::Debug for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Code: {}, displayText = {}.",
            self.code, self.display_text
        )
    }
}

impl std::error::Error for ErrorCode {}
