// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod error;
mod process;

pub use error::{JobError, JobResult, INTERNAL_ERROR_MESSAGE};
pub use process::{
    run_tool, ProcessError, ToolCommand, ToolOutput, INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER,
};

pub const CRATE_NAME: &str = "sqc-core";
