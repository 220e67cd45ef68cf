//! Terminal formatting for the CLI.
//!
//! Everything here writes to stdout; diagnostics from the library go through
//! `tracing` to stderr.

mod headers;
mod output;
mod status;
mod tables;

pub use headers::print_section_header;
pub use output::{format_duration, print_key_value};
pub use status::{print_error, print_info, print_success, print_warning, Status};
pub use tables::{
    print_analysis_tables, print_dependency_table, print_outcome_table, print_version_table,
};
