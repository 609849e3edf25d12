//! Pure logic for the runner: checklist parsing, the report model, and the
//! verification marker.
//!
//! Nothing here touches the filesystem, processes, or the clock; timestamps
//! are passed in by the caller.

pub mod checklist;
pub mod report;
pub mod types;
pub mod verdict;
