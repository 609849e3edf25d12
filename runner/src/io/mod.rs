//! Side-effecting collaborators: files, processes, git, and the comment API.

pub mod agent;
pub mod comment;
pub mod config;
pub mod git;
pub mod pr_context;
pub mod process;
pub mod prompt;
pub mod spec_store;
