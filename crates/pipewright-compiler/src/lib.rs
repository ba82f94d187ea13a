//! Job graph compilation for Pipewright.
//!
//! Turns job definitions and resolved settings into a validated graph of
//! job nodes, then registers that graph with an execution engine.

pub mod builder;
pub mod commands;
pub mod dag;
pub mod git;
pub mod plan;

pub use builder::{BuildContext, build_node};
pub use dag::{JobGraph, RegisteredGraph, RegisteredNode};
pub use git::GitCli;
pub use plan::{ExecutionPlan, PlanRecorder, PlannedNode};
