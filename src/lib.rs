//! Deimos is a declarative frame graph: a scheduling layer for rendering (or any
//! DAG-structured) workloads. Client code declares *passes* over *virtual resources*; the
//! graph compiles the declaration into an executable schedule with dead-pass culling, tight
//! transient resource lifetimes and versioned handles that make out-of-order writes a
//! detectable error instead of a silent hazard.
//!
//! The crate is backend-agnostic: resource kinds, the allocator and the execution context are
//! all caller-supplied. See the [`graph`] module documentation for a walkthrough, and the
//! [`Virtualizable`] trait for the contract a resource kind implements.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod graph;
pub mod prelude;

mod error;

pub use error::Error;
pub use graph::frame_graph::{FrameGraph, PassBuilder, PassResources, Phase, MAX_EXEC_CAPTURE};
pub use graph::pass::AccessFlags;
pub use graph::resource::Virtualizable;
pub use graph::virtual_resource::NodeId;
