//! Re-exports the most commonly used deimos types.

pub use crate::graph::frame_graph::{FrameGraph, PassBuilder, PassResources, Phase};
pub use crate::graph::pass::AccessFlags;
pub use crate::graph::resource::Virtualizable;
pub use crate::graph::virtual_resource::NodeId;
pub use crate::Error;
