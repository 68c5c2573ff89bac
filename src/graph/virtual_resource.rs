use crate::graph::pass::PassIndex;
use crate::graph::resource::ResourceId;

/// Handle to one *version* of a virtual resource in a [`FrameGraph`](crate::FrameGraph).
///
/// Handles are cheap to copy and compare. Every write declaration on a resource that was not
/// created in the same pass *renames* it: the old handle becomes permanently stale and the
/// write returns a fresh handle at the next version. Use
/// [`FrameGraph::is_valid()`](crate::FrameGraph::is_valid) to test whether a handle still
/// refers to the newest version.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A single version of a virtual resource. Nodes only ever accumulate; renaming a resource
/// appends a new node pointing at the same entry with a higher version.
#[derive(Debug)]
pub(crate) struct ResourceNode {
    pub(crate) name: String,
    pub(crate) id: NodeId,
    /// Back-reference to the entry this node is a version of.
    pub(crate) resource: ResourceId,
    /// The entry version this node captured when it was created.
    pub(crate) version: u32,
    /// The pass whose write produced this version, filled in during compile.
    pub(crate) producer: Option<PassIndex>,
    /// Number of passes reading this version, computed during compile.
    pub(crate) ref_count: u32,
}

impl ResourceNode {
    pub(crate) fn new(name: String, id: NodeId, resource: ResourceId, version: u32) -> Self {
        Self {
            name,
            id,
            resource,
            version,
            producer: None,
            ref_count: 0,
        }
    }
}
