//! Pass nodes and the deferred execution callbacks they own.

use anyhow::Result;

use crate::graph::frame_graph::PassResources;
use crate::graph::virtual_resource::NodeId;

/// Dense index of a pass in declaration order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PassIndex(pub(crate) u32);

impl PassIndex {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Caller-defined bits attached to a read or write declaration.
///
/// The graph does not interpret them; they are forwarded verbatim to the resource kind's
/// [`pre_read`](crate::Virtualizable::pre_read) / [`pre_write`](crate::Virtualizable::pre_write)
/// hooks when the declaring pass executes. Flags are part of a declaration's identity within a
/// single pass: reading the same handle with two different flag values records two
/// declarations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AccessFlags(pub u32);

impl AccessFlags {
    /// Used by declarations made without explicit flags.
    pub const IGNORED: AccessFlags = AccessFlags(u32::MAX);
}

impl Default for AccessFlags {
    fn default() -> Self {
        AccessFlags::IGNORED
    }
}

/// A single read or write declaration of a pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct AccessDeclaration {
    pub(crate) id: NodeId,
    pub(crate) flags: AccessFlags,
}

/// Type-erased pass payload: the user's data object plus the deferred execution closure.
pub(crate) trait PassExecutor<'cb, C, A> {
    fn execute(
        &mut self,
        resources: &mut PassResources<'_, 'cb, C, A>,
        context: &mut C,
    ) -> Result<()>;
}

pub(crate) type BoxedPassFn<'cb, C, A> = Box<dyn PassExecutor<'cb, C, A> + 'cb>;

/// Concrete pass payload for [`FrameGraph::add_callback_pass`](crate::FrameGraph::add_callback_pass).
pub(crate) struct CallbackPass<D, E> {
    pub(crate) data: D,
    pub(crate) exec: E,
}

impl<'cb, C, A, D, E> PassExecutor<'cb, C, A> for CallbackPass<D, E>
where
    E: for<'a> FnMut(&D, &mut PassResources<'a, 'cb, C, A>, &mut C) -> Result<()>,
{
    fn execute(
        &mut self,
        resources: &mut PassResources<'_, 'cb, C, A>,
        context: &mut C,
    ) -> Result<()> {
        let Self { data, exec } = self;
        (exec)(data, resources, context)
    }
}

/// One declared pass: its access sets, culling state and deferred executor.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) struct PassNode<'cb, C, A> {
    pub(crate) name: String,
    pub(crate) id: PassIndex,
    #[derivative(Debug = "ignore")]
    pub(crate) exec: Option<BoxedPassFn<'cb, C, A>>,
    pub(crate) creates: Vec<NodeId>,
    pub(crate) reads: Vec<AccessDeclaration>,
    pub(crate) writes: Vec<AccessDeclaration>,
    pub(crate) has_side_effect: bool,
    pub(crate) ref_count: u32,
}

impl<'cb, C, A> PassNode<'cb, C, A> {
    pub(crate) fn new(name: String, id: PassIndex) -> Self {
        Self {
            name,
            id,
            exec: None,
            creates: Vec::new(),
            reads: Vec::new(),
            writes: Vec::new(),
            has_side_effect: false,
            ref_count: 0,
        }
    }

    pub(crate) fn creates(&self, id: NodeId) -> bool {
        self.creates.contains(&id)
    }

    pub(crate) fn reads(&self, id: NodeId) -> bool {
        self.reads.iter().any(|decl| decl.id == id)
    }

    pub(crate) fn writes(&self, id: NodeId) -> bool {
        self.writes.iter().any(|decl| decl.id == id)
    }

    /// True if the pass declared any form of access to the node.
    pub(crate) fn declares(&self, id: NodeId) -> bool {
        self.creates(id) || self.reads(id) || self.writes(id)
    }

    /// A pass survives culling if something still references its output, or if it was marked
    /// as observable.
    pub(crate) fn can_execute(&self) -> bool {
        self.ref_count > 0 || self.has_side_effect
    }
}
