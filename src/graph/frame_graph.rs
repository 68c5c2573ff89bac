//! The frame graph core: the declaration façade, the compile step and the execute walk.

use std::mem;

use anyhow::Result;

use crate::error::Error;
use crate::graph::pass::{
    AccessDeclaration, AccessFlags, CallbackPass, PassExecutor, PassIndex, PassNode,
};
use crate::graph::resource::{
    ResourceEntry, ResourceId, ResourceRegistry, ResourceType, Virtualizable, INITIAL_VERSION,
};
use crate::graph::virtual_resource::{NodeId, ResourceNode};

/// Upper bound, in bytes, on the state an execution callback may capture. Larger captures are
/// rejected with [`Error::CaptureTooLarge`]; move bulky state into the context instead.
pub const MAX_EXEC_CAPTURE: usize = 1024;

/// Lifecycle phase of a [`FrameGraph`]. Declarations are legal only during setup; compile and
/// execute each happen exactly once, in that order.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Setup,
    Compiled,
    Executed,
}

/// A single-use frame graph.
///
/// `C` is the caller's context type and `A` the caller's allocator type; the graph does not
/// interpret either, it only forwards them to resource kinds and execution callbacks during
/// [`execute()`](Self::execute). The `'cb` lifetime bounds the execution callbacks, so they
/// may borrow from the surrounding scope.
///
/// See the [`graph`](crate::graph) module documentation for a usage walkthrough.
pub struct FrameGraph<'cb, C = (), A = ()> {
    pass_nodes: Vec<PassNode<'cb, C, A>>,
    resource_nodes: Vec<ResourceNode>,
    registry: ResourceRegistry<C, A>,
    phase: Phase,
}

impl<C, A> Default for FrameGraph<'_, C, A> {
    /// Create an empty frame graph in the setup phase.
    fn default() -> Self {
        Self {
            pass_nodes: Vec::new(),
            resource_nodes: Vec::new(),
            registry: ResourceRegistry::new(),
            phase: Phase::Setup,
        }
    }
}

impl<'cb, C, A> FrameGraph<'cb, C, A> {
    /// Create an empty frame graph in the setup phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capacity hint for the pass and resource tables. Has no observable effect.
    pub fn reserve(&mut self, num_passes: usize, num_resources: usize) {
        self.pass_nodes.reserve(num_passes);
        self.resource_nodes.reserve(num_resources);
        self.registry.reserve(num_resources);
    }

    /// Number of declared passes, culled or not.
    pub fn num_passes(&self) -> usize {
        self.pass_nodes.len()
    }

    /// Number of declared virtual resources (renamed versions excluded).
    pub fn num_resources(&self) -> usize {
        self.registry.len()
    }

    /// Declare a pass.
    ///
    /// `setup` runs immediately: it receives a [`PassBuilder`] scoped to this pass plus a
    /// default-constructed `D` to publish handles in. `exec` is deferred until
    /// [`execute()`](Self::execute) and receives the declared data, a [`PassResources`] view
    /// restricted to the declared accesses, and the caller context. The declared data is
    /// returned so later passes can consume the published handles.
    ///
    /// # Errors
    /// * Fails with [`Error::WrongPhase`] if the graph was already compiled.
    /// * Fails with [`Error::CaptureTooLarge`] if `exec` captures [`MAX_EXEC_CAPTURE`] bytes
    ///   or more.
    /// * Propagates any error returned by `setup`.
    pub fn add_callback_pass<D, S, E>(
        &mut self,
        name: impl Into<String>,
        setup: S,
        exec: E,
    ) -> Result<D>
    where
        D: Default + Clone + 'cb,
        S: FnOnce(&mut PassBuilder<'_, 'cb, C, A>, &mut D) -> Result<()>,
        E: for<'a> FnMut(&D, &mut PassResources<'a, 'cb, C, A>, &mut C) -> Result<()> + 'cb,
    {
        self.expect_phase(Phase::Setup, "add_callback_pass")?;
        let name = name.into();
        let size = mem::size_of::<E>();
        if size >= MAX_EXEC_CAPTURE {
            return Err(Error::CaptureTooLarge {
                pass: name,
                size,
                limit: MAX_EXEC_CAPTURE,
            }
            .into());
        }

        let id = PassIndex(self.pass_nodes.len() as u32);
        self.pass_nodes.push(PassNode::new(name, id));

        let mut data = D::default();
        {
            let mut builder = PassBuilder {
                graph: &mut *self,
                pass: id,
            };
            setup(&mut builder, &mut data)?;
        }

        self.pass_nodes[id.index()].exec = Some(Box::new(CallbackPass {
            data: data.clone(),
            exec,
        }));
        Ok(data)
    }

    /// Import a caller-owned resource into the graph. The graph will never create or destroy
    /// it, but passes may read and write it; writing an imported resource marks the writing
    /// pass as having a side effect.
    ///
    /// # Errors
    /// * Fails with [`Error::WrongPhase`] if the graph was already compiled.
    pub fn import<T>(
        &mut self,
        name: impl Into<String>,
        descriptor: T::Desc,
        resource: T,
    ) -> Result<NodeId>
    where
        T: Virtualizable<C, A>,
    {
        self.expect_phase(Phase::Setup, "import")?;
        Ok(self.create_virtual(ResourceType::Imported, name.into(), descriptor, resource))
    }

    /// True if `id` still refers to the newest version of its resource. Renamed-away and
    /// foreign handles are invalid.
    pub fn is_valid(&self, id: NodeId) -> bool {
        match self.node(id) {
            Ok(node) => node.version == self.registry.get(node.resource).version(),
            Err(_) => false,
        }
    }

    /// Typed access to the descriptor a resource was declared with.
    ///
    /// # Errors
    /// * Fails with [`Error::WrongKind`] if the resource is not of kind `T`.
    /// * Fails with [`Error::NodeNotFound`] if the handle does not belong to this graph.
    pub fn get_descriptor<T>(&self, id: NodeId) -> Result<&T::Desc>
    where
        T: Virtualizable<C, A>,
    {
        let node = self.node(id)?;
        let entry = self.registry.get(node.resource);
        entry
            .descriptor::<T>()
            .ok_or_else(|| anyhow::Error::from(Error::WrongKind(node.name.clone())))
    }

    /// Cull passes and resources that no side-effecting pass consumes, then compute the
    /// lifetime endpoints of every resource entry.
    ///
    /// # Errors
    /// * Fails with [`Error::WrongPhase`] unless the graph is in the setup phase.
    pub fn compile(&mut self) -> Result<()> {
        self.expect_phase(Phase::Setup, "compile")?;

        let Self {
            pass_nodes,
            resource_nodes,
            registry,
            ..
        } = self;

        // Seed reference counts: passes are referenced by their writes, resource versions by
        // their readers. Producers of each version are recorded along the way.
        for pass in pass_nodes.iter_mut() {
            pass.ref_count = pass.writes.len() as u32;
            for read in &pass.reads {
                resource_nodes[read.id.index()].ref_count += 1;
            }
            for write in &pass.writes {
                resource_nodes[write.id.index()].producer = Some(pass.id);
            }
        }

        // Cull: flood from unreferenced resource versions back through their producers.
        // Side-effecting passes stop the flood.
        let mut unreferenced: Vec<NodeId> = resource_nodes
            .iter()
            .filter(|node| node.ref_count == 0)
            .map(|node| node.id)
            .collect();
        while let Some(id) = unreferenced.pop() {
            let Some(producer) = resource_nodes[id.index()].producer else {
                continue;
            };
            let producer = &mut pass_nodes[producer.index()];
            if producer.has_side_effect {
                continue;
            }
            debug_assert!(producer.ref_count >= 1);
            producer.ref_count -= 1;
            if producer.ref_count == 0 {
                trace!("Culled pass `{}`", producer.name);
                for read in &producer.reads {
                    let node = &mut resource_nodes[read.id.index()];
                    node.ref_count -= 1;
                    if node.ref_count == 0 {
                        unreferenced.push(node.id);
                    }
                }
            }
        }

        // Lifetimes: in declaration order, the first surviving pass that creates an entry
        // realizes it, the last surviving pass that touches any version releases it.
        for pass in pass_nodes.iter() {
            if pass.ref_count == 0 {
                continue;
            }
            for id in &pass.creates {
                let resource = resource_nodes[id.index()].resource;
                registry.get_mut(resource).producer = Some(pass.id);
            }
            for decl in pass.writes.iter().chain(pass.reads.iter()) {
                let resource = resource_nodes[decl.id.index()].resource;
                registry.get_mut(resource).last = Some(pass.id);
            }
        }

        debug!(
            "Compiled frame graph: {}/{} passes live",
            self.pass_nodes.iter().filter(|p| p.can_execute()).count(),
            self.pass_nodes.len()
        );
        self.phase = Phase::Compiled;
        Ok(())
    }

    /// Walk the passes in declaration order: realize created transients, fire the pre-access
    /// hooks, invoke the execution callbacks, and release transients after their last use.
    ///
    /// # Errors
    /// * Fails with [`Error::WrongPhase`] unless the graph was compiled first.
    /// * Propagates the first execution callback error, wrapped with the pass name. Transient
    ///   resources whose lifetime ended at or before the failing pass are still released.
    pub fn execute(&mut self, context: &mut C, allocator: &mut A) -> Result<()> {
        self.expect_phase(Phase::Compiled, "execute")?;
        self.phase = Phase::Executed;

        for index in 0..self.pass_nodes.len() {
            let current = PassIndex(index as u32);
            if !self.pass_nodes[index].can_execute() {
                trace!("Skipping culled pass `{}`", self.pass_nodes[index].name);
                continue;
            }

            // Realize the transients this pass creates.
            for i in 0..self.pass_nodes[index].creates.len() {
                let id = self.pass_nodes[index].creates[i];
                let node = &self.resource_nodes[id.index()];
                let entry = self.registry.get_mut(node.resource);
                let detail = entry.describe();
                if detail.is_empty() {
                    trace!("Realizing transient resource `{}`", node.name);
                } else {
                    trace!("Realizing transient resource `{}` ({})", node.name, detail);
                }
                entry.create(allocator);
            }

            // Fire the pre-access hooks with the declared flags.
            for i in 0..self.pass_nodes[index].reads.len() {
                let decl = self.pass_nodes[index].reads[i];
                let resource = self.resource_nodes[decl.id.index()].resource;
                self.registry.get_mut(resource).pre_read(decl.flags, context);
            }
            for i in 0..self.pass_nodes[index].writes.len() {
                let decl = self.pass_nodes[index].writes[i];
                let resource = self.resource_nodes[decl.id.index()].resource;
                self.registry
                    .get_mut(resource)
                    .pre_write(decl.flags, context);
            }

            // Run the deferred executor. The box is taken out of the pass node so the
            // resources view can borrow the graph; the graph is single-use, so it is not
            // put back.
            if let Some(mut exec) = self.pass_nodes[index].exec.take() {
                trace!("Executing pass `{}`", self.pass_nodes[index].name);
                let mut resources = PassResources {
                    graph: &mut *self,
                    pass: current,
                };
                if let Err(err) = exec.execute(&mut resources, context) {
                    let name = self.pass_nodes[index].name.clone();
                    self.release_through(current, allocator);
                    return Err(err.context(format!("Execution of pass `{}` failed", name)));
                }
            }

            // Release transients whose last consumer just ran.
            for entry in self.registry.entries_mut() {
                if entry.last == Some(current) && entry.is_transient() && entry.is_realized() {
                    trace!("Releasing transient resource #{}", entry.id().0);
                    entry.destroy(allocator);
                }
            }
        }

        Ok(())
    }

    /// Cleanup after a failed executor: release every realized transient whose lifetime ends
    /// at or before the aborting pass. Later transients are left to their own teardown, since
    /// their last consumer never ran.
    fn release_through(&mut self, pass: PassIndex, allocator: &mut A) {
        for entry in self.registry.entries_mut() {
            if entry.is_transient()
                && entry.is_realized()
                && entry.last.map_or(false, |last| last.0 <= pass.0)
            {
                entry.destroy(allocator);
            }
        }
    }

    fn expect_phase(&self, expected: Phase, operation: &'static str) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(Error::WrongPhase {
                operation,
                phase: self.phase,
            }
            .into())
        }
    }

    fn node(&self, id: NodeId) -> Result<&ResourceNode> {
        self.resource_nodes
            .get(id.index())
            .ok_or_else(|| anyhow::Error::from(Error::NodeNotFound))
    }

    pub(crate) fn entry(&self, id: NodeId) -> Result<&ResourceEntry<C, A>> {
        let node = self.node(id)?;
        Ok(self.registry.get(node.resource))
    }

    fn create_virtual<T>(
        &mut self,
        ty: ResourceType,
        name: String,
        descriptor: T::Desc,
        resource: T,
    ) -> NodeId
    where
        T: Virtualizable<C, A>,
    {
        let resource_id = self.registry.add(ty, descriptor, resource);
        self.create_resource_node(name, resource_id, INITIAL_VERSION)
    }

    fn create_resource_node(&mut self, name: String, resource: ResourceId, version: u32) -> NodeId {
        let id = NodeId(self.resource_nodes.len() as u32);
        self.resource_nodes
            .push(ResourceNode::new(name, id, resource, version));
        id
    }

    /// Advance the entry version and mint a node for it; the heart of rename-on-write.
    fn clone_node(&mut self, id: NodeId) -> Result<NodeId> {
        let (name, resource) = {
            let node = self.node(id)?;
            (node.name.clone(), node.resource)
        };
        let version = self.registry.get_mut(resource).bump_version();
        Ok(self.create_resource_node(name, resource, version))
    }
}

/// Scoped declaration interface handed to a pass's setup callback. Everything a pass touches
/// must be announced here; undeclared access is rejected during execution.
pub struct PassBuilder<'a, 'cb, C, A> {
    graph: &'a mut FrameGraph<'cb, C, A>,
    pass: PassIndex,
}

impl<'a, 'cb, C, A> PassBuilder<'a, 'cb, C, A> {
    /// Declare the creation of a transient resource. The physical resource is realized during
    /// execute, right before the first pass that needs it.
    pub fn create<T>(&mut self, name: impl Into<String>, descriptor: T::Desc) -> NodeId
    where
        T: Virtualizable<C, A>,
    {
        let id = self.graph.create_virtual(
            ResourceType::Transient,
            name.into(),
            descriptor,
            T::default(),
        );
        self.pass_node_mut().creates.push(id);
        id
    }

    /// Declare a read. Equivalent to [`read_with_flags()`](Self::read_with_flags) with
    /// [`AccessFlags::IGNORED`].
    ///
    /// # Errors
    /// See [`read_with_flags()`](Self::read_with_flags).
    pub fn read(&mut self, id: NodeId) -> Result<NodeId> {
        self.read_with_flags(id, AccessFlags::IGNORED)
    }

    /// Declare a read with caller-defined flags. Re-declaring the same `(id, flags)` pair is
    /// a no-op returning the same handle.
    ///
    /// # Errors
    /// * Fails with [`Error::InvalidHandle`] if the handle was renamed away by a write.
    /// * Fails with [`Error::ConflictingAccess`] if this pass already creates or writes `id`.
    pub fn read_with_flags(&mut self, id: NodeId, flags: AccessFlags) -> Result<NodeId> {
        self.check_valid(id)?;
        let pass = self.pass_node();
        if pass.creates(id) || pass.writes(id) {
            return Err(Error::ConflictingAccess {
                pass: pass.name.clone(),
                name: self.graph.node(id)?.name.clone(),
            }
            .into());
        }
        let decl = AccessDeclaration { id, flags };
        let pass = self.pass_node_mut();
        if !pass.reads.contains(&decl) {
            pass.reads.push(decl);
        }
        Ok(id)
    }

    /// Declare a write. Equivalent to [`write_with_flags()`](Self::write_with_flags) with
    /// [`AccessFlags::IGNORED`].
    ///
    /// # Errors
    /// See [`write_with_flags()`](Self::write_with_flags).
    pub fn write(&mut self, id: NodeId) -> Result<NodeId> {
        self.write_with_flags(id, AccessFlags::IGNORED)
    }

    /// Declare a write with caller-defined flags and return the handle to use from here on.
    ///
    /// Writing a resource created in this same pass returns `id` unchanged. Writing anything
    /// else counts as a read followed by a *rename*: the entry version advances, `id` becomes
    /// stale, and the fresh handle is returned. Stale handles catch resources modified in
    /// undefined order, and the rename chain fixes the execution order of the writers.
    /// Writing an imported resource marks this pass as having a side effect.
    ///
    /// # Errors
    /// * Fails with [`Error::InvalidHandle`] if the handle was renamed away by an earlier
    ///   write.
    pub fn write_with_flags(&mut self, id: NodeId, flags: AccessFlags) -> Result<NodeId> {
        self.check_valid(id)?;
        if self.graph.entry(id)?.is_imported() {
            self.set_side_effect();
        }
        let decl = AccessDeclaration { id, flags };
        if self.pass_node().creates(id) {
            let pass = self.pass_node_mut();
            if !pass.writes.contains(&decl) {
                pass.writes.push(decl);
            }
            Ok(id)
        } else {
            {
                let pass = self.pass_node_mut();
                if !pass.reads.contains(&decl) {
                    pass.reads.push(decl);
                }
            }
            let renamed = self.graph.clone_node(id)?;
            self.pass_node_mut().writes.push(AccessDeclaration {
                id: renamed,
                flags,
            });
            Ok(renamed)
        }
    }

    /// Mark this pass as observable from outside the graph, so it survives culling even when
    /// nothing consumes its outputs.
    pub fn set_side_effect(&mut self) -> &mut Self {
        self.pass_node_mut().has_side_effect = true;
        self
    }

    fn check_valid(&self, id: NodeId) -> Result<()> {
        let node = self.graph.node(id)?;
        let current = self.graph.registry.get(node.resource).version();
        if node.version == current {
            Ok(())
        } else {
            Err(Error::InvalidHandle {
                name: node.name.clone(),
                version: node.version,
                current,
            }
            .into())
        }
    }

    fn pass_node(&self) -> &PassNode<'cb, C, A> {
        &self.graph.pass_nodes[self.pass.index()]
    }

    fn pass_node_mut(&mut self) -> &mut PassNode<'cb, C, A> {
        &mut self.graph.pass_nodes[self.pass.index()]
    }
}

/// View over the resources of the currently executing pass, handed to execution callbacks.
/// Only resources the pass declared through its builder are reachable; there is no validity
/// testing and no cross-pass access.
pub struct PassResources<'a, 'cb, C, A> {
    graph: &'a mut FrameGraph<'cb, C, A>,
    pass: PassIndex,
}

impl<'a, 'cb, C, A> PassResources<'a, 'cb, C, A> {
    /// Typed access to a declared resource.
    ///
    /// # Errors
    /// * Fails with [`Error::UndeclaredAccess`] if the pass did not declare `id`.
    /// * Fails with [`Error::WrongKind`] if the resource is not of kind `T`.
    pub fn get<T>(&mut self, id: NodeId) -> Result<&mut T>
    where
        T: Virtualizable<C, A>,
    {
        self.check_declared(id)?;
        let node = self.graph.node(id)?;
        let (name, resource) = (node.name.clone(), node.resource);
        self.graph
            .registry
            .get_mut(resource)
            .get_mut::<T>()
            .ok_or_else(|| anyhow::Error::from(Error::WrongKind(name)))
    }

    /// Typed access to the descriptor of a declared resource.
    ///
    /// # Errors
    /// * Fails with [`Error::UndeclaredAccess`] if the pass did not declare `id`.
    /// * Fails with [`Error::WrongKind`] if the resource is not of kind `T`.
    pub fn get_descriptor<T>(&self, id: NodeId) -> Result<&T::Desc>
    where
        T: Virtualizable<C, A>,
    {
        self.check_declared(id)?;
        self.graph.get_descriptor::<T>(id)
    }

    fn check_declared(&self, id: NodeId) -> Result<()> {
        let pass = &self.graph.pass_nodes[self.pass.index()];
        if pass.declares(id) {
            Ok(())
        } else {
            Err(Error::UndeclaredAccess {
                pass: pass.name.clone(),
                name: self.graph.node(id)?.name.clone(),
            }
            .into())
        }
    }
}
