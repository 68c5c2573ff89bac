//! Type-erased storage for virtual resources and the registry that owns them.

use std::any::Any;

use crate::graph::pass::{AccessFlags, PassIndex};

/// Version assigned to every entry on creation; renames count up from here.
pub(crate) const INITIAL_VERSION: u32 = 1;

/// Dense index of a resource entry in the registry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ResourceId(pub(crate) u32);

impl ResourceId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Whether the graph owns the physical resource or the caller does.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ResourceType {
    /// Created by the graph right before first use and destroyed after last use.
    Transient,
    /// Supplied by the caller; the graph never creates or destroys it.
    Imported,
}

/// Contract a resource kind must fulfill to be virtualized by a
/// [`FrameGraph<C, A>`](crate::FrameGraph).
///
/// `C` and `A` are the graph's context and allocator types; both are opaque to the graph and
/// forwarded untouched to the hooks below. A kind describes itself through a copyable
/// descriptor value and brackets its physical lifetime with [`create()`](Self::create) and
/// [`destroy()`](Self::destroy). Kinds that do not care about the context or allocator can
/// implement the trait for all of them:
///
/// ```
/// use deimos::Virtualizable;
///
/// #[derive(Debug, Default)]
/// struct Texture {
///     id: u32,
/// }
///
/// #[derive(Debug, Clone)]
/// struct TextureDesc {
///     width: u32,
///     height: u32,
/// }
///
/// impl<C, A> Virtualizable<C, A> for Texture {
///     type Desc = TextureDesc;
///
///     fn create(&mut self, _desc: &TextureDesc, _allocator: &mut A) {
///         self.id = 1;
///     }
///
///     fn destroy(&mut self, _desc: &TextureDesc, _allocator: &mut A) {
///         self.id = 0;
///     }
/// }
/// # fn main() {}
/// ```
pub trait Virtualizable<C, A>: Default + 'static {
    /// Value object describing the resource. Carried by the entry, immutable after creation.
    type Desc: Clone + 'static;

    /// Realize the physical resource. Called during execute, right before the first pass that
    /// needs it. Only ever called on transient resources.
    fn create(&mut self, desc: &Self::Desc, allocator: &mut A);

    /// Release the physical resource. Called during execute, right after the last pass that
    /// references it. Only ever called on transient resources.
    fn destroy(&mut self, desc: &Self::Desc, allocator: &mut A);

    /// Called before each executing pass that declared a read on this resource, with the flags
    /// of that declaration.
    fn pre_read(&mut self, _desc: &Self::Desc, _flags: AccessFlags, _context: &mut C) {}

    /// Called before each executing pass that declared a write on this resource, with the
    /// flags of that declaration.
    fn pre_write(&mut self, _desc: &Self::Desc, _flags: AccessFlags, _context: &mut C) {}

    /// Diagnostic one-liner for a resource with this descriptor, used in trace logging.
    fn describe(_desc: &Self::Desc) -> String {
        String::new()
    }
}

/// Object-safe rendition of [`Virtualizable`], so entries of different kinds can live in one
/// registry. Downcasting back to the concrete kind goes through [`Any`].
trait Concept<C, A> {
    fn create(&mut self, allocator: &mut A);
    fn destroy(&mut self, allocator: &mut A);
    fn pre_read(&mut self, flags: AccessFlags, context: &mut C);
    fn pre_write(&mut self, flags: AccessFlags, context: &mut C);
    fn describe(&self) -> String;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Model<T, D> {
    descriptor: D,
    resource: T,
}

impl<C, A, T> Concept<C, A> for Model<T, T::Desc>
where
    T: Virtualizable<C, A>,
{
    fn create(&mut self, allocator: &mut A) {
        self.resource.create(&self.descriptor, allocator);
    }

    fn destroy(&mut self, allocator: &mut A) {
        self.resource.destroy(&self.descriptor, allocator);
    }

    fn pre_read(&mut self, flags: AccessFlags, context: &mut C) {
        self.resource.pre_read(&self.descriptor, flags, context);
    }

    fn pre_write(&mut self, flags: AccessFlags, context: &mut C) {
        self.resource.pre_write(&self.descriptor, flags, context);
    }

    fn describe(&self) -> String {
        T::describe(&self.descriptor)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// One entry per physical virtual resource. Versions of the entry are tracked separately as
/// resource nodes; the entry itself stores the erased descriptor/resource pair and the
/// lifetime endpoints computed during compile.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) struct ResourceEntry<C, A> {
    ty: ResourceType,
    id: ResourceId,
    version: u32,
    #[derivative(Debug = "ignore")]
    concept: Box<dyn Concept<C, A>>,
    /// Earliest live pass that needs the resource realized, set during compile.
    pub(crate) producer: Option<PassIndex>,
    /// Latest live pass that references any version, set during compile.
    pub(crate) last: Option<PassIndex>,
    realized: bool,
}

impl<C, A> ResourceEntry<C, A> {
    fn new<T>(ty: ResourceType, id: ResourceId, descriptor: T::Desc, resource: T) -> Self
    where
        T: Virtualizable<C, A>,
    {
        Self {
            ty,
            id,
            version: INITIAL_VERSION,
            concept: Box::new(Model {
                descriptor,
                resource,
            }),
            producer: None,
            last: None,
            realized: false,
        }
    }

    pub(crate) fn id(&self) -> ResourceId {
        self.id
    }

    pub(crate) fn version(&self) -> u32 {
        self.version
    }

    pub(crate) fn is_imported(&self) -> bool {
        self.ty == ResourceType::Imported
    }

    pub(crate) fn is_transient(&self) -> bool {
        self.ty == ResourceType::Transient
    }

    /// True between `create()` and `destroy()` of the physical resource.
    pub(crate) fn is_realized(&self) -> bool {
        self.realized
    }

    /// Advance the version for a rename and return the new value. Any node still holding an
    /// older version is stale from here on.
    pub(crate) fn bump_version(&mut self) -> u32 {
        self.version += 1;
        self.version
    }

    pub(crate) fn create(&mut self, allocator: &mut A) {
        debug_assert!(self.is_transient());
        self.concept.create(allocator);
        self.realized = true;
    }

    pub(crate) fn destroy(&mut self, allocator: &mut A) {
        debug_assert!(self.is_transient());
        self.concept.destroy(allocator);
        self.realized = false;
    }

    pub(crate) fn pre_read(&mut self, flags: AccessFlags, context: &mut C) {
        self.concept.pre_read(flags, context);
    }

    pub(crate) fn pre_write(&mut self, flags: AccessFlags, context: &mut C) {
        self.concept.pre_write(flags, context);
    }

    pub(crate) fn describe(&self) -> String {
        self.concept.describe()
    }

    /// Typed access to the backing resource. `None` if the entry stores a different kind.
    pub(crate) fn get<T>(&self) -> Option<&T>
    where
        T: Virtualizable<C, A>,
    {
        self.concept
            .as_any()
            .downcast_ref::<Model<T, T::Desc>>()
            .map(|model| &model.resource)
    }

    pub(crate) fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Virtualizable<C, A>,
    {
        self.concept
            .as_any_mut()
            .downcast_mut::<Model<T, T::Desc>>()
            .map(|model| &mut model.resource)
    }

    /// Typed access to the descriptor. `None` if the entry stores a different kind.
    pub(crate) fn descriptor<T>(&self) -> Option<&T::Desc>
    where
        T: Virtualizable<C, A>,
    {
        self.concept
            .as_any()
            .downcast_ref::<Model<T, T::Desc>>()
            .map(|model| &model.descriptor)
    }
}

/// Owns every resource entry declared on a frame graph, addressed by dense id.
#[derive(Derivative)]
#[derivative(Debug(bound = ""), Default(bound = ""))]
pub(crate) struct ResourceRegistry<C, A> {
    entries: Vec<ResourceEntry<C, A>>,
}

impl<C, A> ResourceRegistry<C, A> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reserve(&mut self, additional: usize) {
        self.entries.reserve(additional);
    }

    pub(crate) fn add<T>(&mut self, ty: ResourceType, descriptor: T::Desc, resource: T) -> ResourceId
    where
        T: Virtualizable<C, A>,
    {
        let id = ResourceId(self.entries.len() as u32);
        self.entries
            .push(ResourceEntry::new(ty, id, descriptor, resource));
        id
    }

    pub(crate) fn get(&self, id: ResourceId) -> &ResourceEntry<C, A> {
        &self.entries[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: ResourceId) -> &mut ResourceEntry<C, A> {
        &mut self.entries[id.index()]
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut ResourceEntry<C, A>> {
        self.entries.iter_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
