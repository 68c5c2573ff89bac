//! Shared resource kinds and a counting allocator for the frame graph tests.

use deimos::Virtualizable;

/// Allocator handed to `FrameGraph::execute()` in tests. Hands out monotonically increasing
/// ids and records create/destroy events so tests can check lifetime bracketing. The counter
/// lives here rather than in a global so tests stay independent under the parallel runner.
#[derive(Debug, Default)]
pub struct TestAllocator {
    next_id: i32,
    pub creates: u32,
    pub destroys: u32,
    pub live: i32,
    pub events: Vec<String>,
}

impl TestAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Texture stand-in. `id` is assigned by the allocator on creation; imported instances carry
/// whatever id the test gave them.
#[derive(Debug)]
pub struct TestTexture {
    pub id: i32,
}

impl Default for TestTexture {
    fn default() -> Self {
        Self {
            id: -1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
}

impl<C> Virtualizable<C, TestAllocator> for TestTexture {
    type Desc = TextureDesc;

    fn create(&mut self, desc: &TextureDesc, allocator: &mut TestAllocator) {
        self.id = allocator.next_id();
        allocator.creates += 1;
        allocator.live += 1;
        allocator
            .events
            .push(format!("create {}x{}", desc.width, desc.height));
    }

    fn destroy(&mut self, desc: &TextureDesc, allocator: &mut TestAllocator) {
        allocator.destroys += 1;
        allocator.live -= 1;
        allocator
            .events
            .push(format!("destroy {}x{}", desc.width, desc.height));
    }

    fn describe(desc: &TextureDesc) -> String {
        format!("Texture {}x{}", desc.width, desc.height)
    }
}

/// Second kind, for wrong-kind access tests.
#[derive(Debug, Default)]
pub struct TestBuffer {
    pub address: u64,
}

#[derive(Debug, Clone, Default)]
pub struct BufferDesc {
    pub size: u64,
}

impl<C> Virtualizable<C, TestAllocator> for TestBuffer {
    type Desc = BufferDesc;

    fn create(&mut self, _desc: &BufferDesc, allocator: &mut TestAllocator) {
        self.address = 0xd000 + allocator.next_id() as u64;
    }

    fn destroy(&mut self, _desc: &BufferDesc, _allocator: &mut TestAllocator) {}
}
