//! The frame graph is a declarative scheduling layer: passes announce which virtual resources
//! they create, read and write, and the graph turns that declaration into an executable
//! schedule. Compiling the graph culls passes and resources that contribute nothing to
//! observable output, and computes the lifetime of every transient resource so it can be
//! realized right before first use and released right after last use.
//!
//! Resources are *virtual* during setup: a [`NodeId`](crate::NodeId) names a version of a
//! resource, not a live object. Physical realization is deferred to
//! [`FrameGraph::execute()`](crate::FrameGraph::execute), which calls back into the resource
//! kind through the [`Virtualizable`](crate::Virtualizable) trait. Writing a resource another
//! pass produced *renames* it: the old handle goes stale and the writer gets a fresh one.
//! The rename chain is what fixes the execution order of writers without an explicit
//! dependency API.
//!
//! # Example
//!
//! A minimal two-pass setup: a pass producing an offscreen texture, and a pass shading it
//! into an imported backbuffer.
//!
//! ```
//! use anyhow::Result;
//! use deimos::prelude::*;
//!
//! #[derive(Debug, Default)]
//! struct Texture {
//!     id: u32,
//! }
//!
//! #[derive(Debug, Clone)]
//! struct TextureDesc {
//!     width: u32,
//!     height: u32,
//! }
//!
//! impl<C, A> Virtualizable<C, A> for Texture {
//!     type Desc = TextureDesc;
//!
//!     fn create(&mut self, _desc: &TextureDesc, _allocator: &mut A) {
//!         self.id = 1;
//!     }
//!
//!     fn destroy(&mut self, _desc: &TextureDesc, _allocator: &mut A) {
//!         self.id = 0;
//!     }
//! }
//!
//! #[derive(Debug, Default, Clone, Copy)]
//! struct ShadingData {
//!     albedo: NodeId,
//!     output: NodeId,
//! }
//!
//! fn main() -> Result<()> {
//!     let mut graph: FrameGraph = FrameGraph::new();
//!     let desc = TextureDesc {
//!         width: 1280,
//!         height: 720,
//!     };
//!     let backbuffer = graph.import("backbuffer", desc.clone(), Texture { id: 777 })?;
//!
//!     let geometry = graph.add_callback_pass(
//!         "geometry",
//!         |builder, data: &mut ShadingData| {
//!             data.albedo = builder.create::<Texture>("albedo", desc.clone());
//!             data.albedo = builder.write(data.albedo)?;
//!             Ok(())
//!         },
//!         move |_data, _resources, _context| Ok(()),
//!     )?;
//!
//!     let shading = graph.add_callback_pass(
//!         "shading",
//!         |builder, data: &mut ShadingData| {
//!             data.albedo = builder.read(geometry.albedo)?;
//!             // Writing the imported backbuffer keeps this pass (and everything it
//!             // depends on) alive through culling.
//!             data.output = builder.write(backbuffer)?;
//!             Ok(())
//!         },
//!         move |data, resources, _context| {
//!             let target = resources.get::<Texture>(data.output)?;
//!             assert_eq!(target.id, 777);
//!             Ok(())
//!         },
//!     )?;
//!
//!     graph.compile()?;
//!     graph.execute(&mut (), &mut ())?;
//!     assert!(graph.is_valid(shading.output));
//!     Ok(())
//! }
//! ```
//!
//! Passes whose outputs nobody consumes are culled unless they declare a side effect with
//! [`PassBuilder::set_side_effect()`](crate::PassBuilder::set_side_effect); writing an
//! imported resource sets that flag implicitly.

pub mod frame_graph;
pub mod pass;
pub mod resource;
pub mod virtual_resource;
