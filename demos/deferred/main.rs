//! A deferred-shading frame skeleton built on deimos.
//!
//! There is no GPU here: the texture kind allocates slots from a toy allocator, so running
//! this (with trace logging on) shows the schedule the graph derives, including which passes
//! are culled and where transients are realized and released.

use anyhow::Result;
use log::info;

use deimos::prelude::*;

/// Caller context forwarded to every execution callback.
#[derive(Debug)]
struct FrameContext {
    frame_index: u64,
}

/// Toy texture allocator: hands out slots and tracks the high-water mark.
#[derive(Debug, Default)]
struct SlotAllocator {
    next_slot: u32,
    live: u32,
    peak: u32,
}

impl SlotAllocator {
    fn allocate(&mut self) -> u32 {
        self.next_slot += 1;
        self.live += 1;
        self.peak = self.peak.max(self.live);
        self.next_slot
    }

    fn free(&mut self) {
        self.live -= 1;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Format {
    Rgba8,
    Rgba16F,
    Depth32F,
}

#[derive(Debug, Clone)]
struct TextureDesc {
    width: u32,
    height: u32,
    format: Format,
}

#[derive(Debug, Default)]
struct Texture {
    slot: Option<u32>,
}

impl Virtualizable<FrameContext, SlotAllocator> for Texture {
    type Desc = TextureDesc;

    fn create(&mut self, _desc: &TextureDesc, allocator: &mut SlotAllocator) {
        self.slot = Some(allocator.allocate());
    }

    fn destroy(&mut self, _desc: &TextureDesc, allocator: &mut SlotAllocator) {
        self.slot = None;
        allocator.free();
    }

    fn describe(desc: &TextureDesc) -> String {
        format!("{}x{} {:?}", desc.width, desc.height, desc.format)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct DepthData {
    depth: NodeId,
}

#[derive(Debug, Default, Clone, Copy)]
struct GBufferData {
    depth: NodeId,
    albedo: NodeId,
    normal: NodeId,
}

#[derive(Debug, Default, Clone, Copy)]
struct LightingData {
    albedo: NodeId,
    normal: NodeId,
    hdr: NodeId,
}

#[derive(Debug, Default, Clone, Copy)]
struct TonemapData {
    hdr: NodeId,
    output: NodeId,
}

fn main() -> Result<()> {
    std::env::set_var("RUST_LOG", "trace");
    pretty_env_logger::init();

    let mut graph: FrameGraph<FrameContext, SlotAllocator> = FrameGraph::new();
    graph.reserve(5, 8);

    let swapchain = graph.import(
        "swapchain",
        TextureDesc {
            width: 1280,
            height: 720,
            format: Format::Rgba8,
        },
        Texture {
            slot: Some(0),
        },
    )?;
    let extent = graph.get_descriptor::<Texture>(swapchain)?.clone();

    let depth_pass = graph.add_callback_pass(
        "depth_prepass",
        |builder, data: &mut DepthData| {
            data.depth = builder.create::<Texture>(
                "depth",
                TextureDesc {
                    format: Format::Depth32F,
                    ..extent.clone()
                },
            );
            data.depth = builder.write(data.depth)?;
            Ok(())
        },
        move |data, resources, context| {
            let depth = resources.get::<Texture>(data.depth)?;
            info!(
                "[frame {}] depth prepass into slot {:?}",
                context.frame_index, depth.slot
            );
            Ok(())
        },
    )?;

    let gbuffer_pass = graph.add_callback_pass(
        "gbuffer",
        |builder, data: &mut GBufferData| {
            data.depth = builder.read(depth_pass.depth)?;
            data.albedo = builder.create::<Texture>(
                "gbuffer_albedo",
                TextureDesc {
                    format: Format::Rgba8,
                    ..extent.clone()
                },
            );
            data.albedo = builder.write(data.albedo)?;
            data.normal = builder.create::<Texture>(
                "gbuffer_normal",
                TextureDesc {
                    format: Format::Rgba16F,
                    ..extent.clone()
                },
            );
            data.normal = builder.write(data.normal)?;
            Ok(())
        },
        move |data, resources, context| {
            let albedo_slot = resources.get::<Texture>(data.albedo)?.slot;
            let normal_slot = resources.get::<Texture>(data.normal)?.slot;
            info!(
                "[frame {}] gbuffer: albedo slot {:?}, normal slot {:?}",
                context.frame_index, albedo_slot, normal_slot,
            );
            Ok(())
        },
    )?;

    let lighting_pass = graph.add_callback_pass(
        "lighting",
        |builder, data: &mut LightingData| {
            data.albedo = builder.read(gbuffer_pass.albedo)?;
            data.normal = builder.read(gbuffer_pass.normal)?;
            data.hdr = builder.create::<Texture>(
                "hdr",
                TextureDesc {
                    format: Format::Rgba16F,
                    ..extent.clone()
                },
            );
            data.hdr = builder.write(data.hdr)?;
            Ok(())
        },
        move |data, resources, context| {
            info!(
                "[frame {}] shading into hdr slot {:?}",
                context.frame_index,
                resources.get::<Texture>(data.hdr)?.slot
            );
            Ok(())
        },
    )?;

    graph.add_callback_pass(
        "tonemap",
        |builder, data: &mut TonemapData| {
            data.hdr = builder.read(lighting_pass.hdr)?;
            // Writing the imported swapchain keeps the whole chain alive through culling.
            data.output = builder.write(swapchain)?;
            Ok(())
        },
        move |data, resources, context| {
            info!(
                "[frame {}] tonemap to swapchain slot {:?}",
                context.frame_index,
                resources.get::<Texture>(data.output)?.slot
            );
            Ok(())
        },
    )?;

    // Nothing consumes this and it declares no side effect, so compile() culls it.
    graph.add_callback_pass(
        "debug_overlay",
        |builder, data: &mut NodeId| {
            *data = builder.create::<Texture>(
                "overlay",
                TextureDesc {
                    format: Format::Rgba8,
                    ..extent.clone()
                },
            );
            *data = builder.write(*data)?;
            Ok(())
        },
        move |_data, _resources, context| {
            info!("[frame {}] debug overlay (never printed)", context.frame_index);
            Ok(())
        },
    )?;

    info!(
        "declared {} passes over {} resources",
        graph.num_passes(),
        graph.num_resources()
    );
    graph.compile()?;

    let mut context = FrameContext {
        frame_index: 0,
    };
    let mut allocator = SlotAllocator::default();
    graph.execute(&mut context, &mut allocator)?;

    info!(
        "frame complete: peak of {} transient textures live, {} still allocated",
        allocator.peak, allocator.live
    );
    Ok(())
}
