use std::cell::Cell;
use std::rc::Rc;

use anyhow::{bail, Result};

use deimos::prelude::*;

mod framework;

use framework::{TestAllocator, TestTexture, TextureDesc};

#[test]
pub fn dummy_pass_is_culled() -> Result<()> {
    let mut graph: FrameGraph<(), TestAllocator> = FrameGraph::new();

    let executed = Rc::new(Cell::new(false));
    let flag = executed.clone();
    graph.add_callback_pass(
        "Dummy",
        |_builder, _data: &mut ()| Ok(()),
        move |_data, _resources, _context| {
            flag.set(true);
            Ok(())
        },
    )?;

    graph.compile()?;
    graph.execute(&mut (), &mut TestAllocator::new())?;
    assert!(
        !executed.get(),
        "a pass with no writes and no side effect should be culled"
    );
    Ok(())
}

#[test]
pub fn side_effect_preserves_pass() -> Result<()> {
    let mut graph: FrameGraph<(), TestAllocator> = FrameGraph::new();

    #[derive(Debug, Default, Clone, Copy)]
    struct TestData {
        foo: NodeId,
        bar: NodeId,
    }

    let executed = Rc::new(Cell::new(false));
    let flag = executed.clone();
    let data = graph.add_callback_pass(
        "Test pass",
        |builder, data: &mut TestData| {
            data.foo = builder.create::<TestTexture>(
                "foo",
                TextureDesc {
                    width: 128,
                    height: 128,
                },
            );
            data.foo = builder.write(data.foo)?;
            data.bar = builder.create::<TestTexture>(
                "bar",
                TextureDesc {
                    width: 256,
                    height: 256,
                },
            );
            data.bar = builder.write(data.bar)?;
            builder.set_side_effect();
            Ok(())
        },
        move |data, resources, _context| {
            assert_eq!(resources.get::<TestTexture>(data.foo)?.id, 1);
            assert_eq!(resources.get::<TestTexture>(data.bar)?.id, 2);
            flag.set(true);
            Ok(())
        },
    )?;

    assert!(graph.is_valid(data.foo));
    assert!(graph.is_valid(data.bar));

    graph.compile()?;
    graph.execute(&mut (), &mut TestAllocator::new())?;
    assert!(executed.get(), "side-effect pass must survive culling");
    Ok(())
}

#[test]
pub fn rename_chain_orders_passes() -> Result<()> {
    #[derive(Debug, Default, Clone, Copy)]
    struct PassData {
        foo: NodeId,
    }

    let mut graph: FrameGraph<Vec<&'static str>, TestAllocator> = FrameGraph::new();

    let pass1 = graph.add_callback_pass(
        "Pass1",
        |builder, data: &mut PassData| {
            data.foo = builder.create::<TestTexture>("foo", TextureDesc::default());
            data.foo = builder.write(data.foo)?;
            Ok(())
        },
        move |_data, _resources, context| {
            context.push("Pass1");
            Ok(())
        },
    )?;

    let pass2 = graph.add_callback_pass(
        "Pass2",
        |builder, data: &mut PassData| {
            let input = builder.read(pass1.foo)?;
            data.foo = builder.write(input)?;
            builder.set_side_effect();
            Ok(())
        },
        move |_data, _resources, context| {
            context.push("Pass2");
            Ok(())
        },
    )?;

    assert!(
        !graph.is_valid(pass1.foo),
        "the second writer renames the resource, staling the first handle"
    );
    assert!(graph.is_valid(pass2.foo));

    let mut order = Vec::new();
    graph.compile()?;
    graph.execute(&mut order, &mut TestAllocator::new())?;
    assert_eq!(order, vec!["Pass1", "Pass2"]);
    Ok(())
}

#[test]
pub fn deferred_pipeline_culls_dummy_pass() -> Result<()> {
    #[derive(Debug, Default, Clone, Copy)]
    struct DepthData {
        depth: NodeId,
    }
    #[derive(Debug, Default, Clone, Copy)]
    struct GBufferData {
        depth: NodeId,
        position: NodeId,
        normal: NodeId,
        albedo: NodeId,
    }
    #[derive(Debug, Default, Clone, Copy)]
    struct LightingData {
        position: NodeId,
        normal: NodeId,
        albedo: NodeId,
        output: NodeId,
    }

    let mut graph: FrameGraph<Vec<&'static str>, TestAllocator> = FrameGraph::new();
    graph.reserve(4, 8);

    let backbuffer = graph.import(
        "Backbuffer",
        TextureDesc {
            width: 1280,
            height: 720,
        },
        TestTexture {
            id: 117,
        },
    )?;
    let desc = graph.get_descriptor::<TestTexture>(backbuffer)?.clone();

    let depth_pass = graph.add_callback_pass(
        "Depth pass",
        |builder, data: &mut DepthData| {
            data.depth = builder.create::<TestTexture>("DepthBuffer", desc.clone());
            data.depth = builder.write(data.depth)?;
            Ok(())
        },
        move |_data, _resources, context| {
            context.push("Depth pass");
            Ok(())
        },
    )?;

    let gbuffer_pass = graph.add_callback_pass(
        "GBuffer pass",
        |builder, data: &mut GBufferData| {
            data.depth = builder.read(depth_pass.depth)?;
            data.position = builder.create::<TestTexture>("GBuffer/ Position", desc.clone());
            data.position = builder.write(data.position)?;
            data.normal = builder.create::<TestTexture>("GBuffer/ Normal", desc.clone());
            data.normal = builder.write(data.normal)?;
            data.albedo = builder.create::<TestTexture>("GBuffer/ Albedo", desc.clone());
            data.albedo = builder.write(data.albedo)?;
            Ok(())
        },
        move |_data, _resources, context| {
            context.push("GBuffer pass");
            Ok(())
        },
    )?;

    graph.add_callback_pass(
        "Lighting pass",
        |builder, data: &mut LightingData| {
            data.position = builder.read(gbuffer_pass.position)?;
            data.normal = builder.read(gbuffer_pass.normal)?;
            data.albedo = builder.read(gbuffer_pass.albedo)?;
            data.output = builder.write(backbuffer)?;
            Ok(())
        },
        move |_data, _resources, context| {
            context.push("Lighting pass");
            Ok(())
        },
    )?;

    graph.add_callback_pass(
        "Dummy pass",
        |_builder, _data: &mut ()| Ok(()),
        move |_data, _resources, context: &mut Vec<&'static str>| {
            context.push("Dummy pass");
            Ok(())
        },
    )?;

    let mut order = Vec::new();
    let mut allocator = TestAllocator::new();
    graph.compile()?;
    graph.execute(&mut order, &mut allocator)?;

    assert_eq!(order, vec!["Depth pass", "GBuffer pass", "Lighting pass"]);
    assert_eq!(allocator.creates, 4, "depth + three gbuffer attachments");
    assert_eq!(allocator.destroys, 4);
    assert_eq!(allocator.live, 0, "all transients released after execution");
    Ok(())
}

#[test]
pub fn transient_lifetimes_are_tight() -> Result<()> {
    #[derive(Debug, Default, Clone, Copy)]
    struct Produce {
        t1: NodeId,
    }
    #[derive(Debug, Default, Clone, Copy)]
    struct Blur {
        t1: NodeId,
        t2: NodeId,
    }
    #[derive(Debug, Default, Clone, Copy)]
    struct Present {
        t2: NodeId,
        out: NodeId,
    }

    let mut graph: FrameGraph<(), TestAllocator> = FrameGraph::new();
    let backbuffer = graph.import(
        "Backbuffer",
        TextureDesc {
            width: 9,
            height: 9,
        },
        TestTexture {
            id: 1,
        },
    )?;

    let produce = graph.add_callback_pass(
        "Produce",
        |builder, data: &mut Produce| {
            data.t1 = builder.create::<TestTexture>(
                "t1",
                TextureDesc {
                    width: 1,
                    height: 1,
                },
            );
            data.t1 = builder.write(data.t1)?;
            Ok(())
        },
        move |_data, _resources, _context| Ok(()),
    )?;

    let blur = graph.add_callback_pass(
        "Blur",
        |builder, data: &mut Blur| {
            data.t1 = builder.read(produce.t1)?;
            data.t2 = builder.create::<TestTexture>(
                "t2",
                TextureDesc {
                    width: 2,
                    height: 2,
                },
            );
            data.t2 = builder.write(data.t2)?;
            Ok(())
        },
        move |_data, _resources, _context| Ok(()),
    )?;

    graph.add_callback_pass(
        "Present",
        |builder, data: &mut Present| {
            data.t2 = builder.read(blur.t2)?;
            data.out = builder.write(backbuffer)?;
            Ok(())
        },
        move |_data, _resources, _context| Ok(()),
    )?;

    let mut allocator = TestAllocator::new();
    graph.compile()?;
    graph.execute(&mut (), &mut allocator)?;

    assert_eq!(
        allocator.events,
        vec!["create 1x1", "create 2x2", "destroy 1x1", "destroy 2x2"],
        "each transient is realized right before first use and released right after last use"
    );
    Ok(())
}

#[test]
pub fn failing_executor_aborts_and_releases_transients() -> Result<()> {
    #[derive(Debug, Default, Clone, Copy)]
    struct Produce {
        t1: NodeId,
    }
    #[derive(Debug, Default, Clone, Copy)]
    struct Consume {
        t1: NodeId,
        out: NodeId,
    }

    let mut graph: FrameGraph<(), TestAllocator> = FrameGraph::new();
    let backbuffer = graph.import(
        "Backbuffer",
        TextureDesc::default(),
        TestTexture {
            id: 1,
        },
    )?;

    let produce = graph.add_callback_pass(
        "Produce",
        |builder, data: &mut Produce| {
            data.t1 = builder.create::<TestTexture>("t1", TextureDesc::default());
            data.t1 = builder.write(data.t1)?;
            Ok(())
        },
        move |_data, _resources, _context| Ok(()),
    )?;

    graph.add_callback_pass(
        "Consume",
        |builder, data: &mut Consume| {
            data.t1 = builder.read(produce.t1)?;
            data.out = builder.write(backbuffer)?;
            Ok(())
        },
        move |_data, _resources, _context| bail!("lighting exploded"),
    )?;

    let mut allocator = TestAllocator::new();
    graph.compile()?;
    let err = graph.execute(&mut (), &mut allocator).unwrap_err();

    assert!(format!("{err:#}").contains("Execution of pass `Consume` failed"));
    assert!(format!("{err:#}").contains("lighting exploded"));
    assert_eq!(allocator.creates, 1);
    assert_eq!(
        allocator.destroys, 1,
        "transients whose lifetime ended at the failing pass are still released"
    );
    assert_eq!(allocator.live, 0);
    Ok(())
}

#[test]
pub fn oversized_exec_capture_is_rejected() {
    let mut graph: FrameGraph<(), TestAllocator> = FrameGraph::new();

    let big = [0u8; 2048];
    let err = graph
        .add_callback_pass(
            "Huge",
            |_builder, _data: &mut ()| Ok(()),
            move |_data, _resources, _context| {
                assert_eq!(big[0], 0);
                Ok(())
            },
        )
        .unwrap_err();

    let err = err.downcast_ref::<Error>().unwrap();
    assert!(matches!(err, Error::CaptureTooLarge { .. }));
}

#[test]
pub fn phase_machine_is_enforced() -> Result<()> {
    let mut graph: FrameGraph<(), TestAllocator> = FrameGraph::new();
    let mut allocator = TestAllocator::new();

    let err = graph.execute(&mut (), &mut allocator).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>().unwrap(),
        Error::WrongPhase {
            operation: "execute",
            ..
        }
    ));

    graph.add_callback_pass(
        "Noop",
        |builder, _data: &mut ()| {
            builder.set_side_effect();
            Ok(())
        },
        move |_data, _resources, _context| Ok(()),
    )?;
    graph.compile()?;

    assert!(graph.compile().is_err(), "double compile must fail");
    assert!(graph
        .add_callback_pass(
            "Late",
            |_builder, _data: &mut ()| Ok(()),
            move |_data, _resources, _context| Ok(()),
        )
        .is_err());
    assert!(graph
        .import("Late import", TextureDesc::default(), TestTexture::default())
        .is_err());

    graph.execute(&mut (), &mut allocator)?;
    assert!(
        graph.execute(&mut (), &mut allocator).is_err(),
        "double execute must fail"
    );
    Ok(())
}
