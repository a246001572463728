use nabu_engine::device::{NullBackend, NullView};
use nabu_engine::handle::{IndexBufferId, TextureId, VertexBufferId};
use nabu_engine::render::{DrawConstants, Vertex};
use nabu_engine::resource::ResourceState;
use nabu_engine::{StreamConfig, StreamContext, StreamError, UploadMode};

const CHECKER: [u8; 16] = [
    255, 0, 0, 255, 0, 255, 0, 255, //
    0, 0, 255, 255, 255, 255, 255, 255,
];

fn context(mode: UploadMode, page_size: u64, ring_capacity: u32) -> StreamContext<NullBackend> {
    let config = StreamConfig {
        page_size,
        ring_capacity,
        staging_slots: 4,
        frames_in_flight: 2,
        upload_mode: mode,
        ..Default::default()
    };
    StreamContext::new(NullBackend::new(), config).unwrap()
}

fn triangle() -> [Vertex; 3] {
    let v = |x: f32, y: f32| Vertex {
        position: [x, y, 0.0],
        normal: [0.0, 0.0, 1.0],
        color: [1.0; 4],
        uv: [x, y],
    };
    [v(0.0, 0.0), v(1.0, 0.0), v(0.0, 1.0)]
}

struct Scene {
    vb: VertexBufferId,
    ib: IndexBufferId,
    tex: TextureId,
}

fn scene(ctx: &mut StreamContext<NullBackend>) -> Scene {
    Scene {
        vb: ctx.vertex_buffer_create(&triangle()).unwrap(),
        ib: ctx.index_buffer_create(&[0, 1, 2]).unwrap(),
        tex: ctx.texture_create(2, 2, 4, &CHECKER).unwrap(),
    }
}

fn tinted(frame: u32, draw: u32) -> DrawConstants {
    DrawConstants {
        tint: [frame as f32, draw as f32, 0.0, 1.0],
        ..DrawConstants::default()
    }
}

fn record_frame(ctx: &mut StreamContext<NullBackend>, scene: &Scene, frame: u32, draws: u32) {
    ctx.begin_frame().unwrap();
    for draw in 0..draws {
        ctx.set_draw_constants(&tinted(frame, draw)).unwrap();
        ctx.bind_view_for_draw(0, scene.tex).unwrap();
        ctx.draw(scene.vb, scene.ib).unwrap();
    }
    ctx.end_frame().unwrap();
    ctx.present().unwrap();
}

#[test]
fn long_run_recycles_pages_and_ring_without_hazards() {
    let mut ctx = context(UploadMode::Deferred, 1024, 32);
    let scene = scene(&mut ctx);

    for frame in 0..200 {
        record_frame(&mut ctx, &scene, frame, 3);
        if frame % 3 == 0 {
            ctx.backend_mut().retire_next();
        }
        let stats = ctx.stats();
        assert!(stats.ring_occupied <= stats.ring_capacity);
    }

    let stats = ctx.stats();
    assert_eq!(stats.frames_presented, 200);
    assert!(stats.upload.pages <= 12, "upload pages kept growing: {stats}");
    assert!(stats.blocking_waits > 0);

    let gpu = ctx.shutdown().unwrap();
    assert!(gpu.hazards().is_empty(), "{:?}", gpu.hazards());
    assert_eq!(gpu.executed_draws().len(), 600);
}

#[test]
fn every_draw_sees_its_own_constants_and_view() {
    let mut ctx = context(UploadMode::Deferred, 1024, 16);
    let scene = scene(&mut ctx);
    for frame in 0..20 {
        record_frame(&mut ctx, &scene, frame, 2);
    }
    let gpu = ctx.shutdown().unwrap();

    let expected: Vec<DrawConstants> = (0..20)
        .flat_map(|frame| (0..2).map(move |draw| tinted(frame, draw)))
        .collect();
    let draws = gpu.executed_draws();
    assert_eq!(draws.len(), expected.len());
    for (draw, constants) in draws.iter().zip(&expected) {
        let bytes = bytemuck::bytes_of(constants);
        assert_eq!(&draw.constants[..bytes.len()], bytes);
        assert_eq!(draw.index_count, 3);

        let view: NullView = draw.views[0].unwrap();
        assert_eq!(gpu.view_contents(view), &CHECKER[..]);
    }
    assert!(draws.windows(2).all(|w| w[0].sync <= w[1].sync));
}

#[test]
fn ring_wraps_under_sustained_load() {
    // Four slots per frame against a ten-slot ring forces a wrap every
    // couple of frames.
    let mut ctx = context(UploadMode::Deferred, 4096, 10);
    let scene = scene(&mut ctx);
    let other = ctx.texture_create(1, 1, 3, &[9, 8, 7]).unwrap();

    for frame in 0..50 {
        ctx.begin_frame().unwrap();
        for slot in 0..4 {
            let tex = if slot % 2 == 0 { scene.tex } else { other };
            ctx.bind_view_for_draw(slot, tex).unwrap();
        }
        ctx.set_draw_constants(&tinted(frame, 0)).unwrap();
        ctx.draw(scene.vb, scene.ib).unwrap();
        ctx.end_frame().unwrap();
        // Keep the GPU in lockstep so the ring never fills.
        ctx.backend_mut().retire_all();
        ctx.present().unwrap();
    }

    let gpu = ctx.shutdown().unwrap();
    assert!(gpu.hazards().is_empty(), "{:?}", gpu.hazards());
    for draw in gpu.executed_draws() {
        assert_eq!(draw.views.len(), 4);
        assert_eq!(gpu.view_contents(draw.views[1].unwrap()), &[9, 8, 7, 255]);
    }
}

#[test]
fn ring_overrun_is_reported_not_overwritten() {
    let mut ctx = context(UploadMode::Deferred, 4096, 8);
    let scene = scene(&mut ctx);

    ctx.begin_frame().unwrap();
    for _ in 0..2 {
        for slot in 0..4 {
            ctx.bind_view_for_draw(slot, scene.tex).unwrap();
        }
        ctx.draw(scene.vb, scene.ib).unwrap();
    }
    for slot in 0..4 {
        ctx.bind_view_for_draw(slot, scene.tex).unwrap();
    }
    let err = ctx.draw(scene.vb, scene.ib).unwrap_err();
    assert!(matches!(err, StreamError::RingExhausted { .. }));
    assert!(err.is_fatal());
    assert!(ctx.backend().hazards().is_empty());
}

#[test]
fn resource_destroyed_while_in_flight_outlives_the_gpu_work() {
    let mut ctx = context(UploadMode::Deferred, 4096, 16);
    let scene = scene(&mut ctx);
    let doomed = ctx.texture_create(1, 1, 1, &[42]).unwrap();

    ctx.begin_frame().unwrap();
    ctx.bind_view_for_draw(0, doomed).unwrap();
    ctx.draw(scene.vb, scene.ib).unwrap();
    ctx.end_frame().unwrap();
    ctx.present().unwrap();

    ctx.texture_destroy(doomed).unwrap();
    assert_eq!(ctx.texture_state(doomed), Some(ResourceState::PendingDestroy));
    assert!(matches!(
        ctx.texture_destroy(doomed),
        Err(StreamError::InvalidHandle { .. })
    ));

    // The draw still reads the texture after the destroy call.
    ctx.backend_mut().retire_all();
    let view = ctx.backend().executed_draws()[0].views[0].unwrap();
    assert_eq!(ctx.backend().view_contents(view), &[42]);
    assert!(!ctx.backend().is_dropped(view.0));

    ctx.flush().unwrap();
    assert_eq!(ctx.texture_state(doomed), Some(ResourceState::Reclaimed));
    assert!(ctx.backend().is_dropped(view.0));
    assert!(ctx.backend().hazards().is_empty());

    // The id comes back for the next texture.
    let reissued = ctx.texture_create(1, 1, 1, &[7]).unwrap();
    assert_eq!(reissued, doomed);
    assert_eq!(ctx.texture_state(reissued), Some(ResourceState::Uploading));
}

#[test]
fn blocking_mode_never_leaves_uploads_in_flight() {
    let mut ctx = context(UploadMode::Blocking, 4096, 16);
    let scene = scene(&mut ctx);
    assert_eq!(ctx.texture_state(scene.tex), Some(ResourceState::Live));
    assert_eq!(ctx.backend().in_flight(), 0);

    ctx.texture_destroy(scene.tex).unwrap();
    assert_eq!(ctx.texture_state(scene.tex), Some(ResourceState::Reclaimed));
    assert_eq!(ctx.stats().pending_destroys, 0);

    let gpu = ctx.shutdown().unwrap();
    assert!(gpu.hazards().is_empty());
}

#[test]
fn blocking_and_deferred_render_the_same_frames() {
    let run = |mode| {
        let mut ctx = context(mode, 1024, 16);
        let scene = scene(&mut ctx);
        for frame in 0..10 {
            record_frame(&mut ctx, &scene, frame, 2);
        }
        let gpu = ctx.shutdown().unwrap();
        assert!(gpu.hazards().is_empty());
        gpu.executed_draws()
            .iter()
            .map(|d| d.constants[64..80].to_vec())
            .collect::<Vec<_>>()
    };
    assert_eq!(run(UploadMode::Blocking), run(UploadMode::Deferred));
}

#[test]
fn device_loss_surfaces_as_fatal_error() {
    let mut ctx = context(UploadMode::Deferred, 4096, 16);
    let scene = scene(&mut ctx);
    record_frame(&mut ctx, &scene, 0, 1);

    ctx.begin_frame().unwrap();
    ctx.draw(scene.vb, scene.ib).unwrap();
    ctx.backend_mut().lose_device("simulated removal");

    let err = ctx.end_frame().unwrap_err();
    assert_eq!(err, StreamError::DeviceLost("simulated removal".into()));
    assert!(err.is_fatal());
    // Still recording: retries keep failing instead of hanging.
    assert!(ctx.in_frame());
    assert!(matches!(ctx.end_frame(), Err(StreamError::DeviceLost(_))));
    assert!(matches!(ctx.flush(), Err(StreamError::FrameState(_))));
}

#[test]
fn stream_ceiling_turns_into_out_of_memory() {
    let config = StreamConfig {
        page_size: 1024,
        max_stream_bytes: Some(2048),
        ring_capacity: 16,
        staging_slots: 4,
        ..Default::default()
    };
    let mut ctx = StreamContext::new(NullBackend::new(), config).unwrap();
    let scene = scene(&mut ctx);

    ctx.begin_frame().unwrap();
    let mut result = Ok(());
    for draw in 0..16 {
        ctx.set_draw_constants(&tinted(0, draw)).unwrap();
        result = ctx.draw(scene.vb, scene.ib);
        if result.is_err() {
            break;
        }
    }
    assert!(matches!(result, Err(StreamError::OutOfStreamingMemory { .. })));
    assert!(!result.unwrap_err().is_fatal());
}

fn executed_tints(gpu: &NullBackend) -> Vec<[f32; 2]> {
    gpu.executed_draws()
        .iter()
        .map(|draw| {
            let tint: [f32; 4] = bytemuck::pod_read_unaligned(&draw.constants[64..80]);
            [tint[0], tint[1]]
        })
        .collect()
}

#[test]
fn blocking_create_inside_a_frame_keeps_pending_constants_alive() {
    let mut ctx = context(UploadMode::Blocking, 1024, 16);
    let scene = scene(&mut ctx);

    ctx.begin_frame().unwrap();
    ctx.set_draw_constants(&tinted(7, 0)).unwrap();
    // Flushes and waits in the middle of the frame.
    let late = ctx.texture_create(1, 1, 4, &[1, 2, 3, 4]).unwrap();
    ctx.bind_view_for_draw(0, late).unwrap();
    ctx.draw(scene.vb, scene.ib).unwrap();
    ctx.end_frame().unwrap();
    ctx.present().unwrap();

    ctx.begin_frame().unwrap();
    for draw in 0..2 {
        ctx.set_draw_constants(&tinted(9, draw)).unwrap();
        ctx.draw(scene.vb, scene.ib).unwrap();
    }
    ctx.end_frame().unwrap();
    ctx.present().unwrap();

    let gpu = ctx.shutdown().unwrap();
    assert!(gpu.hazards().is_empty(), "{:?}", gpu.hazards());
    assert_eq!(executed_tints(&gpu), [[7.0, 0.0], [9.0, 0.0], [9.0, 1.0]]);
    let view = gpu.executed_draws()[0].views[0].unwrap();
    assert_eq!(gpu.view_contents(view), &[1, 2, 3, 4]);
}

#[test]
fn blocking_destroy_inside_a_frame_keeps_pending_constants_alive() {
    let mut ctx = context(UploadMode::Blocking, 1024, 16);
    let scene = scene(&mut ctx);

    ctx.begin_frame().unwrap();
    ctx.set_draw_constants(&tinted(3, 0)).unwrap();
    ctx.bind_view_for_draw(0, scene.tex).unwrap();
    ctx.draw(scene.vb, scene.ib).unwrap();
    ctx.set_draw_constants(&tinted(3, 1)).unwrap();
    ctx.texture_destroy(scene.tex).unwrap();
    assert_eq!(ctx.texture_state(scene.tex), Some(ResourceState::Reclaimed));
    ctx.draw(scene.vb, scene.ib).unwrap();
    ctx.end_frame().unwrap();
    ctx.present().unwrap();

    for frame in 4..8 {
        record_plain_frame(&mut ctx, &scene, frame);
    }

    let gpu = ctx.shutdown().unwrap();
    assert!(gpu.hazards().is_empty(), "{:?}", gpu.hazards());
    let tints = executed_tints(&gpu);
    assert_eq!(tints[..2], [[3.0, 0.0], [3.0, 1.0]]);
    assert_eq!(tints.len(), 6);
}

fn record_plain_frame(ctx: &mut StreamContext<NullBackend>, scene: &Scene, frame: u32) {
    ctx.begin_frame().unwrap();
    ctx.set_draw_constants(&tinted(frame, 0)).unwrap();
    ctx.draw(scene.vb, scene.ib).unwrap();
    ctx.end_frame().unwrap();
    ctx.present().unwrap();
}
