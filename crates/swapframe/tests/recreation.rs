//! Presentation chain recreation: resize, minimize, stale and suboptimal
//! chains.

mod common;

use swapframe::{BeginFrame, FrameDriver, FrameError, FramePhase};

use common::{
    Event, LiveCounts, MockGpu, driver, draw_frames, extent, init_test_logging, pipeline_factory,
    test_config,
};

fn position(events: &[Event], predicate: impl Fn(&Event) -> bool) -> usize {
    events
        .iter()
        .position(predicate)
        .expect("event was recorded")
}

#[test]
fn test_resize_during_recording_presents_old_extent() {
    let (mut driver, gpu) = driver(2, extent(800, 600));
    draw_frames(&mut driver, 3).expect("frames render");
    gpu.clear_events();

    match driver.begin_frame().expect("begin succeeds") {
        BeginFrame::Ready(frame) => assert_eq!(frame.extent, extent(800, 600)),
        BeginFrame::Skipped => panic!("frame should not be skipped"),
    }

    gpu.set_surface_extent(extent(1024, 768));
    driver.notify_surface_resized();
    assert!(driver.resize_pending());
    assert_eq!(driver.chain_info().extent, extent(800, 600));
    assert_eq!(driver.phase(), FramePhase::Recording);

    driver.end_frame().expect("end succeeds");

    let events = gpu.events();
    let presented = position(&events, |e| {
        matches!(e, Event::Present { extent: presented, .. } if *presented == extent(800, 600))
    });
    let recreated = position(&events, |e| {
        matches!(e, Event::CreateChain { extent: created, .. } if *created == extent(1024, 768))
    });
    assert!(
        presented < recreated,
        "chain recreated before the open frame was presented"
    );

    assert!(!driver.resize_pending());
    assert_eq!(driver.chain_info().extent, extent(1024, 768));
    assert_eq!(driver.generation(), 2);
    assert_eq!(driver.frame_index(), 4 % 2);
}

#[test]
fn test_resize_storm_leaves_one_chain() {
    let (mut driver, gpu) = driver(3, extent(800, 600));
    driver
        .register_pipeline(pipeline_factory())
        .expect("pipeline registers");
    draw_frames(&mut driver, 2).expect("frames render");

    for i in 0..10 {
        gpu.set_surface_extent(extent(800 + i * 16, 600 + i * 8));
        driver.notify_surface_resized();
    }
    draw_frames(&mut driver, 1).expect("frame renders");

    // Ten notifications, one recreation.
    assert_eq!(gpu.chain_creations(), 2);

    for i in 0..10 {
        gpu.set_surface_extent(extent(1024 - i * 16, 768 - i * 8));
        assert!(driver.recreate().expect("recreation succeeds"));
    }

    let live = gpu.live();
    assert_eq!(live.chains, 1);
    assert_eq!(live.descriptions, 1);
    assert_eq!(live.draw_targets, 1);
    assert_eq!(live.pipelines, 1);
    assert_eq!(driver.generation(), 12);
    assert_eq!(driver.chain_info().extent, extent(1024 - 9 * 16, 768 - 9 * 8));

    let pipeline_extent = driver
        .presentation()
        .dependents()
        .active_pipeline()
        .map(|p| p.extent());
    assert_eq!(pipeline_extent, Some(driver.chain_info().extent));
}

#[test]
fn test_minimize_then_restore() {
    let (mut driver, gpu) = driver(2, extent(800, 600));
    draw_frames(&mut driver, 2).expect("frames render");

    gpu.set_surface_extent(extent(0, 0));
    gpu.script_extents(&[extent(0, 0), extent(1024, 768)]);

    // Stale on acquire: waits out the minimized window, recreates, skips.
    assert!(driver.begin_frame().expect("begin succeeds").is_skipped());
    assert_eq!(gpu.wait_events_calls(), 2);
    assert_eq!(driver.frame_index(), 0);

    match driver.begin_frame().expect("begin succeeds") {
        BeginFrame::Ready(frame) => {
            assert_eq!(frame.extent, extent(1024, 768));
            assert_eq!(frame.generation, 2);
        }
        BeginFrame::Skipped => panic!("restored window should render"),
    }
    driver.end_frame().expect("end succeeds");

    let zero_chain = gpu.events().iter().any(|e| {
        matches!(e, Event::CreateChain { extent: created, .. } if created.width == 0 || created.height == 0)
    });
    assert!(!zero_chain, "chain created for a minimized window");
}

#[test]
fn test_recreate_twice_is_idempotent() {
    let (mut driver, gpu) = driver(2, extent(800, 600));
    let original = driver.chain_info();

    assert!(driver.recreate().expect("recreation succeeds"));
    let once = driver.chain_info();
    assert!(driver.recreate().expect("recreation succeeds"));
    let twice = driver.chain_info();

    assert_eq!(once, original);
    assert_eq!(twice, once);
    assert_eq!(driver.generation(), 3);
    assert_eq!(gpu.live().chains, 1);

    let replaced: Vec<_> = gpu
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::CreateChain { replaced, .. } => Some(replaced.is_some()),
            _ => None,
        })
        .collect();
    assert_eq!(replaced, vec![false, true, true]);
}

#[test]
fn test_stale_acquire_skips_without_advancing() {
    let (mut driver, gpu) = driver(2, extent(800, 600));
    draw_frames(&mut driver, 1).expect("frame renders");

    gpu.set_surface_extent(extent(1280, 720));
    assert!(driver.begin_frame().expect("begin succeeds").is_skipped());
    assert_eq!(driver.phase(), FramePhase::Idle);
    assert_eq!(driver.frame_index(), 1);
    assert_eq!(driver.generation(), 2);
    assert_eq!(gpu.stale_acquires(), 1);

    match driver.begin_frame().expect("begin succeeds") {
        BeginFrame::Ready(frame) => {
            assert_eq!(frame.frame_index, 1);
            assert_eq!(frame.extent, extent(1280, 720));
        }
        BeginFrame::Skipped => panic!("fresh chain should acquire"),
    }
    driver.end_frame().expect("end succeeds");
}

#[test]
fn test_suboptimal_acquire_recreates_after_present() {
    let (mut driver, gpu) = driver(2, extent(800, 600));
    gpu.suboptimal_acquires(1);

    assert!(driver.render_frame(|_| {}).expect("frame renders"));

    let events = gpu.events();
    let presented = position(&events, |e| matches!(e, Event::Present { .. }));
    let recreated = events
        .iter()
        .rposition(|e| matches!(e, Event::CreateChain { .. }))
        .expect("chain recreated");
    assert!(presented < recreated);
    assert_eq!(driver.generation(), 2);
    assert_eq!(driver.frame_index(), 1);
}

#[test]
fn test_stale_present_recreates_after_present() {
    let (mut driver, gpu) = driver(2, extent(800, 600));

    match driver.begin_frame().expect("begin succeeds") {
        BeginFrame::Ready(frame) => assert_eq!(frame.extent, extent(800, 600)),
        BeginFrame::Skipped => panic!("frame should not be skipped"),
    }
    // The surface changes underneath the open frame without any notification.
    gpu.set_surface_extent(extent(640, 480));
    assert!(!driver.resize_pending());

    driver.end_frame().expect("end succeeds");

    let events = gpu.events();
    let presented = position(&events, |e| {
        matches!(e, Event::Present { extent: presented, .. } if *presented == extent(800, 600))
    });
    let recreated = position(&events, |e| {
        matches!(e, Event::CreateChain { extent: created, .. } if *created == extent(640, 480))
    });
    assert!(presented < recreated);
    assert_eq!(driver.generation(), 2);
    assert_eq!(driver.chain_info().extent, extent(640, 480));
    assert_eq!(driver.frame_index(), 1);
    assert_eq!(gpu.stale_acquires(), 0);
}

#[test]
fn test_suboptimal_present_recreates_after_present() {
    let (mut driver, gpu) = driver(2, extent(800, 600));
    gpu.suboptimal_presents(1);

    assert!(driver.render_frame(|_| {}).expect("frame renders"));

    let events = gpu.events();
    let presented = position(&events, |e| matches!(e, Event::Present { .. }));
    let recreated = events
        .iter()
        .rposition(|e| matches!(e, Event::CreateChain { .. }))
        .expect("chain recreated");
    assert!(presented < recreated);
    assert_eq!(gpu.chain_creations(), 2);
    assert_eq!(driver.generation(), 2);
    assert_eq!(driver.chain_info().extent, extent(800, 600));

    // Only the one suboptimal present asks for a new chain.
    draw_frames(&mut driver, 3).expect("frames render");
    assert_eq!(driver.generation(), 2);
}

#[test]
fn test_pending_resize_consumed_at_frame_boundary() {
    let (mut driver, gpu) = driver(2, extent(800, 600));

    gpu.set_surface_extent(extent(900, 700));
    driver.notify_surface_resized();
    assert_eq!(driver.generation(), 1);

    match driver.begin_frame().expect("begin succeeds") {
        BeginFrame::Ready(frame) => {
            assert_eq!(frame.generation, 2);
            assert_eq!(frame.extent, extent(900, 700));
        }
        BeginFrame::Skipped => panic!("frame should render after recreation"),
    }
    driver.end_frame().expect("end succeeds");
    assert!(!driver.resize_pending());
    assert_eq!(gpu.stale_acquires(), 0);
}

#[test]
fn test_surface_closed_while_minimized_skips() {
    let (mut driver, gpu) = driver(2, extent(800, 600));

    gpu.set_surface_extent(extent(0, 0));
    gpu.request_close();
    assert!(driver.begin_frame().expect("begin succeeds").is_skipped());
    assert_eq!(driver.generation(), 1);
    assert_eq!(gpu.wait_events_calls(), 0);

    driver.shutdown().expect("shutdown succeeds");
    assert_eq!(gpu.live(), LiveCounts::default());
}

#[test]
fn test_initialize_waits_for_drawable_extent() {
    init_test_logging();
    let gpu = MockGpu::new(extent(0, 0));
    gpu.script_extents(&[extent(1024, 768)]);

    let driver = FrameDriver::initialize(gpu.context(), gpu.surface(), test_config(2))
        .expect("driver initializes");
    assert_eq!(driver.chain_info().extent, extent(1024, 768));
    assert_eq!(gpu.wait_events_calls(), 1);
}

#[test]
fn test_initialize_fails_when_surface_closes() {
    init_test_logging();
    let gpu = MockGpu::new(extent(0, 0));
    gpu.request_close();

    let result = FrameDriver::initialize(gpu.context(), gpu.surface(), test_config(2));
    assert!(matches!(result, Err(FrameError::SurfaceClosed)));
    assert_eq!(gpu.live(), LiveCounts::default());
}
