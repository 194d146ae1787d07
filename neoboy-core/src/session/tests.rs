use super::*;
use crate::abi::{CoreKind, Export};
use crate::storage::MemorySaveStore;
use crate::test_utils::{FakeOutput, FixtureCore, Naming, RecordingDisplay, approx_eq};

type TestSession = Session<FakeOutput, RecordingDisplay>;

fn session_for(core: CoreKind) -> TestSession {
    let mut session = Session::new(&BridgeConfig::default(), RecordingDisplay::default());
    session
        .select_core(FixtureCore::new(Naming::Emscripten).instantiate(core))
        .unwrap();
    session.enable_audio(|rate| Ok(FakeOutput::new(rate)));
    session
}

#[test]
fn tick_steps_then_presents_then_enqueues() {
    let mut session = session_for(CoreKind::Gb);
    session.tick().unwrap();

    let frames = &session.display().frames;
    assert_eq!(frames.len(), 1);
    assert_eq!((frames[0].width, frames[0].height), (160, 144));
    assert_eq!(frames[0].as_image().pixel(0, 0), Some([1, 0x22, 0x33, 0xFF]));

    let scheduled = &session.audio().output().unwrap().scheduled;
    assert_eq!(scheduled.len(), 1);
    // The last sample is the frame counter, so audio was read after the step.
    assert_eq!(scheduled[0].1, vec![0.5, -0.5, 0.25, 1.0]);
}

#[test]
fn gba_frames_use_the_gba_resolution() {
    let mut session = session_for(CoreKind::Gba);
    session.tick().unwrap();
    let frame = &session.display().frames[0];
    assert_eq!((frame.width, frame.height), (240, 160));
    assert_eq!(frame.rgba.len(), 240 * 160 * 4);
}

#[test]
fn detached_display_is_skipped() {
    let mut session = session_for(CoreKind::Gb);
    session.display_mut().detached = true;
    session.tick().unwrap();

    assert!(session.display().frames.is_empty());
    assert_eq!(session.audio().output().unwrap().scheduled.len(), 1);
}

#[test]
fn core_without_audio_still_renders() {
    let mut session: TestSession = Session::new(&BridgeConfig::default(), RecordingDisplay::default());
    let handle = FixtureCore::new(Naming::Bare)
        .without(Export::GetAudioBuffer)
        .instantiate(CoreKind::Gbc);
    session.select_core(handle).unwrap();
    session.enable_audio(|rate| Ok(FakeOutput::new(rate)));

    session.tick().unwrap();
    assert_eq!(session.display().frames.len(), 1);
    assert!(session.audio().output().unwrap().scheduled.is_empty());
}

#[test]
fn no_core_means_no_tick() {
    let mut session: TestSession = Session::new(&BridgeConfig::default(), RecordingDisplay::default());
    assert!(matches!(session.tick(), Err(BridgeError::NoModule)));
    assert!(matches!(session.start(), Err(BridgeError::NoModule)));
    assert!(matches!(session.press(Button::A, true), Err(BridgeError::NoModule)));
}

#[test]
fn repaints_at_120hz_step_at_60hz() {
    let mut session = session_for(CoreKind::Gb);
    session.start().unwrap();

    let refresh = 1000.0 / 120.0;
    for i in 0..=120 {
        session.on_repaint(i as f64 * refresh).unwrap();
    }
    assert_eq!(session.display().frames.len(), 60);
    assert_eq!(session.handle_mut().unwrap().probe("probe_frames"), 60);
}

#[test]
fn stopped_session_does_not_tick() {
    let mut session = session_for(CoreKind::Gb);
    session.start().unwrap();
    session.on_repaint(0.0).unwrap();
    session.on_repaint(20.0).unwrap();
    session.stop();

    assert_eq!(session.on_repaint(40.0).unwrap(), PaceOutcome::Idle);
    assert_eq!(session.display().frames.len(), 1);
    assert!(!session.is_running());
}

#[test]
fn restart_resyncs_audio_to_the_device_clock() {
    let mut session = session_for(CoreKind::Gb);
    session.tick().unwrap();
    session.tick().unwrap();
    assert!(session.audio().next_start() > 0.0);

    session.audio_mut().output_mut().unwrap().now = 12.5;
    session.start().unwrap();
    assert!(approx_eq(session.audio().next_start(), 12.5));
}

#[test]
fn starting_twice_keeps_the_audio_schedule() {
    let mut session = session_for(CoreKind::Gb);
    session.start().unwrap();
    for t in [0.0, 17.0, 34.0] {
        session.on_repaint(t).unwrap();
    }
    let queued_until = session.audio().next_start();
    assert!(queued_until > 0.0);

    session.start().unwrap();
    assert!(session.is_running());
    assert!(approx_eq(session.audio().next_start(), queued_until));

    session.on_repaint(51.0).unwrap();
    let starts = session.audio().output().unwrap().starts();
    assert_eq!(starts.len(), 3);
    assert!(approx_eq(starts[2], queued_until));
    assert!(starts.windows(2).all(|pair| pair[1] > pair[0]));
}

#[test]
fn trapping_tick_stops_pacing() {
    let mut session: TestSession = Session::new(&BridgeConfig::default(), RecordingDisplay::default());
    let handle = crate::test_utils::instantiate_wat(
        r#"(module
             (memory (export "memory") 1)
             (func (export "step_frame") unreachable))"#,
        CoreKind::Gb,
        &BridgeConfig::default(),
    );
    session.select_core(handle).unwrap();
    session.start().unwrap();

    session.on_repaint(0.0).unwrap();
    assert!(matches!(session.on_repaint(17.0), Err(BridgeError::Trap(_))));
    assert!(!session.is_running());
}

#[test]
fn selecting_a_new_core_replaces_the_old_one() {
    let mut session = session_for(CoreKind::Gb);
    session.tick().unwrap();

    session
        .select_core(FixtureCore::new(Naming::Bare).instantiate(CoreKind::Gba))
        .unwrap();
    let handle = session.handle_mut().unwrap();
    assert_eq!(handle.core(), CoreKind::Gba);
    assert!(handle.is_initialized());
    assert_eq!(handle.probe("probe_frames"), 0);
}

#[test]
fn buttons_and_reset_reach_the_core() {
    let mut session = session_for(CoreKind::Gb);
    assert!(session.press(Button::Down, true).unwrap());
    session.tick().unwrap();
    session.reset().unwrap();

    let handle = session.handle_mut().unwrap();
    assert_eq!(handle.probe("probe_buttons"), 1 << 7);
    assert_eq!(handle.probe("probe_frames"), 0);
}

#[tokio::test]
async fn save_and_restore_through_a_store() {
    let mut store = MemorySaveStore::new();
    let mut session = session_for(CoreKind::Gbc);

    assert!(!session.load_from(&store).await.unwrap());

    session.tick().unwrap();
    session.tick().unwrap();
    assert!(session.save_to(&mut store).await.unwrap());
    assert!(store.get("gbc_state").await.unwrap().is_some());

    session.tick().unwrap();
    assert!(session.load_from(&store).await.unwrap());
    assert_eq!(session.handle_mut().unwrap().probe("probe_frames"), 2);
}

#[tokio::test]
async fn rom_files_are_read_and_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let rom = dir.path().join("game.gb");
    std::fs::write(&rom, [10u8, 20, 30]).unwrap();

    let mut session = session_for(CoreKind::Gb);
    assert!(session.load_rom_file(&rom).await.unwrap());
    assert_eq!(session.handle_mut().unwrap().probe("probe_rom_sum"), 60);

    let missing = dir.path().join("missing.gb");
    assert!(matches!(
        session.load_rom_file(&missing).await,
        Err(BridgeError::Io(_))
    ));
}

#[test]
fn shutdown_releases_everything() {
    let mut session = session_for(CoreKind::Gb);
    session.start().unwrap();
    session.shutdown();

    assert!(session.handle().is_none());
    assert!(session.audio().is_closed());
    assert!(!session.is_running());
}
