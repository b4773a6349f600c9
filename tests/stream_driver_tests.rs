// Stream driver lifecycle scenarios

use posepipe_core::{Error, ErrorKind, Result, RgbaImage};
use posepipe_pipeline::transformers::VideoSource;
use posepipe_pipeline::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn editor() -> PipelineEditor {
    PipelineEditor::new(
        Arc::new(TransformerRegistry::with_builtins().unwrap()),
        BuildContext::default(),
    )
}

/// A camera that unplugs after `frames` reads; counts every read attempt
struct Camera {
    frames: usize,
    reads: Arc<AtomicUsize>,
}

impl FrameSource for Camera {
    fn describe(&self) -> String {
        "usb camera".to_string()
    }

    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, _timeout: Duration) -> Result<SourceRead> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        if n >= self.frames {
            return Err(Error::resource("device unplugged"));
        }
        Ok(SourceRead::Frame(RgbaImage::new(4, 4)))
    }

    fn close(&mut self) {}
}

#[test]
fn test_start_without_frame_source_fails_and_stays_idle() {
    let mut editor = editor();
    editor
        .build(&PipelineSpec::new(vec![
            StageSpec::new("metric_extractor"),
            StageSpec::new("min_max_selector"),
        ]))
        .unwrap();
    let driver = StreamDriver::new(editor, StreamConfig::default()).unwrap();

    let err = driver.start().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(driver.state(), DriverState::Idle);
}

#[test]
fn test_empty_pipeline_cannot_start() {
    let driver = StreamDriver::new(editor(), StreamConfig::default()).unwrap();
    assert_eq!(driver.start().unwrap_err().kind(), ErrorKind::Configuration);
    assert_eq!(driver.state(), DriverState::Idle);
}

#[test]
fn test_camera_disconnect_yields_one_resource_error() {
    let reads = Arc::new(AtomicUsize::new(0));
    let mut editor = editor();
    let root = editor.root_id();
    editor
        .insert(
            &root,
            Box::new(VideoSource::with_source(Box::new(Camera {
                frames: 10,
                reads: reads.clone(),
            }))),
            None,
        )
        .unwrap();
    editor.add_transformer(&root, "model_runner", None).unwrap();
    editor.add_transformer(&root, "metric_extractor", None).unwrap();

    let driver = StreamDriver::new(editor, StreamConfig::default()).unwrap();
    driver.start().unwrap();

    let mut errors = Vec::new();
    loop {
        let event = driver
            .events()
            .recv_timeout(Duration::from_secs(5))
            .expect("status event");
        let last = event.is_final();
        if let StreamEvent::Failed { error, .. } = event {
            errors.push(error);
        }
        if last {
            break;
        }
    }

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), ErrorKind::Resource);
    assert_eq!(driver.state(), DriverState::Stopped);

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(reads.load(Ordering::SeqCst), 11);
    assert!(driver.events().try_recv().is_err());
}

#[test]
fn test_pause_blocks_structure_but_not_parameters() {
    let mut editor = editor();
    editor
        .build(&PipelineSpec::new(vec![
            StageSpec::new("video_source").param("fps", 60),
            StageSpec::new("scaler"),
        ]))
        .unwrap();
    let root = editor.root_id();
    let driver = StreamDriver::new(editor, StreamConfig::default()).unwrap();
    let scaler = driver.describe().unwrap().members[1].id.clone();

    driver.start().unwrap();
    assert_eq!(
        driver.move_transformer(&root, 1, 0).unwrap_err().kind(),
        ErrorKind::State
    );
    driver.set_enabled(&scaler, false).unwrap();

    driver.pause().unwrap();
    driver.move_transformer(&root, 1, 0).unwrap();
    assert_eq!(driver.describe().unwrap().members[0].id, scaler);
    driver.move_transformer(&root, 0, 1).unwrap();
    driver.start().unwrap();
    driver.stop().unwrap();

    let snapshot = driver.describe().unwrap();
    assert!(!snapshot.members[1].enabled);
    assert_eq!(driver.state(), DriverState::Stopped);
}

#[test]
fn test_restart_after_stop_reopens_resources() {
    let mut editor = editor();
    editor
        .build(&PipelineSpec::new(vec![StageSpec::new("video_source")
            .param("frames", 2)
            .param("fps", 0)]))
        .unwrap();
    let driver = StreamDriver::new(editor, StreamConfig::default()).unwrap();

    for _ in 0..3 {
        driver.start().unwrap();
        let completed = driver
            .events()
            .iter()
            .find(|e| e.is_final())
            .expect("final event");
        assert!(matches!(completed, StreamEvent::Completed { passes: 2 }));
    }
}

#[test]
fn test_shutdown_from_any_state() {
    let mut editor = editor();
    editor
        .build(&PipelineSpec::new(vec![StageSpec::new("video_source")]))
        .unwrap();
    let driver = StreamDriver::new(editor, StreamConfig::default()).unwrap();
    driver.start().unwrap();
    driver.pause().unwrap();
    driver.shutdown();
}

#[test]
fn test_resume_after_removing_only_source_is_refused() {
    let mut editor = editor();
    editor
        .build(&PipelineSpec::new(vec![
            StageSpec::new("video_source").param("fps", 10),
            StageSpec::new("mirror"),
        ]))
        .unwrap();
    let root = editor.root_id();
    let driver = StreamDriver::new(editor, StreamConfig::default()).unwrap();

    driver.start().unwrap();
    driver.pause().unwrap();
    driver.remove_transformer(&root, 0).unwrap();

    let err = driver.start().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(driver.state(), DriverState::Paused);

    driver.stop().unwrap();
    let events: Vec<_> = driver.events().try_iter().collect();
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::Resumed)));
    assert!(matches!(events.last(), Some(StreamEvent::Stopped { passes }) if *passes < 10));
}

#[test]
fn test_misconfigured_source_is_named_in_start_error() {
    let mut editor = editor();
    editor
        .build(&PipelineSpec::new(vec![StageSpec::new("video_source")
            .named("Left Camera")
            .param("source", "directory")]))
        .unwrap();
    let driver = StreamDriver::new(editor, StreamConfig::default()).unwrap();

    let err = driver.start().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("'Left Camera': Directory source needs a path"));
    assert_eq!(driver.state(), DriverState::Idle);
}
