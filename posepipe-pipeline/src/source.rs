//! Frame sources feeding the `video_source` transformer

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_circle_mut;
use posepipe_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Result of one bounded read
#[derive(Debug)]
pub enum SourceRead {
    Frame(RgbaImage),
    /// Nothing arrived within the timeout; ask again
    Pending,
    /// The source is exhausted
    End,
}

/// Opaque producer of frames. `read` must return within roughly `timeout`
/// so a stop request is noticed promptly.
pub trait FrameSource: Send {
    fn describe(&self) -> String;

    fn open(&mut self) -> Result<()>;

    fn read(&mut self, timeout: Duration) -> Result<SourceRead>;

    fn close(&mut self);

    /// Native rate, when known
    fn frame_rate(&self) -> Option<f64> {
        None
    }
}

const DOT_RADIUS: i32 = 3;
const SWEEP_FRAMES: u64 = 60;

/// Generates frames with a bright dot that rises and falls, at a fixed
/// rate. `frames == 0` means endless.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    frames: u64,
    fps: u32,
    produced: u64,
    next_due: Option<Instant>,
    open: bool,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, frames: u64, fps: u32) -> Self {
        Self {
            width,
            height,
            frames,
            fps,
            produced: 0,
            next_due: None,
            open: false,
        }
    }

    /// Dot centre for frame `n`, in pixels
    fn dot_position(&self, n: u64) -> (i32, i32) {
        let phase = (n % SWEEP_FRAMES) as f64 / SWEEP_FRAMES as f64;
        let rise = 0.5 - 0.4 * (phase * std::f64::consts::TAU).cos();
        let x = self.width as f64 * 0.5;
        let y = self.height as f64 * (1.0 - rise);
        (x as i32, y as i32)
    }

    fn render(&self, n: u64) -> RgbaImage {
        let mut image = RgbaImage::from_pixel(self.width, self.height, Rgba([0, 0, 0, 255]));
        let (cx, cy) = self.dot_position(n);
        draw_filled_circle_mut(&mut image, (cx, cy), DOT_RADIUS, Rgba([255, 255, 255, 255]));
        image
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("synthetic {}x{} @ {} fps", self.width, self.height, self.fps)
    }

    fn open(&mut self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::config("Synthetic source needs a non-zero size"));
        }
        self.produced = 0;
        self.next_due = None;
        self.open = true;
        Ok(())
    }

    fn read(&mut self, timeout: Duration) -> Result<SourceRead> {
        if !self.open {
            return Err(Error::resource("Synthetic source is not open"));
        }
        if self.frames > 0 && self.produced >= self.frames {
            return Ok(SourceRead::End);
        }

        if self.fps > 0 {
            let now = Instant::now();
            let due = self.next_due.unwrap_or(now);
            if due > now {
                let wait = due - now;
                if wait > timeout {
                    std::thread::sleep(timeout);
                    return Ok(SourceRead::Pending);
                }
                std::thread::sleep(wait);
            }
            let interval = Duration::from_secs_f64(1.0 / f64::from(self.fps));
            self.next_due = Some(due.max(now) + interval);
        }

        let image = self.render(self.produced);
        self.produced += 1;
        Ok(SourceRead::Frame(image))
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn frame_rate(&self) -> Option<f64> {
        (self.fps > 0).then(|| f64::from(self.fps))
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Replays the image files of a directory in name order
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl DirectorySource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            files: Vec::new(),
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for DirectorySource {
    fn describe(&self) -> String {
        format!("directory {:?}", self.dir)
    }

    fn open(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            Error::resource(format!("Cannot open frame directory {:?}: {}", self.dir, e))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                files.push(path);
            }
        }
        files.sort();

        info!("Opened {:?} with {} frames", self.dir, files.len());
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    fn read(&mut self, _timeout: Duration) -> Result<SourceRead> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(SourceRead::End);
        };
        let image = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(io) => {
                Error::resource(format!("Lost frame {:?}: {}", path, io))
            }
            other => Error::transform(format!("Malformed frame {:?}: {}", path, other)),
        })?;
        debug!("Read frame {:?}", path);
        self.cursor += 1;
        Ok(SourceRead::Frame(image.to_rgba8()))
    }

    fn close(&mut self) {
        self.files.clear();
        self.cursor = 0;
    }
}
