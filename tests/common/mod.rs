//! Shared fakes and fixtures for integration tests

#![allow(dead_code)]

use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use roomcraft::{
    GenerationConfig, GenerationRequest, GenerativeBackend, HandleRegistry, ImageIOService,
    InpaintProcessor, RawOutput, Result, RoomcraftError, Strategy,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Entry/exit timestamps of one `infer` call
#[derive(Debug, Clone, Copy)]
pub struct CallWindow {
    pub strategy: Strategy,
    pub entered: Instant,
    pub exited: Instant,
}

/// Calls observed by every clone of a recorder
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    windows: Arc<Mutex<Vec<CallWindow>>>,
}

impl CallLog {
    pub fn windows(&self) -> Vec<CallWindow> {
        self.windows.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.windows.lock().unwrap().len()
    }

    /// True when no two recorded calls were in flight at the same time
    pub fn is_serial(&self) -> bool {
        let mut windows = self.windows();
        windows.sort_by_key(|w| w.entered);
        windows.windows(2).all(|pair| pair[0].exited <= pair[1].entered)
    }

    fn push(&self, window: CallWindow) {
        self.windows.lock().unwrap().push(window);
    }
}

/// What the recording backend returns
#[derive(Debug, Clone)]
pub enum FakeOutput {
    /// Solid colour at the request size, wrapped in a sequence
    Solid([u8; 3]),
    /// Solid colour at a fixed size, as a single image
    SolidSized([u8; 3], u32, u32),
    /// Cut-out with a transparent left half
    Cutout,
    /// Backend fault
    Fail,
}

/// Fake generative backend that timestamps every call
pub struct RecordingBackend {
    output: FakeOutput,
    delay: Duration,
    log: CallLog,
    initialized: bool,
}

impl RecordingBackend {
    pub fn new(output: FakeOutput) -> Self {
        Self {
            output,
            delay: Duration::ZERO,
            log: CallLog::default(),
            initialized: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl GenerativeBackend for RecordingBackend {
    fn initialize(&mut self, _config: &GenerationConfig) -> Result<Option<Duration>> {
        self.initialized = true;
        Ok(None)
    }

    fn infer(&mut self, request: &GenerationRequest) -> Result<RawOutput> {
        let entered = Instant::now();
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let (width, height) = (request.image.width(), request.image.height());
        let result = match self.output {
            FakeOutput::Solid(color) => Ok(RawOutput::Sequence(vec![DynamicImage::ImageRgb8(
                RgbImage::from_pixel(width, height, Rgb(color)),
            )])),
            FakeOutput::SolidSized(color, w, h) => Ok(RawOutput::Single(DynamicImage::ImageRgb8(
                RgbImage::from_pixel(w, h, Rgb(color)),
            ))),
            FakeOutput::Cutout => Ok(RawOutput::Single(DynamicImage::ImageRgba8(
                RgbaImage::from_fn(width, height, |x, _| {
                    Rgba([90, 90, 90, if x < width / 2 { 0 } else { 255 }])
                }),
            ))),
            FakeOutput::Fail => Err(RoomcraftError::inference("fake device lost")),
        };
        self.log.push(CallWindow {
            strategy: request.strategy,
            entered,
            exited: Instant::now(),
        });
        result
    }

    fn supports(&self, _strategy: Strategy) -> bool {
        true
    }

    fn name(&self) -> &str {
        "recording"
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Deterministic gradient photo
pub fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 120])
    }))
}

pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    ImageIOService::encode_png(&gradient(width, height)).unwrap()
}

/// Processor serving the given strategies with the given fakes
pub fn processor(backends: Vec<(Strategy, RecordingBackend)>) -> InpaintProcessor {
    let config = GenerationConfig::default();
    let mut builder = HandleRegistry::builder();
    for (strategy, backend) in backends {
        builder = builder.register(strategy, Box::new(backend));
    }
    InpaintProcessor::new(builder.initialize(&config).unwrap(), config)
}

/// Assert two pixels agree per channel within `tolerance`
pub fn assert_close(actual: &image::Rgb<u8>, expected: [u8; 3], tolerance: u8) {
    for (a, e) in actual.0.iter().zip(expected) {
        assert!(
            a.abs_diff(e) <= tolerance,
            "pixel {:?} not within {} of {:?}",
            actual.0,
            tolerance,
            expected
        );
    }
}
