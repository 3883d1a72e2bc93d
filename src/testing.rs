//! Fakes shared by unit tests: no audio hardware, GPU or filesystem.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use image::RgbaImage;

use crate::audio::{
    AudioBands, AudioDevice, AudioError, AudioInput, DetailedAudio, SpectrumSource,
};
use crate::gpu::{
    BackendKind, DetailedRender, EnergyOverlay, RenderBackend, RenderError, TileUniforms,
};
use crate::images::{ImageError, ImageSource, LoadedImage};
use crate::status::{FrameStatus, StatusSink};
use crate::timing::Clock;

/// Hand-driven clock; clones share the same time
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn set(&self, now_ms: f64) {
        self.now.set(now_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

struct Script {
    level_db: f32,
    bin_db: HashMap<usize, f32>,
    amplitude: f32,
}

/// Spectrum source with a flat, scriptable level; clones share the script
#[derive(Clone)]
pub struct ScriptedSpectrum {
    script: Rc<RefCell<Script>>,
}

impl ScriptedSpectrum {
    pub const SAMPLE_RATE: f32 = 48_000.0;
    pub const WINDOW: usize = 2048;

    pub fn new() -> Self {
        Self {
            script: Rc::new(RefCell::new(Script {
                level_db: -200.0,
                bin_db: HashMap::new(),
                amplitude: 0.0,
            })),
        }
    }

    /// Level for every bin without an override
    pub fn set_level_db(&self, db: f32) {
        let mut script = self.script.borrow_mut();
        script.level_db = db;
        script.bin_db.clear();
    }

    pub fn set_bin_db(&self, bin: usize, db: f32) {
        self.script.borrow_mut().bin_db.insert(bin, db);
    }

    /// Constant time-domain sample value
    pub fn set_amplitude(&self, amplitude: f32) {
        self.script.borrow_mut().amplitude = amplitude;
    }
}

impl SpectrumSource for ScriptedSpectrum {
    fn sample_rate(&self) -> f32 {
        Self::SAMPLE_RATE
    }

    fn bin_count(&self) -> usize {
        Self::WINDOW / 2
    }

    fn window_len(&self) -> usize {
        Self::WINDOW
    }

    fn frequency_data(&mut self, out: &mut [f32]) {
        let script = self.script.borrow();
        for (i, v) in out.iter_mut().enumerate() {
            *v = script.bin_db.get(&i).copied().unwrap_or(script.level_db);
        }
    }

    fn time_domain_data(&mut self, out: &mut [f32]) {
        out.fill(self.script.borrow().amplitude);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitBehavior {
    Succeed,
    Fail,
    Panic,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Initialize,
    SetCurrent(String),
    SetNext(String),
    Render(TileUniforms, AudioBands),
    RenderDetailed(TileUniforms, DetailedAudio),
    Energy(Option<f32>),
    Swap,
    Resize(u32, u32),
    Destroy,
}

/// Renderer that records every call
pub struct RecordingRenderer {
    kind: BackendKind,
    init: InitBehavior,
    detailed: bool,
    overlay: bool,
    calls: Rc<RefCell<Vec<RenderCall>>>,
}

impl RecordingRenderer {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            init: InitBehavior::Succeed,
            detailed: false,
            overlay: false,
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn with_init(mut self, init: InitBehavior) -> Self {
        self.init = init;
        self
    }

    pub fn with_detailed(mut self) -> Self {
        self.detailed = true;
        self
    }

    pub fn with_overlay(mut self) -> Self {
        self.overlay = true;
        self
    }

    pub fn calls(&self) -> Rc<RefCell<Vec<RenderCall>>> {
        Rc::clone(&self.calls)
    }

    fn record(&self, call: RenderCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl RenderBackend for RecordingRenderer {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn initialize(&mut self) -> Result<(), RenderError> {
        self.record(RenderCall::Initialize);
        match self.init {
            InitBehavior::Succeed => Ok(()),
            InitBehavior::Fail => Err(RenderError::MissingCapability("compute shaders")),
            InitBehavior::Panic => panic!("device lost during setup"),
        }
    }

    fn set_current_image(&mut self, image: &LoadedImage, _tile_size: u32) {
        self.record(RenderCall::SetCurrent(image.url.clone()));
    }

    fn set_next_image(&mut self, image: &LoadedImage) {
        self.record(RenderCall::SetNext(image.url.clone()));
    }

    fn render(&mut self, uniforms: &TileUniforms, bands: AudioBands) {
        self.record(RenderCall::Render(*uniforms, bands));
    }

    fn swap_textures(&mut self) {
        self.record(RenderCall::Swap);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.record(RenderCall::Resize(width, height));
    }

    fn destroy(&mut self) {
        self.record(RenderCall::Destroy);
    }

    fn detailed(&mut self) -> Option<&mut dyn DetailedRender> {
        if self.detailed {
            Some(self)
        } else {
            None
        }
    }

    fn overlay(&mut self) -> Option<&mut dyn EnergyOverlay> {
        if self.overlay {
            Some(self)
        } else {
            None
        }
    }
}

impl EnergyOverlay for RecordingRenderer {
    fn set_energy(&mut self, intensity: Option<f32>) {
        self.record(RenderCall::Energy(intensity));
    }
}

impl DetailedRender for RecordingRenderer {
    fn render_detailed(&mut self, uniforms: &TileUniforms, audio: &DetailedAudio) {
        self.record(RenderCall::RenderDetailed(*uniforms, audio.clone()));
    }
}

struct Sequence {
    urls: Vec<String>,
    index: usize,
    random_pick: usize,
    fail_next: bool,
    fail_preload: bool,
    fail_random: bool,
    cleared: usize,
}

/// In-memory image list with the loader's pointer semantics; clones share state
#[derive(Clone)]
pub struct MemoryImages {
    seq: Rc<RefCell<Sequence>>,
}

impl MemoryImages {
    pub const WIDTH: u32 = 64;
    pub const HEIGHT: u32 = 32;

    /// `count` images named `img-0`, `img-1`, ...
    pub fn new(count: usize) -> Self {
        Self {
            seq: Rc::new(RefCell::new(Sequence {
                urls: (0..count).map(|i| format!("img-{}", i)).collect(),
                index: 0,
                random_pick: 0,
                fail_next: false,
                fail_preload: false,
                fail_random: false,
                cleared: 0,
            })),
        }
    }

    pub fn index(&self) -> usize {
        self.seq.borrow().index
    }

    pub fn cleared(&self) -> usize {
        self.seq.borrow().cleared
    }

    pub fn fail_next(&self, fail: bool) {
        self.seq.borrow_mut().fail_next = fail;
    }

    pub fn fail_preload(&self, fail: bool) {
        self.seq.borrow_mut().fail_preload = fail;
    }

    pub fn fail_random(&self, fail: bool) {
        self.seq.borrow_mut().fail_random = fail;
    }

    fn image(url: &str) -> LoadedImage {
        LoadedImage::new(url, RgbaImage::new(Self::WIDTH, Self::HEIGHT))
    }

    fn url_at(&self, index: usize) -> Result<String, ImageError> {
        let seq = self.seq.borrow();
        if seq.urls.is_empty() {
            return Err(ImageError::NoImages);
        }
        Ok(seq.urls[index % seq.urls.len()].clone())
    }
}

impl ImageSource for MemoryImages {
    fn load_random_image(&mut self) -> Result<LoadedImage, ImageError> {
        let (fail, pick) = {
            let seq = self.seq.borrow();
            (seq.fail_random, seq.random_pick)
        };
        if fail {
            return Err(ImageError::NoImages);
        }
        Ok(Self::image(&self.url_at(pick)?))
    }

    fn load_next_image(&mut self) -> Result<LoadedImage, ImageError> {
        {
            let mut seq = self.seq.borrow_mut();
            if seq.fail_next || seq.urls.is_empty() {
                return Err(ImageError::NoImages);
            }
            seq.index = (seq.index + 1) % seq.urls.len();
        }
        Ok(Self::image(&self.url_at(self.index())?))
    }

    fn preload_next_image(&mut self) -> Result<LoadedImage, ImageError> {
        if self.seq.borrow().fail_preload {
            return Err(ImageError::NoImages);
        }
        Ok(Self::image(&self.url_at(self.index() + 1)?))
    }

    fn clear_cache(&mut self) {
        self.seq.borrow_mut().cleared += 1;
    }

    fn image_count(&self) -> usize {
        self.seq.borrow().urls.len()
    }

    fn cache_size(&self) -> usize {
        0
    }
}

/// Audio input handing out one scripted source, or failing when it has none.
///
/// Only `mic-1` exists; other device ids fail with `DeviceNotFound`.
#[derive(Clone)]
pub struct FakeAudio {
    source: Option<ScriptedSpectrum>,
    pub opened: Rc<Cell<usize>>,
    pub stopped: Rc<Cell<usize>>,
    pub last_device: Rc<RefCell<Option<String>>>,
}

impl FakeAudio {
    pub const DEVICE: &'static str = "mic-1";

    pub fn with_source(source: &ScriptedSpectrum) -> Self {
        Self {
            source: Some(source.clone()),
            opened: Rc::new(Cell::new(0)),
            stopped: Rc::new(Cell::new(0)),
            last_device: Rc::new(RefCell::new(None)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            source: None,
            opened: Rc::new(Cell::new(0)),
            stopped: Rc::new(Cell::new(0)),
            last_device: Rc::new(RefCell::new(None)),
        }
    }
}

impl AudioInput for FakeAudio {
    fn enumerate_devices(&self) -> Vec<AudioDevice> {
        vec![AudioDevice {
            id: Self::DEVICE.to_string(),
            label: "Microphone 1".to_string(),
        }]
    }

    fn get_stream(
        &mut self,
        device_id: Option<&str>,
        _fft_size: usize,
    ) -> Result<Box<dyn SpectrumSource>, AudioError> {
        *self.last_device.borrow_mut() = device_id.map(str::to_string);
        match (&self.source, device_id) {
            (None, _) => Err(AudioError::NoDevice),
            (Some(_), Some(id)) if id != Self::DEVICE => {
                Err(AudioError::DeviceNotFound(id.to_string()))
            }
            (Some(source), _) => {
                self.opened.set(self.opened.get() + 1);
                Ok(Box::new(source.clone()))
            }
        }
    }

    fn stop_stream(&mut self, stream: Box<dyn SpectrumSource>) {
        drop(stream);
        self.stopped.set(self.stopped.get() + 1);
    }
}

/// Status sink keeping every pushed frame
#[derive(Clone, Default)]
pub struct RecordingStatus {
    pub frames: Rc<RefCell<Vec<FrameStatus>>>,
}

impl RecordingStatus {
    pub fn last(&self) -> Option<FrameStatus> {
        self.frames.borrow().last().copied()
    }
}

impl StatusSink for RecordingStatus {
    fn push(&mut self, status: &FrameStatus) {
        self.frames.borrow_mut().push(*status);
    }
}
