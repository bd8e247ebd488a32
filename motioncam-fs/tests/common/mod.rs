//! Shared fixtures: a scripted container decoder and a deterministic
//! renderer whose output encodes the options it was rendered with.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use motioncam_fs::cache::FrameCache;
use motioncam_fs::catalog::{DraftScale, RenderOptions};
use motioncam_fs::decoder::{
    AudioChunk, ContainerDecoder, ContainerMetadata, DecodeError, DecodedFrame, DecoderFactory,
    DecoderPool, FrameMetadata, Timestamp,
};
use motioncam_fs::pipeline::{FramePipeline, WorkerPools};
use motioncam_fs::render::{FrameRenderer, RenderError, RenderRequest};
use motioncam_fs::vfs::McrawFileSystem;

/// Nanoseconds between frames at 30 fps.
pub const FRAME_30FPS: Timestamp = 33_333_333;

/// Raw size of the first frame; later frames shrink by 10 bytes each.
pub const FIRST_RAW_SIZE: usize = 1200;

pub const SOURCE: &str = "/videos/clip.mcraw";

/// Container content served by [`ScriptedFactory`].
#[derive(Debug, Clone, Default)]
pub struct Container {
    pub frames: Vec<Timestamp>,
    pub audio: Vec<AudioChunk>,
    pub channels: u16,
    pub sample_rate_hz: u32,
    /// Frames listed but not loadable.
    pub missing: HashSet<Timestamp>,
}

impl Container {
    pub fn video(frames: Vec<Timestamp>) -> Self {
        Self {
            frames,
            channels: 2,
            sample_rate_hz: 48_000,
            ..Default::default()
        }
    }

    pub fn with_audio(mut self, audio: Vec<AudioChunk>) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_missing(mut self, timestamp: Timestamp) -> Self {
        self.missing.insert(timestamp);
        self
    }

    /// Raw bytes of the frame at `position` in the sorted frame list.
    pub fn raw_frame(position: usize) -> Vec<u8> {
        vec![position as u8; FIRST_RAW_SIZE - 10 * position]
    }
}

pub struct ScriptedDecoder {
    container: Container,
    sorted: Vec<Timestamp>,
}

impl ContainerDecoder for ScriptedDecoder {
    fn frames(&mut self) -> Result<Vec<Timestamp>, DecodeError> {
        Ok(self.container.frames.clone())
    }

    fn load_frame(&mut self, timestamp: Timestamp) -> Result<DecodedFrame, DecodeError> {
        if self.container.missing.contains(&timestamp) {
            return Err(DecodeError::FrameNotFound(timestamp));
        }
        let position = self
            .sorted
            .iter()
            .position(|ts| *ts == timestamp)
            .ok_or(DecodeError::FrameNotFound(timestamp))?;
        Ok(DecodedFrame {
            raw: Container::raw_frame(position),
            metadata: FrameMetadata(json!({ "width": 4032, "height": 3024, "timestamp": timestamp })),
        })
    }

    fn load_audio(&mut self) -> Result<Vec<AudioChunk>, DecodeError> {
        Ok(self.container.audio.clone())
    }

    fn audio_channels(&self) -> u16 {
        self.container.channels
    }

    fn audio_sample_rate_hz(&self) -> u32 {
        self.container.sample_rate_hz
    }

    fn container_metadata(&self) -> ContainerMetadata {
        ContainerMetadata(json!({ "deviceModel": "Scripted" }))
    }
}

pub struct ScriptedFactory {
    container: Container,
    pub opened: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new(container: Container) -> Self {
        Self {
            container,
            opened: AtomicUsize::new(0),
        }
    }
}

impl DecoderFactory for ScriptedFactory {
    fn open(&self, _path: &Path) -> Result<Box<dyn ContainerDecoder>, DecodeError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let mut sorted = self.container.frames.clone();
        sorted.sort_unstable();
        Ok(Box::new(ScriptedDecoder {
            container: self.container.clone(),
            sorted,
        }))
    }
}

/// First byte of every rendered frame: bit flags of the options.
pub fn options_marker(options: RenderOptions) -> u8 {
    (options.draft as u8) | (options.vignette_correction as u8) << 1
        | (options.normalize_shading_map as u8) << 2
}

/// Renderer producing `[marker, raw bytes stepped by scale...]`.
pub struct MarkerRenderer {
    delay: Duration,
    /// Frame index of every render call, in call order.
    pub calls: Mutex<Vec<usize>>,
}

impl MarkerRenderer {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls_for(&self, frame_index: usize) -> usize {
        self.calls.lock().iter().filter(|i| **i == frame_index).count()
    }

    /// Expected output for the frame at `position`.
    pub fn expected(position: usize, options: RenderOptions, draft_scale: DraftScale) -> Vec<u8> {
        let scale = options.scale(draft_scale) as usize;
        let mut out = vec![options_marker(options)];
        out.extend(Container::raw_frame(position).into_iter().step_by(scale));
        out
    }
}

impl FrameRenderer for MarkerRenderer {
    fn render(&self, request: &RenderRequest<'_>) -> Result<Vec<u8>, RenderError> {
        self.calls.lock().push(request.frame_index);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let mut out = vec![options_marker(request.options)];
        out.extend(request.raw.iter().step_by(request.scale as usize).copied());
        Ok(out)
    }
}

/// Pools, pipeline and renderer wired together the way the host does it.
pub struct Harness {
    pub pools: WorkerPools,
    pub pipeline: FramePipeline,
    pub renderer: Arc<MarkerRenderer>,
    pub factory: Arc<ScriptedFactory>,
}

impl Harness {
    pub fn new(container: Container, renderer: MarkerRenderer, cache_bytes: u64) -> Self {
        let pools = WorkerPools::new(2, 2).expect("pools");
        let factory = Arc::new(ScriptedFactory::new(container));
        let renderer = Arc::new(renderer);
        let decoders = Arc::new(DecoderPool::new(factory.clone(), 2));
        let cache = Arc::new(FrameCache::new(cache_bytes));
        let pipeline = FramePipeline::new(&pools, decoders, renderer.clone(), cache);
        Self {
            pools,
            pipeline,
            renderer,
            factory,
        }
    }

    pub fn engine(&self, options: RenderOptions, draft_scale: DraftScale) -> McrawFileSystem {
        McrawFileSystem::new(SOURCE, options, draft_scale, self.pipeline.clone()).expect("engine")
    }
}

/// Interleaved stereo chunks of `frames_per_chunk` sample frames.
pub fn stereo_chunks(start: Timestamp, count: usize, frames_per_chunk: usize) -> Vec<AudioChunk> {
    let step = (frames_per_chunk as f64 * 1e9 / 48_000.0).round() as Timestamp;
    (0..count)
        .map(|i| {
            AudioChunk::new(
                start + i as Timestamp * step,
                vec![(i as i16 + 1) * 10; frames_per_chunk * 2],
            )
        })
        .collect()
}
