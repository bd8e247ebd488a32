//! Builds the catalog of one container for one set of render options.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, instrument};

use super::entry::{normalize_path, Entry};
use super::options::{DraftScale, RenderOptions};
use super::timing::{frame_rate, number_frames};
use super::CatalogError;
use crate::audio::{encode_wav, synchronize};
use crate::cache::CatalogId;
use crate::decoder::{ContainerMetadata, DecoderPool, Timestamp};
use crate::render::{render_unwinding, FrameRenderer, RenderRequest};

/// Immutable catalog of one container under one configuration.
///
/// Engines swap whole snapshots on re-initialization; readers hold an
/// `Arc` to the snapshot they started with.
#[derive(Debug)]
pub struct CatalogSnapshot {
    id: CatalogId,
    source: Arc<PathBuf>,
    options: RenderOptions,
    draft_scale: DraftScale,
    fps: f32,
    typical_frame_size: u64,
    container: Arc<ContainerMetadata>,
    entries: Vec<Entry>,
    by_name: HashMap<String, usize>,
    frame_positions: HashMap<Timestamp, usize>,
    audio: Bytes,
}

impl CatalogSnapshot {
    /// Generation id; the cache namespace of this snapshot.
    pub fn id(&self) -> CatalogId {
        self.id
    }

    pub fn source(&self) -> &Arc<PathBuf> {
        &self.source
    }

    pub fn options(&self) -> RenderOptions {
        self.options
    }

    pub fn draft_scale(&self) -> DraftScale {
        self.draft_scale
    }

    /// Render scale derived from the options and draft scale.
    pub fn scale(&self) -> u32 {
        self.options.scale(self.draft_scale)
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Advertised size of every frame entry.
    pub fn typical_frame_size(&self) -> u64 {
        self.typical_frame_size
    }

    pub fn container(&self) -> &Arc<ContainerMetadata> {
        &self.container
    }

    /// Entries in listing order: audio first, then frames by number.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Find an entry by name, accepting leading slashes.
    pub fn find(&self, path: &str) -> Option<&Entry> {
        self.by_name
            .get(normalize_path(path))
            .map(|index| &self.entries[*index])
    }

    /// Position of `timestamp` in the sorted container frame list.
    pub fn frame_position(&self, timestamp: Timestamp) -> Option<usize> {
        self.frame_positions.get(&timestamp).copied()
    }

    /// The packaged audio track; empty if the container has no audio.
    pub fn audio(&self) -> &Bytes {
        &self.audio
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds [`CatalogSnapshot`]s using a pooled decoder and the renderer.
pub struct CatalogBuilder<'a> {
    decoders: &'a DecoderPool,
    renderer: &'a dyn FrameRenderer,
}

impl<'a> CatalogBuilder<'a> {
    pub fn new(decoders: &'a DecoderPool, renderer: &'a dyn FrameRenderer) -> Self {
        Self { decoders, renderer }
    }

    /// Open `source`, number its frames, render the first frame for the
    /// typical size, and package the synchronized audio track.
    ///
    /// A container without frames yields an empty catalog.
    #[instrument(skip(self), fields(source = %source.display()))]
    pub fn build(
        &self,
        source: &Path,
        options: RenderOptions,
        draft_scale: DraftScale,
    ) -> Result<CatalogSnapshot, CatalogError> {
        let mut lease = self.decoders.checkout(source)?;
        let decoder = lease.decoder();

        let mut timestamps = decoder.frames()?;
        timestamps.sort_unstable();
        let container = Arc::new(decoder.container_metadata());

        let mut snapshot = CatalogSnapshot {
            id: CatalogId::next(),
            source: Arc::new(source.to_path_buf()),
            options,
            draft_scale,
            fps: 0.0,
            typical_frame_size: 0,
            container,
            entries: Vec::new(),
            by_name: HashMap::new(),
            frame_positions: HashMap::new(),
            audio: Bytes::new(),
        };

        let Some(&first) = timestamps.first() else {
            info!("Container has no frames, publishing empty catalog");
            return Ok(snapshot);
        };

        snapshot.fps = frame_rate(&timestamps);

        let sample = match decoder.load_frame(first) {
            Ok(sample) => sample,
            Err(err) => {
                lease.discard();
                return Err(err.into());
            }
        };
        let rendered = render_unwinding(
            self.renderer,
            &RenderRequest {
                raw: &sample.raw,
                frame: &sample.metadata,
                container: &snapshot.container,
                fps: snapshot.fps,
                frame_index: 0,
                options,
                scale: options.scale(draft_scale),
            },
        );
        let rendered = match rendered {
            Ok(rendered) => rendered,
            Err(err) => {
                lease.discard();
                return Err(err.into());
            }
        };
        snapshot.typical_frame_size = rendered.len() as u64;

        let decoder = lease.decoder();
        let mut chunks = decoder.load_audio()?;
        let channels = decoder.audio_channels();
        let sample_rate_hz = decoder.audio_sample_rate_hz();
        let outcome = synchronize(&mut chunks, first, sample_rate_hz, channels);
        snapshot.audio = encode_wav(&chunks, channels, sample_rate_hz);
        debug!(?outcome, audio_bytes = snapshot.audio.len(), "Audio track prepared");

        if !snapshot.audio.is_empty() {
            snapshot.entries.push(Entry::audio(snapshot.audio.len() as u64));
        }

        let extension = self.renderer.extension();
        for (number, timestamp) in number_frames(&timestamps, snapshot.fps) {
            snapshot.entries.push(Entry::frame(
                number,
                extension,
                snapshot.typical_frame_size,
                timestamp,
            ));
        }

        for (position, timestamp) in timestamps.iter().enumerate() {
            snapshot.frame_positions.entry(*timestamp).or_insert(position);
        }
        for (index, entry) in snapshot.entries.iter().enumerate() {
            snapshot.by_name.insert(entry.name.clone(), index);
        }

        info!(
            catalog = %snapshot.id,
            frames = timestamps.len(),
            entries = snapshot.entries.len(),
            fps = snapshot.fps,
            typical_frame_size = snapshot.typical_frame_size,
            camera = snapshot.container.camera_model().unwrap_or("unknown"),
            options = %options,
            "Catalog built"
        );

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntryTag, AUDIO_FILE_NAME};
    use crate::decoder::{
        AudioChunk, ContainerDecoder, DecodeError, DecodedFrame, DecoderFactory,
    };
    use crate::render::RenderError;
    use serde_json::json;

    #[derive(Clone)]
    struct ScriptedDecoder {
        frames: Vec<Timestamp>,
        audio: Vec<AudioChunk>,
    }

    impl ContainerDecoder for ScriptedDecoder {
        fn frames(&mut self) -> Result<Vec<Timestamp>, DecodeError> {
            Ok(self.frames.clone())
        }

        fn load_frame(&mut self, timestamp: Timestamp) -> Result<DecodedFrame, DecodeError> {
            Ok(DecodedFrame {
                raw: vec![1; 1000],
                metadata: crate::decoder::FrameMetadata(json!({ "timestamp": timestamp })),
            })
        }

        fn load_audio(&mut self) -> Result<Vec<AudioChunk>, DecodeError> {
            Ok(self.audio.clone())
        }

        fn audio_channels(&self) -> u16 {
            2
        }

        fn audio_sample_rate_hz(&self) -> u32 {
            48_000
        }

        fn container_metadata(&self) -> ContainerMetadata {
            ContainerMetadata(json!({ "deviceModel": "Test Cam" }))
        }
    }

    struct ScriptedFactory(ScriptedDecoder);

    impl DecoderFactory for ScriptedFactory {
        fn open(&self, _path: &Path) -> Result<Box<dyn ContainerDecoder>, DecodeError> {
            Ok(Box::new(self.0.clone()))
        }
    }

    struct ScaleRenderer;

    impl FrameRenderer for ScaleRenderer {
        fn render(&self, request: &RenderRequest<'_>) -> Result<Vec<u8>, RenderError> {
            Ok(vec![0; request.raw.len() / request.scale as usize])
        }
    }

    fn build(decoder: ScriptedDecoder, options: RenderOptions) -> CatalogSnapshot {
        let pool = DecoderPool::new(Arc::new(ScriptedFactory(decoder)), 1);
        CatalogBuilder::new(&pool, &ScaleRenderer)
            .build(Path::new("/videos/a.mcraw"), options, DraftScale::Quarter)
            .unwrap()
    }

    #[test]
    fn test_three_frames_without_audio() {
        let snapshot = build(
            ScriptedDecoder {
                frames: vec![66_666_667, 0, 33_333_333],
                audio: Vec::new(),
            },
            RenderOptions::default(),
        );

        let names: Vec<_> = snapshot.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["frame-000000.dng", "frame-000001.dng", "frame-000002.dng"]
        );
        assert!(snapshot.find(AUDIO_FILE_NAME).is_none());
        assert_eq!(snapshot.typical_frame_size(), 1000);
        assert!(snapshot.entries().iter().all(|e| e.size == 1000));
        assert_eq!(snapshot.frame_position(33_333_333), Some(1));
    }

    #[test]
    fn test_dropped_frame_is_backfilled() {
        let step = 33_333_333;
        let snapshot = build(
            ScriptedDecoder {
                frames: vec![0, step, 2 * step, 4 * step, 5 * step],
                audio: Vec::new(),
            },
            RenderOptions::default(),
        );

        assert_eq!(snapshot.entries().len(), 6);
        let third = snapshot.find("/frame-000003.dng").unwrap();
        assert_eq!(third.tag, EntryTag::Frame { timestamp: 4 * step });
    }

    #[test]
    fn test_audio_listed_first_and_draft_scale_applied() {
        let snapshot = build(
            ScriptedDecoder {
                frames: vec![0, 33_333_333],
                audio: vec![AudioChunk::new(0, vec![0; 96])],
            },
            RenderOptions::new().with_draft(true),
        );

        assert_eq!(snapshot.entries()[0].name, AUDIO_FILE_NAME);
        assert_eq!(snapshot.audio().len(), crate::audio::WAV_HEADER_LEN + 192);
        assert_eq!(snapshot.scale(), 4);
        assert_eq!(snapshot.typical_frame_size(), 250);
    }

    #[test]
    fn test_empty_container() {
        let snapshot = build(
            ScriptedDecoder {
                frames: Vec::new(),
                audio: vec![AudioChunk::new(0, vec![0; 96])],
            },
            RenderOptions::default(),
        );
        assert!(snapshot.is_empty());
        assert!(snapshot.audio().is_empty());
    }

    #[test]
    fn test_each_build_gets_a_new_catalog_id() {
        let decoder = ScriptedDecoder {
            frames: vec![0],
            audio: Vec::new(),
        };
        let a = build(decoder.clone(), RenderOptions::default());
        let b = build(decoder, RenderOptions::default());
        assert_ne!(a.id(), b.id());
    }

    /// Lists frames but cannot load any of them.
    #[derive(Clone)]
    struct CorruptDecoder;

    impl ContainerDecoder for CorruptDecoder {
        fn frames(&mut self) -> Result<Vec<Timestamp>, DecodeError> {
            Ok(vec![0, 33_333_333])
        }

        fn load_frame(&mut self, _timestamp: Timestamp) -> Result<DecodedFrame, DecodeError> {
            Err(DecodeError::Corrupt("truncated frame header".to_string()))
        }

        fn load_audio(&mut self) -> Result<Vec<AudioChunk>, DecodeError> {
            Ok(Vec::new())
        }

        fn audio_channels(&self) -> u16 {
            0
        }

        fn audio_sample_rate_hz(&self) -> u32 {
            0
        }

        fn container_metadata(&self) -> ContainerMetadata {
            ContainerMetadata::default()
        }
    }

    struct CorruptFactory;

    impl DecoderFactory for CorruptFactory {
        fn open(&self, _path: &Path) -> Result<Box<dyn ContainerDecoder>, DecodeError> {
            Ok(Box::new(CorruptDecoder))
        }
    }

    struct PanickingRenderer;

    impl FrameRenderer for PanickingRenderer {
        fn render(&self, _request: &RenderRequest<'_>) -> Result<Vec<u8>, RenderError> {
            panic!("unsupported sensor layout");
        }
    }

    #[test]
    fn test_failed_sample_decode_discards_decoder() {
        let pool = DecoderPool::new(Arc::new(CorruptFactory), 1);
        let path = Path::new("/videos/a.mcraw");

        let err = CatalogBuilder::new(&pool, &ScaleRenderer)
            .build(path, RenderOptions::default(), DraftScale::Half)
            .unwrap_err();

        assert!(matches!(err, CatalogError::Decode(DecodeError::Corrupt(_))));
        assert_eq!(pool.idle_count(path), 0);
    }

    #[test]
    fn test_panicking_sample_render_fails_build() {
        let decoder = ScriptedDecoder {
            frames: vec![0, 33_333_333],
            audio: Vec::new(),
        };
        let pool = DecoderPool::new(Arc::new(ScriptedFactory(decoder)), 1);
        let path = Path::new("/videos/a.mcraw");

        let err = CatalogBuilder::new(&pool, &PanickingRenderer)
            .build(path, RenderOptions::default(), DraftScale::Half)
            .unwrap_err();

        assert!(matches!(err, CatalogError::Render(RenderError::Aborted(_))));
        assert_eq!(pool.idle_count(path), 0);
    }
}
