//! In-memory collaborators for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use glam::Vec3;
use rustc_hash::FxHashMap;

use crate::archive::{TableOfContents, TextureArchive};
use crate::capability::{CapabilityRecord, CapabilityTable};
use crate::error::ArchiveError;
use crate::flags::CapabilityFlags;
use crate::node::Texture;
use crate::renderer::{DrawCall, Renderer, TexRange};

/// A 1x1 texture whose payload identifies it.
pub fn tagged_texture(tag: u32) -> Texture {
    Texture::new(1, 1, tag.to_le_bytes().to_vec())
}

/// Tag of a texture built by [`tagged_texture`].
pub fn texture_tag(texture: &Texture) -> Option<u32> {
    let bytes: [u8; 4] = texture.data.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Texture archive backed by hash maps.
#[derive(Default)]
pub struct MemoryArchive {
    blocks: FxHashMap<(String, u64), Texture>,
    sequences: FxHashMap<String, Vec<Texture>>,
    tocs: FxHashMap<String, TableOfContents>,
    failing: FxHashMap<(String, u64), String>,
    /// Block reads started so far.
    pub reads: AtomicUsize,
    /// Held by a test to stall block reads.
    pub gate: Arc<Mutex<()>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block(mut self, archive: &str, offset: u64, texture: Texture) -> Self {
        self.blocks.insert((archive.to_owned(), offset), texture);
        self
    }

    pub fn with_failing_block(mut self, archive: &str, offset: u64, reason: &str) -> Self {
        self.failing
            .insert((archive.to_owned(), offset), reason.to_owned());
        self
    }

    pub fn with_sequence(mut self, archive: &str, textures: Vec<Texture>) -> Self {
        self.sequences.insert(archive.to_owned(), textures);
        self
    }

    pub fn with_toc(mut self, body: &str, toc: TableOfContents) -> Self {
        self.tocs.insert(body.to_owned(), toc);
        self
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl TextureArchive for MemoryArchive {
    fn read_block(&self, archive: &str, offset: u64) -> Result<Option<Texture>, ArchiveError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (archive.to_owned(), offset);
        if let Some(reason) = self.failing.get(&key) {
            return Err(ArchiveError::Read {
                name: archive.to_owned(),
                offset,
                source: std::io::Error::other(reason.clone()),
            });
        }
        Ok(self.blocks.get(&key).cloned())
    }

    fn read_sequence(&self, archive: &str, max: usize) -> Result<Vec<Texture>, ArchiveError> {
        let textures = self
            .sequences
            .get(archive)
            .ok_or_else(|| ArchiveError::Missing {
                name: archive.to_owned(),
            })?;
        Ok(textures.iter().take(max).cloned().collect())
    }

    fn load_toc(&self, body: &str) -> Result<TableOfContents, ArchiveError> {
        self.tocs
            .get(body)
            .cloned()
            .ok_or_else(|| ArchiveError::Missing {
                name: format!("{body}_tile.bin"),
            })
    }
}

/// Capability table with at most one record.
#[derive(Default)]
pub struct MemoryCapabilities {
    record: Option<CapabilityRecord>,
}

impl MemoryCapabilities {
    pub fn new(record: CapabilityRecord) -> Self {
        Self {
            record: Some(record),
        }
    }

    pub fn missing() -> Self {
        Self::default()
    }
}

impl CapabilityTable for MemoryCapabilities {
    fn load_capabilities(&self, body: &str) -> Result<CapabilityRecord, ArchiveError> {
        self.record.clone().ok_or_else(|| ArchiveError::Missing {
            name: format!("{body}_lmask.bin"),
        })
    }
}

/// One draw as seen by [`RecordingRenderer`].
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    pub level: u8,
    pub band: u32,
    pub surface_tag: Option<u32>,
    pub mask_tag: Option<u32>,
    pub tex_range: TexRange,
    pub flags: CapabilityFlags,
    pub ambient: Vec3,
}

/// Renderer that records every draw and treats everything as visible.
#[derive(Default)]
pub struct RecordingRenderer {
    pub draws: Vec<DrawRecord>,
    pub stats: Vec<(u8, u32)>,
    /// Bounding spheres farther than this from the camera are invisible.
    pub max_visible_distance: Option<f32>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_level(&self) -> Option<u8> {
        self.draws.iter().map(|d| d.level).max()
    }

    pub fn clear(&mut self) {
        self.draws.clear();
        self.stats.clear();
    }
}

impl Renderer for RecordingRenderer {
    fn is_visible(&self, center: Vec3, radius: f32) -> bool {
        self.max_visible_distance
            .is_none_or(|limit| center.length() - radius <= limit)
    }

    fn draw(&mut self, call: &DrawCall<'_>) {
        self.draws.push(DrawRecord {
            level: call.level,
            band: call.mesh.key.band,
            surface_tag: call.surface.and_then(|t| texture_tag(t)),
            mask_tag: call.mask.and_then(|t| texture_tag(t)),
            tex_range: call.tex_range,
            flags: call.flags,
            ambient: call.ambient,
        });
    }

    fn record_stats(&mut self, level: u8, vertex_count: u32) {
        self.stats.push((level, vertex_count));
    }
}
