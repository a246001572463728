//! CPU-simulated GPU context.
//!
//! Recorded commands are queued per submission and only execute when the
//! owner retires them, which makes GPU progress fully deterministic. The
//! backend also audits the contract the streaming core relies on and records
//! a [`Hazard`] whenever host memory, ring entries or resources are touched
//! while queued work still depends on them.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use crate::descriptor::RingRange;
use crate::error::{Result, StreamError};
use crate::sync::SyncPoint;

use super::backend::{
    store_ring_entry, BufferDesc, DrawCall, GpuBackend, TexelFormat, TextureCopyLayout,
    TextureDesc,
};

type DropLog = Rc<RefCell<HashSet<u32>>>;

#[derive(Debug)]
pub struct NullBuffer {
    id: u32,
    size: u64,
    drops: DropLog,
}

impl NullBuffer {
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for NullBuffer {
    fn drop(&mut self) {
        self.drops.borrow_mut().insert(self.id);
    }
}

#[derive(Debug)]
pub struct NullTexture {
    id: u32,
    width: u32,
    height: u32,
    format: TexelFormat,
    drops: DropLog,
}

impl NullTexture {
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn format(&self) -> TexelFormat {
        self.format
    }
}

impl Drop for NullTexture {
    fn drop(&mut self) {
        self.drops.borrow_mut().insert(self.id);
    }
}

/// View of a simulated texture; carries the texture id.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct NullView(pub u32);

/// A contract violation observed by the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hazard {
    /// Host write into staging memory a queued command still reads.
    StagingOverwrite { buffer: u32, offset: u64, len: u64 },
    /// Ring entry rewritten while a queued draw still binds it.
    RingOverwrite { index: u32 },
    /// A command executed against a resource that had already been dropped.
    UseAfterDestroy { resource: u32 },
}

/// A draw as the simulated GPU saw it at execution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedDraw {
    pub sync: SyncPoint,
    pub views: Vec<Option<NullView>>,
    pub vertex_buffer: u32,
    pub index_buffer: u32,
    pub index_count: u32,
    pub constants: Vec<u8>,
}

#[derive(Debug)]
enum Command {
    Clear,
    CopyBuffer {
        dst: u32,
        dst_offset: u64,
        src: u32,
        src_offset: u64,
        size: u64,
    },
    CopyTexture {
        dst: u32,
        src: u32,
        layout: TextureCopyLayout,
    },
    Draw {
        views: Option<RingRange>,
        vertex_buffer: u32,
        index_buffer: u32,
        index_count: u32,
        constants: Option<(u32, u64, u64)>,
    },
}

impl Command {
    fn reads_staging(&self, buffer: u32, start: u64, end: u64) -> bool {
        let overlaps = |offset: u64, size: u64| start < offset + size && offset < end;
        match *self {
            Command::CopyBuffer { src, src_offset, size, .. } => {
                src == buffer && overlaps(src_offset, size)
            }
            Command::CopyTexture { src, layout, .. } => {
                src == buffer
                    && overlaps(layout.offset, layout.bytes_per_row as u64 * layout.height as u64)
            }
            Command::Draw { constants: Some((src, offset, size)), .. } => {
                src == buffer && overlaps(offset, size)
            }
            _ => false,
        }
    }

    fn reads_ring(&self, index: u32) -> bool {
        matches!(self, Command::Draw { views: Some(range), .. } if range.contains(index))
    }

    fn resources(&self) -> Vec<u32> {
        match *self {
            Command::Clear => Vec::new(),
            Command::CopyBuffer { dst, src, .. } => vec![dst, src],
            Command::CopyTexture { dst, src, .. } => vec![dst, src],
            Command::Draw { vertex_buffer, index_buffer, constants, .. } => {
                let mut ids = vec![vertex_buffer, index_buffer];
                ids.extend(constants.map(|(src, _, _)| src));
                ids
            }
        }
    }
}

struct TextureStore {
    row_bytes: u32,
    texels: Vec<u8>,
}

/// Deterministic, single-threaded stand-in for a GPU.
pub struct NullBackend {
    next_id: u32,
    buffers: HashMap<u32, Vec<u8>>,
    textures: HashMap<u32, TextureStore>,
    ring: Vec<Option<NullView>>,

    recorded: Vec<Command>,
    in_flight: VecDeque<(SyncPoint, Vec<Command>)>,
    last_signalled: SyncPoint,
    completed: SyncPoint,

    drops: DropLog,
    hazards: Vec<Hazard>,
    executed_draws: Vec<ExecutedDraw>,
    lost: Option<String>,

    staging_created: usize,
    blocking_waits: u64,
    frames_begun: u64,
}

impl NullBackend {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            ring: Vec::new(),
            recorded: Vec::new(),
            in_flight: VecDeque::new(),
            last_signalled: SyncPoint::ZERO,
            completed: SyncPoint::ZERO,
            drops: DropLog::default(),
            hazards: Vec::new(),
            executed_draws: Vec::new(),
            lost: None,
            staging_created: 0,
            blocking_waits: 0,
            frames_begun: 0,
        }
    }

    // ── GPU progress ───────────────────────────────────────────────────────

    /// Executes every submission up to and including `sync`.
    pub fn retire_through(&mut self, sync: SyncPoint) {
        if self.lost.is_some() {
            return;
        }
        while self.in_flight.front().is_some_and(|(s, _)| *s <= sync) {
            let Some((signal, commands)) = self.in_flight.pop_front() else { break };
            for cmd in &commands {
                self.execute(signal, cmd);
            }
            self.completed = signal;
        }
    }

    /// Executes the oldest submission, if any.
    pub fn retire_next(&mut self) {
        if let Some(&(sync, _)) = self.in_flight.front() {
            self.retire_through(sync);
        }
    }

    pub fn retire_all(&mut self) {
        self.retire_through(self.last_signalled);
    }

    /// Simulates device removal; every later submit or wait fails.
    pub fn lose_device(&mut self, reason: &str) {
        self.lost = Some(reason.to_owned());
    }

    // ── inspection ─────────────────────────────────────────────────────────

    pub fn hazards(&self) -> &[Hazard] {
        &self.hazards
    }

    pub fn executed_draws(&self) -> &[ExecutedDraw] {
        &self.executed_draws
    }

    pub fn buffer_contents(&self, buffer: &NullBuffer) -> &[u8] {
        self.buffers.get(&buffer.id).map_or(&[], Vec::as_slice)
    }

    /// Tightly packed texel rows of a texture.
    pub fn texture_contents(&self, texture: &NullTexture) -> &[u8] {
        self.textures.get(&texture.id).map_or(&[], |t| t.texels.as_slice())
    }

    /// Texels of the texture a view points at.
    pub fn view_contents(&self, view: NullView) -> &[u8] {
        self.textures.get(&view.0).map_or(&[], |t| t.texels.as_slice())
    }

    pub fn ring_entry(&self, index: u32) -> Option<NullView> {
        self.ring.get(index as usize).copied().flatten()
    }

    pub fn is_dropped(&self, resource: u32) -> bool {
        self.drops.borrow().contains(&resource)
    }

    /// Submissions queued but not yet retired.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn last_signalled(&self) -> SyncPoint {
        self.last_signalled
    }

    pub fn staging_buffers_created(&self) -> usize {
        self.staging_created
    }

    pub fn blocking_waits(&self) -> u64 {
        self.blocking_waits
    }

    pub fn frames_begun(&self) -> u64 {
        self.frames_begun
    }

    /// Creates a 1x1 texture and returns its view, for tests that only need
    /// distinct views.
    pub fn make_view(&mut self) -> NullView {
        let id = self.alloc_id();
        self.textures.insert(id, TextureStore { row_bytes: 1, texels: vec![0] });
        NullView(id)
    }

    // ── internals ──────────────────────────────────────────────────────────

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn pending_commands(&self) -> impl Iterator<Item = &Command> {
        self.recorded
            .iter()
            .chain(self.in_flight.iter().flat_map(|(_, cmds)| cmds.iter()))
    }

    fn check_alive(&self) -> Result<()> {
        match &self.lost {
            Some(reason) => Err(StreamError::DeviceLost(reason.clone())),
            None => Ok(()),
        }
    }

    fn execute(&mut self, sync: SyncPoint, cmd: &Command) {
        for id in cmd.resources() {
            if self.is_dropped(id) {
                self.hazards.push(Hazard::UseAfterDestroy { resource: id });
            }
        }

        match *cmd {
            Command::Clear => {}
            Command::CopyBuffer { dst, dst_offset, src, src_offset, size } => {
                let bytes = read_range(&self.buffers, src, src_offset, size);
                if let Some(dst) = self.buffers.get_mut(&dst) {
                    write_range(dst, dst_offset, &bytes);
                }
            }
            Command::CopyTexture { dst, src, layout } => {
                let Some(store) = self.textures.get(&dst) else { return };
                let row_bytes = store.row_bytes as u64;
                let mut texels = Vec::with_capacity((row_bytes * layout.height as u64) as usize);
                for row in 0..layout.height as u64 {
                    let offset = layout.offset + row * layout.bytes_per_row as u64;
                    texels.extend(read_range(&self.buffers, src, offset, row_bytes));
                }
                if let Some(store) = self.textures.get_mut(&dst) {
                    store.texels = texels;
                }
            }
            Command::Draw { views, vertex_buffer, index_buffer, index_count, constants } => {
                let views = views
                    .map(|r| (r.base..r.end()).map(|i| self.ring_entry(i)).collect())
                    .unwrap_or_default();
                let constants = constants
                    .map(|(src, offset, size)| read_range(&self.buffers, src, offset, size))
                    .unwrap_or_default();
                self.executed_draws.push(ExecutedDraw {
                    sync,
                    views,
                    vertex_buffer,
                    index_buffer,
                    index_count,
                    constants,
                });
            }
        }
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn read_range(buffers: &HashMap<u32, Vec<u8>>, id: u32, offset: u64, size: u64) -> Vec<u8> {
    let Some(buf) = buffers.get(&id) else { return Vec::new() };
    let start = (offset as usize).min(buf.len());
    let end = (offset.saturating_add(size) as usize).min(buf.len());
    buf[start..end].to_vec()
}

fn write_range(buf: &mut [u8], offset: u64, data: &[u8]) {
    let start = (offset as usize).min(buf.len());
    let end = (start + data.len()).min(buf.len());
    buf[start..end].copy_from_slice(&data[..end - start]);
}

impl GpuBackend for NullBackend {
    type StagingBuffer = NullBuffer;
    type Buffer = NullBuffer;
    type Texture = NullTexture;
    type View = NullView;

    fn create_staging_buffer(&mut self, size: u64) -> Result<NullBuffer> {
        self.check_alive()?;
        let id = self.alloc_id();
        self.buffers.insert(id, vec![0; size as usize]);
        self.staging_created += 1;
        Ok(NullBuffer { id, size, drops: Rc::clone(&self.drops) })
    }

    fn write_staging(&mut self, buffer: &NullBuffer, offset: u64, data: &[u8]) {
        let end = offset + data.len() as u64;
        if self.pending_commands().any(|c| c.reads_staging(buffer.id, offset, end)) {
            self.hazards.push(Hazard::StagingOverwrite {
                buffer: buffer.id,
                offset,
                len: data.len() as u64,
            });
        }
        if let Some(buf) = self.buffers.get_mut(&buffer.id) {
            write_range(buf, offset, data);
        }
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<NullBuffer> {
        self.check_alive()?;
        let id = self.alloc_id();
        self.buffers.insert(id, vec![0; desc.size as usize]);
        Ok(NullBuffer { id, size: desc.size, drops: Rc::clone(&self.drops) })
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<(NullTexture, NullView)> {
        self.check_alive()?;
        let id = self.alloc_id();
        let row_bytes = desc.width * desc.format.bytes_per_texel();
        self.textures.insert(
            id,
            TextureStore {
                row_bytes,
                texels: vec![0; row_bytes as usize * desc.height as usize],
            },
        );
        let texture = NullTexture {
            id,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            drops: Rc::clone(&self.drops),
        };
        Ok((texture, NullView(id)))
    }

    fn copy_buffer_region(
        &mut self,
        dst: &NullBuffer,
        dst_offset: u64,
        src: &NullBuffer,
        src_offset: u64,
        size: u64,
    ) {
        self.recorded.push(Command::CopyBuffer {
            dst: dst.id,
            dst_offset,
            src: src.id,
            src_offset,
            size,
        });
    }

    fn copy_buffer_to_texture(
        &mut self,
        dst: &NullTexture,
        src: &NullBuffer,
        layout: TextureCopyLayout,
    ) {
        self.recorded.push(Command::CopyTexture { dst: dst.id, src: src.id, layout });
    }

    fn record_view_write(&mut self, ring_index: u32, view: &NullView) {
        if self.pending_commands().any(|c| c.reads_ring(ring_index)) {
            self.hazards.push(Hazard::RingOverwrite { index: ring_index });
        }
        store_ring_entry(&mut self.ring, ring_index, view);
    }

    fn begin_frame(&mut self) -> Result<()> {
        self.check_alive()?;
        self.frames_begun += 1;
        self.recorded.push(Command::Clear);
        Ok(())
    }

    fn draw_indexed(&mut self, draw: DrawCall<'_, Self>) {
        self.recorded.push(Command::Draw {
            views: draw.views,
            vertex_buffer: draw.vertex_buffer.id,
            index_buffer: draw.index_buffer.id,
            index_count: draw.index_count,
            constants: draw.constants.map(|c| (c.buffer.id, c.offset, c.size)),
        });
    }

    fn submit_recorded_work(&mut self, signal: SyncPoint) -> Result<()> {
        self.check_alive()?;
        debug_assert!(signal > self.last_signalled, "signal values must increase");
        let commands = std::mem::take(&mut self.recorded);
        self.in_flight.push_back((signal, commands));
        self.last_signalled = signal;
        Ok(())
    }

    fn query_completed_sync_point(&self) -> SyncPoint {
        self.completed
    }

    fn block_until_sync_point(&mut self, sync: SyncPoint) -> Result<()> {
        self.check_alive()?;
        self.blocking_waits += 1;
        self.retire_through(sync);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::BufferKind;

    fn sp(v: u64) -> SyncPoint {
        SyncPoint::new(v)
    }

    #[test]
    fn copies_execute_on_retire() {
        let mut gpu = NullBackend::new();
        let staging = gpu.create_staging_buffer(16).unwrap();
        let dst = gpu
            .create_buffer(&BufferDesc { label: None, size: 8, kind: BufferKind::Vertex })
            .unwrap();

        gpu.write_staging(&staging, 4, &[1, 2, 3, 4]);
        gpu.copy_buffer_region(&dst, 0, &staging, 4, 4);
        gpu.submit_recorded_work(sp(1)).unwrap();
        assert_eq!(gpu.buffer_contents(&dst), &[0; 8]);

        gpu.retire_all();
        assert_eq!(&gpu.buffer_contents(&dst)[..4], &[1, 2, 3, 4]);
        assert_eq!(gpu.query_completed_sync_point(), sp(1));
    }

    #[test]
    fn overwriting_queued_staging_is_a_hazard() {
        let mut gpu = NullBackend::new();
        let staging = gpu.create_staging_buffer(16).unwrap();
        let dst = gpu
            .create_buffer(&BufferDesc { label: None, size: 8, kind: BufferKind::Index })
            .unwrap();
        gpu.copy_buffer_region(&dst, 0, &staging, 0, 8);
        gpu.submit_recorded_work(sp(1)).unwrap();

        gpu.write_staging(&staging, 8, &[0; 8]);
        assert!(gpu.hazards().is_empty());
        gpu.write_staging(&staging, 4, &[0; 4]);
        assert_eq!(gpu.hazards().len(), 1);

        gpu.retire_all();
        gpu.write_staging(&staging, 0, &[0; 8]);
        assert_eq!(gpu.hazards().len(), 1);
    }

    #[test]
    fn retire_is_in_order() {
        let mut gpu = NullBackend::new();
        for v in 1..=3 {
            gpu.submit_recorded_work(sp(v)).unwrap();
        }
        gpu.retire_next();
        assert_eq!(gpu.query_completed_sync_point(), sp(1));
        gpu.retire_through(sp(2));
        assert_eq!(gpu.in_flight(), 1);
    }

    #[test]
    fn lost_device_fails_submission() {
        let mut gpu = NullBackend::new();
        gpu.lose_device("removed");
        assert_eq!(
            gpu.submit_recorded_work(sp(1)),
            Err(StreamError::DeviceLost("removed".into()))
        );
        assert!(gpu.block_until_sync_point(sp(1)).is_err());
    }
}
