//! Typed, recyclable resource identifiers.

mod allocator;

pub use allocator::{Handle, HandleAllocator, HandleKind};

pub enum VertexBufferKind {}
pub enum IndexBufferKind {}
pub enum TextureKind {}

impl HandleKind for VertexBufferKind {
    const NAME: &'static str = "vertex buffer";
}

impl HandleKind for IndexBufferKind {
    const NAME: &'static str = "index buffer";
}

impl HandleKind for TextureKind {
    const NAME: &'static str = "texture";
}

pub type VertexBufferId = Handle<VertexBufferKind>;
pub type IndexBufferId = Handle<IndexBufferKind>;
pub type TextureId = Handle<TextureKind>;
