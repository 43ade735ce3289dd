// src/gpu/mod.rs
//! wgpu-backed implementations of the resource traits.

mod backend;
mod geometry;
mod texture;
mod upload;

pub use backend::WgpuBackend;
pub use geometry::{quad, GpuGeometry, Vertex};
pub use texture::{GpuTexture, UploadConfig};
pub use upload::{CpuUploader, TextureUploader, WgpuUploader};
