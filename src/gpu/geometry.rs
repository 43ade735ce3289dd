// src/gpu/geometry.rs
//! Vertex and index buffers for scene geometry.

use std::sync::atomic::{AtomicBool, Ordering};

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::error::Result;
use crate::registry::GpuResource;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Unit quad in the XY plane facing +Z, UVs repeated `tiles` times.
pub fn quad(tiles: f32) -> ([Vertex; 4], [u32; 6]) {
    let v = |x: f32, y: f32, u: f32, w: f32| Vertex {
        position: [x, y, 0.0],
        normal: [0.0, 0.0, 1.0],
        uv: [u * tiles, w * tiles],
    };
    (
        [v(-1.0, -1.0, 0.0, 1.0), v(1.0, -1.0, 1.0, 1.0), v(1.0, 1.0, 1.0, 0.0), v(-1.0, 1.0, 0.0, 0.0)],
        [0, 1, 2, 0, 2, 3],
    )
}

pub struct GpuGeometry {
    label: String,
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
    destroyed: AtomicBool,
}

impl GpuGeometry {
    pub fn new(device: &wgpu::Device, label: &str, vertices: &[Vertex], indices: &[u32]) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            label: label.to_string(),
            vertices: vertex_buffer,
            indices: index_buffer,
            index_count: indices.len() as u32,
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn vertex_buffer(&self) -> &wgpu::Buffer {
        &self.vertices
    }

    pub fn index_buffer(&self) -> &wgpu::Buffer {
        &self.indices
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

impl GpuResource for GpuGeometry {
    fn label(&self) -> &str {
        &self.label
    }

    fn dispose(&self) -> Result<()> {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            self.vertices.destroy();
            self.indices.destroy();
        }
        Ok(())
    }
}
