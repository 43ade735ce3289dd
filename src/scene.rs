// src/scene.rs
//! Minimal scene graph: the registry walks it on teardown to find every GPU
//! resource the previous context owned.

use std::sync::Arc;

use glam::Mat4;

use crate::material::SharedMaterial;
use crate::registry::GpuResource;

pub struct SceneNode {
    pub name: String,
    pub transform: Mat4,
    pub geometry: Option<Arc<dyn GpuResource>>,
    pub material: Option<SharedMaterial>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Mat4::IDENTITY,
            geometry: None,
            material: None,
            children: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_geometry(mut self, geometry: Arc<dyn GpuResource>) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_material(mut self, material: SharedMaterial) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    /// Depth-first, parents before children.
    pub fn walk(&self, f: &mut dyn FnMut(&SceneNode)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }
}

#[derive(Default)]
pub struct SceneGraph {
    roots: Vec<SceneNode>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: SceneNode) {
        self.roots.push(node);
    }

    pub fn roots(&self) -> &[SceneNode] {
        &self.roots
    }

    pub fn walk(&self, f: &mut dyn FnMut(&SceneNode)) {
        for root in &self.roots {
            root.walk(f);
        }
    }

    pub fn node_count(&self) -> usize {
        let mut n = 0;
        self.walk(&mut |_| n += 1);
        n
    }

    /// Every material in the graph, in walk order. Shared materials appear
    /// once per node that uses them.
    pub fn materials(&self) -> Vec<SharedMaterial> {
        let mut out = Vec::new();
        self.walk(&mut |node| {
            if let Some(m) = &node.material {
                out.push(m.clone());
            }
        });
        out
    }

    pub fn clear(&mut self) {
        self.roots.clear();
    }
}
