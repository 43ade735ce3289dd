// src/gpu/backend.rs
//! The wgpu renderer registered with the context registry.

use std::sync::Arc;

use log::{debug, error, warn};
use winit::window::WindowId;

use crate::error::Result;
use crate::registry::RenderBackend;
use crate::scene::SceneGraph;

pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    surface: Option<wgpu::Surface<'static>>,
    config: wgpu::SurfaceConfiguration,
    scene: SceneGraph,
    /// DOM id of the canvas, used to force WebGL context loss.
    canvas_id: Option<String>,
}

impl WgpuBackend {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    ) -> Self {
        surface.configure(&device, &config);
        Self {
            device,
            queue,
            surface: Some(surface),
            config,
            scene: SceneGraph::new(),
            canvas_id: None,
        }
    }

    pub fn with_canvas_id(mut self, id: impl Into<String>) -> Self {
        self.canvas_id = Some(id.into());
        self
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.config);
        }
    }

    /// Next swapchain image, reconfiguring the surface once if it went stale.
    pub fn acquire_frame(&mut self) -> Option<wgpu::SurfaceTexture> {
        let surface = self.surface.as_ref()?;
        match surface.get_current_texture() {
            Ok(frame) => Some(frame),
            Err(err) => {
                warn!("failed to acquire swapchain texture: {err:?}; reconfiguring surface");
                surface.configure(&self.device, &self.config);
                match surface.get_current_texture() {
                    Ok(frame) => Some(frame),
                    Err(err) => {
                        error!("failed to acquire frame after reconfigure: {err:?}");
                        None
                    }
                }
            }
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn force_context_loss(&self) -> Option<Result<()>> {
        use wasm_bindgen::JsCast;

        let id = self.canvas_id.as_deref()?;
        let canvas = web_sys::window()?
            .document()?
            .get_element_by_id(id)?
            .dyn_into::<web_sys::HtmlCanvasElement>()
            .ok()?;
        let gl = match canvas.get_context("webgl2") {
            Ok(Some(ctx)) => ctx.dyn_into::<web_sys::WebGl2RenderingContext>().ok()?,
            _ => return None,
        };
        match gl.get_extension("WEBGL_lose_context") {
            Ok(Some(ext)) => {
                ext.unchecked_into::<web_sys::WebglLoseContext>().lose_context();
                Some(Ok(()))
            }
            Ok(None) => None,
            Err(err) => Some(Err(crate::error::Error::Disposal {
                resource: "WebGL context".into(),
                reason: format!("{err:?}"),
            })),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn force_context_loss(&self) -> Option<Result<()>> {
        None
    }
}

impl RenderBackend for WgpuBackend {
    type SurfaceId = WindowId;

    fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    fn scene_mut(&mut self) -> &mut SceneGraph {
        &mut self.scene
    }

    fn dispose(&mut self) -> Result<()> {
        self.surface = None;
        self.device.destroy();
        debug!("wgpu device destroyed");
        Ok(())
    }

    fn lose_context(&mut self) -> Option<Result<()>> {
        self.force_context_loss()
    }
}
