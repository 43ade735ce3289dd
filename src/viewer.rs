// src/viewer.rs
//! Demo viewer: one window, one registered context, a yard of procedural
//! materials upgrading from placeholders while frames keep rendering.
//!
//! Space cycles the family shown full screen.

use std::sync::Arc;

use log::{debug, error, info, warn};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

use crate::config::YardConfig;
use crate::descriptor::{GeneratorParams, MapKind, MaterialFamily};
use crate::environment::GpuEnvironment;
use crate::gpu::{quad, GpuGeometry, GpuTexture, UploadConfig, Vertex, WgpuBackend, WgpuUploader};
use crate::loader::Upgrade;
use crate::material::{Material, PendingMaps};
use crate::quality::{AdapterProbe, QualityManager};
use crate::registry::{ContextRegistry, GpuResource, RenderBackend, SurfaceLease};
use crate::scene::SceneNode;
use crate::scheduler::Priority;
use crate::textures::{ProceduralTextures, TextureRequest};

/// DOM id given to the canvas on the web.
pub const CANVAS_ID: &str = "yard-gfx-canvas";

const SHOWCASE_WGSL: &str = r#"
struct VertexIn {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(0) @binding(0) var t_map: texture_2d<f32>;
@group(0) @binding(1) var s_map: sampler;

@vertex
fn vs_main(v: VertexIn) -> VertexOut {
    var out: VertexOut;
    out.clip = vec4<f32>(v.position, 1.0);
    out.uv = v.uv;
    return out;
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    return textureSample(t_map, s_map, in.uv);
}
"#;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn run() {
    crate::init_logging();
    run_inner(YardConfig::default()).await;
}

#[cfg(not(target_arch = "wasm32"))]
pub fn run_native() {
    let config = match YardConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            warn!("ignoring config: {err}");
            YardConfig::default()
        }
    };
    pollster::block_on(run_inner(config));
}

/// Pipeline that draws one texture over the whole surface.
struct ShowcasePass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    bind_group: Option<wgpu::BindGroup>,
}

impl ShowcasePass {
    fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("showcase_shader"),
            source: wgpu::ShaderSource::Wgsl(SHOWCASE_WGSL.into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("showcase_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("showcase_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("showcase_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                compilation_options: Default::default(),
                buffers: &[Vertex::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            layout,
            bind_group: None,
        }
    }

    fn bind(&mut self, device: &wgpu::Device, texture: &GpuTexture) {
        self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("showcase_bind_group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(texture.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(texture.sampler()),
                },
            ],
        }));
    }

    fn draw(&self, backend: &mut WgpuBackend, geometry: &GpuGeometry) {
        let Some(frame) = backend.acquire_frame() else { return };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = backend
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("showcase_encoder"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("showcase_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.08,
                            g: 0.12,
                            b: 0.18,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            // Until the first placeholder lands only the clear runs.
            if let Some(bind_group) = &self.bind_group {
                rpass.set_pipeline(&self.pipeline);
                rpass.set_bind_group(0, bind_group, &[]);
                rpass.set_vertex_buffer(0, geometry.vertex_buffer().slice(..));
                rpass.set_index_buffer(geometry.index_buffer().slice(..), wgpu::IndexFormat::Uint32);
                rpass.draw_indexed(0..geometry.index_count(), 0, 0..1);
            }
        }
        backend.queue().submit(Some(encoder.finish()));
        frame.present();
    }
}

/// Everything tied to one window's context. Dropping it tears the context down.
struct Session {
    window: Arc<Window>,
    device: Arc<wgpu::Device>,
    textures: ProceduralTextures<WgpuUploader>,
    materials: Vec<PendingMaps<Arc<GpuTexture>>>,
    geometry: Arc<GpuGeometry>,
    showcase: ShowcasePass,
    showcase_family: usize,
    showcase_upgrade: Option<Upgrade<Arc<GpuTexture>>>,
    lease: SurfaceLease<WgpuBackend>,
}

impl Session {
    fn show_family(&mut self, index: usize) {
        self.showcase_family = index % MaterialFamily::ALL.len();
        let family = MaterialFamily::ALL[self.showcase_family];
        let request = TextureRequest::new(family, MapKind::Albedo).with_priority(Priority::High);
        let Some(progressive) = self.textures.request(request) else { return };
        if let Some(placeholder) = progressive.placeholder {
            self.showcase.bind(&self.device, &placeholder.resource);
        }
        info!("showing {family} ({:?})", self.textures.loader().state(progressive.upgrade.key()));
        self.showcase_upgrade = Some(progressive.upgrade);
    }

    fn frame(&mut self) {
        let report = self.textures.pump();
        if report.steps > 0 {
            debug!("pumped {} step(s), {} completed", report.steps, report.completed);
        }
        for pending in &mut self.materials {
            pending.poll();
        }
        self.materials.retain(|p| !p.is_settled());

        if let Some(upgrade) = self.showcase_upgrade.as_mut() {
            match upgrade.try_take() {
                None => {}
                Some(Ok(loaded)) => {
                    self.showcase.bind(&self.device, &loaded.resource);
                    self.showcase_upgrade = None;
                }
                Some(Err(err)) => {
                    warn!("showcase upgrade failed: {err}");
                    self.showcase_upgrade = None;
                }
            }
        }

        let geometry = &self.geometry;
        let showcase = &self.showcase;
        self.lease
            .registry()
            .with_active(|_, backend| showcase.draw(backend, geometry));
    }
}

struct YardViewer {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    /// Taken by the first session; the registry destroys it on teardown.
    device: Option<(Arc<wgpu::Device>, Arc<wgpu::Queue>)>,
    config: YardConfig,
    registry: Arc<ContextRegistry<WgpuBackend>>,
    session: Option<Session>,
}

impl YardViewer {
    fn start_session(&mut self, event_loop: &ActiveEventLoop) -> Option<Session> {
        let Some((device, queue)) = self.device.take() else {
            warn!("device already torn down; cannot resume");
            return None;
        };

        let attrs = Window::default_attributes().with_title("Yard GFX");
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                error!("failed to create window: {err}");
                return None;
            }
        };

        #[cfg(target_arch = "wasm32")]
        attach_canvas(&window);

        let surface = match self.instance.create_surface(window.clone()) {
            Ok(surface) => surface,
            Err(err) => {
                error!("failed to create surface: {err}");
                return None;
            }
        };
        let quality = Arc::new(QualityManager::new(
            AdapterProbe::new(&self.adapter, window.scale_factor()),
            self.config.quality.clone(),
        ));
        let size = window.inner_size();
        let (width, height) = quality
            .settings()
            .surface_size(size.width, size.height, window.scale_factor());
        let caps = surface.get_capabilities(&self.adapter);
        let Some(&fallback) = caps.formats.first() else {
            error!("surface reports no formats");
            return None;
        };
        let format = caps.formats.iter().copied().find(|f| f.is_srgb()).unwrap_or(fallback);
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: caps.present_modes.first().copied().unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let backend = WgpuBackend::new(device.clone(), queue.clone(), surface, surface_config);
        #[cfg(target_arch = "wasm32")]
        let backend = backend.with_canvas_id(CANVAS_ID);
        let Some(lease) = self.registry.acquire(window.id(), backend) else {
            error!("window {:?} already owns a context", window.id());
            return None;
        };

        let env = GpuEnvironment::from_adapter(Some(&self.adapter));
        let uploader = WgpuUploader::new(
            device.clone(),
            queue,
            UploadConfig::default().with_anisotropy(8),
        );
        let textures = ProceduralTextures::new(env, quality, uploader, &self.config);
        self.registry.add_teardown_hook(textures.loader());

        let (vertices, indices) = quad(2.0);
        let geometry = Arc::new(GpuGeometry::new(&device, "yard_quad", &vertices, &indices));

        let mut materials = Vec::new();
        let mut yard = SceneNode::new("yard");
        for (i, family) in MaterialFamily::ALL.into_iter().enumerate() {
            let material = Material::new(family.as_str()).shared();
            let params = GeneratorParams::default().with_seed(i as u32 + 1);
            if let Some(pending) = self.textures_for(&textures, family, params, material.clone()) {
                materials.push(pending);
            }
            let geometry: Arc<dyn GpuResource> = geometry.clone();
            yard = yard.with_child(
                SceneNode::new(family.as_str())
                    .with_geometry(geometry)
                    .with_material(material),
            );
        }
        self.registry.with_active(|_, backend| backend.scene_mut().add(yard));

        let showcase = ShowcasePass::new(&device, format);
        let mut session = Session {
            window,
            device,
            textures,
            materials,
            geometry,
            showcase,
            showcase_family: 0,
            showcase_upgrade: None,
            lease,
        };
        session.show_family(0);
        Some(session)
    }

    fn textures_for(
        &self,
        textures: &ProceduralTextures<WgpuUploader>,
        family: MaterialFamily,
        params: GeneratorParams,
        material: crate::material::SharedMaterial,
    ) -> Option<PendingMaps<Arc<GpuTexture>>> {
        let pending = textures.request_set(family, params, Priority::Medium, material);
        if pending.is_none() {
            info!("{family}: headless, material stays untextured");
        }
        pending
    }
}

impl ApplicationHandler for YardViewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Poll);
        if self.session.is_some() {
            return;
        }
        match self.start_session(event_loop) {
            Some(session) => {
                session.window.request_redraw();
                self.session = Some(session);
            }
            None => event_loop.exit(),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(session) = self.session.as_mut() else { return };
        if session.window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                // Dropping the session releases the lease and tears the context down.
                self.session = None;
                if let Some(report) = self.registry.last_teardown() {
                    info!("context torn down: {report:?}");
                }
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) if new_size.width > 0 && new_size.height > 0 => {
                let (width, height) = session.textures.quality().settings().surface_size(
                    new_size.width,
                    new_size.height,
                    session.window.scale_factor(),
                );
                self.registry.with_active(|_, backend| backend.resize(width, height));
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                debug!("scale factor changed: {scale_factor}");
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && !event.repeat
                    && event.logical_key == Key::Named(NamedKey::Space)
                {
                    let next = session.showcase_family + 1;
                    session.show_family(next);
                }
            }
            WindowEvent::RedrawRequested => {
                session.frame();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(session) = &self.session {
            session.window.request_redraw();
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn attach_canvas(window: &Window) {
    use winit::platform::web::WindowExtWebSys;

    let Some(canvas) = window.canvas() else {
        warn!("no canvas available from winit window");
        return;
    };
    canvas.set_id(CANVAS_ID);
    let canvas: web_sys::Element = canvas.into();
    let Some(document) = web_sys::window().and_then(|w| w.document()) else {
        warn!("no document to attach the canvas to");
        return;
    };
    let parent = document
        .get_element_by_id("yard-container")
        .or_else(|| document.body().map(Into::into));
    if let Some(parent) = parent {
        if let Err(err) = parent.append_child(&canvas) {
            warn!("failed to attach canvas: {err:?}");
        }
    }
}

async fn run_inner(config: YardConfig) {
    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            error!("failed to create event loop: {err}");
            return;
        }
    };

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        dx12_shader_compiler: Default::default(),
        flags: wgpu::InstanceFlags::empty(),
        gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
    });

    // No surface yet; the window only exists once the loop resumes.
    let Some(adapter) = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
    else {
        error!("no suitable GPU adapter; nothing to render");
        return;
    };
    info!("adapter: {:?}", adapter.get_info());

    let (device, queue) = match adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("yard_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: Default::default(),
            },
            None,
        )
        .await
    {
        Ok(pair) => pair,
        Err(err) => {
            error!("failed to request device: {err}");
            return;
        }
    };

    let app = YardViewer {
        instance,
        adapter,
        device: Some((Arc::new(device), Arc::new(queue))),
        config,
        registry: Arc::new(ContextRegistry::new()),
        session: None,
    };

    // The web loop must not block the browser.
    #[cfg(target_arch = "wasm32")]
    {
        use winit::platform::web::EventLoopExtWebSys;
        event_loop.spawn_app(app);
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let mut app = app;
        if let Err(err) = event_loop.run_app(&mut app) {
            error!("event loop failed: {err}");
        }
    }
}
