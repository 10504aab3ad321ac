//! Local preview window, built with the `preview` feature.
//!
//! Events are pumped once per presented frame without blocking, so the
//! session's tick loop stays in charge of timing.

use std::sync::Arc;
use std::time::Duration;

use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowBuilder};

use crate::error::{StreamError, StreamResult};
use crate::render::Frame;
use crate::schema::{CancelKey, PreviewConfig, SessionConfig};
use crate::sink::SinkStatus;

pub struct PreviewWindow {
    event_loop: EventLoop<()>,
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    swap_red_blue: bool,
    cancel_key: Option<KeyCode>,
    scratch: Vec<u8>,
    closed: bool,
}

impl PreviewWindow {
    pub fn open(config: &SessionConfig, preview: &PreviewConfig) -> StreamResult<Self> {
        let cancel_key = key_code(preview.cancel_key()?);
        let event_loop = EventLoop::new().map_err(|error| {
            StreamError::pipeline_io(format!("failed to create preview event loop: {error}"))
        })?;
        let size = PhysicalSize::new(config.canvas.width, config.canvas.height);
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(preview.title.clone())
                .with_inner_size(size)
                .with_resizable(true)
                .build(&event_loop)
                .map_err(|error| {
                    StreamError::pipeline_io(format!("failed to create preview window: {error}"))
                })?,
        );

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(window.clone()).map_err(|error| {
            StreamError::pipeline_io(format!("failed to create preview surface: {error}"))
        })?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            force_fallback_adapter: false,
            compatible_surface: Some(&surface),
        }))
        .ok_or_else(|| StreamError::pipeline_io("no GPU adapter can present to the preview window"))?;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("typewire-preview-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
            },
            None,
        ))
        .map_err(|error| {
            StreamError::pipeline_io(format!("failed to request preview device: {error}"))
        })?;

        let caps = surface.get_capabilities(&adapter);
        if !caps.usages.contains(wgpu::TextureUsages::COPY_DST) {
            return Err(StreamError::pipeline_io(
                "preview surface does not accept texture uploads",
            ));
        }
        let (format, swap_red_blue) = pick_surface_format(&caps.formats).ok_or_else(|| {
            StreamError::pipeline_io(format!(
                "preview surface offers no 8-bit RGBA/BGRA format (available: {:?})",
                caps.formats
            ))
        })?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let inner = window.inner_size();
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
            format,
            width: inner.width.max(1),
            height: inner.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        tracing::info!(
            title = %preview.title,
            width = surface_config.width,
            height = surface_config.height,
            format = ?format,
            "preview window opened"
        );

        Ok(Self {
            event_loop,
            window,
            surface,
            device,
            queue,
            surface_config,
            swap_red_blue,
            cancel_key,
            scratch: Vec::new(),
            closed: false,
        })
    }

    pub fn present(&mut self, frame: &Frame) -> StreamResult<SinkStatus> {
        if self.closed {
            return Err(StreamError::pipeline_io("preview window is closed"));
        }

        let window_id = self.window.id();
        let cancel_key = self.cancel_key;
        let mut cancelled = false;
        let mut resized = None;
        let status = self
            .event_loop
            .pump_events(Some(Duration::ZERO), |event, _target| {
                let Event::WindowEvent { window_id: id, event } = event else {
                    return;
                };
                if id != window_id {
                    return;
                }
                match event {
                    WindowEvent::CloseRequested => cancelled = true,
                    WindowEvent::KeyboardInput { event, .. } => {
                        if event.state == ElementState::Pressed && !event.repeat {
                            if let PhysicalKey::Code(code) = event.physical_key {
                                if code == KeyCode::Escape || Some(code) == cancel_key {
                                    cancelled = true;
                                }
                            }
                        }
                    }
                    WindowEvent::Resized(size) => resized = Some(size),
                    _ => {}
                }
            });

        if let PumpStatus::Exit(code) = status {
            tracing::info!(code, "preview event loop exited");
            return Ok(SinkStatus::Cancelled);
        }
        if cancelled {
            tracing::info!("preview cancelled from the window");
            return Ok(SinkStatus::Cancelled);
        }
        if let Some(size) = resized {
            self.reconfigure(size);
        }

        self.draw(frame)?;
        Ok(SinkStatus::Continue)
    }

    fn reconfigure(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.surface_config.width = size.width;
        self.surface_config.height = size.height;
        self.surface.configure(&self.device, &self.surface_config);
        tracing::debug!(
            width = size.width,
            height = size.height,
            "preview surface reconfigured"
        );
    }

    fn draw(&mut self, frame: &Frame) -> StreamResult<()> {
        let texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                self.surface.configure(&self.device, &self.surface_config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => return Ok(()),
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(StreamError::pipeline_io("preview surface out of memory"));
            }
        };

        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("typewire-preview-clear"),
            });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("typewire-preview-letterbox"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.queue.submit(Some(encoder.finish()));

        self.scratch.clear();
        self.scratch.extend_from_slice(&frame.data);
        if self.swap_red_blue {
            for pixel in self.scratch.chunks_exact_mut(4) {
                pixel.swap(0, 2);
            }
        }

        let width = frame.width.min(self.surface_config.width);
        let height = frame.height.min(self.surface_config.height);
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &self.scratch,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(frame.width * 4),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::empty());
        texture.present();
        Ok(())
    }

    /// Hides the window; GPU resources go away when the sink is dropped.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.window.set_visible(false);
        tracing::info!("preview window closed");
    }
}

/// Picks an 8-bit surface format frames can be copied into, and whether red
/// and blue have to be swapped on upload.
fn pick_surface_format(formats: &[wgpu::TextureFormat]) -> Option<(wgpu::TextureFormat, bool)> {
    formats.iter().copied().find_map(|format| match format {
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => {
            Some((format, true))
        }
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => {
            Some((format, false))
        }
        _ => None,
    })
}

fn key_code(key: CancelKey) -> Option<KeyCode> {
    let code = match key {
        CancelKey::Escape => KeyCode::Escape,
        CancelKey::Space => KeyCode::Space,
        CancelKey::Char(ch) => match ch.to_ascii_lowercase() {
            'a' => KeyCode::KeyA,
            'b' => KeyCode::KeyB,
            'c' => KeyCode::KeyC,
            'd' => KeyCode::KeyD,
            'e' => KeyCode::KeyE,
            'f' => KeyCode::KeyF,
            'g' => KeyCode::KeyG,
            'h' => KeyCode::KeyH,
            'i' => KeyCode::KeyI,
            'j' => KeyCode::KeyJ,
            'k' => KeyCode::KeyK,
            'l' => KeyCode::KeyL,
            'm' => KeyCode::KeyM,
            'n' => KeyCode::KeyN,
            'o' => KeyCode::KeyO,
            'p' => KeyCode::KeyP,
            'q' => KeyCode::KeyQ,
            'r' => KeyCode::KeyR,
            's' => KeyCode::KeyS,
            't' => KeyCode::KeyT,
            'u' => KeyCode::KeyU,
            'v' => KeyCode::KeyV,
            'w' => KeyCode::KeyW,
            'x' => KeyCode::KeyX,
            'y' => KeyCode::KeyY,
            'z' => KeyCode::KeyZ,
            '0' => KeyCode::Digit0,
            '1' => KeyCode::Digit1,
            '2' => KeyCode::Digit2,
            '3' => KeyCode::Digit3,
            '4' => KeyCode::Digit4,
            '5' => KeyCode::Digit5,
            '6' => KeyCode::Digit6,
            '7' => KeyCode::Digit7,
            '8' => KeyCode::Digit8,
            '9' => KeyCode::Digit9,
            _ => return None,
        },
    };
    Some(code)
}
