use std::fmt::Display;

use anyhow::Context;
use eframe::egui::{self, Image, Key, TextureId, Vec2, load::SizedTexture};
use egui_wgpu::RenderState;
use wgpu::{FilterMode, wgt::TextureViewDescriptor};
use winit::dpi::PhysicalSize;

use crate::{
    ParticleStore, ParticleSystem, SimParameters,
    constants::TARGET_FORMAT,
    gpu::GpuContext,
    projection::orthographic,
    seed::Disc,
};

mod info;

const INFO_WIDTH: f32 = 260.0;
/// Margin around the seeded disc in the default view.
const VIEW_MARGIN: f32 = 1.1;

/// Coarse switch deciding whether the simulation advances this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Run,
    Stop,
    Edit,
}

impl RunState {
    pub fn advances(&self) -> bool {
        matches!(self, RunState::Run)
    }

    fn from_key(key: Key) -> Option<Self> {
        match key {
            Key::R => Some(RunState::Run),
            Key::S => Some(RunState::Stop),
            Key::E => Some(RunState::Edit),
            _ => None,
        }
    }
}

impl Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RunState::Run => "RUN",
            RunState::Stop => "STOP",
            RunState::Edit => "EDIT",
        })
    }
}

pub struct SwarmApp {
    system: ParticleSystem,
    texture: IntermediateTexture,
    run_state: RunState,
    mirror: bool,
    view_radius: f32,
    info_panel: info::InfoPanel,
}

impl SwarmApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        params: SimParameters,
        disc: Disc,
    ) -> anyhow::Result<Self> {
        let wgpu_render_state = cc
            .wgpu_render_state
            .as_ref()
            .context("eframe was not started with the wgpu renderer")?;
        let gpu = GpuContext::new(
            wgpu_render_state.device.clone(),
            wgpu_render_state.queue.clone(),
        );

        let mut store = ParticleStore::new(params.population);
        disc.fill(&mut store);
        let system = ParticleSystem::new(&gpu, store, &params, TARGET_FORMAT)?;

        let initial_size = PhysicalSize::new(300, 300);
        let texture =
            IntermediateTexture::new(&wgpu_render_state.device, initial_size, wgpu_render_state);

        Ok(Self {
            system,
            texture,
            run_state: RunState::Run,
            mirror: false,
            view_radius: disc.radius * VIEW_MARGIN,
            info_panel: info::InfoPanel::new(),
        })
    }

    fn handle_keys(&mut self, ctx: &egui::Context) {
        ctx.input(|i| {
            for evt in &i.events {
                if let egui::Event::Key {
                    key, pressed: true, ..
                } = evt
                {
                    if let Some(state) = RunState::from_key(*key) {
                        log::info!("Run state {} -> {}", self.run_state, state);
                        self.run_state = state;
                    } else if *key == Key::P {
                        self.mirror = !self.mirror;
                    }
                }
            }
        });
    }
}

impl eframe::App for SwarmApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        self.handle_keys(ctx);

        if self.run_state.advances() {
            // Draws later on this queue are ordered after the kernel writes.
            let _ = self.system.dispatch();
        }
        if self.mirror {
            match self.system.pull() {
                Ok(store) => self.info_panel.set_bounds(store.bounds()),
                Err(err) => {
                    log::error!("Host sync failed, disabling it: {err:#}");
                    self.mirror = false;
                }
            }
        }

        egui::SidePanel::right("info")
            .exact_width(INFO_WIDTH)
            .show(ctx, |ui| {
                self.info_panel.render(
                    ui,
                    self.system.len(),
                    self.run_state,
                    self.system.ticks(),
                    self.mirror,
                );
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            let available = ui.available_size();
            let psize = PhysicalSize {
                width: (available.x as u32).max(1),
                height: (available.y as u32).max(1),
            };

            if let Some(state) = frame.wgpu_render_state() {
                self.texture.resize(&state.device, psize, state);
            }
            self.system.set_projection(orthographic(
                self.view_radius,
                psize.width as f32 / psize.height as f32,
            ));
            self.system.draw(&self.texture.view);

            ui.add(Image::new(SizedTexture::new(
                self.texture.id,
                Vec2::new(psize.width as f32, psize.height as f32),
            )));
        });
        ctx.request_repaint();
    }
}

struct IntermediateTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: PhysicalSize<u32>,
    id: TextureId,
}

impl IntermediateTexture {
    fn create(device: &wgpu::Device, size: PhysicalSize<u32>) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Intermediate Texture"),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&TextureViewDescriptor::default());
        (texture, view)
    }

    pub fn new(device: &wgpu::Device, size: PhysicalSize<u32>, state: &RenderState) -> Self {
        let (texture, view) = Self::create(device, size);
        let id = state
            .renderer
            .write()
            .register_native_texture(device, &view, FilterMode::Nearest);

        Self {
            texture,
            view,
            id,
            size,
        }
    }

    pub fn resize(&mut self, device: &wgpu::Device, size: PhysicalSize<u32>, state: &RenderState) {
        if self.size == size {
            return;
        }
        self.size = size;
        self.texture.destroy();
        (self.texture, self.view) = Self::create(device, size);

        let mut renderer = state.renderer.write();
        renderer.free_texture(&self.id);
        self.id = renderer.register_native_texture(device, &self.view, FilterMode::Nearest);
    }
}
