//! Canvas demo
//!
//! Draws an animated scene through [`RenderContext`]: solid rectangles, a
//! linear and a radial gradient, a tiled image and a translucent nested layer.
//! Settings are read from `canvas.toml` when present.

mod bootstrap;
mod window;

use std::path::Path;
use std::time::Instant;

use thiserror::Error;
use vulkan_canvas::foundation::logging;
use vulkan_canvas::prelude::*;
use vulkan_canvas::vulkan::AshSwapchain;

use bootstrap::GpuContext;
use window::{Window, WindowError};

const CONFIG_PATH: &str = "canvas.toml";
const DEFAULT_SHADER_DIRECTORY: &str = "target/shaders";
const MAX_CONSECUTIVE_FAILURES: u32 = 120;

#[derive(Error, Debug)]
enum AppError {
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

fn load_config() -> Result<RendererConfig, ConfigError> {
    let path = Path::new(CONFIG_PATH);
    let mut config = if path.exists() {
        log::info!("Loading configuration from {CONFIG_PATH}");
        RendererConfig::load_from_file(path)?
    } else {
        RendererConfig::new("canvas_demo")
    };

    if config.shader_directory.is_none() {
        config = config.with_shader_directory(DEFAULT_SHADER_DIRECTORY);
    }
    config.validate()?;
    Ok(config)
}

/// Everything drawn each frame
struct Scene {
    checker: PixelImage,
    started: Instant,
}

impl Scene {
    fn new() -> VulkanResult<Self> {
        let mut checker = PixelImage::new(8, 8)?;
        for y in 0..8 {
            for x in 0..8 {
                let colour = if (x / 4 + y / 4) % 2 == 0 {
                    PixelArgb::new(255, 220, 220, 220)
                } else {
                    PixelArgb::new(255, 90, 90, 110)
                };
                checker.set_pixel(x, y, colour);
            }
        }

        Ok(Self { checker, started: Instant::now() })
    }

    fn draw(&self, layer: &mut RenderLayer) -> VulkanResult<()> {
        let bounds = layer.bounds();
        let t = self.started.elapsed().as_secs_f32();

        layer.fill_solid(&RectangleList::from(bounds), PixelArgb::new(255, 24, 26, 32))?;

        let band = Rect::new(40, 40, (bounds.width - 80).max(0), 100);
        let sunset = Gradient::linear(
            Point::new(band.x as f32, 0.0),
            PixelArgb::new(255, 230, 80, 40),
            Point::new(band.right() as f32, 0.0),
            PixelArgb::new(255, 40, 120, 230),
        )
        .with_stop(0.5, PixelArgb::new(255, 250, 220, 90));
        layer.fill_gradient(&RectangleList::from(band), &sunset, &AffineTransform::identity(), 255)?;

        let tiles = Rect::new(40, 180, 240, 240);
        let placement = AffineTransform::scale(4.0, 4.0).translated(tiles.x as f32, tiles.y as f32);
        layer.render_image(&RectangleList::from(tiles), &self.checker, &placement, 255, true)?;

        let glow = Rect::new(320, 180, 240, 240);
        let centre = Point::new(glow.x as f32 + 120.0, glow.y as f32 + 120.0);
        let pulse = 90.0 + 25.0 * (t * 2.0).sin();
        let radial = Gradient::radial(
            centre,
            PixelArgb::new(255, 255, 255, 255),
            Point::new(centre.x + pulse, centre.y),
            PixelArgb::TRANSPARENT,
        );
        layer.fill_gradient(&RectangleList::from(glow), &radial, &AffineTransform::identity(), 255)?;

        self.draw_panel(layer, t)
    }

    /// Bouncing bars rendered into a nested layer, composited at partial opacity
    fn draw_panel(&self, layer: &mut RenderLayer, t: f32) -> VulkanResult<()> {
        let panel = Rect::new(600, 180, 320, 240).intersection(&layer.bounds());
        if panel.is_empty() {
            return Ok(());
        }

        let mut child = layer.create_render_layer(panel)?;
        child.clear(panel, PixelArgb::new(255, 10, 10, 10))?;

        let mut bars = SpanList::new();
        for i in 0..8 {
            let phase = t * 3.0 + i as f32 * 0.6;
            let height = (panel.height as f32 * (0.5 + 0.4 * phase.sin())) as i32;
            let x = panel.x + 12 + i * 38;
            bars.add_rectangle(Rect::new(x, panel.bottom() - height, 28, height), 255);
        }
        child.fill_solid(&bars, PixelArgb::new(255, 80, 200, 120))?;

        layer.render_layer(child, 200)
    }
}

fn main() {
    logging::init_with_level(log::LevelFilter::Info);

    if let Err(err) = run() {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let config = load_config()?;
    let mut window = Window::new(&config.application_name, 960, 480)?;
    let mut gpu = GpuContext::new(&mut window, &config.application_name)?;
    let swapchain = gpu.create_swapchain(window.framebuffer_extent())?;

    let state = DeviceState::new(gpu.device(), config)?;
    let mut context = RenderContext::new(state, swapchain)?;
    let scene = Scene::new()?;

    let mut needs_recreation = false;
    let mut failures = 0;

    while !window.should_close() {
        window.poll_events();
        needs_recreation |= window.take_resized();

        if needs_recreation {
            if !recreate(&mut window, &mut context)? {
                continue;
            }
            needs_recreation = false;
        }

        match context.draw_frame(|layer| scene.draw(layer)) {
            DrawStatus::HasFinished => failures = 0,
            DrawStatus::NeedsSwapchainRecreation => needs_recreation = true,
            DrawStatus::HasFailed => {
                failures += 1;
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    return Err(VulkanError::invalid(format!("{failures} frames failed in a row")).into());
                }
            }
        }
    }

    log::info!("Presented {} frames", context.frame_counter());
    Ok(())
}

/// Rebuild the swapchain at the window's size; `false` while minimized
///
/// Memory no longer backing anything is released while minimized.
fn recreate(window: &mut Window, context: &mut RenderContext<AshSwapchain>) -> VulkanResult<bool> {
    let extent = window.framebuffer_extent();
    if extent.width == 0 || extent.height == 0 {
        context.device_state().minimize_storage(false);
        window.wait_events();
        return Ok(false);
    }

    context.presentation_engine_mut().set_window_extent(extent);
    context.recreate_swapchain()?;
    Ok(true)
}
