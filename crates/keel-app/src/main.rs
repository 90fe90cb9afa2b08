// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use keel_core::init_tracing;
use keel_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};
use keel_platform::{create_window, drawable_size, window_attributes};
use tracing::{error, info, warn};

mod config;
mod mesh;
mod renderer;

use config::AppCfg;
use renderer::QuadRenderer;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config
    #[arg(long, default_value = "keel.toml")]
    config: PathBuf,
    /// Enable the validation layer regardless of the config
    #[arg(long)]
    validation: bool,
    /// Exit after presenting this many frames
    #[arg(long)]
    frames: Option<u64>,
}

struct App {
    cfg: AppCfg,
    max_frames: Option<u64>,
    // Declared before the window so it is dropped first.
    renderer: Option<QuadRenderer>,
    window: Option<Arc<Window>>,
    failure: Option<anyhow::Error>,

    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.failure = Some(err);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(renderer) = &self.renderer {
            if let Err(e) = renderer.wait_idle() {
                warn!("{e:#}");
            }
        }
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = window_attributes(
            &self.cfg.window.title,
            self.cfg.window.width,
            self.cfg.window.height,
        );
        let window = create_window(event_loop, attrs).context("creating window")?;
        let renderer = QuadRenderer::new(Arc::clone(&window), &self.cfg)?;
        window.request_redraw();
        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e);
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Poll);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                // The swapchain keeps its creation-time extent.
                info!("Resized → {}x{}", new_size.width, new_size.height);
            }

            WindowEvent::RedrawRequested => {
                let Some(renderer) = &mut self.renderer else {
                    return;
                };
                if self.window.as_deref().is_some_and(|w| drawable_size(w).is_empty()) {
                    return;
                }
                if let Err(e) = renderer.render() {
                    self.fail(event_loop, e);
                    return;
                }
                self.frames = self.frames.saturating_add(1);

                let presented = renderer.frames_presented();
                if self.max_frames.is_some_and(|max| presented >= max) {
                    info!("presented {presented} frames, exiting");
                    self.shutdown(event_loop);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing("info");
    let args = Args::parse();
    let mut cfg = AppCfg::load(&args.config)?;
    cfg.render.validation |= args.validation;

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App {
        cfg,
        max_frames: args.frames,
        renderer: None,
        window: None,
        failure: None,
        frames: 0,
        last_fps_instant: Instant::now(),
    };

    event_loop.run_app(&mut app)?;
    match app.failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
