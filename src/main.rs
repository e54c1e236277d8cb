#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod cli;
mod config;
mod error;
mod headless;
mod pipeline;
mod types;
mod ui;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use gpui::Application;

use cli::Cli;
use pipeline::{ModelLoader, PipelineContext, RenderLoop, RgbaSurface, VideoSource};

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(cli.log_filter())).init();

    if cli.list_cameras {
        return list_cameras();
    }

    let options = cli.loader_options()?;
    let refresh = cli.refresh_config()?;

    // Without a camera the loop simply never leaves idle.
    let source: Option<Box<dyn VideoSource>> = match pipeline::acquire(&cli.capture_config()) {
        Ok(source) => Some(Box::new(source)),
        Err(err) => {
            log::error!("{err}");
            None
        }
    };

    let max_hands = options.max_hands;
    let mut loader = ModelLoader::new();
    loader.load(options, pipeline::ort_factory());

    let render = RenderLoop::new(PipelineContext::new(
        source,
        loader,
        RgbaSurface::new(),
        cli.overlay_style(),
        max_hands,
    ));

    if cli.headless {
        return headless::run(render, &refresh);
    }

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, render) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}

fn list_cameras() -> Result<()> {
    let cameras = pipeline::available_cameras()?;
    if cameras.is_empty() {
        println!("no cameras detected");
    }
    for camera in cameras {
        println!("{}\t{}", camera.index, camera.label);
    }
    Ok(())
}
