use swarm::{SimParameters, seed::Disc, ui::SwarmApp};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let params = SimParameters::default();
    let disc = Disc::default();
    log::info!(
        "Starting swarm with {} particles over {} work groups",
        params.population,
        params.work_groups
    );

    let options = eframe::NativeOptions {
        renderer: eframe::Renderer::Wgpu,
        viewport: eframe::egui::ViewportBuilder::default()
            .with_title("swarm")
            .with_inner_size([1280.0, 720.0]),
        ..Default::default()
    };

    eframe::run_native(
        "swarm",
        options,
        Box::new(move |cc| Ok(Box::new(SwarmApp::new(cc, params, disc)?))),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run the viewer: {e}"))
}
