mod app;
mod commands;
mod effects;
mod render;
mod settings;

use courier_logging::{courier_info, courier_warn};

fn main() -> anyhow::Result<()> {
    let path = settings::settings_path();
    let (settings, load_error) = match settings::load(&path) {
        Ok(settings) => (settings, None),
        Err(err) => (settings::AppSettings::default(), Some(err)),
    };

    courier_logging::initialize(
        settings.log_target.into(),
        settings.level_filter(),
        &settings.log_file,
    );
    if let Some(err) = load_error {
        courier_warn!("{}; using default settings", err);
        eprintln!("warning: {err}; using default settings");
    }
    courier_info!("courier starting with settings from {:?}", path);

    app::run_app(settings)
}
