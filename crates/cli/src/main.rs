mod cli;
mod commands;
mod shell;

use clap::Parser;
use needle_core::{ClientConfig, Result};
use needle_player::StreamingAudioController;
use needle_renderer::NativeElement;
use needle_transport_http::ApiClient;
use once_cell::sync::OnceCell;
use std::process::ExitCode;
use std::sync::Arc;

use cli::Cli;
use shell::Shell;

static LOGGER: OnceCell<()> = OnceCell::new();

fn init_logging(default_filter: &str) {
    LOGGER.get_or_init(|| {
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(default_filter),
        )
        .format_timestamp_millis()
        .try_init();
    });
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("needle: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.api_url {
        config = config.with_api_url(url)?;
    }
    log::info!("Using narration service at {}", config.api_url);

    let api = ApiClient::new(&config);
    if let Err(e) = api.health() {
        log::warn!("Health check failed: {}", e);
    }

    let mut element = NativeElement::new()?;
    element.set_time_update_interval(config.status_interval_ms);
    let output = element.output();
    log::info!(
        "Audio output: {} Hz, {} channels",
        output.sample_rate,
        output.channels
    );

    let mut controller = StreamingAudioController::new(element, Arc::new(api.clone()));
    controller.set_status_interval(config.status_interval_ms);

    Shell::new(api, controller).run()
}
