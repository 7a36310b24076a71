use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use key_presser::cli::Args;
use key_presser::config::AppConfig;
use key_presser::console::{self, ConsoleSurface};
use key_presser::helper::HelperProcess;
use key_presser::hotkey::{self, GlobalHotkeyBackend, HotkeyRegistrar};
use key_presser::injector::InjectionChannel;
use key_presser::keymap;
use key_presser::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "key_presser=debug,kpr=debug"
    } else {
        "key_presser=info,kpr=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut app = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    args.apply_to(&mut app);
    app.validate().context("invalid configuration")?;

    let (hotkey_tx, hotkey_rx) = mpsc::unbounded_channel();
    let backend = GlobalHotkeyBackend::start().context("global hotkeys unavailable")?;
    let forwarder = hotkey::forward_hotkey_events(hotkey_tx);

    let injector = InjectionChannel::new(Box::new(HelperProcess::new(app.engine.helper.clone())));
    let registrar = HotkeyRegistrar::new(Box::new(backend));
    let (mut runtime, handle) = Runtime::new(app.engine.clone(), injector, registrar, hotkey_rx);
    runtime.add_surface(Box::new(ConsoleSurface::new()));

    println!("{}", "key-presser".bold());
    println!(
        "Target '{}', shortcut '{}'. Type 'help' for commands, Ctrl+C to quit.",
        keymap::label(&app.macro_config.target_key).cyan(),
        keymap::label(&app.macro_config.start_stop_shortcut).cyan()
    );

    let status = console::watch_status(handle.subscribe());
    let input = console::spawn_stdin_reader();
    let control = tokio::spawn(console::run_console(handle, app.macro_config, input));

    runtime.run(shutdown_signal()).await;

    control.abort();
    status.abort();
    let _ = forwarder.await;
    println!("{}", "bye".dimmed());
    Ok(())
}
