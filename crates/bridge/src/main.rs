//! # Afterburner LCD
//!
//! Lê a shared memory do MSI Afterburner (MAHM) e mostra as métricas
//! escolhidas em um LCD de caracteres (Matrix Orbital LK) via serial.
//!
//! ## Uso
//! ```bash
//! afterburner_lcd.exe                        # config.toml ao lado do executável
//! afterburner_lcd.exe --config outro.toml    # config alternativo
//! afterburner_lcd --write-sample             # (não-Windows) grava um segmento de teste em shm_dir
//! ```

mod app;
mod console;
mod driver;
mod dump;
mod poller;
mod provider_process;
mod shared_memory;

use app::App;
use driver::{LcdDriver, SerialPortOpener};
use lcd_core::config::{AppConfig, ConfigStore};
use poller::Poller;
use shared_memory::SystemProvider;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = config_path_from_args().unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    for problem in config.validate() {
        warn!("config: {problem}");
    }

    // ── Segmento de teste (sem Afterburner) ──
    #[cfg(not(windows))]
    {
        if std::env::args().any(|a| a == "--write-sample") {
            match shared_memory::write_sample(&config.provider) {
                Ok(path) => info!("Segmento de exemplo gravado em {}", path.display()),
                Err(e) => tracing::error!("Falha ao gravar segmento de exemplo: {e}"),
            }
            return;
        }
    }

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   🖥  AFTERBURNER LCD – ATIVO (Rust)");
    println!("══════════════════════════════════════════════");
    println!("  Porta:     {} @ {} baud", config.serial.port, config.serial.baud_rate);
    println!("  Display:   {}x{}", config.display.width, config.display.height);
    println!(
        "  Intervalo: {}ms (retry {}ms)",
        config.display.update_interval_ms, config.display.retry_interval_ms
    );
    println!("  Mapping:   {}", config.provider.mapping_name);
    println!("  {}", console::HELP);
    println!("══════════════════════════════════════════════");
    println!();

    let provider = SystemProvider::new(&config.provider);
    let store = ConfigStore::new(config_path, config);
    let mut app = App::new(store, Poller::new(provider), LcdDriver::new(SerialPortOpener));

    // ── Console ──
    let commands = match console::spawn_console_thread() {
        Ok(rx) => Some(rx),
        Err(e) => {
            warn!("Console indisponível: {e}");
            None
        }
    };

    // ── Loop principal ──
    app.start(Instant::now());
    app.run(commands);
    info!("Afterburner LCD encerrado");
}

/// `--config <caminho>` ou `--config=<caminho>`.
fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}
