//! Ciclo fetch → decode → format → display.

use crate::driver::{LcdDriver, LinkStatus, PortOpener};
use lcd_core::config::{AppConfig, ConfigSnapshot, DisplayConfig};
use lcd_core::format::{fit_width, format_line};
use lcd_core::layout::LayoutError;
use lcd_core::registry::MetricRegistry;
use lcd_core::shm::{read_snapshot, RegionProvider};
use lcd_core::types::Frame;
use std::time::Instant;
use tracing::{debug, warn};

/// Linhas exibidas enquanto não há dados.
pub const FALLBACK_LINES: [&str; 2] = ["Connecting...", "Data Error"];

/// Resultado de um ciclo (logs e testes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Driver estava fechado e foi aberto
    Opened,
    /// Frame com métricas enfileirado
    Displayed,
    /// Sem dados; frame de fallback enfileirado
    NoData,
    /// Driver desconectado, nada enviado
    NotConnected,
}

/// Formata uma linha por linha do display.
pub fn render_frame(display: &DisplayConfig, registry: &MetricRegistry) -> Frame {
    (0..display.height)
        .map(|row| format_line(display.template(row), registry, display.width))
        .collect()
}

/// Frame de duas linhas mostrado sem dados.
pub fn fallback_frame(width: usize) -> Frame {
    FALLBACK_LINES.iter().map(|line| fit_width(line, width)).collect()
}

pub struct Poller<P: RegionProvider> {
    provider: P,
    process_check: fn(&str) -> bool,
    next_run: Option<Instant>,
}

impl<P: RegionProvider> Poller<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            process_check: crate::provider_process::is_process_running,
            next_run: None,
        }
    }

    /// Troca a verificação de processo (testes).
    pub fn with_process_check(mut self, process_check: fn(&str) -> bool) -> Self {
        self.process_check = process_check;
        self
    }

    pub fn schedule(&mut self, at: Instant) {
        self.next_run = Some(at);
    }

    pub fn cancel(&mut self) {
        self.next_run = None;
    }

    pub fn next_run(&self) -> Option<Instant> {
        self.next_run
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next_run.is_some_and(|at| now >= at)
    }

    /// Lê o segmento uma vez e monta o registro de métricas.
    pub fn read_registry(&self, config: &AppConfig) -> Result<MetricRegistry, LayoutError> {
        let snapshot = read_snapshot(&self.provider, &config.provider.mapping_name)?;
        Ok(MetricRegistry::from_snapshot(&snapshot))
    }

    /// Executa um ciclo com o snapshot de configuração ativo e agenda o próximo.
    pub fn run_cycle<O: PortOpener>(
        &mut self,
        driver: &mut LcdDriver<O>,
        snapshot: &ConfigSnapshot,
        now: Instant,
    ) -> CycleOutcome {
        self.cancel();
        let config = &snapshot.config;
        let display = &config.display;

        let outcome = match driver.status() {
            LinkStatus::Closed => {
                driver.open(config, now);
                CycleOutcome::Opened
            }
            LinkStatus::Connected => match self.read_registry(config) {
                Ok(registry) => {
                    driver.display(&render_frame(display, &registry), display.height);
                    debug!("Ciclo v{}: {} métricas", snapshot.version, registry.len());
                    self.schedule(now + display.update_interval());
                    return CycleOutcome::Displayed;
                }
                Err(e) => {
                    self.report(&e, config);
                    driver.display(&fallback_frame(display.width), display.height);
                    CycleOutcome::NoData
                }
            },
            LinkStatus::Disconnected | LinkStatus::Connecting => CycleOutcome::NotConnected,
        };

        self.schedule(now + display.retry_interval());
        outcome
    }

    fn report(&self, err: &LayoutError, config: &AppConfig) {
        match err {
            LayoutError::ProviderUnavailable { .. } => {
                let process = &config.provider.process_name;
                if (self.process_check)(process) {
                    warn!("{err}; {process} está rodando, verifique o monitoramento por shared memory");
                } else {
                    warn!("{err}; {process} não está rodando");
                }
            }
            e if e.is_no_data() => warn!("{e}"),
            e => warn!("Segmento inválido: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::{drain, fast_config, FakeOpener};
    use lcd_core::layout::encode::{metric, sample_gpu_info, segment};
    use lcd_core::layout::ENTRY_LAYOUT_SIZE;
    use lcd_core::shm::MemoryRegion;
    use lcd_core::ConfigStore;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::time::Duration;

    /// Provedor com conteúdo trocável entre ciclos.
    #[derive(Default)]
    struct FakeProvider {
        segment: RefCell<Option<Vec<u8>>>,
    }

    impl FakeProvider {
        fn set(&self, bytes: Option<Vec<u8>>) {
            *self.segment.borrow_mut() = bytes;
        }
    }

    impl RegionProvider for &FakeProvider {
        type Region = MemoryRegion;

        fn open(&self, name: &str) -> Result<MemoryRegion, LayoutError> {
            match self.segment.borrow().clone() {
                Some(bytes) => Ok(MemoryRegion::new(bytes)),
                None => Err(LayoutError::ProviderUnavailable {
                    name: name.into(),
                    reason: "ausente".into(),
                }),
            }
        }
    }

    fn never_running(_: &str) -> bool {
        false
    }

    fn store() -> ConfigStore {
        let mut config = fast_config();
        config.display.lines = vec![
            "GPU %3.0f{gpuTemperature}C".into(),
            "%s{gpuInfoFamily}".into(),
        ];
        ConfigStore::new(PathBuf::from("config.toml"), config)
    }

    fn afterburner_segment() -> Vec<u8> {
        segment(
            &[metric("GPU temperature", "°C", "%.0f", 63.25)],
            &sample_gpu_info(),
            ENTRY_LAYOUT_SIZE,
        )
    }

    #[test]
    fn renders_one_line_per_row() {
        let mut registry = MetricRegistry::new();
        registry.insert(
            "gpuTemperature".into(),
            lcd_core::registry::Metric::Info(lcd_core::MetricValue::Number(63.25)),
        );
        let display = DisplayConfig {
            height: 3,
            lines: vec!["%5.1f{gpuTemperature}".into()],
            ..Default::default()
        };

        let frame = render_frame(&display, &registry);
        assert_eq!(frame, vec![" 63.3           ", "                ", "                "]);
    }

    #[test]
    fn fallback_frame_is_fitted_to_width() {
        assert_eq!(fallback_frame(16), vec!["Connecting...   ", "Data Error      "]);
        assert_eq!(fallback_frame(8), vec!["Connecti", "Data Err"]);
    }

    #[test]
    fn first_cycle_opens_driver_and_waits_retry_interval() {
        let provider = FakeProvider::default();
        let opener = FakeOpener::online();
        let mut driver = LcdDriver::new(opener);
        let mut poller = Poller::new(&provider).with_process_check(never_running);
        let snap = store().snapshot();
        let now = Instant::now();

        assert_eq!(poller.run_cycle(&mut driver, &snap, now), CycleOutcome::Opened);
        assert!(driver.is_connected());
        assert_eq!(poller.next_run(), Some(now + snap.config.display.retry_interval()));
    }

    #[test]
    fn cycle_with_data_displays_and_uses_update_interval() {
        let provider = FakeProvider::default();
        provider.set(Some(afterburner_segment()));
        let opener = FakeOpener::online();
        let mut driver = LcdDriver::new(opener.clone());
        let snap = store().snapshot();
        driver.open(&snap.config, Instant::now());
        drain(&mut driver);
        opener.clear_writes();

        let mut poller = Poller::new(&provider).with_process_check(never_running);
        let now = Instant::now();
        assert_eq!(poller.run_cycle(&mut driver, &snap, now), CycleOutcome::Displayed);
        assert_eq!(poller.next_run(), Some(now + Duration::from_millis(1000)));

        drain(&mut driver);
        let writes = opener.writes();
        assert_eq!(writes[1], b"GPU  63C        ".to_vec());
        assert_eq!(writes[3], b"GA104           ".to_vec());
    }

    #[test]
    fn missing_provider_shows_fallback_and_retries() {
        let provider = FakeProvider::default();
        let opener = FakeOpener::online();
        let mut driver = LcdDriver::new(opener.clone());
        let snap = store().snapshot();
        driver.open(&snap.config, Instant::now());
        drain(&mut driver);
        opener.clear_writes();

        let mut poller = Poller::new(&provider).with_process_check(never_running);
        let now = Instant::now();
        assert_eq!(poller.run_cycle(&mut driver, &snap, now), CycleOutcome::NoData);
        assert_eq!(poller.next_run(), Some(now + Duration::from_secs(30)));

        drain(&mut driver);
        let writes = opener.writes();
        assert_eq!(writes[1], b"Connecting...   ".to_vec());
        assert_eq!(writes[3], b"Data Error      ".to_vec());
    }

    #[test]
    fn zero_entries_is_handled_like_missing_data() {
        let provider = FakeProvider::default();
        provider.set(Some(segment(&[], &sample_gpu_info(), ENTRY_LAYOUT_SIZE)));
        let mut driver = LcdDriver::new(FakeOpener::online());
        let snap = store().snapshot();
        driver.open(&snap.config, Instant::now());

        let mut poller = Poller::new(&provider).with_process_check(never_running);
        assert_eq!(
            poller.run_cycle(&mut driver, &snap, Instant::now()),
            CycleOutcome::NoData
        );
    }

    #[test]
    fn provider_can_come_back_between_cycles() {
        let provider = FakeProvider::default();
        let mut driver = LcdDriver::new(FakeOpener::online());
        let snap = store().snapshot();
        driver.open(&snap.config, Instant::now());
        let mut poller = Poller::new(&provider).with_process_check(never_running);

        assert_eq!(poller.run_cycle(&mut driver, &snap, Instant::now()), CycleOutcome::NoData);
        provider.set(Some(afterburner_segment()));
        assert_eq!(
            poller.run_cycle(&mut driver, &snap, Instant::now()),
            CycleOutcome::Displayed
        );
    }

    #[test]
    fn disconnected_driver_only_reschedules() {
        let provider = FakeProvider::default();
        provider.set(Some(afterburner_segment()));
        let opener = FakeOpener::default();
        let mut driver = LcdDriver::new(opener.clone());
        let snap = store().snapshot();
        driver.open(&snap.config, Instant::now());

        let mut poller = Poller::new(&provider).with_process_check(never_running);
        let now = Instant::now();
        assert_eq!(poller.run_cycle(&mut driver, &snap, now), CycleOutcome::NotConnected);
        assert_eq!(poller.next_run(), Some(now + Duration::from_secs(30)));
        assert_eq!(driver.pending(), 0);
    }

    #[test]
    fn schedule_and_cancel() {
        let provider = FakeProvider::default();
        let mut poller = Poller::new(&provider);
        let now = Instant::now();
        assert!(!poller.is_due(now));
        poller.schedule(now);
        assert!(poller.is_due(now));
        poller.cancel();
        assert!(!poller.is_due(now + Duration::from_secs(60)));
    }
}
