//! Loop principal e superfície de controle (start, stop, reload, dump, shutdown).
//!
//! Uma única thread executa ciclos, drena a fila do LCD e trata comandos. A
//! espera entre eventos é o `recv_timeout` do channel até o prazo mais próximo.

use crate::console::ControlCommand;
use crate::driver::{LcdDriver, LinkStatus, PortOpener};
use crate::dump::render_table;
use crate::poller::Poller;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use lcd_core::config::ConfigStore;
use lcd_core::shm::RegionProvider;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Espera máxima quando não há nenhum prazo pendente.
const IDLE_WAIT: Duration = Duration::from_secs(1);

pub struct App<P: RegionProvider, O: PortOpener> {
    store: ConfigStore,
    poller: Poller<P>,
    driver: LcdDriver<O>,
}

impl<P: RegionProvider, O: PortOpener> App<P, O> {
    pub fn new(store: ConfigStore, poller: Poller<P>, driver: LcdDriver<O>) -> Self {
        Self {
            store,
            poller,
            driver,
        }
    }

    pub fn driver(&self) -> &LcdDriver<O> {
        &self.driver
    }

    pub fn poller(&self) -> &Poller<P> {
        &self.poller
    }

    /// Abre a conexão e agenda o primeiro ciclo após o atraso inicial.
    pub fn start(&mut self, now: Instant) {
        self.stop();
        let snapshot = self.store.snapshot();
        self.driver.open(&snapshot.config, now);
        self.poller.schedule(now + snapshot.config.display.start_delay());
        info!(
            "Iniciado; primeira atualização em {}ms",
            snapshot.config.display.start_delay_ms
        );
    }

    /// Cancela o próximo ciclo e fecha a conexão.
    pub fn stop(&mut self) {
        self.poller.cancel();
        self.driver.close();
    }

    /// Relê a configuração. Reconecta se a seção `[serial]` mudou.
    pub fn reload(&mut self, now: Instant) {
        let previous = self.store.snapshot();
        let current = match self.store.reload() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("{e}; mantendo configuração v{}", previous.version);
                return;
            }
        };

        if current.config.serial != previous.config.serial
            && self.driver.status() != LinkStatus::Closed
        {
            info!("Configuração serial alterada, reconectando");
            self.driver.open(&current.config, now);
        } else {
            self.driver
                .set_retry_interval(current.config.display.retry_interval());
        }
        if current.config.provider.shm_dir != previous.config.provider.shm_dir {
            warn!("provider.shm_dir alterado; vale a partir do próximo início do processo");
        }
    }

    /// Tabela de diagnóstico com a leitura atual do segmento.
    pub fn dump(&self) -> String {
        let snapshot = self.store.snapshot();
        match self.poller.read_registry(&snapshot.config) {
            Ok(registry) => render_table(&registry),
            Err(e) => format!("Sem dados para exibir: {e}"),
        }
    }

    /// Trata um comando. Retorna `false` quando o processo deve sair.
    pub fn handle(&mut self, cmd: ControlCommand, now: Instant) -> bool {
        match cmd {
            ControlCommand::Start => self.start(now),
            ControlCommand::Stop => {
                self.stop();
                info!("Parado");
            }
            ControlCommand::Reload => self.reload(now),
            ControlCommand::Dump => println!("\n{}", self.dump()),
            ControlCommand::Shutdown => {
                info!("Encerrando Afterburner LCD...");
                self.stop();
                return false;
            }
        }
        true
    }

    /// Executa o que venceu até `now`: fila do LCD e ciclo de polling.
    pub fn tick(&mut self, now: Instant) {
        self.driver.service(now);
        if self.poller.is_due(now) {
            let snapshot = self.store.snapshot();
            self.poller.run_cycle(&mut self.driver, &snapshot, now);
        }
    }

    /// Prazo mais próximo entre o próximo ciclo e a fila do LCD.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.poller.next_run(), self.driver.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Roda até `Shutdown`. Sem console, segue apenas com os prazos.
    pub fn run(mut self, commands: Option<Receiver<ControlCommand>>) {
        let mut commands = commands;

        loop {
            self.tick(Instant::now());

            let wait = self
                .next_deadline()
                .map(|at| at.saturating_duration_since(Instant::now()))
                .unwrap_or(IDLE_WAIT);

            let Some(rx) = &commands else {
                std::thread::sleep(wait);
                continue;
            };

            match rx.recv_timeout(wait) {
                Ok(cmd) => {
                    if !self.handle(cmd, Instant::now()) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => commands = None,
            }
        }
    }
}
