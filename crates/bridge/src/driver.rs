//! Driver do LCD serial.
//!
//! Uma única máquina de estados cobre existência e conexão do driver:
//!
//! ```text
//! Closed ──open──► Connecting ──ok──► Connected
//!   ▲                  │  ▲              │
//!   │                 err │ retry_at     │ erro fatal de I/O
//!   │                  ▼  │              ▼
//!   └────close──── Disconnected { retry_at } ◄┘
//! ```
//!
//! A fila é FIFO e drenada um item por vez: write, flush e pausa de
//! `pacing` antes do próximo. Tudo roda na thread do loop principal.

use lcd_core::config::{AppConfig, SerialConfig};
use lcd_core::lcd::{frame_commands, init_commands};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Falhas do transporte serial.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Falha ao abrir {port}: {source}")]
    Open {
        port: String,
        source: serialport::Error,
    },

    #[error("Erro de escrita na serial: {0}")]
    Write(#[source] io::Error),

    #[error("Erro no flush da serial: {0}")]
    Flush(#[source] io::Error),
}

impl TransportError {
    /// Erros que não indicam perda do dispositivo.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Open { .. } => false,
            TransportError::Write(e) | TransportError::Flush(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
        }
    }
}

/// Transporte aberto, somente escrita.
pub type Port = Box<dyn Write + Send>;

/// Abre o transporte a partir da configuração serial.
pub trait PortOpener {
    fn open(&self, serial: &SerialConfig) -> Result<Port, TransportError>;
}

// ──────────────────────────────────────────────
// Porta serial real
// ──────────────────────────────────────────────

/// Abre portas via `serialport`, 8N1 sem controle de fluxo.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortOpener;

struct SerialLink(Box<dyn serialport::SerialPort>);

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl PortOpener for SerialPortOpener {
    fn open(&self, serial: &SerialConfig) -> Result<Port, TransportError> {
        let port = serialport::new(&serial.port, serial.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(serial.write_timeout())
            .open()
            .map_err(|source| TransportError::Open {
                port: serial.port.clone(),
                source,
            })?;
        Ok(Box::new(SerialLink(port)))
    }
}

// ──────────────────────────────────────────────
// Máquina de estados
// ──────────────────────────────────────────────

enum LinkState {
    Closed,
    Disconnected { retry_at: Instant },
    Connecting,
    Connected { port: Port, ready_at: Instant },
}

/// Estado observável do driver (logs, testes, dump).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Closed,
    Disconnected,
    Connecting,
    Connected,
}

pub struct LcdDriver<O: PortOpener> {
    opener: O,
    serial: SerialConfig,
    retry_interval: Duration,
    state: LinkState,
    queue: VecDeque<Vec<u8>>,
}

impl<O: PortOpener> LcdDriver<O> {
    pub fn new(opener: O) -> Self {
        Self {
            opener,
            serial: SerialConfig::default(),
            retry_interval: Duration::from_secs(30),
            state: LinkState::Closed,
            queue: VecDeque::new(),
        }
    }

    pub fn status(&self) -> LinkStatus {
        match self.state {
            LinkState::Closed => LinkStatus::Closed,
            LinkState::Disconnected { .. } => LinkStatus::Disconnected,
            LinkState::Connecting => LinkStatus::Connecting,
            LinkState::Connected { .. } => LinkStatus::Connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected { .. })
    }

    /// Buffers aguardando envio.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Abre a conexão com a configuração informada, fechando a anterior.
    pub fn open(&mut self, config: &AppConfig, now: Instant) {
        self.close();
        self.serial = config.serial.clone();
        self.retry_interval = config.display.retry_interval();
        self.connect(now);
    }

    /// Intervalo usado nos próximos retries (reload de configuração).
    pub fn set_retry_interval(&mut self, interval: Duration) {
        self.retry_interval = interval;
    }

    fn connect(&mut self, now: Instant) {
        self.state = LinkState::Connecting;
        info!(
            "Conectando ao LCD em {} ({} baud)...",
            self.serial.port, self.serial.baud_rate
        );

        match self.opener.open(&self.serial) {
            Ok(port) => {
                info!("LCD conectado em {}", self.serial.port);
                self.queue.clear();
                self.queue
                    .extend(init_commands(self.serial.brightness, self.serial.contrast));
                self.state = LinkState::Connected { port, ready_at: now };
            }
            Err(e) => {
                error!(
                    "{e}. Nova tentativa em {}s",
                    self.retry_interval.as_secs()
                );
                self.state = LinkState::Disconnected {
                    retry_at: now + self.retry_interval,
                };
            }
        }
    }

    /// Enfileira um frame completo (home, cursor por linha, texto).
    pub fn display(&mut self, frame: &[String], height: usize) {
        if !self.is_connected() {
            debug!("LCD não conectado, frame ignorado");
            return;
        }

        let cmds = frame_commands(frame, height);
        if self.queue.len() + cmds.len() > self.serial.max_pending {
            warn!(
                "Fila do LCD cheia ({} pendentes), frame descartado",
                self.queue.len()
            );
            return;
        }
        self.queue.extend(cmds);
    }

    /// Avança a máquina: reconecta quando vence o retry ou envia o próximo
    /// item da fila quando a pausa terminou.
    pub fn service(&mut self, now: Instant) {
        match self.state {
            LinkState::Disconnected { retry_at } if now >= retry_at => self.connect(now),
            LinkState::Connected { ready_at, .. } if now >= ready_at => self.pump(),
            _ => {}
        }
    }

    fn pump(&mut self) {
        let LinkState::Connected { port, ready_at } = &mut self.state else {
            return;
        };
        let Some(data) = self.queue.pop_front() else {
            return;
        };

        let result = port
            .write_all(&data)
            .map_err(TransportError::Write)
            .and_then(|()| port.flush().map_err(TransportError::Flush));

        match result {
            Ok(()) => {
                debug!("→ {} bytes para o LCD", data.len());
                *ready_at = Instant::now() + self.serial.pacing();
            }
            Err(e) if e.is_transient() => {
                warn!("{e}; item descartado");
                *ready_at = Instant::now() + self.serial.pacing();
            }
            Err(e) => {
                error!(
                    "{e}. LCD desconectado, nova tentativa em {}s",
                    self.retry_interval.as_secs()
                );
                self.state = LinkState::Disconnected {
                    retry_at: Instant::now() + self.retry_interval,
                };
            }
        }
    }

    /// Próximo instante em que [`service`](Self::service) tem trabalho.
    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.state {
            LinkState::Disconnected { retry_at } => Some(*retry_at),
            LinkState::Connected { ready_at, .. } if !self.queue.is_empty() => Some(*ready_at),
            _ => None,
        }
    }

    /// Fecha a conexão e cancela retries. Idempotente.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.state, LinkState::Closed) {
            LinkState::Connected { port, .. } => {
                drop(port);
                info!("LCD desconectado de {}", self.serial.port);
            }
            LinkState::Disconnected { .. } => debug!("Retry de conexão cancelado"),
            LinkState::Connecting | LinkState::Closed => {}
        }
        self.queue.clear();
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn frame(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn connect_sends_clear_and_brightness() {
        let opener = FakeOpener::online();
        let mut driver = LcdDriver::new(opener.clone());

        driver.open(&fast_config(), Instant::now());
        assert_eq!(driver.status(), LinkStatus::Connected);
        drain(&mut driver);

        assert_eq!(opener.writes(), vec![vec![0xFE, 0x58], vec![0xFE, 0x99, 0xFF]]);
    }

    #[test]
    fn display_on_disconnected_driver_enqueues_nothing() {
        let opener = FakeOpener::default();
        let mut driver = LcdDriver::new(opener.clone());

        driver.display(&frame(&["a", "b"]), 2);
        assert_eq!(driver.pending(), 0);

        driver.open(&fast_config(), Instant::now());
        assert_eq!(driver.status(), LinkStatus::Disconnected);
        driver.display(&frame(&["a", "b"]), 2);
        assert_eq!(driver.pending(), 0);
        assert!(opener.writes().is_empty());
    }

    #[test]
    fn frame_is_written_in_wire_order() {
        let opener = FakeOpener::online();
        let mut driver = LcdDriver::new(opener.clone());
        driver.open(&fast_config(), Instant::now());
        drain(&mut driver);
        opener.clear_writes();

        driver.display(&frame(&["GPU 63C", "CPU 41C"]), 2);
        drain(&mut driver);

        assert_eq!(
            opener.writes(),
            vec![
                vec![0xFE, 0x48],
                b"GPU 63C".to_vec(),
                vec![0xFE, 0x47, 0x01, 0x02],
                b"CPU 41C".to_vec(),
            ]
        );
    }

    #[test]
    fn commands_keep_fifo_order_with_slow_transport() {
        let mut opener = FakeOpener::online();
        opener.recorder.delay = Duration::from_millis(5);
        let mut driver = LcdDriver::new(opener.clone());
        driver.open(&fast_config(), Instant::now());
        drain(&mut driver);
        opener.clear_writes();

        for i in 0..5 {
            driver.display(&frame(&[i.to_string().as_str()]), 1);
        }
        drain(&mut driver);

        let expected: Vec<Vec<u8>> = (0..5)
            .flat_map(|i| [vec![0xFE, 0x48], i.to_string().into_bytes()])
            .collect();
        assert_eq!(opener.writes(), expected);
    }

    #[test]
    fn pacing_holds_next_write() {
        let opener = FakeOpener::online();
        let mut driver = LcdDriver::new(opener.clone());
        let mut config = AppConfig::default();
        config.serial.pacing_ms = 60_000;
        driver.open(&config, Instant::now());

        driver.service(Instant::now());
        driver.service(Instant::now());
        assert_eq!(opener.writes().len(), 1);
        assert_eq!(driver.pending(), 1);
        assert!(driver.next_deadline().is_some());
    }

    #[test]
    fn repeated_close_on_never_opened_driver_is_noop() {
        let opener = FakeOpener::online();
        let mut driver = LcdDriver::new(opener.clone());
        driver.close();
        driver.close();
        assert_eq!(driver.status(), LinkStatus::Closed);
        assert_eq!(*opener.opens.lock().unwrap(), 0);
        assert!(driver.next_deadline().is_none());
    }

    #[test]
    fn open_failure_retries_after_interval() {
        let opener = FakeOpener::default();
        let mut driver = LcdDriver::new(opener.clone());
        let start = Instant::now();
        let config = fast_config();

        driver.open(&config, start);
        assert_eq!(driver.status(), LinkStatus::Disconnected);
        assert_eq!(driver.next_deadline(), Some(start + config.display.retry_interval()));

        // Antes do prazo nada acontece
        driver.service(start + Duration::from_secs(1));
        assert_eq!(*opener.opens.lock().unwrap(), 1);

        *opener.available.lock().unwrap() = true;
        driver.service(start + config.display.retry_interval());
        assert_eq!(driver.status(), LinkStatus::Connected);
        assert_eq!(*opener.opens.lock().unwrap(), 2);
    }

    #[test]
    fn fatal_write_error_disconnects() {
        let opener = FakeOpener::online();
        let mut driver = LcdDriver::new(opener.clone());
        driver.open(&fast_config(), Instant::now());

        *opener.recorder.fail_with.lock().unwrap() = Some(io::ErrorKind::BrokenPipe);
        driver.service(Instant::now());
        assert_eq!(driver.status(), LinkStatus::Disconnected);
    }

    #[test]
    fn transient_write_error_keeps_connection() {
        let opener = FakeOpener::online();
        let mut driver = LcdDriver::new(opener.clone());
        driver.open(&fast_config(), Instant::now());

        *opener.recorder.fail_with.lock().unwrap() = Some(io::ErrorKind::TimedOut);
        driver.service(Instant::now());
        assert_eq!(driver.status(), LinkStatus::Connected);
        // Item com erro é descartado, o resto continua na fila
        assert_eq!(driver.pending(), 1);

        *opener.recorder.fail_with.lock().unwrap() = None;
        drain(&mut driver);
        assert_eq!(opener.writes(), vec![vec![0xFE, 0x99, 0xFF]]);
    }

    #[test]
    fn full_queue_drops_new_frame() {
        let opener = FakeOpener::online();
        let mut driver = LcdDriver::new(opener);
        let mut config = fast_config();
        config.serial.max_pending = 6;
        driver.open(&config, Instant::now());

        // 2 de init + 5 do frame > 6
        driver.display(&frame(&["a", "b"]), 2);
        assert_eq!(driver.pending(), 2);
    }

    #[test]
    fn close_clears_queue() {
        let opener = FakeOpener::online();
        let mut driver = LcdDriver::new(opener);
        driver.open(&fast_config(), Instant::now());
        assert!(driver.pending() > 0);
        driver.close();
        assert_eq!(driver.pending(), 0);
        assert_eq!(driver.status(), LinkStatus::Closed);
    }
}
