//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável. Seções ausentes usam o
//! padrão. O loop principal trabalha sempre sobre um [`ConfigSnapshot`]
//! imutável; reload troca o snapshot e incrementa a versão.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Porta serial do LCD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Caminho da porta ("COM3", "/dev/ttyUSB0")
    pub port: String,
    pub baud_rate: u32,
    /// Timeout de escrita (ms); limita quanto tempo um write pode travar
    pub write_timeout_ms: u64,
    /// Pausa entre comandos após o flush (ms)
    pub pacing_ms: u64,
    /// Brilho enviado ao conectar (0–255)
    pub brightness: u8,
    /// Contraste enviado ao conectar, se definido
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<u8>,
    /// Máximo de buffers pendentes antes de descartar frames
    pub max_pending: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "COM3".into(),
            baud_rate: 9600,
            write_timeout_ms: 1000,
            pacing_ms: 50,
            brightness: 255,
            contrast: None,
            max_pending: 64,
        }
    }
}

impl SerialConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

/// Geometria, cadência e templates do LCD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Colunas
    pub width: usize,
    /// Linhas
    pub height: usize,
    /// Intervalo entre atualizações com dados (ms)
    pub update_interval_ms: u64,
    /// Intervalo de retry sem dados / sem conexão (ms)
    pub retry_interval_ms: u64,
    /// Atraso do primeiro ciclo após `start` (ms)
    pub start_delay_ms: u64,
    /// Um template por linha do LCD
    pub lines: Vec<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 16,
            height: 2,
            update_interval_ms: 1000,
            retry_interval_ms: 30_000,
            start_delay_ms: 3000,
            lines: vec![
                "GPU %3.0f{gpuTemperature}C %3.0f{gpuUsage}%".into(),
                "CPU %3.0f{cpuTemperature}C %3.0f{cpuUsage}%".into(),
            ],
        }
    }
}

impl DisplayConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    /// Template da linha `row`; linhas sem template ficam em branco.
    pub fn template(&self, row: usize) -> &str {
        self.lines.get(row).map(String::as_str).unwrap_or("")
    }
}

/// Provedor de shared memory (MSI Afterburner).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Nome do file mapping
    pub mapping_name: String,
    /// Processo que publica o mapping (usado só para diagnóstico)
    pub process_name: String,
    /// Diretório dos snapshots fora do Windows
    pub shm_dir: PathBuf,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            mapping_name: "MAHMSharedMemory".into(),
            process_name: "MSIAfterburner.exe".into(),
            shm_dir: PathBuf::from("/dev/shm"),
        }
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub display: DisplayConfig,
    pub provider: ProviderConfig,
}

/// Erros de leitura/escrita da configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro ao ler {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Erro ao parsear {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Erro ao serializar configuração: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro ao salvar {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl AppConfig {
    /// Lê e parseia o arquivo, sem fallback.
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Carrega configuração de um arquivo TOML, caindo no padrão em caso de erro.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match Self::try_load(path) {
                Ok(config) => {
                    info!("Configuração carregada de {}", path.display());
                    return config;
                }
                Err(e) => warn!("{e}"),
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.serial.port.trim().is_empty() {
            errors.push("Porta serial não pode ser vazia".into());
        }
        if self.serial.baud_rate == 0 {
            errors.push("Baud rate não pode ser 0".into());
        }
        if self.serial.max_pending == 0 {
            errors.push("max_pending não pode ser 0".into());
        }
        if self.display.width == 0 || self.display.width > 255 {
            errors.push(format!("Largura inválida: {} (1–255)", self.display.width));
        }
        if self.display.height == 0 || self.display.height > 255 {
            errors.push(format!("Altura inválida: {} (1–255)", self.display.height));
        }
        if !(100..=60_000).contains(&self.display.update_interval_ms) {
            errors.push(format!(
                "Intervalo de atualização inválido: {} ms (100–60000)",
                self.display.update_interval_ms
            ));
        }
        if !(1000..=600_000).contains(&self.display.retry_interval_ms) {
            errors.push(format!(
                "Intervalo de retry inválido: {} ms (1000–600000)",
                self.display.retry_interval_ms
            ));
        }
        // Frame = home + texto por linha + cursor por linha extra
        let frame_len = self.display.height.saturating_mul(2);
        if self.serial.max_pending > 0 && frame_len > self.serial.max_pending {
            errors.push(format!(
                "max_pending {} não comporta um frame de {} linhas ({} buffers)",
                self.serial.max_pending, self.display.height, frame_len
            ));
        }
        if self.display.lines.len() > self.display.height {
            errors.push(format!(
                "{} templates para {} linhas; os extras serão ignorados",
                self.display.lines.len(),
                self.display.height
            ));
        }
        if self.provider.mapping_name.is_empty() {
            errors.push("Nome do mapping não pode ser vazio".into());
        }

        errors
    }
}

// ──────────────────────────────────────────────
// Snapshots versionados
// ──────────────────────────────────────────────

/// Configuração ativa no início de uma operação.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub version: u64,
    pub config: Arc<AppConfig>,
}

/// Dono da configuração corrente; `reload` troca o snapshot.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: ConfigSnapshot,
}

impl ConfigStore {
    pub fn new(path: PathBuf, config: AppConfig) -> Self {
        Self {
            path,
            current: ConfigSnapshot {
                version: 1,
                config: Arc::new(config),
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        self.current.clone()
    }

    /// Relê o arquivo. Em erro, o snapshot atual continua valendo.
    pub fn reload(&mut self) -> Result<ConfigSnapshot, ConfigError> {
        let config = AppConfig::try_load(&self.path)?;
        Ok(self.replace(config))
    }

    /// Instala uma nova configuração e devolve o novo snapshot.
    pub fn replace(&mut self, config: AppConfig) -> ConfigSnapshot {
        for problem in config.validate() {
            warn!("config: {problem}");
        }
        self.current = ConfigSnapshot {
            version: self.current.version + 1,
            config: Arc::new(config),
        };
        info!("Configuração v{} ativa", self.current.version);
        self.current.clone()
    }
}
