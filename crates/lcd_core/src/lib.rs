//! # LCD Core
//!
//! Crate compartilhada com o layout binário da shared memory do MSI
//! Afterburner (MAHM), o registro de métricas, o formatter de linhas e o
//! conjunto de comandos do LCD serial.
//!
//! ## Módulos
//! - [`types`] – Header, entradas e GPU info decodificados
//! - [`layout`] – Schema binário (offsets fixos, little-endian)
//! - [`shm`] – Abertura/leitura do segmento nomeado
//! - [`registry`] – Chaves camelCase → métrica
//! - [`format`] – Templates `%5.1f{gpuTemperature}` → linha de largura fixa
//! - [`lcd`] – Comandos Matrix Orbital LK
//! - [`config`] – Configuração unificada via TOML

pub mod types;
pub mod layout;
pub mod shm;
pub mod registry;
pub mod format;
pub mod lcd;
pub mod config;

// Re-exports convenientes
pub use types::{MahmSnapshot, MetricValue};
pub use registry::MetricRegistry;
pub use format::format_line;
pub use config::{AppConfig, ConfigSnapshot, ConfigStore};
