//! Tipos do bloco de shared memory do MSI Afterburner (MAHM).
//!
//! Espelham `MAHM_SHARED_MEMORY_HEADER`, `MAHM_SHARED_MEMORY_ENTRY` e
//! `MAHM_SHARED_MEMORY_GPU_ENTRY` do SDK, já decodificados para tipos Rust.
//! O layout binário em si vive em [`crate::layout`].

use std::fmt;

// ──────────────────────────────────────────────
// Header
// ──────────────────────────────────────────────

/// Header do segmento, lido uma vez por ciclo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MahmHeader {
    /// Assinatura `'MAHM'` quando a memória contém dados válidos
    pub signature: u32,
    /// Versão no formato `0xMMMMmmmm` (major.minor)
    pub version: u32,
    /// Tamanho do header declarado pelo provedor (bytes)
    pub header_size: u32,
    /// Quantidade de entradas de métricas
    pub num_entries: u32,
    /// Passo entre entradas declarado pelo provedor (bytes)
    pub entry_size: u32,
    /// Timestamp da última atualização (time_t de 32 bits)
    pub time: i32,
}

impl MahmHeader {
    /// Versão como `(major, minor)`.
    pub fn version_parts(&self) -> (u16, u16) {
        ((self.version >> 16) as u16, (self.version & 0xFFFF) as u16)
    }
}

// ──────────────────────────────────────────────
// Entradas
// ──────────────────────────────────────────────

/// Uma métrica monitorada (temperatura, uso, clock…).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricEntry {
    /// Nome bruto da fonte (ex: "GPU temperature")
    pub name: String,
    /// Unidade (ex: "°C")
    pub units: String,
    pub localized_name: String,
    pub localized_units: String,
    /// Formato printf recomendado (ex: "%.0f")
    pub format: String,
    /// Valor atual
    pub data: f32,
    pub min_limit: f32,
    pub max_limit: f32,
    pub flags: u32,
    /// Índice da GPU dona da métrica
    pub gpu: u32,
    pub src_id: u32,
}

/// Registro final com informações do adaptador principal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpuInfo {
    pub gpu_id: String,
    pub family: String,
    pub device: String,
    pub driver: String,
    pub bios: String,
    /// Memória dedicada (KB)
    pub mem_amount: u32,
}

impl GpuInfo {
    /// Campos como `(nome_do_campo, valor)`, na ordem do layout.
    pub fn fields(&self) -> [(&'static str, MetricValue); 6] {
        [
            ("gpuId", MetricValue::Text(self.gpu_id.clone())),
            ("family", MetricValue::Text(self.family.clone())),
            ("device", MetricValue::Text(self.device.clone())),
            ("driver", MetricValue::Text(self.driver.clone())),
            ("bios", MetricValue::Text(self.bios.clone())),
            ("memAmount", MetricValue::Number(f64::from(self.mem_amount))),
        ]
    }
}

/// Resultado completo de uma leitura do segmento.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MahmSnapshot {
    pub header: MahmHeader,
    pub entries: Vec<MetricEntry>,
    pub gpu_info: GpuInfo,
}

// ──────────────────────────────────────────────
// Valores consumidos pelo formatter
// ──────────────────────────────────────────────

/// Valor de uma chave do registro.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Converte para número, aceitando texto numérico (ex: "3400").
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Some(0.0)
                } else {
                    trimmed.parse().ok()
                }
            }
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{n}"),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

/// Linhas renderizadas para um refresh do LCD.
pub type Frame = Vec<String>;
