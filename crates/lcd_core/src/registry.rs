//! Registro de métricas endereçável por chave camelCase.
//!
//! `"GPU temperature"` vira `gpuTemperature`, `"CPU1 usage"` vira `cpu1Usage`.
//! Nomes duplicados após a normalização: a última entrada vence.

use crate::types::{MahmSnapshot, MetricEntry, MetricValue};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::debug;

/// Uma chave do registro.
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    /// Entrada completa do provedor
    Entry(MetricEntry),
    /// Campo do registro da GPU (apenas valor)
    Info(MetricValue),
}

impl Metric {
    pub fn value(&self) -> MetricValue {
        match self {
            Metric::Entry(e) => MetricValue::Number(f64::from(e.data)),
            Metric::Info(v) => v.clone(),
        }
    }

    /// Formato recomendado pelo provedor, se houver.
    pub fn format_hint(&self) -> Option<&str> {
        match self {
            Metric::Entry(e) if !e.format.is_empty() => Some(&e.format),
            _ => None,
        }
    }

    pub fn units(&self) -> Option<&str> {
        match self {
            Metric::Entry(e) if !e.units.is_empty() => Some(&e.units),
            _ => None,
        }
    }
}

/// Mapa chave → métrica de um único ciclo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricRegistry {
    metrics: BTreeMap<String, Metric>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monta o registro a partir de um snapshot decodificado.
    pub fn from_snapshot(snapshot: &MahmSnapshot) -> Self {
        let mut registry = Self::new();

        for entry in &snapshot.entries {
            registry.insert(normalize_key(&entry.name), Metric::Entry(entry.clone()));
        }

        for (field, value) in snapshot.gpu_info.fields() {
            registry.insert(normalize_key(&format!("gpuInfo {field}")), Metric::Info(value));
        }

        registry
    }

    /// Insere com política last-write-wins.
    pub fn insert(&mut self, key: String, metric: Metric) {
        match self.metrics.entry(key) {
            Entry::Occupied(mut slot) => {
                debug!("Chave duplicada '{}': mantendo a última entrada", slot.key());
                slot.insert(metric);
            }
            Entry::Vacant(slot) => {
                slot.insert(metric);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Metric> {
        self.metrics.get(key)
    }

    pub fn value(&self, key: &str) -> Option<MetricValue> {
        self.metrics.get(key).map(Metric::value)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Itera em ordem alfabética de chave.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Metric)> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// ──────────────────────────────────────────────
// Normalização de chave
// ──────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq)]
enum CharClass {
    Lower,
    Upper,
    Digit,
}

fn classify(c: char) -> Option<CharClass> {
    if c.is_numeric() {
        Some(CharClass::Digit)
    } else if c.is_uppercase() {
        Some(CharClass::Upper)
    } else if c.is_alphabetic() {
        Some(CharClass::Lower)
    } else {
        None
    }
}

/// Quebra um nome em palavras: separadores não-alfanuméricos, transições
/// minúscula→maiúscula, letra↔dígito e sigla→palavra (`GPUTemp` → `GPU`,`Temp`).
fn split_words(raw: &str) -> Vec<String> {
    let chars: Vec<char> = raw.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev: Option<CharClass> = None;

    for (i, &c) in chars.iter().enumerate() {
        let Some(class) = classify(c) else {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev = None;
            continue;
        };

        let boundary = match (prev, class) {
            (Some(CharClass::Lower), CharClass::Upper) => true,
            (Some(CharClass::Digit), CharClass::Lower | CharClass::Upper) => true,
            (Some(CharClass::Lower | CharClass::Upper), CharClass::Digit) => true,
            (Some(CharClass::Upper), CharClass::Upper) => chars
                .get(i + 1)
                .is_some_and(|&next| classify(next) == Some(CharClass::Lower)),
            _ => false,
        };

        if boundary && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(c);
        prev = Some(class);
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Normaliza um nome bruto para a chave camelCase do registro.
pub fn normalize_key(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());

    for (i, word) in split_words(raw).iter().enumerate() {
        let lower = word.to_lowercase();
        if i == 0 {
            key.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            key.extend(first.to_uppercase());
            key.push_str(chars.as_str());
        }
    }

    key
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::encode::{metric, sample_gpu_info};
    use crate::types::MetricEntry;

    fn entry(name: &str, data: f32) -> MetricEntry {
        metric(name, "°C", "%.0f", data)
    }

    #[test]
    fn normalizes_afterburner_names() {
        assert_eq!(normalize_key("GPU temperature"), "gpuTemperature");
        assert_eq!(normalize_key("CPU1 usage"), "cpu1Usage");
        assert_eq!(normalize_key("Fan speed 2"), "fanSpeed2");
        assert_eq!(normalize_key("FB usage"), "fbUsage");
        assert_eq!(normalize_key("No load limit"), "noLoadLimit");
        assert_eq!(normalize_key("Framerate"), "framerate");
    }

    #[test]
    fn normalization_ignores_case_and_separators() {
        let expected = normalize_key("gpu1 temperature");
        assert_eq!(expected, "gpu1Temperature");
        assert_eq!(normalize_key("Gpu1Temperature"), expected);
        assert_eq!(normalize_key("GPU1_TEMPERATURE"), expected);
        assert_eq!(normalize_key("gpu-1 temperature"), expected);
    }

    #[test]
    fn acronym_followed_by_word_is_split() {
        assert_eq!(normalize_key("GPUTemp"), "gpuTemp");
        assert_eq!(normalize_key("gpuInfo memAmount"), "gpuInfoMemAmount");
        assert_eq!(normalize_key("gpuInfo gpuId"), "gpuInfoGpuId");
    }

    #[test]
    fn empty_or_symbol_only_names() {
        assert_eq!(normalize_key(""), "");
        assert_eq!(normalize_key(" -- "), "");
    }

    #[test]
    fn registry_has_entries_plus_gpu_fields() {
        let snapshot = MahmSnapshot {
            entries: vec![
                entry("GPU temperature", 63.25),
                entry("GPU usage", 97.0),
                entry("CPU1 usage", 12.0),
            ],
            gpu_info: sample_gpu_info(),
            ..Default::default()
        };

        let registry = MetricRegistry::from_snapshot(&snapshot);
        assert_eq!(registry.len(), 3 + 6);
        assert_eq!(registry.value("gpuTemperature"), Some(MetricValue::Number(63.25)));
        assert_eq!(registry.value("gpuInfoFamily"), Some(MetricValue::Text("GA104".into())));
        assert_eq!(
            registry.value("gpuInfoMemAmount"),
            Some(MetricValue::Number(8_388_608.0))
        );
        assert!(registry.get("gpuInfoBios").is_some());
    }

    #[test]
    fn duplicate_names_keep_last_entry() {
        let snapshot = MahmSnapshot {
            entries: vec![
                entry("GPU temperature", 40.0),
                entry("GPU Temperature", 55.0),
            ],
            gpu_info: sample_gpu_info(),
            ..Default::default()
        };

        let registry = MetricRegistry::from_snapshot(&snapshot);
        assert_eq!(registry.len(), 1 + 6);
        assert_eq!(registry.value("gpuTemperature"), Some(MetricValue::Number(55.0)));
    }

    #[test]
    fn iteration_is_sorted() {
        let mut registry = MetricRegistry::new();
        registry.insert("zeta".into(), Metric::Info(MetricValue::Number(1.0)));
        registry.insert("alpha".into(), Metric::Info(MetricValue::Number(2.0)));
        let keys: Vec<_> = registry.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["alpha", "zeta"]);
    }
}
