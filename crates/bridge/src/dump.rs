//! Tabela de diagnóstico com todas as métricas disponíveis.

use lcd_core::format::format_value;
use lcd_core::registry::MetricRegistry;
use std::fmt::Write;

const RULE: &str = "─────────────────────────────────────────────";

/// Monta a tabela: chave, formato recomendado, valor atual e unidade.
pub fn render_table(registry: &MetricRegistry) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "{:>20} {:>7} {:>10}", "", "formato", "valor");
    let _ = writeln!(out, "{:>20} {:>7} {:>10}", "chave", "recom.", "atual");
    let _ = writeln!(out, "{RULE}");

    for (key, metric) in registry.iter() {
        let value = metric.value();
        let hint = metric.format_hint().unwrap_or("");

        let mut row = format!("{key:>20} {hint:>7}");
        match metric.units() {
            Some(units) if !hint.is_empty() => {
                let rendered = format_value(hint, &value).unwrap_or_else(|_| "?".into());
                let _ = write!(row, " {rendered:>10} {units}");
            }
            _ => {
                let _ = write!(row, " {value}");
            }
        }
        let _ = writeln!(out, "{}", row.trim_end());
    }

    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(
        out,
        "Mais/menos parâmetros? Adicione ou remova no monitoramento do MSI Afterburner."
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcd_core::layout::encode::{metric, sample_gpu_info};
    use lcd_core::types::MahmSnapshot;

    #[test]
    fn table_lists_sorted_keys_with_formatted_values() {
        let snapshot = MahmSnapshot {
            entries: vec![
                metric("GPU usage", "%", "%.0f", 97.4),
                metric("Power", "W", "%.1f", 212.44),
            ],
            gpu_info: sample_gpu_info(),
            ..Default::default()
        };
        let table = render_table(&MetricRegistry::from_snapshot(&snapshot));
        let rows: Vec<&str> = table.lines().collect();

        let gpu_usage = rows.iter().position(|r| r.contains("gpuUsage")).unwrap();
        let power = rows.iter().position(|r| r.contains("power")).unwrap();
        let family = rows.iter().position(|r| r.contains("gpuInfoFamily")).unwrap();
        assert!(family < gpu_usage && gpu_usage < power);

        assert_eq!(rows[gpu_usage], format!("{:>20} {:>7} {:>10} %", "gpuUsage", "%.0f", "97"));
        assert_eq!(rows[power], format!("{:>20} {:>7} {:>10} W", "power", "%.1f", "212.4"));
        assert!(rows[family].ends_with("GA104"));
        assert!(table.trim_end().ends_with("MSI Afterburner."));
    }
}
