//! Verifica se o processo provedor (Afterburner) está rodando.

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

/// Procura um processo pelo nome do executável (sem diferenciar caixa).
pub fn is_process_running(name: &str) -> bool {
    let mut sys = System::new();
    sys.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::nothing());
    sys.processes()
        .values()
        .any(|p| p.name().eq_ignore_ascii_case(name))
}
