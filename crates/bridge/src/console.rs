//! Thread de console que lê comandos do stdin e envia para o loop via channel.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::io::BufRead;
use tracing::{debug, info};

/// Comandos da superfície de controle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// (Re)abre a conexão e começa a atualizar após o atraso inicial
    Start,
    /// Para o polling e fecha a conexão
    Stop,
    /// Relê o config.toml
    Reload,
    /// Mostra a tabela de métricas
    Dump,
    /// Para tudo e sai do processo
    Shutdown,
}

pub const HELP: &str = "Comandos: start | stop | reload | dump | exit";

/// Interpreta uma linha digitada no console.
pub fn parse_command(line: &str) -> Option<ControlCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "start" | "resume" => Some(ControlCommand::Start),
        "stop" => Some(ControlCommand::Stop),
        "reload" => Some(ControlCommand::Reload),
        "dump" | "data" => Some(ControlCommand::Dump),
        "exit" | "quit" => Some(ControlCommand::Shutdown),
        _ => None,
    }
}

/// Inicia a thread de console. Retorna o receiver do channel.
pub fn spawn_console_thread() -> std::io::Result<Receiver<ControlCommand>> {
    let (tx, rx) = bounded::<ControlCommand>(16);

    std::thread::Builder::new()
        .name("console".into())
        .spawn(move || console_loop(&tx))?;

    Ok(rx)
}

fn console_loop(tx: &Sender<ControlCommand>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Some(cmd) => {
                debug!("Console: {cmd:?}");
                if tx.send(cmd).is_err() || cmd == ControlCommand::Shutdown {
                    return;
                }
            }
            None => println!("{HELP}"),
        }
    }
    info!("stdin fechado; comandos de console desativados");
}
