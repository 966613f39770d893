//! Comandos do LCD (conjunto Matrix Orbital LK).
//!
//! Todo comando começa com o prefixo `0xFE`. Coordenadas do cursor são
//! 1-based no dispositivo; a API aqui recebe 0-based.
//!
//! ```text
//! clear      FE 58
//! backlight  FE 42 01
//! home       FE 48
//! cursor     FE 47 col+1 row+1
//! contrast   FE 50 nível
//! brightness FE 99 nível
//! ```

/// Prefixo de comando.
pub const COMMAND_PREFIX: u8 = 0xFE;

/// Um comando pronto para a fila serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LcdCommand {
    ClearScreen,
    BacklightOn,
    CursorHome,
    /// Coluna e linha 0-based
    SetCursor { col: u8, row: u8 },
    SetContrast(u8),
    SetBrightness(u8),
}

impl LcdCommand {
    /// Bytes exatos enviados ao dispositivo.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            LcdCommand::ClearScreen => vec![COMMAND_PREFIX, 0x58],
            LcdCommand::BacklightOn => vec![COMMAND_PREFIX, 0x42, 0x01],
            LcdCommand::CursorHome => vec![COMMAND_PREFIX, 0x48],
            LcdCommand::SetCursor { col, row } => vec![
                COMMAND_PREFIX,
                0x47,
                col.wrapping_add(1),
                row.wrapping_add(1),
            ],
            LcdCommand::SetContrast(level) => vec![COMMAND_PREFIX, 0x50, level],
            LcdCommand::SetBrightness(level) => vec![COMMAND_PREFIX, 0x99, level],
        }
    }
}

/// Sequência de inicialização ao conectar. Contraste só se configurado.
pub fn init_commands(brightness: u8, contrast: Option<u8>) -> Vec<Vec<u8>> {
    let mut cmds = vec![
        LcdCommand::ClearScreen.encode(),
        LcdCommand::SetBrightness(brightness).encode(),
    ];
    if let Some(level) = contrast {
        cmds.push(LcdCommand::SetContrast(level).encode());
    }
    cmds
}

/// Converte um frame em buffers para a fila: home, e para cada linha o
/// posicionamento (exceto a primeira, que segue o home) e o texto.
pub fn frame_commands(lines: &[String], height: usize) -> Vec<Vec<u8>> {
    let rows = lines.len().min(height);
    let mut out = Vec::with_capacity(1 + rows * 2);
    out.push(LcdCommand::CursorHome.encode());

    for (row, line) in lines.iter().take(rows).enumerate() {
        if row != 0 {
            let row = u8::try_from(row).unwrap_or(u8::MAX);
            out.push(LcdCommand::SetCursor { col: 0, row }.encode());
        }
        out.push(line.as_bytes().to_vec());
    }

    out
}
