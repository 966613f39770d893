//! Acesso ao segmento nomeado e leitura de um snapshot completo.
//!
//! O mapping é aberto, copiado e fechado dentro de [`read_snapshot`]; nunca
//! fica aberto entre ciclos. O fechamento acontece no `Drop` da região.

use crate::layout::{self, LayoutError, HEADER_SIZE};
use crate::types::MahmSnapshot;
use std::cell::Cell;
use std::rc::Rc;
use tracing::debug;

/// Região mapeada somente-leitura.
///
/// Implementações liberam o mapping no `Drop`.
pub trait SharedRegion {
    /// Tamanho acessível da região (bytes).
    fn len(&self) -> usize;

    /// Copia `buf.len()` bytes a partir de `offset`.
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<(), LayoutError>;
}

/// Abre regiões nomeadas (Windows file mapping, arquivo, memória…).
pub trait RegionProvider {
    type Region: SharedRegion;

    fn open(&self, name: &str) -> Result<Self::Region, LayoutError>;
}

/// Checagem de limites comum às implementações de [`SharedRegion::read_at`].
pub fn check_bounds(offset: usize, len: usize, available: usize) -> Result<(), LayoutError> {
    match offset.checked_add(len) {
        Some(end) if end <= available => Ok(()),
        _ => Err(LayoutError::Truncated {
            offset,
            len,
            available,
        }),
    }
}

/// Lê header, entradas e GPU info do mapping `name`.
pub fn read_snapshot<P: RegionProvider>(provider: &P, name: &str) -> Result<MahmSnapshot, LayoutError> {
    let region = provider.open(name)?;

    let mut raw_header = [0u8; HEADER_SIZE];
    region.read_at(0, &mut raw_header)?;
    let header = layout::decode_header(&raw_header);
    layout::validate_header(&header)?;

    // Header vem de outro processo: valida tamanhos antes de alocar
    let offset = header.header_size as usize;
    let mapped = region.len();
    let len = layout::body_len(&header).ok_or(LayoutError::Truncated {
        offset,
        len: usize::MAX,
        available: mapped,
    })?;
    check_bounds(offset, len, mapped)?;

    let mut body = vec![0u8; len];
    region.read_at(offset, &mut body)?;
    drop(region);

    let (entries, gpu_info) = layout::decode_body(&header, &body);
    let (major, minor) = header.version_parts();
    debug!(
        "MAHM v{major}.{minor}: {} entradas, passo {} bytes, segmento {mapped} bytes",
        entries.len(),
        header.entry_size
    );

    Ok(MahmSnapshot {
        header,
        entries,
        gpu_info,
    })
}

// ──────────────────────────────────────────────
// Região em memória
// ──────────────────────────────────────────────

/// Região baseada em buffer próprio (snapshot de arquivo ou teste).
///
/// Conta quantas vezes foi fechada via `closed` compartilhado.
#[derive(Debug)]
pub struct MemoryRegion {
    bytes: Vec<u8>,
    closed: Rc<Cell<usize>>,
}

impl MemoryRegion {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            closed: Rc::new(Cell::new(0)),
        }
    }

    /// Compartilha o contador de fechamentos com o chamador.
    pub fn with_close_counter(bytes: Vec<u8>, closed: Rc<Cell<usize>>) -> Self {
        Self { bytes, closed }
    }
}

impl SharedRegion for MemoryRegion {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<(), LayoutError> {
        check_bounds(offset, buf.len(), self.bytes.len())?;
        buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
        Ok(())
    }
}

impl Drop for MemoryRegion {
    fn drop(&mut self) {
        self.closed.set(self.closed.get() + 1);
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
