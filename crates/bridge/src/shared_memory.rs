//! Provedores do segmento MAHM.
//!
//! - Windows: file mapping nomeado (`OpenFileMappingW` + `MapViewOfFile`)
//! - Demais plataformas: arquivo `<shm_dir>/<mapping_name>` (Wine, desenvolvimento)

use lcd_core::layout::LayoutError;
#[cfg(not(windows))]
use lcd_core::config::ProviderConfig;
#[cfg(not(windows))]
use lcd_core::shm::MemoryRegion;
#[cfg(not(windows))]
use lcd_core::shm::RegionProvider;
#[cfg(not(windows))]
use std::path::PathBuf;

#[cfg(windows)]
pub use self::windows_mapping::NamedMappingProvider as SystemProvider;

#[cfg(not(windows))]
pub use self::FileProvider as SystemProvider;

fn unavailable(name: &str, reason: impl std::fmt::Display) -> LayoutError {
    LayoutError::ProviderUnavailable {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

// ──────────────────────────────────────────────
// Windows: file mapping nomeado
// ──────────────────────────────────────────────

#[cfg(windows)]
mod windows_mapping {
    use super::unavailable;
    use lcd_core::config::ProviderConfig;
    use lcd_core::layout::LayoutError;
    use lcd_core::shm::{check_bounds, RegionProvider, SharedRegion};
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use tracing::debug;
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Memory::{
        MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, VirtualQuery, FILE_MAP_READ,
        MEMORY_BASIC_INFORMATION, MEMORY_MAPPED_VIEW_ADDRESS,
    };
    use windows::core::PCWSTR;

    /// Abre o mapping publicado pelo Afterburner, somente leitura.
    #[derive(Debug, Default)]
    pub struct NamedMappingProvider;

    impl NamedMappingProvider {
        pub fn new(_config: &ProviderConfig) -> Self {
            Self
        }
    }

    /// View mapeada. Desmapeia e fecha o handle no `Drop`.
    pub struct MappedView {
        handle: HANDLE,
        view: MEMORY_MAPPED_VIEW_ADDRESS,
        len: usize,
    }

    impl RegionProvider for NamedMappingProvider {
        type Region = MappedView;

        fn open(&self, name: &str) -> Result<MappedView, LayoutError> {
            let wide: Vec<u16> = OsStr::new(name)
                .encode_wide()
                .chain(std::iter::once(0))
                .collect();

            unsafe {
                let handle = OpenFileMappingW(FILE_MAP_READ.0, false, PCWSTR(wide.as_ptr()))
                    .map_err(|e| unavailable(name, e))?;

                let view = MapViewOfFile(handle, FILE_MAP_READ, 0, 0, 0);
                if view.Value.is_null() {
                    let err = windows::core::Error::from_win32();
                    let _ = CloseHandle(handle);
                    return Err(unavailable(name, err));
                }

                // Tamanho real da região; limita todas as leituras
                let mut info = MEMORY_BASIC_INFORMATION::default();
                let written = VirtualQuery(
                    Some(view.Value as *const _),
                    &mut info,
                    std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
                );
                let len = if written == 0 { 0 } else { info.RegionSize };

                debug!("Mapping '{name}' aberto ({len} bytes)");
                Ok(MappedView { handle, view, len })
            }
        }
    }

    impl SharedRegion for MappedView {
        fn len(&self) -> usize {
            self.len
        }

        fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<(), LayoutError> {
            check_bounds(offset, buf.len(), self.len)?;
            // Cópia direta: o provedor escreve na região enquanto lemos
            unsafe {
                std::ptr::copy_nonoverlapping(
                    (self.view.Value as *const u8).add(offset),
                    buf.as_mut_ptr(),
                    buf.len(),
                );
            }
            Ok(())
        }
    }

    impl Drop for MappedView {
        fn drop(&mut self) {
            unsafe {
                let _ = UnmapViewOfFile(self.view);
                let _ = CloseHandle(self.handle);
            }
        }
    }
}

// ──────────────────────────────────────────────
// Arquivo (não-Windows)
// ──────────────────────────────────────────────

/// Lê o segmento de um arquivo com o nome do mapping dentro de `dir`.
#[cfg(not(windows))]
#[derive(Debug, Clone)]
pub struct FileProvider {
    dir: PathBuf,
}

#[cfg(not(windows))]
impl FileProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            dir: config.shm_dir.clone(),
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

#[cfg(not(windows))]
impl RegionProvider for FileProvider {
    type Region = MemoryRegion;

    fn open(&self, name: &str) -> Result<MemoryRegion, LayoutError> {
        let path = self.path_for(name);
        let bytes = std::fs::read(&path).map_err(|e| unavailable(name, format!("{}: {e}", path.display())))?;
        Ok(MemoryRegion::new(bytes))
    }
}

/// Escreve um segmento de exemplo em `<shm_dir>/<mapping_name>`.
#[cfg(not(windows))]
pub fn write_sample(config: &ProviderConfig) -> std::io::Result<PathBuf> {
    use lcd_core::layout::{encode, ENTRY_LAYOUT_SIZE};

    let path = FileProvider::new(config).path_for(&config.mapping_name);
    let segment = encode::segment(
        &encode::sample_entries(),
        &encode::sample_gpu_info(),
        ENTRY_LAYOUT_SIZE,
    );
    std::fs::write(&path, segment)?;
    Ok(path)
}
