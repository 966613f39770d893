//! Layout binário do segmento MAHM.
//!
//! Schema explícito com offsets fixos (little-endian), sem overlay de
//! struct `repr(C)`. O provedor é um processo de terceiros, então o passo
//! entre entradas vem sempre do header e nunca de `size_of`.
//!
//! ```text
//! ┌──────────────┬───────────────────────────────┬──────────────┐
//! │ Header (24)  │ Entry × num_entries (stride)  │ GpuInfo (1304)│
//! └──────────────┴───────────────────────────────┴──────────────┘
//!  0             header_size                      header_size + stride × n
//! ```

use crate::types::{GpuInfo, MahmHeader, MetricEntry};

/// Capacidade de cada string fixa (`MAX_PATH`).
pub const MAX_PATH: usize = 260;

/// `'MAHM'` como constante multi-char do C.
pub const MAHM_SIGNATURE: u32 = 0x4D41_484D;

/// Assinatura escrita pelo provedor ao desalocar o segmento.
pub const DEAD_SIGNATURE: u32 = 0xDEAD;

/// Tamanho fixo do header lido.
pub const HEADER_SIZE: usize = 24;

/// Tamanho do layout interno de uma entrada: 5 strings + 3 floats + 3 dwords.
pub const ENTRY_LAYOUT_SIZE: usize = 5 * MAX_PATH + 6 * 4;

/// Tamanho do registro de informações da GPU: 5 strings + 1 dword.
pub const GPU_INFO_SIZE: usize = 5 * MAX_PATH + 4;

// Offsets dentro de uma entrada
const ENTRY_NAME: usize = 0;
const ENTRY_UNITS: usize = MAX_PATH;
const ENTRY_LOCALIZED_NAME: usize = 2 * MAX_PATH;
const ENTRY_LOCALIZED_UNITS: usize = 3 * MAX_PATH;
const ENTRY_FORMAT: usize = 4 * MAX_PATH;
const ENTRY_DATA: usize = 5 * MAX_PATH;
const ENTRY_MIN_LIMIT: usize = ENTRY_DATA + 4;
const ENTRY_MAX_LIMIT: usize = ENTRY_DATA + 8;
const ENTRY_FLAGS: usize = ENTRY_DATA + 12;
const ENTRY_GPU: usize = ENTRY_DATA + 16;
const ENTRY_SRC_ID: usize = ENTRY_DATA + 20;

// Offsets dentro do registro da GPU
const GPU_ID: usize = 0;
const GPU_FAMILY: usize = MAX_PATH;
const GPU_DEVICE: usize = 2 * MAX_PATH;
const GPU_DRIVER: usize = 3 * MAX_PATH;
const GPU_BIOS: usize = 4 * MAX_PATH;
const GPU_MEM_AMOUNT: usize = 5 * MAX_PATH;

/// Erros de leitura/decodificação do segmento.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("Provedor indisponível: mapping '{name}' não pôde ser aberto ({reason})")]
    ProviderUnavailable { name: String, reason: String },

    #[error("Sem dados: o provedor declara 0 entradas")]
    NoData,

    #[error("Segmento marcado para desalocação (0xDEAD)")]
    ShuttingDown,

    #[error("Assinatura inválida: 0x{0:08X} (esperado 0x{MAHM_SIGNATURE:08X})")]
    InvalidSignature(u32),

    #[error("Passo de entrada {0} menor que o layout mínimo ({ENTRY_LAYOUT_SIZE})")]
    EntryTooSmall(u32),

    #[error("Leitura fora do segmento: {len} bytes no offset {offset} (segmento tem {available})")]
    Truncated {
        offset: usize,
        len: usize,
        available: usize,
    },
}

impl LayoutError {
    /// Erros que significam "nada para mostrar ainda", não falha de I/O.
    pub fn is_no_data(&self) -> bool {
        matches!(self, LayoutError::NoData | LayoutError::ShuttingDown)
    }
}

// ──────────────────────────────────────────────
// Primitivas
// ──────────────────────────────────────────────

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    read_u32(buf, offset) as i32
}

fn read_f32(buf: &[u8], offset: usize) -> f32 {
    f32::from_bits(read_u32(buf, offset))
}

/// Lê uma string fixa até o primeiro NUL dentro da capacidade.
pub fn read_fixed_str(buf: &[u8], offset: usize) -> String {
    let field = &buf[offset..offset + MAX_PATH];
    let end = field.iter().position(|&b| b == 0).unwrap_or(MAX_PATH);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

// ──────────────────────────────────────────────
// Decodificação
// ──────────────────────────────────────────────

/// Decodifica o header. `buf` precisa ter [`HEADER_SIZE`] bytes.
pub fn decode_header(buf: &[u8; HEADER_SIZE]) -> MahmHeader {
    MahmHeader {
        signature: read_u32(buf, 0),
        version: read_u32(buf, 4),
        header_size: read_u32(buf, 8),
        num_entries: read_u32(buf, 12),
        entry_size: read_u32(buf, 16),
        time: read_i32(buf, 20),
    }
}

/// Valida assinatura e quantidade de entradas.
pub fn validate_header(header: &MahmHeader) -> Result<(), LayoutError> {
    match header.signature {
        MAHM_SIGNATURE => {}
        DEAD_SIGNATURE => return Err(LayoutError::ShuttingDown),
        other => return Err(LayoutError::InvalidSignature(other)),
    }
    if header.num_entries == 0 {
        return Err(LayoutError::NoData);
    }
    if (header.entry_size as usize) < ENTRY_LAYOUT_SIZE {
        return Err(LayoutError::EntryTooSmall(header.entry_size));
    }
    Ok(())
}

/// Bytes que seguem o header: entradas + registro da GPU.
///
/// `None` se o tamanho declarado não cabe em `usize`.
pub fn body_len(header: &MahmHeader) -> Option<usize> {
    (header.entry_size as usize)
        .checked_mul(header.num_entries as usize)?
        .checked_add(GPU_INFO_SIZE)
}

/// Decodifica uma entrada a partir do seu offset inicial.
pub fn decode_entry(buf: &[u8], base: usize) -> MetricEntry {
    MetricEntry {
        name: read_fixed_str(buf, base + ENTRY_NAME),
        units: read_fixed_str(buf, base + ENTRY_UNITS),
        localized_name: read_fixed_str(buf, base + ENTRY_LOCALIZED_NAME),
        localized_units: read_fixed_str(buf, base + ENTRY_LOCALIZED_UNITS),
        format: read_fixed_str(buf, base + ENTRY_FORMAT),
        data: read_f32(buf, base + ENTRY_DATA),
        min_limit: read_f32(buf, base + ENTRY_MIN_LIMIT),
        max_limit: read_f32(buf, base + ENTRY_MAX_LIMIT),
        flags: read_u32(buf, base + ENTRY_FLAGS),
        gpu: read_u32(buf, base + ENTRY_GPU),
        src_id: read_u32(buf, base + ENTRY_SRC_ID),
    }
}

/// Decodifica o registro da GPU a partir do seu offset inicial.
pub fn decode_gpu_info(buf: &[u8], base: usize) -> GpuInfo {
    GpuInfo {
        gpu_id: read_fixed_str(buf, base + GPU_ID),
        family: read_fixed_str(buf, base + GPU_FAMILY),
        device: read_fixed_str(buf, base + GPU_DEVICE),
        driver: read_fixed_str(buf, base + GPU_DRIVER),
        bios: read_fixed_str(buf, base + GPU_BIOS),
        mem_amount: read_u32(buf, base + GPU_MEM_AMOUNT),
    }
}

/// Decodifica o corpo (entradas + GPU) já validado pelo header.
///
/// `body` precisa ter exatamente [`body_len`] bytes.
pub fn decode_body(header: &MahmHeader, body: &[u8]) -> (Vec<MetricEntry>, GpuInfo) {
    let stride = header.entry_size as usize;
    let count = header.num_entries as usize;

    let entries = (0..count).map(|i| decode_entry(body, stride * i)).collect();
    let gpu_info = decode_gpu_info(body, stride * count);

    (entries, gpu_info)
}

// ──────────────────────────────────────────────
// Encoder
// ──────────────────────────────────────────────

/// Monta segmentos MAHM sintéticos (testes e snapshots de desenvolvimento).
pub mod encode {
    use super::*;

    fn put_str(buf: &mut [u8], offset: usize, value: &str) {
        let bytes = value.as_bytes();
        // Mantém ao menos um NUL dentro da capacidade
        let len = bytes.len().min(MAX_PATH - 1);
        buf[offset..offset + len].copy_from_slice(&bytes[..len]);
    }

    fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
        buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn header_bytes(header: &MahmHeader) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_SIZE];
        put_u32(&mut buf, 0, header.signature);
        put_u32(&mut buf, 4, header.version);
        put_u32(&mut buf, 8, header.header_size);
        put_u32(&mut buf, 12, header.num_entries);
        put_u32(&mut buf, 16, header.entry_size);
        put_u32(&mut buf, 20, header.time as u32);
        buf
    }

    pub fn entry_bytes(entry: &MetricEntry, stride: usize) -> Vec<u8> {
        let mut buf = vec![0u8; stride.max(ENTRY_LAYOUT_SIZE)];
        put_str(&mut buf, ENTRY_NAME, &entry.name);
        put_str(&mut buf, ENTRY_UNITS, &entry.units);
        put_str(&mut buf, ENTRY_LOCALIZED_NAME, &entry.localized_name);
        put_str(&mut buf, ENTRY_LOCALIZED_UNITS, &entry.localized_units);
        put_str(&mut buf, ENTRY_FORMAT, &entry.format);
        put_u32(&mut buf, ENTRY_DATA, entry.data.to_bits());
        put_u32(&mut buf, ENTRY_MIN_LIMIT, entry.min_limit.to_bits());
        put_u32(&mut buf, ENTRY_MAX_LIMIT, entry.max_limit.to_bits());
        put_u32(&mut buf, ENTRY_FLAGS, entry.flags);
        put_u32(&mut buf, ENTRY_GPU, entry.gpu);
        put_u32(&mut buf, ENTRY_SRC_ID, entry.src_id);
        buf
    }

    pub fn gpu_info_bytes(info: &GpuInfo) -> Vec<u8> {
        let mut buf = vec![0u8; GPU_INFO_SIZE];
        put_str(&mut buf, GPU_ID, &info.gpu_id);
        put_str(&mut buf, GPU_FAMILY, &info.family);
        put_str(&mut buf, GPU_DEVICE, &info.device);
        put_str(&mut buf, GPU_DRIVER, &info.driver);
        put_str(&mut buf, GPU_BIOS, &info.bios);
        put_u32(&mut buf, GPU_MEM_AMOUNT, info.mem_amount);
        buf
    }

    /// Segmento completo: header v2.0 de 32 bytes, entradas com passo `stride`
    /// e o registro da GPU no final.
    pub fn segment(entries: &[MetricEntry], gpu_info: &GpuInfo, stride: usize) -> Vec<u8> {
        let stride = stride.max(ENTRY_LAYOUT_SIZE);
        let header = MahmHeader {
            signature: MAHM_SIGNATURE,
            version: 0x0002_0000,
            header_size: 32,
            num_entries: entries.len() as u32,
            entry_size: stride as u32,
            time: 1_700_000_000,
        };
        let mut buf = header_bytes(&header);
        buf.resize(header.header_size as usize, 0);
        for e in entries {
            buf.extend_from_slice(&entry_bytes(e, stride));
        }
        buf.extend_from_slice(&gpu_info_bytes(gpu_info));
        buf
    }

    /// Métrica no formato típico do Afterburner.
    pub fn metric(name: &str, units: &str, format: &str, data: f32) -> MetricEntry {
        MetricEntry {
            name: name.into(),
            units: units.into(),
            localized_name: name.into(),
            localized_units: units.into(),
            format: format.into(),
            data,
            min_limit: 0.0,
            max_limit: 100.0,
            ..Default::default()
        }
    }

    /// Conjunto de métricas parecido com um Afterburner real.
    pub fn sample_entries() -> Vec<MetricEntry> {
        vec![
            metric("GPU temperature", "°C", "%.0f", 63.25),
            metric("GPU usage", "%", "%.0f", 97.0),
            metric("Core clock", "MHz", "%.0f", 1905.0),
            metric("Memory clock", "MHz", "%.0f", 7001.0),
            metric("Memory usage", "MB", "%.0f", 5843.5),
            metric("Power", "W", "%.1f", 212.4),
            metric("Fan speed", "%", "%.0f", 54.0),
            metric("CPU temperature", "°C", "%.0f", 41.0),
            metric("CPU usage", "%", "%.0f", 18.3),
            metric("RAM usage", "MB", "%.0f", 11769.0),
            metric("Framerate", "FPS", "%.0f", 143.8),
        ]
    }

    pub fn sample_gpu_info() -> GpuInfo {
        GpuInfo {
            gpu_id: "VEN_10DE&DEV_2484".into(),
            family: "GA104".into(),
            device: "NVIDIA GeForce RTX 3070".into(),
            driver: "546.33".into(),
            bios: "94.04.25.00.6F".into(),
            mem_amount: 8_388_608,
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::encode::*;
    use super::*;

    fn entry(name: &str, data: f32) -> MetricEntry {
        metric(name, "°C", "%.0f", data)
    }

    fn header_of(buf: &[u8]) -> MahmHeader {
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&buf[..HEADER_SIZE]);
        decode_header(&raw)
    }

    #[test]
    fn layout_sizes_match_sdk() {
        assert_eq!(ENTRY_LAYOUT_SIZE, 1324);
        assert_eq!(GPU_INFO_SIZE, 1304);
    }

    #[test]
    fn header_fields_are_little_endian() {
        let buf = segment(&[entry("GPU temperature", 63.25)], &sample_gpu_info(), ENTRY_LAYOUT_SIZE);
        let header = header_of(&buf);
        assert_eq!(header.signature, MAHM_SIGNATURE);
        assert_eq!(&buf[0..4], &[0x4D, 0x48, 0x41, 0x4D]);
        assert_eq!(header.header_size, 32);
        assert_eq!(header.num_entries, 1);
        assert_eq!(header.entry_size, 1324);
        assert_eq!(header.time, 1_700_000_000);
        assert!(validate_header(&header).is_ok());
    }

    #[test]
    fn strings_stop_at_first_nul() {
        let mut field = vec![b'x'; MAX_PATH + 8];
        field[3] = 0;
        assert_eq!(read_fixed_str(&field, 0), "xxx");
    }

    #[test]
    fn unterminated_string_is_bounded_by_capacity() {
        let field = vec![b'a'; MAX_PATH + 8];
        assert_eq!(read_fixed_str(&field, 0).len(), MAX_PATH);
    }

    #[test]
    fn stride_comes_from_header_not_layout() {
        // Provedor declara entradas maiores que o layout conhecido
        let stride = ENTRY_LAYOUT_SIZE + 36;
        let entries = [entry("GPU temperature", 63.25), entry("GPU usage", 97.0)];
        let buf = segment(&entries, &sample_gpu_info(), stride);
        let header = header_of(&buf);

        let start = header.header_size as usize;
        let body = &buf[start..start + body_len(&header).unwrap()];
        let (decoded, gpu) = decode_body(&header, body);

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], entries[0]);
        assert_eq!(decoded[1].name, "GPU usage");
        assert_eq!(decoded[1].data, 97.0);
        assert_eq!(gpu, sample_gpu_info());
    }

    #[test]
    fn body_len_covers_entries_and_gpu_info() {
        let header = MahmHeader {
            num_entries: 3,
            entry_size: ENTRY_LAYOUT_SIZE as u32,
            ..Default::default()
        };
        assert_eq!(body_len(&header), Some(3 * ENTRY_LAYOUT_SIZE + GPU_INFO_SIZE));
    }

    #[test]
    fn zero_entries_is_no_data() {
        let buf = segment(&[], &sample_gpu_info(), ENTRY_LAYOUT_SIZE);
        let err = validate_header(&header_of(&buf)).unwrap_err();
        assert!(matches!(err, LayoutError::NoData));
        assert!(err.is_no_data());
    }

    #[test]
    fn dead_signature_is_reported_as_shutdown() {
        let header = MahmHeader {
            signature: DEAD_SIGNATURE,
            num_entries: 3,
            entry_size: ENTRY_LAYOUT_SIZE as u32,
            ..Default::default()
        };
        assert!(matches!(validate_header(&header), Err(LayoutError::ShuttingDown)));
    }

    #[test]
    fn rejects_unknown_signature() {
        let header = MahmHeader {
            signature: 0x1234_5678,
            num_entries: 1,
            entry_size: ENTRY_LAYOUT_SIZE as u32,
            ..Default::default()
        };
        assert!(matches!(
            validate_header(&header),
            Err(LayoutError::InvalidSignature(0x1234_5678))
        ));
    }

    #[test]
    fn rejects_stride_smaller_than_layout() {
        let header = MahmHeader {
            signature: MAHM_SIGNATURE,
            num_entries: 1,
            entry_size: 100,
            ..Default::default()
        };
        assert!(matches!(validate_header(&header), Err(LayoutError::EntryTooSmall(100))));
    }
}
