//! Formatação de linhas do LCD a partir de templates.
//!
//! Sintaxe de campo: `%<flags><width>.<precision><type>{nome}`, com flags
//! `- + espaço 0 #` e tipos `b c d e u f F o s x X` (semântica de printf).
//! `{nome}` sem especificador vira `?`. A linha final tem sempre exatamente
//! `width` caracteres.

use crate::registry::MetricRegistry;
use crate::types::MetricValue;
use tracing::debug;

/// Limite para width/precision vindos do template.
const MAX_FIELD: usize = 255;

/// Falha ao formatar um único campo. Nunca sai do formatter de linha.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("Campo '{0}' não existe no registro")]
    Missing(String),

    #[error("Valor '{0}' não é numérico")]
    NotANumber(String),

    #[error("Código de caractere inválido: {0}")]
    InvalidChar(f64),

    #[error("Especificador inválido: '{0}'")]
    InvalidSpec(String),
}

// ──────────────────────────────────────────────
// Especificador
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub left: bool,
    pub plus: bool,
    pub space: bool,
    pub zero: bool,
    pub alt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Binary,
    Char,
    Decimal,
    Exponent,
    Unsigned,
    Fixed,
    FixedUpper,
    Octal,
    Str,
    Hex,
    HexUpper,
}

impl Conversion {
    fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            b'b' => Conversion::Binary,
            b'c' => Conversion::Char,
            b'd' => Conversion::Decimal,
            b'e' => Conversion::Exponent,
            b'u' => Conversion::Unsigned,
            b'f' => Conversion::Fixed,
            b'F' => Conversion::FixedUpper,
            b'o' => Conversion::Octal,
            b's' => Conversion::Str,
            b'x' => Conversion::Hex,
            b'X' => Conversion::HexUpper,
            _ => return None,
        })
    }
}

/// Especificador printf já parseado (`%-05.1f` etc).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    pub flags: Flags,
    pub width: Option<usize>,
    pub precision: Option<usize>,
    pub conversion: Conversion,
}

fn parse_digits(bytes: &[u8], start: usize) -> (Option<usize>, usize) {
    let len = bytes[start..].iter().take_while(|b| b.is_ascii_digit()).count();
    if len == 0 {
        return (None, start);
    }
    let value = bytes[start..start + len]
        .iter()
        .fold(0usize, |acc, b| acc.saturating_mul(10).saturating_add(usize::from(b - b'0')));
    (Some(value.min(MAX_FIELD)), start + len)
}

impl FormatSpec {
    /// Parseia um especificador no início de `s`. Retorna o spec e os bytes consumidos.
    pub fn parse_prefix(s: &str) -> Option<(Self, usize)> {
        let bytes = s.as_bytes();
        if bytes.first() != Some(&b'%') {
            return None;
        }

        let mut flags = Flags::default();
        let mut i = 1;
        while let Some(&b) = bytes.get(i) {
            match b {
                b'-' => flags.left = true,
                b'+' => flags.plus = true,
                b' ' => flags.space = true,
                b'0' => flags.zero = true,
                b'#' => flags.alt = true,
                _ => break,
            }
            i += 1;
        }

        let (width, next) = parse_digits(bytes, i);
        i = next;

        let mut precision = None;
        if bytes.get(i) == Some(&b'.') {
            let (digits, next) = parse_digits(bytes, i + 1);
            precision = Some(digits?);
            i = next;
        }

        let conversion = Conversion::from_byte(*bytes.get(i)?)?;
        let spec = FormatSpec {
            flags,
            width,
            precision,
            conversion,
        };
        Some((spec, i + 1))
    }

    /// Parseia um especificador isolado, ex: o formato recomendado `"%.0f"`.
    pub fn parse(s: &str) -> Result<Self, FieldError> {
        match Self::parse_prefix(s) {
            Some((spec, len)) if len == s.len() => Ok(spec),
            _ => Err(FieldError::InvalidSpec(s.to_string())),
        }
    }

    /// Aplica o especificador a um valor.
    pub fn apply(&self, value: &MetricValue) -> Result<String, FieldError> {
        match self.conversion {
            Conversion::Str => {
                let text = value.to_string();
                let text = match self.precision {
                    Some(p) => text.chars().take(p).collect(),
                    None => text,
                };
                Ok(self.pad_text(text))
            }
            Conversion::Char => {
                let n = number_of(value)?;
                let c = char::from_u32(n.trunc() as u32)
                    .filter(|_| n.is_finite() && n >= 0.0)
                    .ok_or(FieldError::InvalidChar(n))?;
                Ok(self.pad_text(c.to_string()))
            }
            Conversion::Decimal => {
                let n = integer_of(value)?;
                let digits = self.min_digits(n.unsigned_abs().to_string());
                Ok(self.pad_number(self.sign(n < 0), "", digits))
            }
            Conversion::Unsigned => {
                let n = integer_of(value)? as u32;
                Ok(self.pad_number("", "", self.min_digits(n.to_string())))
            }
            Conversion::Binary | Conversion::Octal | Conversion::Hex | Conversion::HexUpper => {
                let n = integer_of(value)? as u32;
                let (digits, prefix) = match self.conversion {
                    Conversion::Binary => (format!("{n:b}"), "0b"),
                    Conversion::Octal => (format!("{n:o}"), "0"),
                    Conversion::Hex => (format!("{n:x}"), "0x"),
                    _ => (format!("{n:X}"), "0X"),
                };
                let prefix = if self.flags.alt && n != 0 { prefix } else { "" };
                Ok(self.pad_number("", prefix, self.min_digits(digits)))
            }
            Conversion::Fixed | Conversion::FixedUpper => {
                let n = number_of(value)?;
                let upper = self.conversion == Conversion::FixedUpper;
                if !n.is_finite() {
                    return Ok(self.pad_non_finite(n, upper));
                }
                let precision = self.precision.unwrap_or(6);
                let mut digits = fixed(n.abs(), precision);
                if self.flags.alt && precision == 0 {
                    digits.push('.');
                }
                Ok(self.pad_number(self.sign(is_negative(n)), "", digits))
            }
            Conversion::Exponent => {
                let n = number_of(value)?;
                if !n.is_finite() {
                    return Ok(self.pad_non_finite(n, false));
                }
                let precision = self.precision.unwrap_or(6);
                let digits = exponent(n.abs(), precision, self.flags.alt);
                Ok(self.pad_number(self.sign(is_negative(n)), "", digits))
            }
        }
    }

    fn sign(&self, negative: bool) -> &'static str {
        if negative {
            "-"
        } else if self.flags.plus {
            "+"
        } else if self.flags.space {
            " "
        } else {
            ""
        }
    }

    /// Precision em inteiros = número mínimo de dígitos.
    fn min_digits(&self, digits: String) -> String {
        match self.precision {
            Some(p) if digits.len() < p => format!("{}{digits}", "0".repeat(p - digits.len())),
            _ => digits,
        }
    }

    fn pad_text(&self, text: String) -> String {
        let width = self.width.unwrap_or(0);
        if self.flags.left {
            format!("{text:<width$}")
        } else {
            format!("{text:>width$}")
        }
    }

    fn pad_number(&self, sign: &str, prefix: &str, digits: String) -> String {
        let width = self.width.unwrap_or(0);
        let len = sign.len() + prefix.len() + digits.chars().count();
        if len >= width {
            return format!("{sign}{prefix}{digits}");
        }

        let fill = width - len;
        let integer = !matches!(
            self.conversion,
            Conversion::Fixed | Conversion::FixedUpper | Conversion::Exponent
        );
        let zero_pad = self.flags.zero && !self.flags.left && !(integer && self.precision.is_some());

        if self.flags.left {
            format!("{sign}{prefix}{digits}{}", " ".repeat(fill))
        } else if zero_pad {
            format!("{sign}{prefix}{}{digits}", "0".repeat(fill))
        } else {
            format!("{}{sign}{prefix}{digits}", " ".repeat(fill))
        }
    }

    fn pad_non_finite(&self, n: f64, upper: bool) -> String {
        let text = match (n.is_nan(), upper) {
            (true, false) => "nan",
            (true, true) => "NAN",
            (false, false) => "inf",
            (false, true) => "INF",
        };
        let sign = self.sign(n.is_sign_negative() && !n.is_nan());
        self.pad_text(format!("{sign}{text}"))
    }
}

// ──────────────────────────────────────────────
// Conversões numéricas
// ──────────────────────────────────────────────

fn number_of(value: &MetricValue) -> Result<f64, FieldError> {
    value
        .as_number()
        .ok_or_else(|| FieldError::NotANumber(value.to_string()))
}

fn integer_of(value: &MetricValue) -> Result<i64, FieldError> {
    let n = number_of(value)?;
    if !n.is_finite() {
        return Err(FieldError::NotANumber(value.to_string()));
    }
    Ok(n.trunc() as i64)
}

fn is_negative(n: f64) -> bool {
    n < 0.0
}

/// `x` está exatamente no meio entre dois múltiplos de `10^-decimals`?
///
/// Com `x = m·2^e`, empate ⇔ `m·10^d·2^(e+1)` é inteiro ímpar. `decimals`
/// negativo arredonda à esquerda da vírgula (dezenas, centenas...).
fn is_half_tie(x: f64, decimals: i32) -> bool {
    if !x.is_finite() || x == 0.0 || decimals.unsigned_abs() > 22 {
        return false;
    }
    let bits = x.abs().to_bits();
    let exp_bits = ((bits >> 52) & 0x7FF) as i32;
    let fraction = bits & ((1u64 << 52) - 1);
    let (mantissa, exp) = if exp_bits == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), exp_bits - 1075)
    };

    let scaled = if decimals >= 0 {
        u128::from(mantissa) * 5u128.pow(decimals as u32)
    } else {
        let divisor = 5u64.pow(decimals.unsigned_abs());
        if mantissa % divisor != 0 {
            return false;
        }
        u128::from(mantissa / divisor)
    };
    let shift = exp + 1 + decimals;
    shift <= 0 && scaled.trailing_zeros() as i32 == -shift
}

/// Soma uma unidade no último dígito de um decimal positivo ("9.9" → "10.0").
fn increment_decimal(digits: &str) -> String {
    let mut out: Vec<u8> = digits.bytes().collect();
    for b in out.iter_mut().rev() {
        match *b {
            b'.' => continue,
            b'9' => *b = b'0',
            _ => {
                *b += 1;
                return String::from_utf8_lossy(&out).into_owned();
            }
        }
    }
    out.insert(0, b'1');
    String::from_utf8_lossy(&out).into_owned()
}

/// Ponto fixo com arredondamento "metade para longe do zero" sobre o valor exato.
fn fixed(magnitude: f64, precision: usize) -> String {
    if !is_half_tie(magnitude, precision as i32) {
        return format!("{magnitude:.precision$}");
    }
    // Empate exato: o valor tem precision+1 casas, a última é 5
    let digits = precision + 1;
    let exact = format!("{magnitude:.digits$}");
    let truncated = &exact[..exact.len() - 1];
    increment_decimal(truncated.strip_suffix('.').unwrap_or(truncated))
}

/// Notação científica estilo C: `6.325000e+01`.
fn exponent(magnitude: f64, precision: usize, alt: bool) -> String {
    let (mantissa, exp) = scientific(magnitude, precision);
    let sign = if exp < 0 { '-' } else { '+' };
    let dot = if alt && precision == 0 { "." } else { "" };
    format!("{mantissa}{dot}e{sign}{:02}", exp.unsigned_abs())
}

/// Separa `"6.33e1"` em mantissa e expoente.
fn split_exponent(rust: &str) -> (&str, i32) {
    let (mantissa, exp) = rust.split_once('e').unwrap_or((rust, "0"));
    (mantissa, exp.parse().unwrap_or(0))
}

/// Mantissa com `precision` casas e expoente decimal; empates exatos
/// arredondam para longe do zero, como em [`fixed`].
fn scientific(magnitude: f64, precision: usize) -> (String, i32) {
    let rounded = format!("{magnitude:.precision$e}");
    // Expoente do valor exato, antes de qualquer arredondamento
    let shortest = format!("{magnitude:e}");
    let (_, exact_exp) = split_exponent(&shortest);

    if !is_half_tie(magnitude, precision as i32 - exact_exp) {
        let (mantissa, exp) = split_exponent(&rounded);
        return (mantissa.to_string(), exp);
    }

    // Empate exato: a mantissa tem precision+1 casas, a última é 5
    let digits = precision + 1;
    let exact = format!("{magnitude:.digits$e}");
    let (mantissa, exp) = split_exponent(&exact);
    let truncated = &mantissa[..mantissa.len() - 1];
    let truncated = truncated.strip_suffix('.').unwrap_or(truncated);
    let incremented = increment_decimal(truncated);

    // "9.99" → "10.00": volta para um dígito antes da vírgula
    if incremented.len() > truncated.len() {
        (format!("{:.precision$}", 1.0), exp + 1)
    } else {
        (incremented, exp)
    }
}

// ──────────────────────────────────────────────
// Templates
// ──────────────────────────────────────────────

/// Tamanho de um `{nome}` no início de `s`, se houver.
fn placeholder_len(s: &str) -> Option<usize> {
    let inner = s.strip_prefix('{')?;
    let name_len = inner
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    (name_len > 0 && inner.as_bytes().get(name_len) == Some(&b'}')).then_some(name_len + 2)
}

/// Formata um campo tipado; em qualquer falha devolve `?` alinhado à direita.
fn render_field(spec: &FormatSpec, name: &str, registry: &MetricRegistry) -> String {
    let result = registry
        .value(name)
        .ok_or_else(|| FieldError::Missing(name.to_string()))
        .and_then(|value| spec.apply(&value));

    match result {
        Ok(text) => text,
        Err(e) => {
            debug!("Campo '{name}' não formatado: {e}");
            let width = spec.width.unwrap_or(1);
            format!("{:>width$}", "?")
        }
    }
}

/// Completa com espaços e corta em exatamente `width` caracteres.
pub fn fit_width(text: &str, width: usize) -> String {
    let mut line: String = text.chars().take(width).collect();
    let len = line.chars().count();
    line.extend(std::iter::repeat_n(' ', width - len));
    line
}

/// Resolve um template contra o registro, produzindo exatamente `width` caracteres.
pub fn format_line(template: &str, registry: &MetricRegistry, width: usize) -> String {
    if template.is_empty() {
        return " ".repeat(width);
    }

    let mut line = String::with_capacity(template.len().max(width));
    let mut rest = template;

    while let Some(pos) = rest.find(['%', '{']) {
        line.push_str(&rest[..pos]);
        rest = &rest[pos..];

        let consumed = if rest.starts_with('%') {
            FormatSpec::parse_prefix(rest).and_then(|(spec, spec_len)| {
                let name_len = placeholder_len(&rest[spec_len..])?;
                let name = &rest[spec_len + 1..spec_len + name_len - 1];
                line.push_str(&render_field(&spec, name, registry));
                Some(spec_len + name_len)
            })
        } else {
            placeholder_len(rest).inspect(|_| line.push('?'))
        };

        match consumed {
            Some(len) => rest = &rest[len..],
            None => {
                line.push_str(&rest[..1]);
                rest = &rest[1..];
            }
        }
    }
    line.push_str(rest);

    fit_width(&line, width)
}

/// Formata um valor com o formato recomendado do provedor (ex: `"%.0f"`).
pub fn format_value(spec: &str, value: &MetricValue) -> Result<String, FieldError> {
    FormatSpec::parse(spec)?.apply(value)
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
