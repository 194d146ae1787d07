//! Loader utilities for emulator core modules.
//!
//! Responsibilities:
//! - Detect whether the provided bytes are a `.wasm` binary or `.wat` text.
//! - If it looks like WAT, convert it to WASM bytes (via the `wat` crate).
//! - Compile a Wasmtime `Module` from the resulting WASM bytes.
//!
//! Core files are picked by the user, so the file extension is not trusted; we sniff the
//! bytes themselves.

use tracing::debug;
use wasmtime::{Engine, Module};

/// Error returned by loader helpers.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The input was empty or otherwise not recognized as WASM/WAT.
    #[error("unrecognized core module format (expected wasm or wat)")]
    UnrecognizedFormat,
    /// WAT parsing failed.
    #[error("failed to parse WAT: {0}")]
    WatParseFailed(#[source] wat::Error),
    /// Module compilation failed.
    #[error("failed to compile WASM module: {0:#}")]
    CompileFailed(#[source] wasmtime::Error),
}

/// What kind of module the loader inferred from the bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DetectedFormat {
    Wasm,
    Wat,
}

/// Result of normalizing (detecting + possibly converting) the input.
#[derive(Clone, Debug)]
pub struct Detected {
    pub format: DetectedFormat,
    /// Always valid WASM bytes (for WASM/WAT inputs).
    pub wasm_bytes: Vec<u8>,
}

/// Load: detect -> (optional) wat->wasm -> compile.
pub fn compile_module(engine: &Engine, bytes: &[u8]) -> Result<Module, LoadError> {
    let Detected { format, wasm_bytes } = normalize_to_wasm(bytes)?;
    debug!(?format, len = wasm_bytes.len(), "compiling core module");
    Module::new(engine, &wasm_bytes).map_err(LoadError::CompileFailed)
}

/// Detect format and normalize to valid WASM bytes.
pub fn normalize_to_wasm(bytes: &[u8]) -> Result<Detected, LoadError> {
    let format = detect_format(bytes).ok_or(LoadError::UnrecognizedFormat)?;

    let wasm_bytes = match format {
        DetectedFormat::Wasm => bytes.to_vec(),
        DetectedFormat::Wat => wat::parse_bytes(bytes)
            .map_err(LoadError::WatParseFailed)?
            .into_owned(),
    };

    Ok(Detected { format, wasm_bytes })
}

/// Best-effort detection.
///
/// Rules:
/// - If the first 4 bytes are `\0asm`, treat as WASM.
/// - Else, after stripping UTF-8 BOM / leading whitespace, if the first non-ws byte is `(`,
///   treat as WAT (common WAT starts with `(module ...)`).
pub fn detect_format(bytes: &[u8]) -> Option<DetectedFormat> {
    if bytes.starts_with(b"\0asm") {
        return Some(DetectedFormat::Wasm);
    }

    let i = skip_bom_and_leading_ws(bytes);
    (bytes.get(i) == Some(&b'(')).then_some(DetectedFormat::Wat)
}

fn skip_bom_and_leading_ws(bytes: &[u8]) -> usize {
    let start = if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        3
    } else {
        0
    };

    bytes[start..]
        .iter()
        .position(|b| !matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
        .map_or(bytes.len(), |offset| start + offset)
}
