use std::path::{Path, PathBuf};

use crate::error::SourceError;

// ---------------------------------------------------------------------------
// Fully specified source: `path[ext,DISPERSION,FLUX]`
// ---------------------------------------------------------------------------

/// A file path with the extension index and column names embedded, in the
/// notation used by the TABLES package, e.g. `o4st09020_sx1.fits[1,WAVELENGTH,FLUX]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    pub path: PathBuf,
    pub ext: usize,
    pub dispersion: String,
    pub flux: String,
}

/// Whether the string uses bracket notation.
pub fn is_fully_specified(spec: &str) -> bool {
    spec.contains('[')
}

/// Parse `path[ext,DISPERSION,FLUX]`. Splits on the first `[`.
pub fn parse_source(spec: &str) -> Result<SourceSpec, SourceError> {
    let (path, rest) = spec
        .split_once('[')
        .ok_or_else(|| SourceError::BadFieldCount(spec.to_string()))?;
    if path.trim().is_empty() {
        return Err(SourceError::EmptyPath);
    }
    let inner = rest
        .strip_suffix(']')
        .ok_or_else(|| SourceError::Unterminated(spec.to_string()))?;

    let fields: Vec<&str> = inner.split(',').map(str::trim).collect();
    let [ext, dispersion, flux] = fields.as_slice() else {
        return Err(SourceError::BadFieldCount(inner.to_string()));
    };
    let ext = ext
        .parse::<usize>()
        .map_err(|_| SourceError::BadExtension(ext.to_string()))?;
    if dispersion.is_empty() || flux.is_empty() {
        return Err(SourceError::EmptyColumn(inner.to_string()));
    }

    Ok(SourceSpec {
        path: PathBuf::from(path.trim()),
        ext,
        dispersion: dispersion.to_string(),
        flux: flux.to_string(),
    })
}

/// Display name for a loaded file: last path component up to its final `.`.
pub fn data_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("Data")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fully_specified_path() {
        let spec = parse_source("/data/o4st09020_sx1.fits[1,WAVELENGTH,FLUX]").unwrap();
        assert_eq!(spec.path, PathBuf::from("/data/o4st09020_sx1.fits"));
        assert_eq!(spec.ext, 1);
        assert_eq!(spec.dispersion, "WAVELENGTH");
        assert_eq!(spec.flux, "FLUX");
    }

    #[test]
    fn rejects_malformed_brackets() {
        assert!(matches!(
            parse_source("a.fits[1,WAVE,FLUX"),
            Err(SourceError::Unterminated(_))
        ));
        assert!(matches!(
            parse_source("a.fits[1,WAVE]"),
            Err(SourceError::BadFieldCount(_))
        ));
        assert!(matches!(
            parse_source("a.fits[-1,WAVE,FLUX]"),
            Err(SourceError::BadExtension(_))
        ));
        assert!(matches!(
            parse_source("a.fits[0,,FLUX]"),
            Err(SourceError::EmptyColumn(_))
        ));
        assert_eq!(parse_source("[0,W,F]"), Err(SourceError::EmptyPath));
    }

    #[test]
    fn name_is_file_stem() {
        assert_eq!(data_name(Path::new("/tmp/run.2/hd1234.parquet")), "hd1234");
        assert_eq!(data_name(Path::new("")), "Data");
    }
}
