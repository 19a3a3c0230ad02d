//! Persistence of the servo trim table.
//!
//! Trim is the only piece of configuration a client can change at runtime,
//! so it is the only piece that survives restarts. The store is a seam: the
//! server calls [`TrimStore::persist`] after every accepted SET_TRIM and
//! never cares where the values go.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use tracing::warn;

/// Where updated trim tables are written.
pub trait TrimStore {
    fn persist(&mut self, trim: &[f64; 6]) -> io::Result<()>;
}

/// Line-oriented `key=value` file in the format of the original controller:
/// a quoted version header followed by one `trim[i]=value` line per servo
/// with a non-zero trim.
pub struct FileTrimStore {
    path: PathBuf,
}

impl FileTrimStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileTrimStore { path: path.into() }
    }

    /// Reads trim overrides into `trim`. A missing file is not an error;
    /// a version mismatch or malformed line stops parsing with a warning,
    /// keeping whatever was already applied.
    pub fn load(&self, trim: &mut [f64; 6]) -> io::Result<()> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        let mut lines = contents.lines();
        match lines.next() {
            Some(header) if header.trim() == version_header() => {}
            _ => {
                warn!(path = %self.path.display(), "trim file has wrong version, ignoring");
                return Ok(());
            }
        }

        for line in lines {
            let Some((index, value)) = parse_trim_line(line) else {
                warn!(line, "malformed trim line, ignoring rest of file");
                break;
            };
            if index > 5 {
                warn!(index, "trim index out of range, ignoring rest of file");
                break;
            }
            trim[index] = value;
        }
        Ok(())
    }
}

impl TrimStore for FileTrimStore {
    fn persist(&mut self, trim: &[f64; 6]) -> io::Result<()> {
        let mut file = fs::File::create(&self.path)?;
        writeln!(file, "{}", version_header())?;
        for (i, &value) in trim.iter().enumerate() {
            if value != 0.0 {
                writeln!(file, "trim[{i}]={value}")?;
            }
        }
        Ok(())
    }
}

/// Store that drops everything; used when running without persistence.
pub struct NullTrimStore;

impl TrimStore for NullTrimStore {
    fn persist(&mut self, _trim: &[f64; 6]) -> io::Result<()> {
        Ok(())
    }
}

fn version_header() -> String {
    format!("version=\"{}\"", env!("CARGO_PKG_VERSION"))
}

/// Parses one `trim[i]=value` line, tolerating whitespace around the
/// brackets and the equals sign.
fn parse_trim_line(line: &str) -> Option<(usize, f64)> {
    let line = line.trim();
    let rest = line.strip_prefix("trim")?.trim_start();
    let rest = rest.strip_prefix('[')?;
    let (index, rest) = rest.split_once(']')?;
    let value = rest.trim_start().strip_prefix('=')?;
    Some((
        index.trim().parse().ok()?,
        value.trim().parse().ok()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("stewart-trim-{}-{name}", std::process::id()));
        p
    }

    #[test]
    fn roundtrip_preserves_nonzero_trims() {
        let path = temp_path("roundtrip");
        let mut store = FileTrimStore::new(&path);
        let trim = [0.0, -2.5, 5.0, 0.0, 0.0, 1.25];
        store.persist(&trim).unwrap();

        let mut loaded = [0.0; 6];
        store.load(&mut loaded).unwrap();
        assert_eq!(loaded, trim);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_loads_nothing() {
        let store = FileTrimStore::new(temp_path("missing-nonexistent"));
        let mut trim = [1.0; 6];
        store.load(&mut trim).unwrap();
        assert_eq!(trim, [1.0; 6]);
    }

    #[test]
    fn wrong_version_is_ignored() {
        let path = temp_path("version");
        fs::write(&path, "version=\"0.0.0-other\"\ntrim[0]=9.0\n").unwrap();
        let store = FileTrimStore::new(&path);
        let mut trim = [0.0; 6];
        store.load(&mut trim).unwrap();
        assert_eq!(trim, [0.0; 6]);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn out_of_range_index_stops_parsing() {
        let path = temp_path("range");
        fs::write(
            &path,
            format!("{}\ntrim[7]=9.0\ntrim[1]=2.0\n", version_header()),
        )
        .unwrap();
        let store = FileTrimStore::new(&path);
        let mut trim = [0.0; 6];
        store.load(&mut trim).unwrap();
        // Parsing stopped at the bad index; later lines are not applied.
        assert_eq!(trim, [0.0; 6]);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn trim_line_parser_tolerates_spacing() {
        assert_eq!(parse_trim_line("trim[3]=1.5"), Some((3, 1.5)));
        assert_eq!(parse_trim_line(" trim [ 4 ] = -2.25 "), Some((4, -2.25)));
        assert_eq!(parse_trim_line("trim=1.0"), None);
        assert_eq!(parse_trim_line("nonsense"), None);
    }
}
