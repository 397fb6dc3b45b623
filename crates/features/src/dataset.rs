//! Snapshot loading from JSONL / JSONL.gz recordings.
//!
//! One snapshot per line. Blank lines are skipped; a malformed row fails
//! the whole load with its line number.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;

use tc_core::types::Snapshot;

/// Load snapshots from a single file, sorted by timestamp.
///
/// With `symbol = Some(..)` rows for other symbols are dropped
/// (case-insensitive). Without a filter the file must hold one symbol.
pub fn load_snapshots(path: &Path, symbol: Option<&str>) -> Result<Vec<Snapshot>> {
    let file = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader: Box<dyn BufRead> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut snapshots = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read {}:{}", path.display(), lineno + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let snap: Snapshot = serde_json::from_str(&line)
            .with_context(|| format!("parse snapshot at {}:{}", path.display(), lineno + 1))?;
        if let Some(filter) = symbol {
            if !snap.symbol.0.eq_ignore_ascii_case(filter) {
                continue;
            }
        }
        snapshots.push(snap);
    }

    if symbol.is_none() {
        ensure_single_symbol(&snapshots, path)?;
    }

    // Stable: equal timestamps keep file order.
    snapshots.sort_by_key(|s| s.timestamp);
    tracing::debug!(path = %path.display(), count = snapshots.len(), "loaded snapshots");
    Ok(snapshots)
}

fn ensure_single_symbol(snapshots: &[Snapshot], source: &Path) -> Result<()> {
    if let Some(first) = snapshots.first() {
        if let Some(other) = snapshots.iter().find(|s| s.symbol != first.symbol) {
            bail!(
                "{} mixes symbols {} and {}; pass a symbol filter",
                source.display(),
                first.symbol,
                other.symbol
            );
        }
    }
    Ok(())
}

/// Load a single recording, or every recording in a directory.
///
/// For a directory, files whose name contains `symbol` are read in name
/// order and merged into one timestamp-ordered sequence.
pub fn load_dataset(path: &Path, symbol: Option<&str>) -> Result<Vec<Snapshot>> {
    if !path.is_dir() {
        return load_snapshots(path, symbol);
    }
    let files = find_data_files(path, symbol.unwrap_or(""))?;
    if files.is_empty() {
        bail!("no .jsonl or .jsonl.gz recordings in {}", path.display());
    }
    let mut snapshots = Vec::new();
    for file in &files {
        snapshots.extend(load_snapshots(file, symbol)?);
    }
    if symbol.is_none() {
        ensure_single_symbol(&snapshots, path)?;
    }
    snapshots.sort_by_key(|s| s.timestamp);
    tracing::info!(dir = %path.display(), files = files.len(), count = snapshots.len(), "loaded recordings");
    Ok(snapshots)
}

/// JSONL / JSONL.gz files in `dir` whose name contains `symbol_filter`
/// (case-insensitive, empty matches all), sorted by name.
pub fn find_data_files(dir: &Path, symbol_filter: &str) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))?;
    let filter = symbol_filter.to_lowercase();
    let mut files = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if !name.ends_with(".jsonl.gz") && !name.ends_with(".jsonl") {
            continue;
        }
        if !filter.is_empty() && !name.contains(&filter) {
            continue;
        }
        files.push(entry.path());
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    const ROWS: &str = r#"{"symbol":"BTCUSDT","timestamp":3000,"bid_price":101.0,"ask_price":102.0,"bid_qty":1.0,"ask_qty":2.0}

{"symbol":"BTCUSDT","timestamp":1000,"bid_price":99.0,"ask_price":100.0,"bid_qty":1.0,"ask_qty":2.0,"bid_volume":4.0}
{"symbol":"BTCUSDT","timestamp":2000,"bid_price":100.0,"ask_price":101.0,"bid_qty":1.0,"ask_qty":2.0,"bid_depth":10.0,"ask_depth":12.0}
"#;

    #[test]
    fn test_load_plain_sorts_and_derives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("btc.jsonl");
        std::fs::write(&path, ROWS).unwrap();

        let snaps = load_snapshots(&path, None).unwrap();
        assert_eq!(snaps.len(), 3);
        let ts: Vec<u64> = snaps.iter().map(|s| s.timestamp.0).collect();
        assert_eq!(ts, vec![1000, 2000, 3000]);
        assert_eq!(snaps[0].mid_price, 99.5);
        assert_eq!(snaps[0].bid_volume, 4.0);
        assert_eq!(snaps[1].bid_depth, 10.0);
        assert_eq!(snaps[2].bid_depth, 1.0);
    }

    #[test]
    fn test_load_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("btc.jsonl.gz");
        let file = std::fs::File::create(&path).unwrap();
        let mut enc = GzEncoder::new(file, Compression::default());
        enc.write_all(ROWS.as_bytes()).unwrap();
        enc.finish().unwrap();

        let snaps = load_snapshots(&path, None).unwrap();
        assert_eq!(snaps.len(), 3);
    }

    #[test]
    fn test_malformed_row_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, format!("{ROWS}{{\"symbol\": 5}}\n")).unwrap();

        let err = load_snapshots(&path, None).unwrap_err();
        assert!(format!("{err:#}").contains(":5"), "{err:#}");
    }

    #[test]
    fn test_mixed_symbols_need_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.jsonl");
        let extra = r#"{"symbol":"ETHUSDT","timestamp":1500,"bid_price":9.0,"ask_price":10.0,"bid_qty":1.0,"ask_qty":1.0}"#;
        std::fs::write(&path, format!("{ROWS}{extra}\n")).unwrap();

        assert!(load_snapshots(&path, None).is_err());
        let eth = load_snapshots(&path, Some("ethusdt")).unwrap();
        assert_eq!(eth.len(), 1);
        let btc = load_snapshots(&path, Some("BTCUSDT")).unwrap();
        assert_eq!(btc.len(), 3);
    }

    #[test]
    fn test_find_data_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_btc.jsonl", "a_btc.jsonl.gz", "eth.jsonl", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let all = find_data_files(dir.path(), "").unwrap();
        assert_eq!(all.len(), 3);
        let btc = find_data_files(dir.path(), "BTC").unwrap();
        let names: Vec<String> = btc
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a_btc.jsonl.gz", "b_btc.jsonl"]);
    }

    #[test]
    fn test_load_dataset_merges_directory() {
        let dir = tempfile::tempdir().unwrap();
        let later = r#"{"symbol":"BTCUSDT","timestamp":2500,"bid_price":100.0,"ask_price":101.0,"bid_qty":1.0,"ask_qty":2.0}"#;
        std::fs::write(dir.path().join("btcusdt_a.jsonl"), ROWS).unwrap();
        std::fs::write(dir.path().join("btcusdt_b.jsonl"), format!("{later}\n")).unwrap();
        std::fs::write(dir.path().join("readme.txt"), "x").unwrap();

        let snaps = load_dataset(dir.path(), None).unwrap();
        let ts: Vec<u64> = snaps.iter().map(|s| s.timestamp.0).collect();
        assert_eq!(ts, vec![1000, 2000, 2500, 3000]);

        // A single file goes straight through.
        assert_eq!(load_dataset(&dir.path().join("btcusdt_b.jsonl"), None).unwrap().len(), 1);
        assert!(load_dataset(dir.path(), Some("ETHUSDT")).is_err());
    }

    #[test]
    fn test_load_dataset_rejects_mixed_files() {
        let dir = tempfile::tempdir().unwrap();
        let eth = r#"{"symbol":"ETHUSDT","timestamp":1500,"bid_price":9.0,"ask_price":10.0,"bid_qty":1.0,"ask_qty":1.0}"#;
        std::fs::write(dir.path().join("btc.jsonl"), ROWS).unwrap();
        std::fs::write(dir.path().join("ethusdt.jsonl"), format!("{eth}\n")).unwrap();

        assert!(load_dataset(dir.path(), None).is_err());
        assert_eq!(load_dataset(dir.path(), Some("ETHUSDT")).unwrap().len(), 1);
    }
}
