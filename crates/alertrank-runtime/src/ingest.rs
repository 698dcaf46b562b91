//! Event file reading. Plain or gzip-compressed newline-delimited JSON.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::Context;
use flate2::read::GzDecoder;
use tokio::sync::Mutex;

use alertrank_core::{IngestStats, Pipeline};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// `.gz` extension, or the gzip magic bytes at the start of the file.
pub fn is_gzipped(path: &Path) -> std::io::Result<bool> {
    if path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
    {
        return Ok(true);
    }
    let mut magic = [0u8; 2];
    let mut file = File::open(path)?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Read every line of an event file, decompressing when needed.
pub fn read_lines(path: &Path) -> anyhow::Result<Vec<String>> {
    let gzipped =
        is_gzipped(path).with_context(|| format!("cannot open event file {}", path.display()))?;
    let file =
        File::open(path).with_context(|| format!("cannot open event file {}", path.display()))?;
    let reader: Box<dyn BufRead> = if gzipped {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    reader
        .lines()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("error reading event file {}", path.display()))
}

/// Read `path` off the async runtime, then feed it through the shared pipeline.
pub async fn ingest_file(
    pipeline: &Mutex<Pipeline>,
    path: PathBuf,
    presort: bool,
) -> anyhow::Result<IngestStats> {
    let file_display = path.display().to_string();
    let lines = tokio::task::spawn_blocking(move || read_lines(&path)).await??;
    let stats = pipeline.lock().await.ingest_batch(&lines, presort);
    tracing::info!(
        file = %file_display,
        accepted = stats.accepted,
        rejected = stats.rejected(),
        finalized = stats.finalized,
        "ingested event file"
    );
    Ok(stats)
}
