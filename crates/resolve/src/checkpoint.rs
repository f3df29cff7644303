//! Per-chunk persistence of scored candidate pairs so an interrupted run can
//! resume without re-scoring finished chunks.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::config::ResolveConfig;
use crate::error::ResolveError;
use crate::model::{CandidatePair, Record, SourceTag};

const MANIFEST_FILE: &str = "manifest.json";

/// Settings a stored chunk depends on. Resuming under a different
/// fingerprint would mix incompatible pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreFingerprint {
    pub radius_m: f64,
    pub block_key_len: usize,
    pub chunk_size: usize,
    pub anchor_sources: Vec<SourceTag>,
    pub records: usize,
    /// blake3 over every field blocking and scoring read, in id order.
    pub records_digest: String,
}

impl StoreFingerprint {
    pub fn new(config: &ResolveConfig, records: &[Record]) -> Self {
        Self {
            radius_m: config.blocking.radius_m,
            block_key_len: config.blocking.block_key_len,
            chunk_size: config.blocking.chunk_size,
            anchor_sources: config.blocking.anchor_sources.clone(),
            records: records.len(),
            records_digest: records_digest(records),
        }
    }
}

fn records_digest(records: &[Record]) -> String {
    let mut sorted: Vec<&Record> = records.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut hasher = blake3::Hasher::new();
    let text = |hasher: &mut blake3::Hasher, s: &str| {
        hasher.update(s.as_bytes());
        hasher.update(&[0]);
    };
    let opt_text = |hasher: &mut blake3::Hasher, s: Option<&str>| match s {
        Some(s) => {
            hasher.update(&[1]);
            hasher.update(s.as_bytes());
            hasher.update(&[0]);
        }
        None => {
            hasher.update(&[2]);
        }
    };
    let coord = |hasher: &mut blake3::Hasher, v: Option<f64>| match v {
        Some(v) => {
            hasher.update(&[1]);
            hasher.update(&v.to_bits().to_le_bytes());
        }
        None => {
            hasher.update(&[2]);
        }
    };

    for record in sorted {
        text(&mut hasher, &record.id);
        text(&mut hasher, record.source.as_str());
        text(&mut hasher, &record.name_norm);
        opt_text(&mut hasher, record.address_norm.as_deref());
        coord(&mut hasher, record.lat);
        coord(&mut hasher, record.lon);
        opt_text(&mut hasher, record.region.as_deref());
    }
    hasher.finalize().to_hex().to_string()
}

/// Chunk results keyed by chunk index. Saving the same chunk twice
/// overwrites it with identical content.
pub trait ChunkStore: Send + Sync {
    /// Bind the store to a run; fails if it already holds another run's chunks.
    fn prepare(&self, fingerprint: &StoreFingerprint) -> Result<(), ResolveError>;
    fn load(&self, chunk: usize) -> Result<Option<Vec<CandidatePair>>, ResolveError>;
    fn save(&self, chunk: usize, pairs: &[CandidatePair]) -> Result<(), ResolveError>;
}

// ---------------------------------------------------------------------------
// Directory store
// ---------------------------------------------------------------------------

/// `chunk_<index>.jsonl` files plus `manifest.json` in one directory.
#[derive(Debug, Clone)]
pub struct DirChunkStore {
    dir: PathBuf,
}

impl DirChunkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn chunk_path(&self, chunk: usize) -> PathBuf {
        self.dir.join(format!("chunk_{chunk}.jsonl"))
    }
}

/// Write to a sibling temp file, then rename over the target.
fn write_atomic(
    path: &Path,
    body: impl FnOnce(&mut BufWriter<fs::File>) -> std::io::Result<()>,
) -> Result<(), ResolveError> {
    let temp_path = path.with_extension("tmp");
    {
        let file = fs::File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        body(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

impl ChunkStore for DirChunkStore {
    fn prepare(&self, fingerprint: &StoreFingerprint) -> Result<(), ResolveError> {
        fs::create_dir_all(&self.dir)?;
        let manifest = self.dir.join(MANIFEST_FILE);

        if manifest.exists() {
            let raw = fs::read_to_string(&manifest)?;
            let stored: StoreFingerprint = serde_json::from_str(&raw).map_err(|e| {
                ResolveError::CheckpointMismatch(format!("{}: {e}", manifest.display()))
            })?;
            if &stored != fingerprint {
                return Err(ResolveError::CheckpointMismatch(format!(
                    "{} was written with different settings ({stored:?}); use a fresh directory",
                    self.dir.display()
                )));
            }
            return Ok(());
        }

        write_atomic(&manifest, |w| {
            serde_json::to_writer_pretty(&mut *w, fingerprint)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    fn load(&self, chunk: usize) -> Result<Option<Vec<CandidatePair>>, ResolveError> {
        let path = self.chunk_path(chunk);
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(fs::File::open(&path)?);
        let mut pairs = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let pair: CandidatePair = serde_json::from_str(&line).map_err(|e| {
                ResolveError::CheckpointMismatch(format!(
                    "{} line {}: {e}",
                    path.display(),
                    line_no + 1
                ))
            })?;
            pairs.push(pair);
        }
        Ok(Some(pairs))
    }

    fn save(&self, chunk: usize, pairs: &[CandidatePair]) -> Result<(), ResolveError> {
        write_atomic(&self.chunk_path(chunk), |w| {
            for pair in pairs {
                serde_json::to_writer(&mut *w, pair)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                w.write_all(b"\n")?;
            }
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Keeps chunks in memory; used by tests and embedders that checkpoint
/// elsewhere.
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    fingerprint: Mutex<Option<StoreFingerprint>>,
    chunks: Mutex<HashMap<usize, Vec<CandidatePair>>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Forget one chunk, as if the run had been interrupted before it.
    pub fn remove(&self, chunk: usize) {
        if let Ok(mut chunks) = self.chunks.lock() {
            chunks.remove(&chunk);
        }
    }
}

fn poisoned() -> ResolveError {
    ResolveError::Io("chunk store lock poisoned".into())
}

impl ChunkStore for MemoryChunkStore {
    fn prepare(&self, fingerprint: &StoreFingerprint) -> Result<(), ResolveError> {
        let mut stored = self.fingerprint.lock().map_err(|_| poisoned())?;
        match stored.as_ref() {
            Some(existing) if existing != fingerprint => Err(ResolveError::CheckpointMismatch(
                format!("store holds chunks for {existing:?}"),
            )),
            Some(_) => Ok(()),
            None => {
                *stored = Some(fingerprint.clone());
                Ok(())
            }
        }
    }

    fn load(&self, chunk: usize) -> Result<Option<Vec<CandidatePair>>, ResolveError> {
        let chunks = self.chunks.lock().map_err(|_| poisoned())?;
        Ok(chunks.get(&chunk).cloned())
    }

    fn save(&self, chunk: usize, pairs: &[CandidatePair]) -> Result<(), ResolveError> {
        let mut chunks = self.chunks.lock().map_err(|_| poisoned())?;
        chunks.insert(chunk, pairs.to_vec());
        Ok(())
    }
}
