use ahash::RandomState;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::AnalyzerError;

/// Fixed seeds keep a key in the same partition for the whole run.
static PARTITION_HASHER: RandomState = RandomState::with_seeds(
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
);

pub fn partition_of(key: &str, level: u32, partitions: usize) -> usize {
    (PARTITION_HASHER.hash_one((level, key)) % partitions as u64) as usize
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpillFile {
    pub path: PathBuf,
    pub level: u32,
}

/// Scratch files for one counter, created lazily on first spill and
/// removed with the store.
///
/// Records are JSON lines of `[key, aggregate]`, so keys containing
/// newlines or quotes survive the round trip.
pub struct SpillStore {
    label: &'static str,
    root: Option<PathBuf>,
    partitions: usize,
    limit_bytes: u64,
    in_use_bytes: u64,
    next_id: u64,
    dir: Option<TempDir>,
    writers: Vec<Option<(SpillFile, BufWriter<File>)>>,
    sealed: Vec<SpillFile>,
}

impl SpillStore {
    pub fn new(
        label: &'static str,
        root: Option<PathBuf>,
        partitions: usize,
        limit_bytes: u64,
    ) -> Self {
        SpillStore {
            label,
            root,
            partitions: partitions.max(1),
            limit_bytes,
            in_use_bytes: 0,
            next_id: 0,
            dir: None,
            writers: Vec::new(),
            sealed: Vec::new(),
        }
    }

    pub fn has_spilled(&self) -> bool {
        self.dir.is_some()
    }

    pub fn in_use_bytes(&self) -> u64 {
        self.in_use_bytes
    }

    /// Appends partial aggregates to the level-0 partition files.
    pub fn append<A, I>(&mut self, entries: I) -> Result<(), AnalyzerError>
    where
        A: Serialize,
        I: IntoIterator<Item = (String, A)>,
    {
        if self.writers.is_empty() {
            self.writers = (0..self.partitions).map(|_| None).collect();
        }

        for (key, aggregate) in entries {
            let partition = partition_of(&key, 0, self.partitions);
            let line = self.encode(&key, &aggregate)?;

            if self.writers[partition].is_none() {
                let file = self.create_file(0)?;
                let writer = BufWriter::new(open_for_write(&file.path)?);
                self.writers[partition] = Some((file, writer));
            }
            if let Some((file, writer)) = self.writers[partition].as_mut() {
                writer
                    .write_all(&line)
                    .map_err(|e| write_error(&file.path, e))?;
            }
        }
        Ok(())
    }

    /// Flushes and closes every writer, returning the level-0 files to merge.
    pub fn seal(&mut self) -> Result<Vec<SpillFile>, AnalyzerError> {
        for (file, mut writer) in self.writers.drain(..).flatten() {
            writer.flush().map_err(|e| write_error(&file.path, e))?;
            self.sealed.push(file);
        }
        Ok(std::mem::take(&mut self.sealed))
    }

    pub fn read<A>(
        &self,
        file: &SpillFile,
    ) -> Result<impl Iterator<Item = Result<(String, A), AnalyzerError>>, AnalyzerError>
    where
        A: DeserializeOwned,
    {
        let handle = File::open(&file.path).map_err(|e| {
            AnalyzerError::io(format!("failed to open scratch file {}", file.path.display()), e)
        })?;
        let path = file.path.clone();

        Ok(BufReader::new(handle).lines().map(move |line| {
            let line = line.map_err(|e| {
                AnalyzerError::io(format!("failed to read scratch file {}", path.display()), e)
            })?;
            serde_json::from_str(&line).map_err(|source| AnalyzerError::Scratch {
                path: path.clone(),
                source,
            })
        }))
    }

    /// Re-partitions `file` one hash level deeper and deletes it.
    pub fn split<A>(&mut self, file: &SpillFile) -> Result<Vec<SpillFile>, AnalyzerError>
    where
        A: Serialize + DeserializeOwned,
    {
        let level = file.level + 1;
        let mut children: Vec<Option<(SpillFile, BufWriter<File>)>> =
            (0..self.partitions).map(|_| None).collect();

        for record in self.read::<A>(file)? {
            let (key, aggregate) = record?;
            let partition = partition_of(&key, level, self.partitions);
            let line = self.encode(&key, &aggregate)?;

            if children[partition].is_none() {
                let child = self.create_file(level)?;
                let writer = BufWriter::new(open_for_write(&child.path)?);
                children[partition] = Some((child, writer));
            }
            if let Some((child, writer)) = children[partition].as_mut() {
                writer
                    .write_all(&line)
                    .map_err(|e| write_error(&child.path, e))?;
            }
        }

        let mut files = Vec::new();
        for (child, mut writer) in children.into_iter().flatten() {
            writer.flush().map_err(|e| write_error(&child.path, e))?;
            files.push(child);
        }
        self.remove(file)?;

        tracing::debug!(
            counter = self.label,
            level,
            children = files.len(),
            "re-split oversized partition"
        );
        Ok(files)
    }

    pub fn remove(&mut self, file: &SpillFile) -> Result<(), AnalyzerError> {
        let size = fs::metadata(&file.path).map(|m| m.len()).unwrap_or(0);
        fs::remove_file(&file.path).map_err(|e| {
            AnalyzerError::io(format!("failed to remove scratch file {}", file.path.display()), e)
        })?;
        self.in_use_bytes = self.in_use_bytes.saturating_sub(size);
        Ok(())
    }

    fn encode<A: Serialize>(&mut self, key: &str, aggregate: &A) -> Result<Vec<u8>, AnalyzerError> {
        let mut line = serde_json::to_vec(&(key, aggregate))?;
        line.push(b'\n');

        let size = line.len() as u64;
        if self.in_use_bytes + size > self.limit_bytes {
            return Err(AnalyzerError::ResourceExhausted(format!(
                "{} scratch space would exceed {} bytes",
                self.label, self.limit_bytes
            )));
        }
        self.in_use_bytes += size;
        Ok(line)
    }

    fn create_file(&mut self, level: u32) -> Result<SpillFile, AnalyzerError> {
        if self.dir.is_none() {
            let mut builder = tempfile::Builder::new();
            builder.prefix("chunk-lytics-");
            let dir = match &self.root {
                Some(root) => builder.tempdir_in(root),
                None => builder.tempdir(),
            }
            .map_err(|e| AnalyzerError::io("failed to create scratch directory", e))?;
            tracing::debug!(counter = self.label, dir = %dir.path().display(), "scratch directory created");
            self.dir = Some(dir);
        }

        let dir = self.dir.as_ref().map_or_else(|| Path::new("."), TempDir::path);
        let path = dir.join(format!("{}-{}-{}.jsonl", self.label, level, self.next_id));
        self.next_id += 1;
        Ok(SpillFile { path, level })
    }
}

fn open_for_write(path: &Path) -> Result<File, AnalyzerError> {
    File::create(path).map_err(|e| {
        AnalyzerError::io(format!("failed to create scratch file {}", path.display()), e)
    })
}

fn write_error(path: &Path, e: std::io::Error) -> AnalyzerError {
    AnalyzerError::io(format!("failed to write scratch file {}", path.display()), e)
}
