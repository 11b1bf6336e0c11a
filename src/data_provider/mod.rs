use log::{error, info, warn};
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::errors::{DataHubError, Result};
use crate::models::market::Record;

pub mod merge;

pub use merge::{merge_upsert, MergeResult};

const UTF8_BOM: &str = "\u{feff}";

/// Result of a store update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub inserted: usize,
    pub replaced: usize,
}

impl UpsertStats {
    pub fn is_unchanged(&self) -> bool {
        self.inserted == 0 && self.replaced == 0
    }
}

/// 单个数据集的 CSV 存储
///
/// The file is only ever rewritten as a whole (read, merge, write to a
/// sibling temp file, rename), so readers never observe a half-written file.
pub struct DatasetStore<R: Record> {
    path: PathBuf,
    _marker: PhantomData<R>,
}

impl<R: Record> DatasetStore<R> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// 按配置中的数据目录打开数据集
    pub fn open(config: &Config) -> Self {
        Self::new(config.dataset_path(R::DATASET))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn merge_error(&self, reason: impl Into<String>) -> DataHubError {
        DataHubError::MergeError {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn read_raw(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&self.path)
            .map(Some)
            .map_err(|e| self.merge_error(format!("unreadable file: {}", e)))
    }

    fn parse(&self, content: &str) -> Result<Vec<R>> {
        let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(content.as_bytes());

        let mut rows = Vec::new();
        for (line, record) in reader.deserialize::<R>().enumerate() {
            // 表头占第 1 行
            let row = record.map_err(|e| self.merge_error(format!("row {}: {}", line + 2, e)))?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// 读取全部数据，文件不存在时返回空
    pub fn load(&self) -> Result<Vec<R>> {
        match self.read_raw()? {
            Some(content) => self.parse(&content),
            None => Ok(Vec::new()),
        }
    }

    /// Canonical file content: BOM, header, `YYYY-MM-DD` dates, plain numbers.
    fn encode(rows: &[R]) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in rows {
            writer.serialize(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| DataHubError::IoError(e.into_error()))?;
        let body = String::from_utf8(bytes)
            .map_err(|e| DataHubError::DataError(format!("non UTF-8 CSV output: {}", e)))?;
        Ok(format!("{}{}", UTF8_BOM, body))
    }

    fn write_atomic(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| R::DATASET.file_name().to_string());
        let tmp_path = self.path.with_file_name(format!(".{}.tmp", file_name));

        let written = (|| -> Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            Ok(())
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Writes the rows as UTF-8 CSV with a byte-order mark, atomically.
    pub fn save(&self, rows: &[R]) -> Result<()> {
        self.write_atomic(&Self::encode(rows)?)
    }

    /// Merges `new` into the stored rows and rewrites the file when its
    /// canonical content changes. Besides new or replaced rows, that covers
    /// collapsed duplicates, re-sorted rows and legacy date or number formats.
    ///
    /// An unreadable existing file aborts the update and leaves it untouched.
    pub fn upsert(&self, new: Vec<R>) -> Result<UpsertStats> {
        if new.is_empty() {
            info!("No rows to merge into {}", self.path.display());
            return Ok(UpsertStats::default());
        }

        let raw = self.read_raw()?;
        let existing = match raw.as_deref().map(|content| self.parse(content)).transpose() {
            Ok(rows) => rows.unwrap_or_default(),
            Err(e) => {
                error!("Failed to read {}: {}", self.path.display(), e);
                return Err(e);
            }
        };

        let merged = merge_upsert(existing, new);
        let stats = UpsertStats {
            inserted: merged.inserted,
            replaced: merged.replaced,
        };

        let encoded = Self::encode(&merged.rows)?;
        if raw.as_deref() == Some(encoded.as_str()) {
            info!("无新增资料，{} 未变更", self.path.display());
            return Ok(stats);
        }

        self.write_atomic(&encoded)?;
        if raw.is_none() {
            info!("Created {} with {} rows", self.path.display(), merged.rows.len());
        } else if merged.is_unchanged() {
            info!("Rewrote {} in canonical form", self.path.display());
        } else {
            info!(
                "Inserted {} and replaced {} rows in {}",
                stats.inserted,
                stats.replaced,
                self.path.display()
            );
        }
        Ok(stats)
    }

    /// Rows of the most recent date, in stored order.
    pub fn latest_slice(&self) -> Result<Vec<R>> {
        let rows = self.load()?;
        let Some(latest) = rows.iter().map(|r| r.date()).max() else {
            return Ok(Vec::new());
        };
        Ok(rows.into_iter().filter(|r| r.date() == latest).collect())
    }
}

/// Exclusive writer guard over a data directory.
///
/// The read-merge-write cycle is not safe for concurrent runs against the
/// same files; holding this guard for the whole run is the precondition.
/// The guard is an advisory lock on an open handle, released by the OS when
/// the handle closes, so a killed run never leaves the directory locked.
#[derive(Debug)]
pub struct WriterLock {
    path: PathBuf,
    _file: File,
}

impl WriterLock {
    pub const FILE_NAME: &'static str = ".datahub.lock";

    pub fn acquire(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(Self::FILE_NAME);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                warn!("{} is held, another run is in progress", path.display());
                return Err(DataHubError::Locked(path));
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }

        // 记录持有者，仅供排查
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
