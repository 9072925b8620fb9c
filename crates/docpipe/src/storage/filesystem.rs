use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::sanitize::{file_stem, short_id};
use crate::task::ProcessingResult;

use super::{OutputSink, StoredOutput};

/// Writes files into one output directory without ever overwriting.
pub struct FileStorage {
    output_directory: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(output_directory: P) -> Self {
        Self {
            output_directory: output_directory.as_ref().to_path_buf(),
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Stores `content` as `<filename>.<extension>`, or `<filename>_N.<extension>`
    /// when that name is taken.
    pub fn store(
        &self,
        content: &[u8],
        filename: &str,
        extension: &str,
    ) -> Result<PathBuf, StorageError> {
        self.ensure_directory(&self.output_directory)?;

        let full_filename = format!("{}.{}", filename, extension);
        self.store_with_atomic_creation(&self.output_directory, &full_filename, content)
    }

    /// Creates the file with `create_new` so a concurrent writer can never
    /// clobber it; on conflict the next numbered name is tried.
    fn store_with_atomic_creation(
        &self,
        dir_path: &Path,
        filename: &str,
        content: &[u8],
    ) -> Result<PathBuf, StorageError> {
        use std::io::Write;

        let (base, ext) = match filename.rfind('.') {
            Some(dot_pos) => (&filename[..dot_pos], Some(&filename[dot_pos..])),
            None => (filename, None),
        };

        for counter in 1..=1000 {
            let try_filename = if counter == 1 {
                filename.to_string()
            } else {
                match ext {
                    Some(ext) => format!("{}_{}{}", base, counter, ext),
                    None => format!("{}_{}", base, counter),
                }
            };

            let try_path = dir_path.join(&try_filename);

            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&try_path)
            {
                Ok(mut file) => {
                    if let Err(e) = file.write_all(content) {
                        drop(file);
                        discard(&try_path);
                        return Err(StorageError::WriteFile {
                            path: try_path,
                            source: e,
                        });
                    }
                    return Ok(try_path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile {
                        path: try_path,
                        source: e,
                    });
                }
            }
        }

        Err(StorageError::FileExists(dir_path.join(filename)))
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

/// Removes a partially written output. Failure is only logged since the
/// original error is what the caller reports.
fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(
            file = %crate::sanitize::redact_path(path),
            "Failed to remove partial output: {}",
            e
        );
    }
}

// ─── FileSink ───────────────────────────────────────────────────────────────

/// Output sink writing `<stem>_<id8>.<md|json>` plus `<stem>_<id8>_meta.json`.
pub struct FileSink {
    storage: std::sync::Arc<FileStorage>,
}

impl FileSink {
    pub fn new<P: AsRef<Path>>(output_directory: P) -> Self {
        Self {
            storage: std::sync::Arc::new(FileStorage::new(output_directory)),
        }
    }

    pub fn output_directory(&self) -> &Path {
        self.storage.output_directory()
    }
}

fn write_result(
    storage: &FileStorage,
    base_name: &str,
    extension: &str,
    content: &str,
    metadata_json: &[u8],
) -> Result<StoredOutput, StorageError> {
    let location = storage.store(content.as_bytes(), base_name, extension)?;
    let metadata_location =
        match storage.store(metadata_json, &format!("{}_meta", base_name), "json") {
            Ok(path) => path,
            Err(e) => {
                discard(&location);
                return Err(e);
            }
        };
    Ok(StoredOutput {
        location,
        metadata_location: Some(metadata_location),
    })
}

#[async_trait]
impl OutputSink for FileSink {
    async fn persist(
        &self,
        task_id: &str,
        source_name: &str,
        result: &ProcessingResult,
    ) -> Result<StoredOutput, StorageError> {
        let base_name = format!(
            "{}_{}",
            file_stem(Path::new(source_name)),
            short_id(task_id, 8)
        );
        let extension = result.output_format.extension();
        let content = result.content.clone();
        let metadata_json = serde_json::to_vec_pretty(&result.metadata)?;
        let storage = self.storage.clone();

        let stored = tokio::task::spawn_blocking(move || {
            write_result(&storage, &base_name, extension, &content, &metadata_json)
        })
        .await
        .map_err(|e| StorageError::Aborted(e.to_string()))??;

        tracing::info!(
            file = %crate::sanitize::redact_path(&stored.location),
            "Result saved"
        );
        Ok(stored)
    }
}
