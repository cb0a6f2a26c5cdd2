//! JSON Lines file sink with atomic tmp→rename

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Buffered JSONL writer; the final file only appears on [`JsonlSink::finalize`].
pub struct JsonlSink {
    writer: BufWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_count: usize,
}

impl std::fmt::Debug for JsonlSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlSink")
            .field("final_path", &self.final_path)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl JsonlSink {
    /// Create `<output_dir>/<name>.jsonl`, writing through a `.tmp` sibling.
    pub fn new(output_dir: &Path, name: &str) -> io::Result<Self> {
        fs::create_dir_all(output_dir)?;
        let final_path = output_dir.join(format!("{name}.jsonl"));
        let tmp_path = output_dir.join(format!("{name}.jsonl.tmp"));

        // Clean up stale tmp file
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let file = File::create(&tmp_path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            tmp_path,
            final_path,
            row_count: 0,
        })
    }

    /// Append one record as a single line
    pub fn write_record<T: Serialize + ?Sized>(&mut self, record: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, record).map_err(io::Error::other)?;
        self.writer.write_all(b"\n")?;
        self.row_count += 1;
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Flush and atomically rename tmp → final; returns rows written.
    pub fn finalize(mut self) -> io::Result<usize> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(self.row_count)
    }

    /// Drop the partial output.
    pub fn abort(self) -> io::Result<()> {
        let tmp_path = self.tmp_path.clone();
        drop(self.writer);
        fs::remove_file(tmp_path)
    }
}

/// Remove stale .tmp files in the output directory
pub fn cleanup_tmp_files(output_dir: &Path) -> io::Result<()> {
    if !output_dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(output_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            cleanup_tmp_files(&path)?;
        } else if path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn finalize_renames_and_counts() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonlSink::new(dir.path(), "acme").unwrap();
        sink.write_record(&serde_json::json!({"id": 1})).unwrap();
        sink.write_record(&serde_json::json!({"id": 2})).unwrap();
        assert_eq!(sink.row_count(), 2);
        assert!(!dir.path().join("acme.jsonl").exists());

        assert_eq!(sink.finalize().unwrap(), 2);
        let content = fs::read_to_string(dir.path().join("acme.jsonl")).unwrap();
        assert_eq!(content, "{\"id\":1}\n{\"id\":2}\n");
        assert!(!dir.path().join("acme.jsonl.tmp").exists());
    }

    #[test]
    fn abort_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonlSink::new(dir.path(), "acme").unwrap();
        sink.write_record(&serde_json::json!({"id": 1})).unwrap();
        sink.abort().unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn creates_missing_output_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("tickets");
        let sink = JsonlSink::new(&nested, "acme").unwrap();
        assert_eq!(sink.finalize().unwrap(), 0);
        assert!(nested.join("acme.jsonl").exists());
    }

    #[test]
    fn cleanup_tmp_files_recurses_and_keeps_jsonl() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("groups");
        fs::create_dir_all(&sub).unwrap();
        fs::write(dir.path().join("a.jsonl.tmp"), b"stale").unwrap();
        fs::write(sub.join("b.jsonl.tmp"), b"stale").unwrap();
        fs::write(sub.join("c.jsonl"), b"keep").unwrap();

        cleanup_tmp_files(dir.path()).unwrap();

        assert!(!dir.path().join("a.jsonl.tmp").exists());
        assert!(!sub.join("b.jsonl.tmp").exists());
        assert!(sub.join("c.jsonl").exists());
    }

    #[test]
    fn cleanup_missing_dir_is_ok() {
        let dir = TempDir::new().unwrap();
        cleanup_tmp_files(&dir.path().join("nope")).unwrap();
    }
}
