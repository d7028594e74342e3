use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

const DEFAULT_OUTPUT: &str = "downloads.jsonl";
const COMPRESSED_SUFFIX: &str = "zst";
const COMPRESSION_LEVEL: i32 = 3;

/// Output file used when the caller did not name one.
pub fn default_output_path(compress: bool) -> PathBuf {
    if compress {
        PathBuf::from(format!("{DEFAULT_OUTPUT}.{COMPRESSED_SUFFIX}"))
    } else {
        PathBuf::from(DEFAULT_OUTPUT)
    }
}

/// Newline-delimited JSON appended to a file, page by page.
///
/// With compression every page is written as its own zstd frame, so a file that
/// several interrupted runs appended to still decodes as one stream.
#[derive(Debug)]
pub struct OutputSink {
    path: PathBuf,
    file: File,
    compress: bool,
}

impl OutputSink {
    pub fn open(path: impl Into<PathBuf>, compress: bool) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::debug!(path = %path.display(), compress, "opened output");
        Ok(OutputSink { path, file, compress })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one page and makes it durable before returning.
    ///
    /// A page either lands whole or not at all: when the append fails part way
    /// the file is cut back to its previous length.
    pub fn write_page(&mut self, records: &[Value]) -> io::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let bytes = render_page(records, self.compress)?;
        append_all(&mut self.file, &bytes)?;
        self.file.sync_data()
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }
}

/// Something a page can be appended to and cut back from.
trait AppendTarget: Write {
    fn end(&self) -> io::Result<u64>;
    fn truncate(&self, len: u64) -> io::Result<()>;
}

impl AppendTarget for File {
    fn end(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

fn append_all<T: AppendTarget>(target: &mut T, bytes: &[u8]) -> io::Result<()> {
    let start = target.end()?;
    if let Err(e) = target.write_all(bytes).and_then(|_| target.flush()) {
        if let Err(rewind) = target.truncate(start) {
            tracing::error!(error = %rewind, start, "could not drop partially written page");
        }
        return Err(e);
    }
    Ok(())
}

/// One JSON document per line, or a single zstd frame holding those lines.
fn render_page(records: &[Value], compress: bool) -> io::Result<Vec<u8>> {
    let mut lines = Vec::new();
    for record in records {
        serde_json::to_writer(&mut lines, record)?;
        lines.push(b'\n');
    }
    if compress {
        zstd::encode_all(lines.as_slice(), COMPRESSION_LEVEL)
    } else {
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// In-memory file that runs out of space after `capacity` bytes.
    struct FullDisk {
        data: RefCell<Vec<u8>>,
        capacity: usize,
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let data = self.data.get_mut();
            let room = self.capacity.saturating_sub(data.len());
            if room == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "no space left on device"));
            }
            let n = room.min(buf.len());
            data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl AppendTarget for FullDisk {
        fn end(&self) -> io::Result<u64> {
            Ok(self.data.borrow().len() as u64)
        }

        fn truncate(&self, len: u64) -> io::Result<()> {
            self.data.borrow_mut().truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn given_disk_full_mid_page_then_partial_page_is_removed() {
        let mut disk = FullDisk { data: RefCell::new(b"{\"id\":0}\n".to_vec()), capacity: 8 * 1024 };
        let big: Vec<Value> = (0..1000).map(|id| json!({ "id": id, "pad": "x".repeat(16) })).collect();
        let page = render_page(&big, false).unwrap();
        assert!(page.len() > 8 * 1024);

        let error = append_all(&mut disk, &page).unwrap_err();

        assert_eq!(error.to_string(), "no space left on device");
        assert_eq!(disk.data.into_inner(), b"{\"id\":0}\n".to_vec());
    }

    #[test]
    fn given_room_enough_then_page_is_appended() {
        let mut disk = FullDisk { data: RefCell::new(Vec::new()), capacity: 1024 };

        append_all(&mut disk, b"{\"id\":1}\n").unwrap();

        assert_eq!(disk.data.into_inner(), b"{\"id\":1}\n".to_vec());
    }

    #[test]
    fn default_path_gets_compressor_suffix() {
        assert_eq!(default_output_path(false), PathBuf::from("downloads.jsonl"));
        assert_eq!(default_output_path(true), PathBuf::from("downloads.jsonl.zst"));
    }

    #[test]
    fn given_plain_sink_when_pages_written_then_one_record_per_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("data.jsonl");

        let mut sink = OutputSink::open(&path, false).unwrap();
        sink.write_page(&[json!({"id": 1}), json!({"id": 2})]).unwrap();
        sink.write_page(&[json!({"id": 3})]).unwrap();
        sink.finish().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"id\":1}\n{\"id\":2}\n{\"id\":3}\n");
    }

    #[test]
    fn given_existing_file_when_reopened_then_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.jsonl");

        let mut first = OutputSink::open(&path, false).unwrap();
        first.write_page(&[json!("a")]).unwrap();
        first.finish().unwrap();
        let mut second = OutputSink::open(&path, false).unwrap();
        second.write_page(&[json!("b")]).unwrap();
        second.finish().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "\"a\"\n\"b\"\n");
    }

    #[test]
    fn given_compressed_runs_then_frames_decode_as_one_stream() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.jsonl.zst");

        let mut first = OutputSink::open(&path, true).unwrap();
        first.write_page(&[json!({"id": 1})]).unwrap();
        first.write_page(&[json!({"id": 2})]).unwrap();
        drop(first);
        let mut second = OutputSink::open(&path, true).unwrap();
        second.write_page(&[json!({"id": 3})]).unwrap();
        second.finish().unwrap();

        let decoded = zstd::decode_all(File::open(&path).unwrap()).unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            "{\"id\":1}\n{\"id\":2}\n{\"id\":3}\n"
        );
    }
}
