use bytes::Bytes;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;

/// Re-readable document content.
///
/// Every call to [`Content::reader`] starts again from the first byte, so a
/// handler can inspect the content and leave it untouched for the next one.
#[derive(Debug, Clone)]
pub enum Content {
    Memory(Bytes),
    /// Content spooled to disk; opened afresh on every read.
    File(PathBuf),
}

impl Content {
    pub fn reader(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        match self {
            Content::Memory(bytes) => Ok(Box::new(bytes.as_ref())),
            Content::File(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
        }
    }

    /// Reads at most `limit` bytes from the start of the content.
    pub fn read_prefix(&self, limit: usize) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.reader()?.take(limit as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        match self {
            Content::Memory(bytes) => Ok(bytes.to_vec()),
            Content::File(_) => {
                let mut buf = Vec::new();
                self.reader()?.read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }
}

impl From<Bytes> for Content {
    fn from(bytes: Bytes) -> Self {
        Content::Memory(bytes)
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content::Memory(Bytes::from(bytes))
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Memory(Bytes::from(text))
    }
}

impl From<&'static str> for Content {
    fn from(text: &'static str) -> Self {
        Content::Memory(Bytes::from_static(text.as_bytes()))
    }
}

impl From<PathBuf> for Content {
    fn from(path: PathBuf) -> Self {
        Content::File(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_memory_content_is_rereadable() {
        let content = Content::from("hello world");
        assert_eq!(content.read_all().unwrap(), b"hello world");
        assert_eq!(content.read_prefix(5).unwrap(), b"hello");
        assert_eq!(content.read_all().unwrap(), b"hello world");
    }

    #[test]
    fn test_file_content_is_rereadable() {
        let path = std::env::temp_dir().join(format!("enricher-{}.txt", uuid::Uuid::new_v4()));
        fs::write(&path, "spooled content").unwrap();

        let content = Content::from(path.clone());
        assert_eq!(content.read_prefix(7).unwrap(), b"spooled");
        assert_eq!(content.read_all().unwrap(), b"spooled content");

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let content = Content::from(PathBuf::from("/nonexistent/enricher/content"));
        assert!(content.read_all().is_err());
    }
}
