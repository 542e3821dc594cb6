//! Archive abstraction
//!
//! The importer treats the container holding the document graph as an
//! external collaborator: anything that can open a named entry as a token
//! stream. [`MemoryArchive`] is the in-process implementation used by tests
//! and by embedders that already hold decompressed entries.

use std::collections::HashMap;
use std::io::Cursor;

use crate::error::{ImportError, Result};
use crate::resolver::FileId;
use crate::token::{TokenSource, XmlTokenSource};

/// Named access to the files of one document graph.
///
/// Implementations must be shareable across worker threads; `open` is called
/// concurrently for different entries.
pub trait Archive: Send + Sync {
    /// Open the entry as a token stream. Fails with [`ImportError::Archive`]
    /// if the id does not exist in the archive.
    fn open(&self, file: &FileId) -> Result<Box<dyn TokenSource + Send + '_>>;
}

/// In-memory archive mapping normalized entry names to XML text.
#[derive(Debug, Default, Clone)]
pub struct MemoryArchive {
    entries: HashMap<FileId, String>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_file(mut self, name: &str, xml: impl Into<String>) -> Self {
        self.insert(name, xml);
        self
    }

    pub fn insert(&mut self, name: &str, xml: impl Into<String>) {
        self.entries.insert(FileId::new(name), xml.into());
    }

    pub fn contains(&self, file: &FileId) -> bool {
        self.entries.contains_key(file)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Archive for MemoryArchive {
    fn open(&self, file: &FileId) -> Result<Box<dyn TokenSource + Send + '_>> {
        let xml = self.entries.get(file).ok_or_else(|| ImportError::Archive {
            file: file.to_string(),
            details: "entry not found in archive".to_string(),
        })?;
        Ok(Box::new(XmlTokenSource::new(
            Cursor::new(xml.clone().into_bytes()),
            file.to_string(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Event;

    #[test]
    fn test_open_existing_entry() {
        let archive = MemoryArchive::new().with_file("3D/model.xml", "<model/>");
        assert_eq!(archive.len(), 1);

        let mut source = archive.open(&FileId::new("/3D/model.xml")).unwrap();
        assert_eq!(
            source.next().unwrap(),
            Some(Event::ElementStart("model".to_string()))
        );
        assert!(source.is_empty_element());
    }

    #[test]
    fn test_open_missing_entry() {
        let archive = MemoryArchive::new();
        let error = archive.open(&FileId::new("/absent.xml")).err().unwrap();
        match error {
            ImportError::Archive { file, .. } => assert_eq!(file, "/absent.xml"),
            other => panic!("expected archive error, got {other}"),
        }
    }

    #[test]
    fn test_entry_names_normalized() {
        let archive = MemoryArchive::new().with_file("3D\\part.xml", "<part/>");
        assert!(archive.contains(&FileId::new("/3D/part.xml")));
    }
}
