//! Row-to-image matching
//!
//! A row and an image belong together when the row's match key equals the
//! image filename's digits (extension stripped). Matching is exact; a photo
//! one second off is a different passage.

use lombada_common::timestamp::match_key_from_filename;
use std::collections::HashMap;

use crate::batch::UploadedFile;

/// Anything with a filename that can be matched
pub trait NamedFile {
    fn file_name(&self) -> &str;
}

impl NamedFile for UploadedFile {
    fn file_name(&self) -> &str {
        &self.name
    }
}

impl NamedFile for &str {
    fn file_name(&self) -> &str {
        self
    }
}

impl NamedFile for String {
    fn file_name(&self) -> &str {
        self
    }
}

/// First file whose derived key equals `key`
pub fn match_image<'a, F: NamedFile>(key: &str, files: &'a [F]) -> Option<&'a F> {
    files
        .iter()
        .find(|f| match_key_from_filename(f.file_name()) == key)
}

/// Pre-computed key lookup over a batch's images
///
/// Equivalent to [`match_image`] for every key (first file wins), built once
/// per batch instead of scanning per row.
pub struct ImageIndex<'a, F> {
    by_key: HashMap<String, &'a F>,
}

impl<'a, F: NamedFile> ImageIndex<'a, F> {
    pub fn build(files: &'a [F]) -> Self {
        let mut by_key: HashMap<String, &'a F> = HashMap::with_capacity(files.len());

        for file in files {
            let key = match_key_from_filename(file.file_name());
            if let Some(existing) = by_key.get(&key) {
                tracing::warn!(
                    key = %key,
                    kept = %existing.file_name(),
                    ignored = %file.file_name(),
                    "Two images share a match key; keeping the first"
                );
                continue;
            }
            by_key.insert(key, file);
        }

        Self { by_key }
    }

    pub fn get(&self, key: &str) -> Option<&'a F> {
        let found = self.by_key.get(key).copied();
        tracing::debug!(key, matched = found.is_some(), "Image lookup");
        found
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
