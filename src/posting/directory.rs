//! Subject directory
//!
//! Lookup of a student's external reference number (stambuk) by name. The
//! student registry lives in another module; postings only read from it.

use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Subject directory unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    async fn find_subject_id(&self, subject_name: &str) -> Result<Option<String>, DirectoryError>;
}

/// Directory that knows nobody. Postings keep an empty subject id.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDirectory;

#[async_trait]
impl SubjectDirectory for NoDirectory {
    async fn find_subject_id(&self, _subject_name: &str) -> Result<Option<String>, DirectoryError> {
        Ok(None)
    }
}

/// Fixed name to id map, for seeding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entries: HashMap<String, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subject(mut self, name: impl Into<String>, subject_id: impl Into<String>) -> Self {
        self.entries.insert(name.into(), subject_id.into());
        self
    }
}

#[async_trait]
impl SubjectDirectory for StaticDirectory {
    async fn find_subject_id(&self, subject_name: &str) -> Result<Option<String>, DirectoryError> {
        Ok(self.entries.get(subject_name.trim()).cloned())
    }
}
