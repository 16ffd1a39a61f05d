//! Test doubles for the remote store and the target database.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::{Cursor, Write};
use std::sync::Mutex;
use zip::write::SimpleFileOptions;

use crate::errors::DatabaseError;
use crate::restore::db_restore::Database;
use crate::restore::s3_download::{BackupObject, RemoteStore, normalize_prefix};

struct StoredObject {
    key: String,
    last_modified: i64,
    content_type: String,
    body: Vec<u8>,
}

/// In-memory bucket. Lists only direct children of a prefix, like S3 with
/// a `/` delimiter.
#[derive(Default)]
pub struct MemoryStore {
    objects: Vec<StoredObject>,
    gets: Mutex<Vec<String>>,
    fail_listing: bool,
}

impl MemoryStore {
    pub fn with_object(
        mut self,
        key: &str,
        last_modified: i64,
        content_type: &str,
        body: Vec<u8>,
    ) -> Self {
        self.objects.push(StoredObject {
            key: key.to_string(),
            last_modified,
            content_type: content_type.to_string(),
            body,
        });
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Keys downloaded so far.
    pub fn downloads(&self) -> Vec<String> {
        self.gets.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list(&self, prefix: &str) -> Result<Vec<BackupObject>> {
        if self.fail_listing {
            return Err(anyhow!("connection reset by peer"));
        }
        let prefix = normalize_prefix(prefix);
        Ok(self
            .objects
            .iter()
            .filter(|o| {
                o.key
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .map(|o| BackupObject::new(o.key.clone(), o.last_modified))
            .collect())
    }

    async fn content_type(&self, key: &str) -> Result<String> {
        self.objects
            .iter()
            .find(|o| o.key == key)
            .map(|o| o.content_type.clone())
            .ok_or_else(|| anyhow!("no such key: {}", key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.gets.lock().unwrap().push(key.to_string());
        self.objects
            .iter()
            .find(|o| o.key == key)
            .map(|o| o.body.clone())
            .ok_or_else(|| anyhow!("no such key: {}", key))
    }
}

/// Records every executed batch; optionally fails each one.
#[derive(Default)]
pub struct RecordingDatabase {
    executed: Mutex<Vec<String>>,
    failure: Option<String>,
}

impl RecordingDatabase {
    pub fn failing(message: &str) -> Self {
        RecordingDatabase {
            executed: Mutex::new(Vec::new()),
            failure: Some(message.to_string()),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Database for RecordingDatabase {
    async fn execute_raw(&self, sql: &str) -> std::result::Result<(), DatabaseError> {
        self.executed.lock().unwrap().push(sql.to_string());
        match &self.failure {
            Some(message) => Err(DatabaseError::Other(message.clone())),
            None => Ok(()),
        }
    }
}

pub fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Builds a zip archive from `(path, content)` pairs; `/` in paths creates
/// nested entries.
pub fn zip_bytes(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in entries {
        writer.start_file(name.as_str(), options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
