//! Uploaded file storage.

use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};

use super::{Database, DbResult};
use crate::models::{FileRef, UploadedFile};

impl Database {
    /// Store upload content under a fresh storage key.
    pub fn store_file(&self, file: &UploadedFile, now: &str) -> DbResult<FileRef> {
        let storage_key = uuid::Uuid::new_v4().to_string();
        let sha256 = hash_content(&file.content);
        self.conn.execute(
            r#"
            INSERT INTO stored_files (storage_key, file_name, sha256, size_bytes, content, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                storage_key,
                file.file_name,
                sha256,
                file.content.len() as i64,
                file.content,
                now,
            ],
        )?;
        Ok(FileRef {
            storage_key,
            file_name: file.file_name.clone(),
            sha256,
            size_bytes: file.content.len() as u64,
            uploaded_at: now.to_string(),
        })
    }

    /// Raw content for a storage key.
    pub fn get_file_content(&self, storage_key: &str) -> DbResult<Option<Vec<u8>>> {
        Ok(self
            .conn
            .query_row(
                "SELECT content FROM stored_files WHERE storage_key = ?",
                [storage_key],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Drop a replaced file.
    pub fn delete_file(&self, storage_key: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM stored_files WHERE storage_key = ?", [storage_key])?;
        Ok(rows_affected > 0)
    }
}

/// SHA-256 of `data`, hex encoded.
pub fn hash_content(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
