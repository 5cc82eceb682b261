//! Multipart form intake
//!
//! File parts are streamed chunk by chunk into the job's workspace as
//! `<field>.<ext>`; both components are reduced to `[A-Za-z0-9_-]` so a
//! client-chosen name can never escape the workspace. Text parts are kept
//! in memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{ApiError, ApiResult};

/// Parts of a received form
#[derive(Debug, Default)]
pub struct UploadedForm {
    files: HashMap<String, PathBuf>,
    fields: HashMap<String, String>,
}

impl UploadedForm {
    /// Workspace path of file part `name`
    pub fn file(&self, name: &str) -> Option<&Path> {
        self.files.get(name).map(PathBuf::as_path)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Decode text part `name` as JSON; absent or blank yields `None`
    pub fn json<T: DeserializeOwned>(&self, name: &str) -> ApiResult<Option<T>> {
        match self.text(name).map(str::trim).filter(|s| !s.is_empty()) {
            Some(text) => serde_json::from_str(text)
                .map(Some)
                .map_err(|e| ApiError::BadRequest(format!("'{}' is not valid JSON: {}", name, e))),
            None => Ok(None),
        }
    }
}

/// Drain `multipart` into `dir`
pub async fn receive(mut multipart: Multipart, dir: &Path) -> ApiResult<UploadedForm> {
    let mut form = UploadedForm::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        let Some(original) = field.file_name().map(str::to_string) else {
            let text = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            form.fields.insert(name, text);
            continue;
        };

        let path = dir.join(stored_name(&name, &original));
        let mut file = tokio::fs::File::create(&path).await?;
        let mut written = 0usize;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        debug!(field = %name, bytes = written, path = %path.display(), "Upload stored");
        form.files.insert(name, path);
    }

    Ok(form)
}

fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// `<field>.<ext>` with both parts sanitized
fn stored_name(field: &str, original: &str) -> String {
    let stem = match sanitize(field) {
        s if s.is_empty() => "upload".to_string(),
        s => s,
    };
    let extension = Path::new(original)
        .extension()
        .map(|ext| sanitize(&ext.to_string_lossy()).to_ascii_lowercase())
        .unwrap_or_default();

    if extension.is_empty() {
        stem
    } else {
        format!("{}.{}", stem, extension)
    }
}
