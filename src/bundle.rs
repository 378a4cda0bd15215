//! Whole-collection exchange: the lesson library packed into a ZIP bundle
//! with a checksummed manifest, and the matching restore path.

use anyhow::{anyhow, Context};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::security::sanitize_json;

const MANIFEST_ENTRY: &str = "manifest.json";
const LESSONS_ENTRY: &str = "lessons.json";
pub const BUNDLE_FORMAT: &str = "planbook-lessons-v1";

#[derive(Debug, Clone)]
pub struct BundleExportSummary {
    pub lesson_count: usize,
}

pub fn export_lessons_bundle(
    lessons: &[Value],
    out_path: &Path,
) -> anyhow::Result<BundleExportSummary> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let payload =
        serde_json::to_string_pretty(&lessons).context("failed to serialize lesson collection")?;
    let checksum = hex::encode(Sha256::digest(payload.as_bytes()));

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "lessonCount": lessons.len(),
        "checksum": checksum,
    });

    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(LESSONS_ENTRY, opts)
        .context("failed to start lessons entry")?;
    zip.write_all(payload.as_bytes())
        .context("failed to write lessons entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(BundleExportSummary {
        lesson_count: lessons.len(),
    })
}

/// Opens a bundle, verifies format and checksum, and returns the contained
/// lesson documents with pollution keys already stripped. Merging into the
/// live collection is the caller's concern.
pub fn import_lessons_bundle(in_path: &Path) -> anyhow::Result<Vec<Value>> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(Value::as_str)
        .unwrap_or("");
    if format != BUNDLE_FORMAT {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let mut payload = String::new();
    archive
        .by_name(LESSONS_ENTRY)
        .context("bundle missing lessons.json")?
        .read_to_string(&mut payload)
        .context("failed to read lessons.json")?;

    if let Some(expected) = manifest.get("checksum").and_then(Value::as_str) {
        let actual = hex::encode(Sha256::digest(payload.as_bytes()));
        if actual != expected {
            return Err(anyhow!("bundle checksum mismatch"));
        }
    }

    let lessons: Vec<Value> =
        serde_json::from_str(&payload).context("lessons.json is invalid JSON")?;
    Ok(lessons.iter().map(sanitize_json).collect())
}
