//! Zip codec for package archives.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::io::{Cursor, Read};
use std::time::SystemTime;
use zip::ZipArchive;

use super::ArchiveEntry;

/// Decode every entry of a zip archive held in memory.
///
/// Entry paths are returned as stored, with `\` separators unified to `/`.
/// No path sanitizing happens here; the installer owns that guard.
pub fn read_entries(bytes: &[u8]) -> Result<Vec<ArchiveEntry>> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).context("Failed to parse ZIP archive")?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read ZIP entry {}", i))?;

        let path = entry.name().replace('\\', "/");
        let is_dir = entry.is_dir();
        let modified = entry.last_modified().and_then(to_system_time);

        let mut data = Vec::new();
        if !is_dir {
            entry
                .read_to_end(&mut data)
                .with_context(|| format!("Failed to decompress ZIP entry {}", path))?;
        }

        entries.push(ArchiveEntry {
            path,
            is_dir,
            data,
            modified,
        });
    }
    Ok(entries)
}

/// Interpret a zip (MS-DOS) timestamp as UTC.
fn to_system_time(dt: zip::DateTime) -> Option<SystemTime> {
    let naive = NaiveDateTime::try_from(dt).ok()?;
    Some(SystemTime::from(naive.and_utc()))
}
