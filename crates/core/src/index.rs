//! Local index persistence (`index.txt`)
//!
//! The index records the last remote state this client knows about, not the
//! current on-disk content. One record per line:
//!
//! ```text
//! filename,version,hash1 hash2 ...
//! ```
//!
//! The filename is percent-escaped so the comma delimiters stay unambiguous.
//! The hash field is empty for an empty file and the literal `0` for a
//! tombstone.

use std::fmt::Write as _;
use std::path::Path;

use color_eyre::eyre::{bail, eyre, Result};

use crate::meta::{FileInfoMap, FileMetaData, HashList};

/// Reserved index filename; never tracked as a synced file
pub const INDEX_FILENAME: &str = "index.txt";

/// Load the index from `base_dir`, or an empty map if none exists yet
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_index(base_dir: &Path) -> Result<FileInfoMap> {
    let path = base_dir.join(INDEX_FILENAME);
    if !path.exists() {
        return Ok(FileInfoMap::new());
    }
    parse_index(&std::fs::read_to_string(&path)?)
}

/// Rewrite the whole index file, records sorted by filename
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn save_index(base_dir: &Path, index: &FileInfoMap) -> Result<()> {
    let mut names: Vec<&String> = index.keys().collect();
    names.sort();

    let mut out = String::new();
    for name in names {
        let _ = writeln!(out, "{}", encode_record(&index[name]));
    }

    std::fs::write(base_dir.join(INDEX_FILENAME), out)?;
    Ok(())
}

fn encode_record(meta: &FileMetaData) -> String {
    let hashes: Vec<String> = meta.hash_list.clone().into();
    format!(
        "{},{},{}",
        escape_filename(&meta.filename),
        meta.version,
        hashes.join(" ")
    )
}

fn parse_index(contents: &str) -> Result<FileInfoMap> {
    let mut map = FileInfoMap::new();
    for (lineno, line) in contents.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let meta = parse_record(line).map_err(|e| eyre!("index line {}: {e}", lineno + 1))?;
        map.insert(meta.filename.clone(), meta);
    }
    Ok(map)
}

fn parse_record(line: &str) -> Result<FileMetaData> {
    let (name_field, rest) = line
        .split_once(',')
        .ok_or_else(|| eyre!("missing version field"))?;
    let (version_field, hash_field) = rest
        .split_once(',')
        .ok_or_else(|| eyre!("missing hash field"))?;

    let filename = unescape_filename(name_field)?;
    let version: i32 = version_field
        .parse()
        .map_err(|e| eyre!("bad version {version_field:?}: {e}"))?;
    let entries: Vec<String> = if hash_field.is_empty() {
        Vec::new()
    } else {
        hash_field.split(' ').map(str::to_string).collect()
    };

    Ok(FileMetaData {
        filename,
        version,
        hash_list: HashList::try_from(entries)?,
    })
}

/// Percent-escape the characters that would break the line format
fn escape_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '%' | ',' | '\n' | '\r' => {
                let _ = write!(out, "%{:02X}", ch as u32);
            }
            _ => out.push(ch),
        }
    }
    out
}

fn unescape_filename(escaped: &str) -> Result<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let hi = chars.next().and_then(|c| c.to_digit(16));
        let lo = chars.next().and_then(|c| c.to_digit(16));
        match (hi, lo) {
            (Some(hi), Some(lo)) => {
                let code = hi * 16 + lo;
                out.push(char::from_u32(code).ok_or_else(|| eyre!("bad escape code {code}"))?);
            }
            _ => bail!("truncated escape in filename {escaped:?}"),
        }
    }
    Ok(out)
}
