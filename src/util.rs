use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::model::InputFile;

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let count = file
            .read(&mut buf)
            .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn ensure_input_file(role: &str, path: &Path) -> Result<()> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("required {role} input is missing: {}", path.display()))?;
    if !metadata.is_file() {
        bail!("required {role} input is not a file: {}", path.display());
    }
    File::open(path)
        .with_context(|| format!("required {role} input is unreadable: {}", path.display()))?;
    Ok(())
}

pub fn describe_input(role: &str, path: &Path) -> Result<InputFile> {
    let bytes = fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();

    Ok(InputFile {
        role: role.to_string(),
        path: path.display().to_string(),
        bytes,
        sha256: sha256_file(path)?,
    })
}

pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Newest `run_*` directory below `results_root`, by name.
pub fn latest_run_dir(results_root: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(results_root)
        .with_context(|| format!("failed to read {}", results_root.display()))?;

    let mut latest: Option<(String, PathBuf)> = None;
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to read entry in {}", results_root.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_dir()
        {
            continue;
        }

        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !name.starts_with("run_") {
            continue;
        }

        let is_newer = latest
            .as_ref()
            .map(|(current, _)| name > current.as_str())
            .unwrap_or(true);
        if is_newer {
            latest = Some((name.to_string(), path.clone()));
        }
    }

    latest
        .map(|(_, path)| path)
        .with_context(|| format!("no run_* directories in {}", results_root.display()))
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;

    let mut file = File::create(path)
        .with_context(|| format!("failed to create json file: {}", path.display()))?;
    file.write_all(&data)
        .with_context(|| format!("failed to write json file: {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("failed to finalize json file: {}", path.display()))?;

    Ok(())
}

pub fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let mut data = String::with_capacity(lines.iter().map(|line| line.len() + 1).sum());
    for line in lines {
        data.push_str(line);
        data.push('\n');
    }

    fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
pub(crate) fn scratch_dir(tag: &str) -> PathBuf {
    let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let dir = std::env::temp_dir().join(format!(
        "hmmeval_{}_{}_{}",
        tag,
        std::process::id(),
        stamp
    ));
    fs::create_dir_all(&dir).expect("scratch dir should be creatable");
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_run_dir_picks_lexicographically_newest_run() {
        let root = scratch_dir("latest_run");
        fs::create_dir_all(root.join("run_20250710_0900")).unwrap();
        fs::create_dir_all(root.join("run_20250711_1015")).unwrap();
        fs::create_dir_all(root.join("archive")).unwrap();
        fs::write(root.join("run_20991231_2359"), "not a directory").unwrap();

        let latest = latest_run_dir(&root).unwrap();
        assert_eq!(latest, root.join("run_20250711_1015"));
    }

    #[test]
    fn latest_run_dir_fails_without_runs() {
        let root = scratch_dir("no_runs");
        assert!(latest_run_dir(&root).is_err());
    }

    #[test]
    fn ensure_input_file_rejects_missing_and_directory_paths() {
        let root = scratch_dir("inputs");
        let missing = root.join("absent.tbl");
        let err = ensure_input_file("hit table", &missing).unwrap_err();
        assert!(err.to_string().contains("hit table input is missing"));

        assert!(ensure_input_file("labels", &root).is_err());

        let present = root.join("labels.txt");
        fs::write(&present, "A\t1\n").unwrap();
        assert!(ensure_input_file("labels", &present).is_ok());
    }

    #[test]
    fn write_lines_terminates_every_line() {
        let root = scratch_dir("lines");
        let path = root.join("out").join("ids.txt");
        write_lines(&path, &["A".to_string(), "B".to_string()]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "A\nB\n");

        write_lines(&path, &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }
}
