//! Artifact downloads for the managed backend.
//!
//! Every download goes to `<dest>.tmp` and is renamed into place only when
//! complete, so a partial artifact is never visible under its final name.
//! A SHA-256 digest is computed while streaming and handed back for the
//! setup log. Archive extraction takes only `lib/` entries, refuses
//! symlinks that escape the destination, and bounds entry sizes.

use super::ServerError;
use crate::logging::log_debug;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Large model files on slow links need a generous ceiling.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Per-entry extraction cap; anything bigger is a bomb, not a library.
const MAX_ARCHIVE_ENTRY_BYTES: u64 = 500 * 1024 * 1024;

const COPY_BUF_BYTES: usize = 32 * 1024;

/// Stage name plus bytes downloaded / total (when the server sent one).
pub type ProgressFn<'a> = &'a (dyn Fn(&str, u64, Option<u64>) + Send + Sync);

pub(super) fn download_client() -> Result<reqwest::blocking::Client, ServerError> {
    reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(ServerError::Http)
}

/// Download `url` to `dest` atomically; returns the SHA-256 hex digest.
pub(super) fn download_file(
    client: &reqwest::blocking::Client,
    url: &str,
    dest: &Path,
    progress: ProgressFn,
    stage: &str,
) -> Result<String, ServerError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut response = client.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(ServerError::DownloadFailed {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let total = response.content_length();

    let tmp_path = tmp_path_for(dest);
    let cleanup = TmpGuard(&tmp_path);
    let mut file = fs::File::create(&tmp_path)?;
    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;
    let mut buf = [0u8; COPY_BUF_BYTES];
    loop {
        let n = response.read(&mut buf)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
        hasher.update(&buf[..n]);
        downloaded += n as u64;
        progress(stage, downloaded, total);
    }
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, dest)?;
    cleanup.disarm();

    Ok(hex_digest(hasher))
}

/// Download a gzip+tar bundle and extract the shared-library files under
/// its `lib/` directory into `dest_dir`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(super) fn download_and_extract_lib_archive(
    client: &reqwest::blocking::Client,
    url: &str,
    dest_dir: &Path,
    progress: ProgressFn,
    stage: &str,
) -> Result<(), ServerError> {
    fs::create_dir_all(dest_dir)?;

    let response = client.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(ServerError::DownloadFailed {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let total = response.content_length();
    let counted = CountingReader {
        inner: response,
        read: 0,
        total,
        progress,
        stage,
    };

    let gz = GzDecoder::new(counted);
    let mut archive = tar::Archive::new(gz);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();

        // Archives are laid out as <bundle-name>/lib/<file>; only lib/
        // content is wanted.
        let mut components = path.components();
        let _bundle_root = components.next();
        let rel: PathBuf = components.collect();
        if !rel.starts_with("lib") {
            continue;
        }
        let Some(filename) = rel.file_name() else {
            continue;
        };
        let dest = dest_dir.join(filename);

        match entry.header().entry_type() {
            tar::EntryType::Directory => continue,
            tar::EntryType::Symlink => {
                let target = entry
                    .link_name()?
                    .ok_or_else(|| ServerError::Archive("symlink without target".to_string()))?;
                if symlink_escapes(dest_dir, &target) {
                    return Err(ServerError::Archive(format!(
                        "symlink {} target {:?} escapes destination directory",
                        filename.to_string_lossy(),
                        target
                    )));
                }
                let _ = fs::remove_file(&dest);
                #[cfg(unix)]
                std::os::unix::fs::symlink(&target, &dest)?;
            }
            _ => {
                let declared = entry.header().size().unwrap_or(0);
                let limit = if declared == 0 || declared > MAX_ARCHIVE_ENTRY_BYTES {
                    MAX_ARCHIVE_ENTRY_BYTES
                } else {
                    declared
                };
                let mut out = fs::File::create(&dest)?;
                // +1 so a body longer than its header is detectable as an
                // overflow rather than silently truncated at the limit.
                let copied = std::io::copy(&mut (&mut entry).take(limit + 1), &mut out)?;
                if copied > limit {
                    drop(out);
                    let _ = fs::remove_file(&dest);
                    return Err(ServerError::Archive(format!(
                        "entry {} exceeds its declared size",
                        filename.to_string_lossy()
                    )));
                }
                #[cfg(unix)]
                if let Ok(mode) = entry.header().mode() {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = fs::set_permissions(&dest, fs::Permissions::from_mode(mode));
                }
            }
        }
        log_debug(
            "server",
            &format!("extracted {}", filename.to_string_lossy()),
        );
    }
    Ok(())
}

fn tmp_path_for(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    dest.with_file_name(name)
}

fn hex_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Lexically resolve `target` relative to `dest_dir` and check whether it
/// leaves the directory. The target does not exist yet, so this cannot use
/// canonicalize.
fn symlink_escapes(dest_dir: &Path, target: &Path) -> bool {
    if target.is_absolute() {
        return !target.starts_with(dest_dir);
    }
    let mut depth: i32 = 0;
    for component in target.components() {
        match component {
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return true;
                }
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}

/// Removes the temp file unless the download completed.
struct TmpGuard<'a>(&'a Path);

impl TmpGuard<'_> {
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for TmpGuard<'_> {
    fn drop(&mut self) {
        let _ = fs::remove_file(self.0);
    }
}

/// Streams bytes through while reporting progress.
struct CountingReader<'a, R: Read> {
    inner: R,
    read: u64,
    total: Option<u64>,
    progress: ProgressFn<'a>,
    stage: &'a str,
}

impl<R: Read> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        (self.progress)(self.stage, self.read, self.total);
        Ok(n)
    }
}
