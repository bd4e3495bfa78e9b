use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Byte-count progress emitted while downloading; rendering is the
/// caller's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchEvent {
    pub received: u64,
    pub total: Option<u64>,
}

/// Remote acquisition collaborator: fetch-or-update a directory from a
/// repository, or download a file.
pub trait RemoteFetch {
    fn clone_or_update(&self, location: &str, destination: &Path, branch: Option<&str>)
        -> Result<()>;

    fn download(
        &self,
        url: &str,
        destination: &Path,
        progress: &mut dyn FnMut(FetchEvent),
    ) -> Result<()>;
}

/// Production fetcher: git for repositories, blocking HTTP for archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpGitFetch;

impl RemoteFetch for HttpGitFetch {
    fn clone_or_update(
        &self,
        location: &str,
        destination: &Path,
        branch: Option<&str>,
    ) -> Result<()> {
        bakehouse_registry::clone_or_update(location, destination, branch)
    }

    fn download(
        &self,
        url: &str,
        destination: &Path,
        progress: &mut dyn FnMut(FetchEvent),
    ) -> Result<()> {
        let mut response = reqwest::blocking::get(url)
            .with_context(|| format!("failed to request {url}"))?;
        if !response.status().is_success() {
            anyhow::bail!("download of {} failed: HTTP {}", url, response.status());
        }
        let total = response.content_length();

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        // Stream into a .part file and rename on completion so an aborted
        // download never poses as a cached archive.
        let part = destination.with_file_name(format!(
            "{}.part",
            destination
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("download")
        ));

        let result = (|| -> Result<()> {
            let mut out = File::create(&part)
                .with_context(|| format!("failed to create {}", part.display()))?;
            let mut received = 0u64;
            let mut buffer = [0u8; 64 * 1024];
            loop {
                let n = response
                    .read(&mut buffer)
                    .with_context(|| format!("failed reading response body from {url}"))?;
                if n == 0 {
                    break;
                }
                out.write_all(&buffer[..n])
                    .with_context(|| format!("failed writing {}", part.display()))?;
                received += n as u64;
                progress(FetchEvent { received, total });
            }
            out.flush()
                .with_context(|| format!("failed flushing {}", part.display()))
        })();

        if let Err(err) = result {
            let _ = fs::remove_file(&part);
            return Err(err);
        }

        fs::rename(&part, destination)
            .with_context(|| format!("failed to move download into place: {}", destination.display()))
    }
}

/// Compare a file's SHA-256 digest against an expected hex string.
pub fn verify_sha256(path: &Path, expected: &str) -> Result<bool> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buffer)
            .with_context(|| format!("failed reading {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    let digest = hex::encode(hasher.finalize());
    Ok(digest.eq_ignore_ascii_case(expected.trim()))
}
