//! Artifact synchronization to the remote filesystem.
//!
//! Two transfer mechanisms, both byte-faithful: small files go inline as
//! base64 through a quoted heredoc (shell-safe for arbitrary content), large
//! files go over the session's file-copy channel. A failed file is recorded
//! in the report and never aborts its siblings; callers must inspect the
//! report rather than a boolean.

use crate::error::{Error, Result};
use crate::session::Session;
use crate::target::ManifestEntry;
use crate::utils::shell;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Files at or below this size transfer inline; larger ones use file copy.
const INLINE_TRANSFER_MAX: u64 = 64 * 1024;

#[derive(Debug, Clone, Default)]
pub struct TransferManifest {
    files: Vec<(PathBuf, String)>,
    dirs: Vec<(PathBuf, String)>,
}

impl TransferManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, local: impl Into<PathBuf>, remote: impl Into<String>) {
        self.files.push((local.into(), remote.into()));
    }

    pub fn add_dir(&mut self, local: impl Into<PathBuf>, remote: impl Into<String>) {
        self.dirs.push((local.into(), remote.into()));
    }

    /// Partition configured entries by what the local filesystem says they
    /// are right now. Entries whose local path is missing stay file entries
    /// so the failure is recorded per file at transfer time.
    pub fn from_entries(entries: &[ManifestEntry]) -> Self {
        let mut manifest = Self::new();
        for entry in entries {
            if Path::new(&entry.local).is_dir() {
                manifest.add_dir(&entry.local, &entry.remote);
            } else {
                manifest.add_file(&entry.local, &entry.remote);
            }
        }
        manifest
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Transferred,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTransfer {
    pub local: String,
    pub remote: String,
    pub status: TransferStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub files: Vec<FileTransfer>,
    pub transferred: u32,
    pub failed: u32,
}

impl UploadReport {
    pub fn ok(&self) -> bool {
        self.failed == 0
    }
}

/// Upload every manifest entry, expanding directories recursively and
/// creating remote directories first. Partial-failure semantics: each file
/// gets its own report row.
pub fn upload(
    session: &dyn Session,
    manifest: &TransferManifest,
    verify: bool,
) -> Result<UploadReport> {
    let mut planned: Vec<(PathBuf, String)> = manifest.files.clone();
    let mut remote_dirs: BTreeSet<String> = BTreeSet::new();
    let mut files = Vec::new();

    for (local, remote) in &manifest.dirs {
        remote_dirs.insert(remote.clone());
        if let Err(err) = expand_dir(local, remote, &mut planned, &mut remote_dirs) {
            files.push(FileTransfer {
                local: local.display().to_string(),
                remote: remote.clone(),
                status: TransferStatus::Failed,
                error: Some(err),
            });
        }
    }

    for (_, remote) in &planned {
        if let Some(parent) = parent_of(remote) {
            remote_dirs.insert(parent);
        }
    }

    if !remote_dirs.is_empty() {
        let quoted: Vec<String> = remote_dirs.iter().map(|d| shell::quote_path(d)).collect();
        let mkdir = format!("mkdir -p {}", quoted.join(" "));
        let output = session.execute(&mkdir)?;
        if !output.success {
            // Individual transfers under a missing directory will fail and
            // be recorded; nothing to abort here.
            log_status!("sync", "mkdir reported exit {}: {}", output.exit_code, output.stderr.trim());
        }
    }

    for (local, remote) in &planned {
        match transfer_one(session, local, remote, verify) {
            Ok(()) => {
                log_status!("sync", "{} -> {}", local.display(), remote);
                files.push(FileTransfer {
                    local: local.display().to_string(),
                    remote: remote.clone(),
                    status: TransferStatus::Transferred,
                    error: None,
                });
            }
            Err(err) => {
                log_status!("sync", "FAILED {} -> {}: {}", local.display(), remote, err);
                files.push(FileTransfer {
                    local: local.display().to_string(),
                    remote: remote.clone(),
                    status: TransferStatus::Failed,
                    error: Some(err),
                });
            }
        }
    }

    let transferred = files
        .iter()
        .filter(|f| f.status == TransferStatus::Transferred)
        .count() as u32;
    let failed = files.len() as u32 - transferred;

    Ok(UploadReport {
        files,
        transferred,
        failed,
    })
}

/// Write bytes to a remote path through a base64 heredoc. Content survives
/// byte-for-byte regardless of shell-special characters.
pub fn push_content(session: &dyn Session, remote: &str, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = parent_of(remote) {
        let output = session.execute(&format!("mkdir -p {}", shell::quote_path(&parent)))?;
        if !output.success {
            return Err(Error::transfer_failed(
                "<inline>",
                remote,
                format!("mkdir failed: {}", output.stderr.trim()),
            ));
        }
    }

    let encoded = STANDARD.encode(bytes);
    let delimiter = unique_delimiter(&encoded);
    let command = format!(
        "base64 -d > {} << '{}'\n{}\n{}",
        shell::quote_path(remote),
        delimiter,
        encoded,
        delimiter
    );

    let output = session.execute(&command)?;
    if !output.success {
        return Err(Error::transfer_failed(
            "<inline>",
            remote,
            output.stderr.trim().to_string(),
        ));
    }
    Ok(())
}

/// Idempotently create conventional state subdirectories under a root.
pub fn ensure_remote_dirs(session: &dyn Session, root: &str, dirs: &[String]) -> Result<()> {
    if dirs.is_empty() {
        return Ok(());
    }

    let quoted: Vec<String> = dirs
        .iter()
        .map(|d| shell::quote_path(&join_remote(root, d)))
        .collect();
    let command = format!("mkdir -p {}", quoted.join(" "));

    let output = session.execute(&command)?;
    if !output.success {
        return Err(Error::remote_command_failed(
            command,
            output.exit_code,
            output.stdout,
            output.stderr,
        ));
    }
    Ok(())
}

fn transfer_one(
    session: &dyn Session,
    local: &Path,
    remote: &str,
    verify: bool,
) -> std::result::Result<(), String> {
    let size = local
        .metadata()
        .map_err(|e| format!("cannot read local file: {}", e))?
        .len();

    if size <= INLINE_TRANSFER_MAX {
        let bytes = std::fs::read(local).map_err(|e| format!("cannot read local file: {}", e))?;
        push_content(session, remote, &bytes).map_err(|e| e.to_string())?;
    } else {
        session
            .send_file(local, remote)
            .map_err(|e| e.to_string())?;
    }

    if verify {
        verify_checksum(session, local, remote)?;
    }
    Ok(())
}

fn verify_checksum(
    session: &dyn Session,
    local: &Path,
    remote: &str,
) -> std::result::Result<(), String> {
    let local_digest = local_sha256(local)?;

    let command = format!("sha256sum {}", shell::quote_path(remote));
    let output = session
        .execute(&command)
        .map_err(|e| format!("checksum verification failed: {}", e))?;
    if !output.success {
        return Err(format!(
            "checksum verification failed: {}",
            output.stderr.trim()
        ));
    }

    let remote_digest = output.stdout.split_whitespace().next().unwrap_or_default();
    if remote_digest != local_digest {
        return Err(format!(
            "checksum mismatch (local {}, remote {})",
            local_digest, remote_digest
        ));
    }
    Ok(())
}

fn local_sha256(path: &Path) -> std::result::Result<String, String> {
    let mut file =
        std::fs::File::open(path).map_err(|e| format!("cannot read local file: {}", e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| format!("cannot hash local file: {}", e))?;
    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

fn expand_dir(
    local: &Path,
    remote: &str,
    planned: &mut Vec<(PathBuf, String)>,
    remote_dirs: &mut BTreeSet<String>,
) -> std::result::Result<(), String> {
    let entries =
        std::fs::read_dir(local).map_err(|e| format!("cannot read local directory: {}", e))?;

    for entry in entries {
        let entry = entry.map_err(|e| format!("cannot read local directory: {}", e))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
            continue;
        };
        let child_remote = join_remote(remote, &name);

        if path.is_dir() {
            remote_dirs.insert(child_remote.clone());
            expand_dir(&path, &child_remote, planned, remote_dirs)?;
        } else {
            planned.push((path, child_remote));
        }
    }
    Ok(())
}

fn join_remote(base: &str, rel: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), rel.trim_start_matches('/'))
}

fn parent_of(remote: &str) -> Option<String> {
    let trimmed = remote.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    if idx == 0 {
        return None;
    }
    Some(trimmed[..idx].to_string())
}

/// Generate a heredoc delimiter that doesn't appear in the content.
fn unique_delimiter(content: &str) -> String {
    let mut delimiter = "DOCKHANDEOF".to_string();
    let mut counter = 0;
    while content.contains(&delimiter) {
        counter += 1;
        delimiter = format!("DOCKHANDEOF_{}", counter);
    }
    delimiter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CommandOutput;
    use std::cell::RefCell;
    use std::io::Write;

    #[derive(Default)]
    struct FakeSession {
        calls: RefCell<Vec<String>>,
        fail_execute_containing: Option<String>,
        checksum_reply: Option<String>,
    }

    impl Session for FakeSession {
        fn execute(&self, command: &str) -> crate::error::Result<CommandOutput> {
            self.calls.borrow_mut().push(command.to_string());

            if let Some(pattern) = &self.fail_execute_containing {
                if command.contains(pattern.as_str()) {
                    return Ok(CommandOutput {
                        stdout: String::new(),
                        stderr: "disk full".to_string(),
                        success: false,
                        exit_code: 1,
                    });
                }
            }

            if command.starts_with("sha256sum") {
                if let Some(reply) = &self.checksum_reply {
                    return Ok(CommandOutput {
                        stdout: format!("{}  file\n", reply),
                        stderr: String::new(),
                        success: true,
                        exit_code: 0,
                    });
                }
            }

            Ok(CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
                success: true,
                exit_code: 0,
            })
        }

        fn execute_streamed(
            &self,
            command: &str,
            _on_line: &mut dyn FnMut(&str),
        ) -> crate::error::Result<CommandOutput> {
            self.execute(command)
        }

        fn send_file(&self, local: &Path, remote: &str) -> crate::error::Result<()> {
            self.calls
                .borrow_mut()
                .push(format!("scp {} {}", local.display(), remote));
            Ok(())
        }

        fn host(&self) -> &str {
            "fake"
        }
    }

    fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    #[test]
    fn missing_local_file_does_not_abort_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_file(dir.path(), "app.conf", b"port = 8080\n");

        let mut manifest = TransferManifest::new();
        manifest.add_file(dir.path().join("missing.conf"), "/srv/app/missing.conf");
        manifest.add_file(&good, "/srv/app/app.conf");

        let session = FakeSession::default();
        let report = upload(&session, &manifest, false).unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.transferred, 1);

        let failed: Vec<_> = report
            .files
            .iter()
            .filter(|f| f.status == TransferStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].local.ends_with("missing.conf"));
        assert!(failed[0].error.as_deref().unwrap().contains("cannot read"));
    }

    #[test]
    fn remote_write_failure_recorded_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.conf", b"a\n");
        let b = write_file(dir.path(), "b.conf", b"b\n");

        let mut manifest = TransferManifest::new();
        manifest.add_file(&a, "/srv/app/a.conf");
        manifest.add_file(&b, "/srv/app/b.conf");

        let session = FakeSession {
            fail_execute_containing: Some("b.conf' <<".to_string()),
            ..Default::default()
        };
        let report = upload(&session, &manifest, false).unwrap();

        assert_eq!(report.transferred, 1);
        assert_eq!(report.failed, 1);
        let failed = report
            .files
            .iter()
            .find(|f| f.status == TransferStatus::Failed)
            .unwrap();
        assert_eq!(failed.remote, "/srv/app/b.conf");
    }

    #[test]
    fn directories_expand_recursively_with_mkdir_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("static")).unwrap();
        write_file(&dir.path().join("static"), "style.css", b"body {}\n");
        write_file(dir.path(), "index.html", b"<html></html>\n");

        let mut manifest = TransferManifest::new();
        manifest.add_dir(dir.path(), "/srv/app/site");

        let session = FakeSession::default();
        let report = upload(&session, &manifest, false).unwrap();

        assert_eq!(report.failed, 0);
        assert_eq!(report.transferred, 2);

        let calls = session.calls.borrow();
        let mkdir = calls.iter().find(|c| c.starts_with("mkdir -p")).unwrap();
        assert!(mkdir.contains("'/srv/app/site'"));
        assert!(mkdir.contains("'/srv/app/site/static'"));
        assert!(calls
            .iter()
            .any(|c| c.contains("'/srv/app/site/static/style.css'")));
    }

    #[test]
    fn inline_transfer_uses_base64_heredoc() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "env", b"SECRET='with $pecial chars'\n");

        let mut manifest = TransferManifest::new();
        manifest.add_file(&file, "/srv/app/.env");

        let session = FakeSession::default();
        upload(&session, &manifest, false).unwrap();

        let calls = session.calls.borrow();
        let write = calls
            .iter()
            .find(|c| c.contains("base64 -d > '/srv/app/.env'"))
            .unwrap();
        assert!(write.contains("<< 'DOCKHANDEOF'"));
        let encoded = STANDARD.encode(b"SECRET='with $pecial chars'\n");
        assert!(write.contains(&encoded));
    }

    #[test]
    fn checksum_mismatch_marks_file_failed() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), "app.bin", b"binary payload");

        let mut manifest = TransferManifest::new();
        manifest.add_file(&file, "/srv/app/app.bin");

        let session = FakeSession {
            checksum_reply: Some("deadbeef".to_string()),
            ..Default::default()
        };
        let report = upload(&session, &manifest, true).unwrap();

        assert_eq!(report.failed, 1);
        assert!(report.files[0]
            .error
            .as_deref()
            .unwrap()
            .contains("checksum mismatch"));
    }

    #[test]
    fn matching_checksum_passes_verification() {
        let dir = tempfile::tempdir().unwrap();
        let content = b"binary payload";
        let file = write_file(dir.path(), "app.bin", content);

        let mut hasher = Sha256::new();
        hasher.update(content);
        let digest: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();

        let session = FakeSession {
            checksum_reply: Some(digest),
            ..Default::default()
        };

        let mut manifest = TransferManifest::new();
        manifest.add_file(&file, "/srv/app/app.bin");
        let report = upload(&session, &manifest, true).unwrap();
        assert!(report.ok());
    }

    #[test]
    fn ensure_remote_dirs_quotes_joined_paths() {
        let session = FakeSession::default();
        ensure_remote_dirs(
            &session,
            "/srv/app/",
            &["data".to_string(), "logs".to_string()],
        )
        .unwrap();

        let calls = session.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], "mkdir -p '/srv/app/data' '/srv/app/logs'");
    }
}
