//! Git engine backed by the `git` command-line binary

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use chrono::{DateTime, Utc};

use crate::config::{GitIdentity, VcsConfig};
use crate::engine::VcsEngine;
use crate::error::VcsError;
use crate::types::{CommitSummary, FileState, StatusEntry, TreeFile, TreeSnapshot};

/// Field and record separators for `git log --format`.
const FIELD_SEP: char = '\x1f';
const RECORD_SEP: char = '\x1e';

/// Engine implementation that shells out to git in a working directory.
pub struct GitCli {
    /// Working directory for git operations
    work_dir: PathBuf,
    binary: String,
    identity: Option<GitIdentity>,
}

impl GitCli {
    pub fn new(work_dir: impl Into<PathBuf>, config: &VcsConfig) -> Self {
        Self {
            work_dir: work_dir.into(),
            binary: config.git_binary.clone(),
            identity: config.identity.clone(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Spawn git with optional extra environment and stdin, returning the raw output.
    fn run(
        &self,
        args: &[&str],
        env: &[(&str, &OsStr)],
        stdin: Option<&[u8]>,
    ) -> Result<Output, VcsError> {
        tracing::debug!("git {}", args.join(" "));

        let mut cmd = Command::new(&self.binary);
        cmd.args(args).current_dir(&self.work_dir);
        if let Some(identity) = &self.identity {
            cmd.env("GIT_AUTHOR_NAME", &identity.name)
                .env("GIT_AUTHOR_EMAIL", &identity.email)
                .env("GIT_COMMITTER_NAME", &identity.name)
                .env("GIT_COMMITTER_EMAIL", &identity.email);
        }
        for (key, value) in env {
            cmd.env(key, value);
        }

        let io_err = |source| VcsError::IoError {
            path: self.work_dir.display().to_string(),
            source,
        };

        let Some(input) = stdin else {
            return cmd.stdin(Stdio::null()).output().map_err(io_err);
        };

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(io_err)?;

        // Feed stdin from a separate thread so a large reply on stdout
        // cannot deadlock against a large request.
        let writer = child.stdin.take().map(|mut pipe| {
            let input = input.to_vec();
            std::thread::spawn(move || pipe.write_all(&input))
        });
        let output = child.wait_with_output().map_err(io_err)?;
        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) if output.status.success() => return Err(io_err(e)),
                Ok(Err(_)) => {}
                Err(_) => {
                    return Err(VcsError::Engine(format!(
                        "git {}: stdin writer panicked",
                        args.join(" ")
                    )))
                }
            }
        }
        Ok(output)
    }

    /// Run git and fail unless it exits successfully; returns raw stdout.
    fn git_with(
        &self,
        args: &[&str],
        env: &[(&str, &OsStr)],
        stdin: Option<&[u8]>,
    ) -> Result<Vec<u8>, VcsError> {
        let output = self.run(args, env, stdin)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VcsError::Engine(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    /// Run a git command in the working directory
    fn git_cmd(&self, args: &[&str]) -> Result<String, VcsError> {
        let stdout = self.git_with(args, &[], None)?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    /// Run a git query where exit status 1 means "no answer" rather than failure.
    fn git_probe(&self, args: &[&str]) -> Result<Option<String>, VcsError> {
        let output = self.run(args, &[], None)?;
        match output.status.code() {
            Some(0) => Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            )),
            Some(1) => Ok(None),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(VcsError::Engine(format!(
                    "git {} failed: {}",
                    args.join(" "),
                    stderr.trim()
                )))
            }
        }
    }

    fn scratch_io(path: &Path) -> impl Fn(std::io::Error) -> VcsError + '_ {
        move |source| VcsError::IoError {
            path: path.display().to_string(),
            source,
        }
    }
}

impl VcsEngine for GitCli {
    fn current_branch(&self) -> Result<String, VcsError> {
        Ok(self
            .git_probe(&["symbolic-ref", "--short", "-q", "HEAD"])?
            .unwrap_or_else(|| "HEAD".to_string()))
    }

    fn resolve(&self, rev: &str) -> Result<Option<String>, VcsError> {
        let spec = format!("{}^{{commit}}", rev);
        self.git_probe(&["rev-parse", "--verify", "-q", &spec])
    }

    fn status(&self) -> Result<Vec<StatusEntry>, VcsError> {
        let raw = self.git_with(
            &["status", "--porcelain=v1", "-z", "--untracked-files=all"],
            &[],
            None,
        )?;
        Ok(parse_porcelain(&String::from_utf8_lossy(&raw)))
    }

    fn add(&self, path: &str) -> Result<(), VcsError> {
        self.git_cmd(&["add", "--", path])?;
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), VcsError> {
        self.git_cmd(&["rm", "--cached", "-q", "--ignore-unmatch", "--", path])?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<String, VcsError> {
        tracing::info!("GitCli: committing in {}", self.work_dir.display());
        self.git_cmd(&["commit", "-q", "-m", message])?;
        self.git_cmd(&["rev-parse", "HEAD"])
    }

    fn write_commit(
        &self,
        tree: &TreeSnapshot,
        parents: &[String],
        message: &str,
    ) -> Result<String, VcsError> {
        // Build the tree in a throwaway index so the real one is never touched.
        let scratch = tempfile::tempdir().map_err(Self::scratch_io(&self.work_dir))?;
        let index = scratch.path().join("index");
        let index_env = [("GIT_INDEX_FILE", index.as_os_str())];

        if !tree.is_empty() {
            let blobs = scratch.path().join("blobs");
            std::fs::create_dir(&blobs).map_err(Self::scratch_io(&blobs))?;

            let mut listing = String::new();
            for (n, file) in tree.values().enumerate() {
                let blob = blobs.join(n.to_string());
                std::fs::write(&blob, &file.content).map_err(Self::scratch_io(&blob))?;
                listing.push_str(&blob.display().to_string());
                listing.push('\n');
            }

            let hashed = self.git_with(
                &["hash-object", "-w", "--no-filters", "--stdin-paths"],
                &[],
                Some(listing.as_bytes()),
            )?;
            let hashed = String::from_utf8_lossy(&hashed);
            let oids: Vec<&str> = hashed.lines().collect();
            if oids.len() != tree.len() {
                return Err(VcsError::Engine(format!(
                    "hash-object returned {} ids for {} files",
                    oids.len(),
                    tree.len()
                )));
            }

            let mut info = Vec::new();
            for ((path, file), oid) in tree.iter().zip(oids) {
                info.extend_from_slice(format!("{:o} {}\t{}\0", file.mode, oid, path).as_bytes());
            }
            self.git_with(
                &["update-index", "--add", "-z", "--index-info"],
                &index_env,
                Some(&info),
            )?;
        }

        let tree_oid = self.git_with(&["write-tree"], &index_env, None)?;
        let tree_oid = String::from_utf8_lossy(&tree_oid).trim().to_string();

        let mut args = vec!["commit-tree", tree_oid.as_str()];
        for parent in parents {
            args.push("-p");
            args.push(parent);
        }
        args.push("-m");
        args.push(message);
        self.git_cmd(&args)
    }

    fn read_tree(&self, rev: &str) -> Result<TreeSnapshot, VcsError> {
        let listing = self.git_with(&["ls-tree", "-r", "-z", "--full-tree", rev], &[], None)?;

        let mut entries = Vec::new();
        for record in listing.split(|b| *b == 0).filter(|r| !r.is_empty()) {
            let record = String::from_utf8_lossy(record);
            let Some((meta, path)) = record.split_once('\t') else {
                continue;
            };
            let mut fields = meta.split_whitespace();
            let (Some(mode), Some(kind), Some(oid)) = (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            // Submodule entries have no blob content.
            if kind != "blob" {
                continue;
            }
            let mode = u32::from_str_radix(mode, 8)
                .map_err(|e| VcsError::Engine(format!("bad mode '{}' for {}: {}", mode, path, e)))?;
            entries.push((path.to_string(), mode, oid.to_string()));
        }

        let mut tree = TreeSnapshot::new();
        if entries.is_empty() {
            return Ok(tree);
        }

        let request: String = entries.iter().map(|(_, _, oid)| format!("{}\n", oid)).collect();
        let batch = self.git_with(&["cat-file", "--batch"], &[], Some(request.as_bytes()))?;

        let mut pos = 0;
        for (path, mode, oid) in entries {
            let header_end = batch[pos..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|i| pos + i)
                .ok_or_else(|| VcsError::Engine(format!("truncated cat-file reply for {}", oid)))?;
            let header = String::from_utf8_lossy(&batch[pos..header_end]);
            let size: usize = header
                .rsplit(' ')
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| VcsError::Engine(format!("bad cat-file header: {}", header)))?;
            let start = header_end + 1;
            let end = start + size;
            if end > batch.len() {
                return Err(VcsError::Engine(format!("truncated blob for {}", path)));
            }
            tree.insert(
                path,
                TreeFile {
                    mode,
                    content: batch[start..end].to_vec(),
                },
            );
            // Skip the LF that terminates each object.
            pos = end + 1;
        }
        Ok(tree)
    }

    fn reset_hard(&self, rev: &str) -> Result<(), VcsError> {
        self.git_cmd(&["reset", "-q", "--hard", rev])?;
        Ok(())
    }

    fn checkout(&self, branch: &str) -> Result<(), VcsError> {
        tracing::info!("GitCli: checking out {}", branch);
        self.git_cmd(&["checkout", "-q", branch])?;
        Ok(())
    }

    fn create_branch(&self, name: &str, start: Option<&str>) -> Result<(), VcsError> {
        tracing::info!("GitCli: creating branch {}", name);
        let mut args = vec!["branch", name];
        args.extend(start);
        self.git_cmd(&args)?;
        Ok(())
    }

    fn list_branches(&self) -> Result<Vec<String>, VcsError> {
        let out = self.git_cmd(&["for-each-ref", "--format=%(refname:short)", "refs/heads/"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    fn log(&self, rev: &str, depth: usize) -> Result<Vec<CommitSummary>, VcsError> {
        let limit = format!("-n{}", depth);
        let format = "--format=%H%x1f%h%x1f%an%x1f%aI%x1f%s%x1e";
        let out = self.git_cmd(&["log", &limit, format, rev])?;
        out.split(RECORD_SEP)
            .map(|r| r.trim_start_matches('\n'))
            .filter(|r| !r.is_empty())
            .map(parse_log_record)
            .collect()
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, VcsError> {
        Ok(self
            .git_probe(&["merge-base", "--is-ancestor", ancestor, descendant])?
            .is_some())
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, VcsError> {
        self.git_probe(&["merge-base", a, b])
    }

    fn diff_listing(&self, rev: Option<&str>, path: Option<&str>) -> Result<String, VcsError> {
        let mut args = vec!["diff", "--no-color", "--no-ext-diff"];
        args.extend(rev);
        if let Some(path) = path {
            args.push("--");
            args.push(path);
        }
        let out = self.git_with(&args, &[], None)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

fn parse_log_record(record: &str) -> Result<CommitSummary, VcsError> {
    let fields: Vec<&str> = record.splitn(5, FIELD_SEP).collect();
    let [id, short_id, author, date, subject] = fields[..] else {
        return Err(VcsError::Engine(format!("unexpected log record: {:?}", record)));
    };
    let timestamp = DateTime::parse_from_rfc3339(date)
        .map_err(|e| VcsError::Engine(format!("bad commit date '{}': {}", date, e)))?
        .with_timezone(&Utc);
    Ok(CommitSummary {
        id: id.to_string(),
        short_id: short_id.to_string(),
        author: author.to_string(),
        timestamp,
        subject: subject.trim_end().to_string(),
    })
}

/// Parse `git status --porcelain=v1 -z` output into a status matrix.
pub(crate) fn parse_porcelain(raw: &str) -> Vec<StatusEntry> {
    let mut entries: BTreeMap<String, StatusEntry> = BTreeMap::new();
    let mut records = raw.split('\0').filter(|r| !r.is_empty());

    while let Some(record) = records.next() {
        let bytes = record.as_bytes();
        if bytes.len() < 4 {
            continue;
        }
        let (x, y) = (bytes[0] as char, bytes[1] as char);
        let path = &record[3..];

        // Renames and copies carry their source path as the next record.
        if matches!(x, 'R' | 'C') {
            if let Some(orig) = records.next() {
                if x == 'R' {
                    insert_entry(
                        &mut entries,
                        StatusEntry {
                            path: orig.to_string(),
                            head_state: FileState::Deleted,
                            workdir_state: FileState::Unmodified,
                            stage_state: FileState::Deleted,
                        },
                    );
                }
            }
        }
        insert_entry(&mut entries, classify(path, x, y));
    }

    entries.into_values().collect()
}

fn classify(path: &str, x: char, y: char) -> StatusEntry {
    use FileState::*;

    let entry = |head_state, workdir_state, stage_state| StatusEntry {
        path: path.to_string(),
        head_state,
        workdir_state,
        stage_state,
    };

    if x == '?' {
        return entry(Added, Added, Unmodified);
    }
    let unmerged = x == 'U' || y == 'U' || (x == 'A' && y == 'A') || (x == 'D' && y == 'D');
    if unmerged {
        return entry(Modified, Modified, Modified);
    }

    let stage_state = match x {
        'M' | 'T' => Modified,
        'A' | 'R' | 'C' => Added,
        'D' => Deleted,
        _ => Unmodified,
    };
    let workdir_state = match y {
        'M' | 'T' => Modified,
        'D' => Deleted,
        _ => Unmodified,
    };
    let head_state = match (stage_state, workdir_state) {
        (Added, Deleted) => Unmodified,
        (_, Deleted) => Deleted,
        (Added, _) => Added,
        (Deleted, _) => Deleted,
        _ => Modified,
    };
    entry(head_state, workdir_state, stage_state)
}

/// A path can appear twice (staged deletion plus an untracked re-creation).
fn insert_entry(entries: &mut BTreeMap<String, StatusEntry>, entry: StatusEntry) {
    match entries.get_mut(&entry.path) {
        Some(existing) => {
            existing.head_state = FileState::Modified;
            if existing.stage_state == FileState::Unmodified {
                existing.stage_state = entry.stage_state;
            }
            if entry.workdir_state != FileState::Unmodified {
                existing.workdir_state = entry.workdir_state;
            }
        }
        None => {
            entries.insert(entry.path.clone(), entry);
        }
    }
}
