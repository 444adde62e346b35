/*
 * Produces the merged text artifact: an optional prompt and rules header, a banner,
 * a directory summary of the included files, and then every file with line numbers.
 * Unreadable files are reported inline and do not stop the merge. Cancellation is
 * checked before each file; a cancelled merge leaves the partial output on disk.
 */
use super::projects::now_timestamp;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use time::macros::format_description;

const BANNER_WIDTH: usize = 80;
const PROMPT_RULE_WIDTH: usize = 64;

#[derive(Debug)]
pub enum MergeError {
    EmptySelection,
    Io(io::Error),
    // The background merge thread stopped without producing a result.
    Worker(String),
}

impl From<io::Error> for MergeError {
    fn from(err: io::Error) -> Self {
        MergeError::Io(err)
    }
}

impl std::fmt::Display for MergeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeError::EmptySelection => write!(f, "No files selected to merge"),
            MergeError::Io(e) => write!(f, "Failed to write merged file: {e}"),
            MergeError::Worker(msg) => write!(f, "Merge worker failed: {msg}"),
        }
    }
}

impl std::error::Error for MergeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MergeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MergeError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Completed {
        files_written: usize,
        output_path: PathBuf,
    },
    Cancelled {
        files_written: usize,
        output_path: PathBuf,
    },
}

/*
 * Receives progress from a running merge. `report` is called once per file before it
 * is written, with a 1-based index and the file's base name. `is_cancelled` is polled
 * at file boundaries.
 */
pub trait MergeProgressOperations: Send + Sync {
    fn report(&self, index: usize, total: usize, label: &str);
    fn finish(&self, total: usize);
    fn is_cancelled(&self) -> bool;
}

pub struct NoopMergeProgress;

impl MergeProgressOperations for NoopMergeProgress {
    fn report(&self, _index: usize, _total: usize, _label: &str) {}
    fn finish(&self, _total: usize) {}
    fn is_cancelled(&self) -> bool {
        false
    }
}

// Everything a merge needs, captured before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    pub files: Vec<PathBuf>,
    pub output_path: PathBuf,
    pub prompt: String,
    pub rules: String,
}

pub trait MergeWriterOperations: Send + Sync {
    fn merge(
        &self,
        request: &MergeRequest,
        progress: &dyn MergeProgressOperations,
    ) -> Result<MergeOutcome>;
}

pub struct CoreMergeWriter {}

impl CoreMergeWriter {
    pub fn new() -> Self {
        CoreMergeWriter {}
    }
}

impl Default for CoreMergeWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeWriterOperations for CoreMergeWriter {
    fn merge(
        &self,
        request: &MergeRequest,
        progress: &dyn MergeProgressOperations,
    ) -> Result<MergeOutcome> {
        if request.files.is_empty() {
            return Err(MergeError::EmptySelection);
        }
        if let Some(parent) = request.output_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        log::info!(
            "CoreMergeWriter: Merging {} files into {:?}.",
            request.files.len(),
            request.output_path
        );
        let file = File::create(&request.output_path)?;
        let mut out = BufWriter::new(file);
        let created_at = banner_timestamp();
        let (files_written, cancelled) = write_merged(&mut out, request, progress, &created_at)?;
        out.flush()?;

        if cancelled {
            log::info!("CoreMergeWriter: Merge cancelled after {files_written} files.");
            Ok(MergeOutcome::Cancelled {
                files_written,
                output_path: request.output_path.clone(),
            })
        } else {
            progress.finish(files_written);
            log::info!("CoreMergeWriter: Merge complete, {files_written} files written.");
            Ok(MergeOutcome::Completed {
                files_written,
                output_path: request.output_path.clone(),
            })
        }
    }
}

fn banner_timestamp() -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    now_timestamp()
        .format(&format)
        .unwrap_or_else(|_| String::from("unknown time"))
}

fn write_text_block<W: Write>(out: &mut W, text: &str, prefix: &str) -> io::Result<()> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    if trimmed.starts_with(prefix) {
        writeln!(out, "{trimmed}")?;
    } else {
        writeln!(out, "{prefix}\n{trimmed}")?;
    }
    writeln!(out, "{}", "~".repeat(PROMPT_RULE_WIDTH))
}

/*
 * Writes the whole artifact to `out`. Returns the number of files written and whether
 * the merge stopped because of cancellation.
 */
pub fn write_merged<W: Write>(
    out: &mut W,
    request: &MergeRequest,
    progress: &dyn MergeProgressOperations,
    created_at: &str,
) -> io::Result<(usize, bool)> {
    let total = request.files.len();
    let banner = "=".repeat(BANNER_WIDTH);
    let delimiter = "-".repeat(BANNER_WIDTH);

    write_text_block(out, &request.prompt, "GOAL:")?;
    write_text_block(out, &request.rules, "RULES:")?;

    writeln!(out, "{banner}")?;
    writeln!(out, "MERGED FILE - Created {created_at}")?;
    writeln!(out, "Contains {total} files")?;
    writeln!(out, "{banner}")?;
    writeln!(out)?;
    writeln!(out, "{}", generate_file_structure(&request.files))?;
    writeln!(out)?;
    writeln!(out, "{banner}")?;

    let mut written = 0;
    for (i, path) in request.files.iter().enumerate() {
        if progress.is_cancelled() {
            return Ok((written, true));
        }
        let base_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        progress.report(i + 1, total, &base_name);

        writeln!(out)?;
        writeln!(out, "{delimiter}")?;
        writeln!(out, "FILE: {}", path.display())?;
        writeln!(out, "{delimiter}")?;
        writeln!(out)?;
        write_numbered_file(out, path, &base_name)?;
        writeln!(out)?;
        written += 1;
    }

    writeln!(out, "{banner}")?;
    writeln!(out, "END OF MERGED FILE - {written} files")?;
    writeln!(out, "{banner}")?;
    Ok((written, false))
}

/*
 * Copies one file into `out` line by line with a 5-wide line number, trailing
 * whitespace trimmed and invalid UTF-8 replaced. A file that cannot be opened or read
 * gets an inline error line; lines already written before a read error stay.
 */
fn write_numbered_file<W: Write>(out: &mut W, path: &Path, base_name: &str) -> io::Result<()> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => return write_read_error(out, path, base_name, &e),
    };
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    let mut number = 0;
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => return Ok(()),
            Ok(_) => {
                number += 1;
                writeln!(out, "{:5} {}", number, String::from_utf8_lossy(&line).trim_end())?;
            }
            Err(e) => return write_read_error(out, path, base_name, &e),
        }
    }
}

fn write_read_error<W: Write>(
    out: &mut W,
    path: &Path,
    base_name: &str,
    err: &io::Error,
) -> io::Result<()> {
    log::warn!("CoreMergeWriter: Could not read {path:?}: {err}");
    writeln!(out, "ERROR: Could not read file '{base_name}': {err}")
}

fn common_ancestor(files: &[PathBuf]) -> Option<PathBuf> {
    let mut iter = files.iter();
    let first = iter.next()?;
    let mut common = first.parent()?.to_path_buf();
    for path in iter {
        while !path.starts_with(&common) {
            if !common.pop() {
                return None;
            }
        }
    }
    // The filesystem root alone does not count as a shared ancestor.
    common.parent()?;
    Some(common)
}

/*
 * Lists the files grouped by their directory, directories and files sorted. With a
 * shared ancestor the directories are shown relative to it (the ancestor itself as
 * "."), otherwise as absolute paths.
 */
pub fn generate_file_structure(files: &[PathBuf]) -> String {
    if files.is_empty() {
        return "DIRECTORY STRUCTURE:\n(No files selected)".to_string();
    }
    let common = common_ancestor(files);

    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for file in files {
        let dir = file.parent().unwrap_or_else(|| Path::new(""));
        let display_dir = match &common {
            Some(base) => match dir.strip_prefix(base) {
                Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => dir.display().to_string(),
            },
            None => dir.display().to_string(),
        };
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        groups.entry(display_dir).or_default().push(name);
    }

    let mut lines = vec!["DIRECTORY STRUCTURE:".to_string()];
    if let Some(base) = &common {
        lines.push(format!("Base: {}", base.display()));
    }
    for (dir, mut names) in groups {
        names.sort();
        lines.push(String::new());
        lines.push(format!("Directory: {dir}"));
        lines.extend(names.into_iter().map(|n| format!("  |- {n}")));
    }
    lines.join("\n")
}
