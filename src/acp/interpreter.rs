//! Interpreter resolution for agents shipped as scripts.
//!
//! Many agents are distributed as a script with a shebang such as
//! `#!/usr/bin/env node`. GUI-launched hosts often lack the user's shell
//! `PATH`, so `env` cannot find the interpreter. An [`InterpreterProbe`]
//! recognises scripts for one interpreter by their first line only, and
//! [`resolve_launch`] then locates the interpreter binary explicitly.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info};

use crate::config::{expand_home, InterpreterConfig};

/// Bytes read from the head of a file when looking for a shebang.
pub const SHEBANG_PROBE_BYTES: usize = 256;

/// Strategy deciding whether a file is a script for a given interpreter.
pub trait InterpreterProbe: Send + Sync + std::fmt::Debug {
    /// Interpreter binary name searched for, e.g. `node`.
    fn interpreter_name(&self) -> &str;

    /// Whether `first_line` (without the newline) marks a script for this
    /// interpreter.
    fn matches(&self, first_line: &str) -> bool;

    /// Directories searched, in priority order, for the interpreter.
    fn search_dirs(&self) -> Vec<PathBuf>;
}

/// Shebang-based probe for a named interpreter.
///
/// Matches `#!/path/to/<name>` and `#!/usr/bin/env [-S] <name>` forms.
#[derive(Debug, Clone)]
pub struct ShebangProbe {
    name: String,
    pattern: Option<Regex>,
    search_dirs: Vec<String>,
}

impl ShebangProbe {
    /// Probe for `name`, searching `search_dirs` (`~` and globs allowed).
    #[must_use]
    pub fn new(name: &str, search_dirs: Vec<String>) -> Self {
        let escaped = regex::escape(name);
        let pattern = Regex::new(&format!(
            r"^#!\s*(?:\S*/env(?:\s+-\S+)*\s+|\S*/)?{escaped}(?:\s|$)"
        ))
        .ok();
        Self {
            name: name.to_owned(),
            pattern,
            search_dirs,
        }
    }

    /// Node.js probe with the default search list.
    #[must_use]
    pub fn node() -> Self {
        Self::from_config(&InterpreterConfig::default())
    }

    /// Probe described by configuration.
    #[must_use]
    pub fn from_config(config: &InterpreterConfig) -> Self {
        Self::new(&config.name, config.search_dirs.clone())
    }
}

impl InterpreterProbe for ShebangProbe {
    fn interpreter_name(&self) -> &str {
        &self.name
    }

    fn matches(&self, first_line: &str) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(first_line))
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        for raw in &self.search_dirs {
            let expanded = expand_home(raw);
            let pattern = expanded.to_string_lossy();
            if !pattern.contains(['*', '?', '[']) {
                dirs.push(expanded);
                continue;
            }
            let Ok(paths) = glob::glob(&pattern) else {
                debug!(pattern = %pattern, "interpreter: invalid search glob, skipping");
                continue;
            };
            // Newest versions sort last; prefer them.
            let mut matched: Vec<PathBuf> = paths.filter_map(std::result::Result::ok).collect();
            matched.sort_by_cached_key(|path| version_key(path));
            dirs.extend(matched.into_iter().rev());
        }
        dirs
    }
}

/// One run of a path compared by [`version_key`].
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum VersionPart {
    Number(u64),
    Text(String),
}

/// Ordering key that compares digit runs numerically, so `v9.11.2` sorts
/// before `v22.3.0`.
fn version_key(path: &Path) -> Vec<VersionPart> {
    let text = path.to_string_lossy();
    let mut parts = Vec::new();
    let mut rest: &str = &text;
    while let Some(first) = rest.chars().next() {
        let digits = first.is_ascii_digit();
        let end = rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(rest.len());
        let (run, tail) = rest.split_at(end);
        parts.push(if digits {
            run.parse()
                .map_or_else(|_| VersionPart::Text(run.to_owned()), VersionPart::Number)
        } else {
            VersionPart::Text(run.to_owned())
        });
        rest = tail;
    }
    parts
}

/// The program and leading arguments to actually execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTarget {
    /// Executable handed to the OS.
    pub program: PathBuf,
    /// Arguments placed before the caller's arguments.
    pub leading_args: Vec<PathBuf>,
    /// Directory whose binaries should win on `PATH`.
    pub path_dir: Option<PathBuf>,
}

/// Read the first line of `path`, looking at no more than
/// [`SHEBANG_PROBE_BYTES`] bytes.
#[must_use]
pub fn read_first_line(path: &Path) -> Option<String> {
    let mut head = [0u8; SHEBANG_PROBE_BYTES];
    let mut file = File::open(path).ok()?;
    let n = file.read(&mut head).ok()?;
    let head = &head[..n];
    if !head.starts_with(b"#!") {
        return None;
    }
    let end = head.iter().position(|b| *b == b'\n').unwrap_or(head.len());
    Some(String::from_utf8_lossy(&head[..end]).trim_end().to_owned())
}

/// Decide how to launch `path`.
///
/// If the probe recognises `path` as a script, the interpreter is looked up
/// in the script's own directory (after resolving symlinks), then in the
/// probe's search directories. When nothing is found, or the file is not a
/// script, `path` is launched as-is.
#[must_use]
pub fn resolve_launch(path: &Path, probe: &dyn InterpreterProbe) -> LaunchTarget {
    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let own_dir = resolved.parent().map(Path::to_path_buf);

    let literal = LaunchTarget {
        program: path.to_path_buf(),
        leading_args: Vec::new(),
        path_dir: own_dir.clone(),
    };

    let Some(first_line) = read_first_line(&resolved) else {
        return literal;
    };
    if !probe.matches(&first_line) {
        return literal;
    }

    let name = probe.interpreter_name();
    let candidates = own_dir
        .iter()
        .cloned()
        .chain(probe.search_dirs())
        .map(|dir| dir.join(name));

    for candidate in candidates {
        if is_executable(&candidate) {
            info!(
                script = %resolved.display(),
                interpreter = %candidate.display(),
                "interpreter: resolved script interpreter"
            );
            let path_dir = candidate.parent().map(Path::to_path_buf);
            return LaunchTarget {
                program: candidate,
                leading_args: vec![resolved],
                path_dir,
            };
        }
    }

    debug!(
        script = %resolved.display(),
        interpreter = name,
        "interpreter: not found in search dirs, launching script directly"
    );
    literal
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
