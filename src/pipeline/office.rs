//! External office-suite adapter (LibreOffice / soffice).
//!
//! The suite is driven in headless batch mode:
//!
//! ```text
//! soffice -env:UserInstallation=file://<out>/.profile \
//!         --headless --convert-to pdf --outdir <out> <input>
//! ```
//!
//! It writes `<input-stem>.pdf` into `<out>` and there is no way to ask for a
//! different name, so the output is discovered by that convention. A clean
//! exit without the file is a failure.
//!
//! Each run gets its own user profile under the output directory. Two
//! instances sharing the default profile block on its lock file, which
//! under concurrent requests looks exactly like a hang.

use crate::config::ConverterConfig;
use crate::error::ToolError;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info};

/// Bytes of stderr kept in [`ToolError::ExitStatus`].
const STDERR_KEEP: usize = 512;

/// Locates and runs the office suite.
#[derive(Debug, Clone)]
pub struct OfficeSuite {
    candidates: Vec<String>,
    explicit: Option<PathBuf>,
    timeout: Duration,
}

impl OfficeSuite {
    pub fn new(config: &ConverterConfig) -> Self {
        Self {
            candidates: config.office_programs.clone(),
            explicit: config.office_program.clone(),
            timeout: config.office_timeout(),
        }
    }

    /// Resolve the program to run. Not cached: the suite may be installed
    /// or removed while the process is running.
    pub fn locate(&self) -> Result<PathBuf, ToolError> {
        if let Some(explicit) = &self.explicit {
            return find_program(&explicit.to_string_lossy()).ok_or_else(|| {
                ToolError::Unavailable {
                    searched: explicit.display().to_string(),
                }
            });
        }
        self.candidates
            .iter()
            .find_map(|name| find_program(name))
            .ok_or_else(|| ToolError::Unavailable {
                searched: self.candidates.join(", "),
            })
    }

    /// Convert `input` to `<out_dir>/<input-stem>.pdf`.
    pub async fn convert_to_pdf(&self, input: &Path, out_dir: &Path) -> Result<PathBuf, ToolError> {
        let program = self.locate()?;
        let program_name = program.display().to_string();
        let profile = out_dir.join(".profile");

        let mut cmd = Command::new(&program);
        cmd.arg(format!("-env:UserInstallation={}", file_url(&profile)))
            .args(["--headless", "--convert-to", "pdf", "--outdir"])
            .arg(out_dir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {} on {}", program_name, input.display());
        let start = Instant::now();

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::Spawn {
                    program: program_name,
                    detail: e.to_string(),
                })
            }
            Err(_) => {
                return Err(ToolError::TimedOut {
                    program: program_name,
                    after: self.timeout,
                })
            }
        };

        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.len() > STDERR_KEEP {
                let cut = (0..=STDERR_KEEP)
                    .rev()
                    .find(|&i| stderr.is_char_boundary(i))
                    .unwrap_or(0);
                stderr.truncate(cut);
            }
            return Err(ToolError::ExitStatus {
                program: program_name,
                status: output.status.to_string(),
                stderr,
            });
        }

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let expected = out_dir.join(format!("{stem}.pdf"));
        if !expected.is_file() {
            return Err(ToolError::MissingOutput {
                program: program_name,
                expected,
            });
        }

        info!(
            "{} converted {} in {}ms",
            program_name,
            input.display(),
            start.elapsed().as_millis()
        );
        Ok(expected)
    }
}

/// Look `name` up on `PATH`, or check it directly when it contains a path
/// separator.
fn find_program(name: &str) -> Option<PathBuf> {
    let as_path = Path::new(name);
    if as_path.components().count() > 1 || as_path.is_absolute() {
        return is_executable(as_path).then(|| as_path.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{name}.exe"));
            if is_executable(&exe) {
                return Some(exe);
            }
        }
        None
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Bytes left as-is in a `file://` path; everything else is `%XX`.
const URL_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b':')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn file_url(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    let encoded = utf8_percent_encode(&s, URL_PATH);
    if s.starts_with('/') {
        format!("file://{encoded}")
    } else {
        format!("file:///{encoded}")
    }
}
