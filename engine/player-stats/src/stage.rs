//! Stage plumbing shared by every pipeline binary: freshness checks,
//! atomic artifact writes and process exit codes.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::SystemTime;

use tracing::{error, info};

/// Process exit code for a fatal failure
pub const EXIT_FAILURE: u8 = 1;

/// Process exit code when the target artifact is already complete
pub const EXIT_NOTHING_TO_DO: u8 = 2;

/// How a stage ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// New output was written
    Completed,
    /// The target was already up to date
    NothingToDo,
}

impl StageOutcome {
    pub fn exit_code(self) -> u8 {
        match self {
            StageOutcome::Completed => 0,
            StageOutcome::NothingToDo => EXIT_NOTHING_TO_DO,
        }
    }
}

/// Convert a stage result into the process exit code, logging failures
pub fn finish(stage: &str, result: anyhow::Result<StageOutcome>) -> ExitCode {
    match result {
        Ok(outcome) => {
            if outcome == StageOutcome::NothingToDo {
                info!("{stage}: nothing to do");
            }
            ExitCode::from(outcome.exit_code())
        }
        Err(err) => {
            error!("{stage} failed: {err:#}");
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// True when `output` exists and is at least as new as every input
pub fn is_up_to_date(output: &Path, inputs: &[&Path]) -> bool {
    let Some(out_time) = modified(output) else {
        return false;
    };
    inputs.iter().all(|input| modified(input).is_some_and(|t| t <= out_time))
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `path` through a temporary sibling that is renamed into place on
/// success, so a failed write leaves the previous artifact untouched
pub fn write_atomically<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(path);
    let result = (|| {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        write(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    })();
    match result {
        Ok(()) => fs::rename(&tmp, path),
        Err(err) => {
            let _ = fs::remove_file(&tmp);
            Err(err)
        }
    }
}
