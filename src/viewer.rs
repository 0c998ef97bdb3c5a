//! Displaying candidate duplicates to the user.
//!
//! The search command hands every group it reports to a [`Viewer`]. The
//! viewer answers whether the search should go on to the next group, which is
//! the only way to cut a search short.

use std::path::PathBuf;
use std::process::Command;

/// Placeholder in viewer arguments replaced by the group title.
pub const TITLE_PLACEHOLDER: &str = "{title}";

/// Errors from launching a viewer.
#[derive(thiserror::Error, Debug)]
pub enum ViewerError {
    /// The viewer command line is empty.
    #[error("No viewer program configured")]
    NoProgram,

    /// The viewer program could not be started.
    #[error("Failed to start viewer '{program}': {source}")]
    Spawn {
        /// Program name
        program: String,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Something that shows a group of images and decides whether to continue.
pub trait Viewer {
    /// Show `files` under `title`.
    ///
    /// Returns `Ok(false)` when the user asked to stop.
    fn present(&mut self, title: &str, files: &[PathBuf]) -> Result<bool, ViewerError>;
}

/// Viewer for headless runs. Shows nothing and always continues.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopViewer;

impl Viewer for NoopViewer {
    fn present(&mut self, _title: &str, _files: &[PathBuf]) -> Result<bool, ViewerError> {
        Ok(true)
    }
}

/// Runs an external image viewer and waits for it to exit.
///
/// A successful exit means "show the next group"; any other exit status
/// stops the search.
#[derive(Debug, Clone)]
pub struct ExternalViewer {
    program: String,
    args: Vec<String>,
}

impl ExternalViewer {
    /// Build a viewer from a command line such as `feh --title {title}`.
    ///
    /// # Errors
    ///
    /// Returns [`ViewerError::NoProgram`] for an empty command line.
    pub fn from_command_line(command: &str) -> Result<Self, ViewerError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(ViewerError::NoProgram)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// The program that will be run.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, title: &str, files: &[PathBuf]) -> Command {
        let mut cmd = Command::new(&self.program);
        for arg in &self.args {
            cmd.arg(arg.replace(TITLE_PLACEHOLDER, title));
        }
        cmd.args(files);
        cmd
    }
}

impl Viewer for ExternalViewer {
    fn present(&mut self, title: &str, files: &[PathBuf]) -> Result<bool, ViewerError> {
        if files.is_empty() {
            return Ok(true);
        }
        log::debug!("Opening {} files in {}", files.len(), self.program);
        let status = self
            .command(title, files)
            .status()
            .map_err(|source| ViewerError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !status.success() {
            log::info!("Viewer exited with {}, stopping", status);
        }
        Ok(status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_viewer_continues() {
        let mut viewer = NoopViewer;
        assert!(viewer.present("set", &[PathBuf::from("/a.png")]).unwrap());
    }

    #[test]
    fn test_parse_command_line() {
        let viewer = ExternalViewer::from_command_line("feh --title {title}").unwrap();
        assert_eq!(viewer.program(), "feh");
        let cmd = viewer.command("Binary equal (set #1)", &[PathBuf::from("/a.png")]);
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(args, vec!["--title", "Binary equal (set #1)", "/a.png"]);
    }

    #[test]
    fn test_empty_command_line() {
        assert!(matches!(
            ExternalViewer::from_command_line("  "),
            Err(ViewerError::NoProgram)
        ));
    }

    #[test]
    fn test_missing_program() {
        let mut viewer =
            ExternalViewer::from_command_line("imagedups-no-such-viewer-program").unwrap();
        let err = viewer.present("t", &[PathBuf::from("/a.png")]).unwrap_err();
        assert!(matches!(err, ViewerError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_controls_continuation() {
        let mut ok = ExternalViewer::from_command_line("true").unwrap();
        assert!(ok.present("t", &[PathBuf::from("/a.png")]).unwrap());

        let mut stop = ExternalViewer::from_command_line("false").unwrap();
        assert!(!stop.present("t", &[PathBuf::from("/a.png")]).unwrap());
    }
}
