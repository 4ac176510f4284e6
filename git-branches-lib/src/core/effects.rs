//! Wrappers around various side effects.

use std::fmt::{Debug, Display, Write};
use std::io::{self, stderr, stdout, Write as WriteIo};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bstr::ByteSlice;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use lazy_static::lazy_static;
use tracing::warn;

use crate::core::formatting::Glyphs;

#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OperationType {
    FetchCommit(Arc<String>),
    GatherBranches,
    PlanUpdate,
    QueryForge(Arc<String>),
    QueryRemote,
    RunGitCommand(Arc<String>),
}

impl Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::FetchCommit(sha) => write!(f, "Fetching commit {sha}"),
            OperationType::GatherBranches => write!(f, "Examining local branches"),
            OperationType::PlanUpdate => write!(f, "Planning branch updates"),
            OperationType::QueryForge(branch) => {
                write!(f, "Looking up change request for {branch}")
            }
            OperationType::QueryRemote => write!(f, "Querying remote branches"),
            OperationType::RunGitCommand(command) => {
                write!(f, "Running Git command: {command}")
            }
        }
    }
}

#[derive(Clone, Debug)]
enum OutputDest {
    Stdout,
    Suppress,
    BufferForTest {
        stdout: Arc<Mutex<Vec<u8>>>,
        stderr: Arc<Mutex<Vec<u8>>>,
    },
}

/// Spinners for the operations currently in progress, innermost last.
#[derive(Debug, Default)]
struct ActiveOperations {
    operations: Vec<(OperationType, ProgressBar)>,
}

impl ActiveOperations {
    /// Run `f` with the spinners hidden, so that its output isn't clobbered.
    fn suspend<T>(&self, f: impl FnOnce() -> T) -> T {
        match self.operations.last() {
            Some((_, progress_bar)) => progress_bar.suspend(f),
            None => f(),
        }
    }
}

/// Wrapper around side-effectful operations, such as output and progress
/// indicators. One of these is created per invocation and handed to whatever
/// needs to write to the terminal.
#[derive(Clone)]
pub struct Effects {
    glyphs: Glyphs,
    dest: OutputDest,
    active_operations: Arc<Mutex<ActiveOperations>>,
}

impl Debug for Effects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<Effects fancy={}>",
            self.glyphs.should_write_ansi_escape_codes
        )
    }
}

impl Effects {
    /// Constructor. Writes to stdout.
    pub fn new(glyphs: Glyphs) -> Self {
        Effects {
            glyphs,
            dest: OutputDest::Stdout,
            active_operations: Default::default(),
        }
    }

    /// Constructor. Writes to the provided buffer.
    pub fn new_from_buffer_for_test(
        glyphs: Glyphs,
        stdout: &Arc<Mutex<Vec<u8>>>,
        stderr: &Arc<Mutex<Vec<u8>>>,
    ) -> Self {
        Effects {
            glyphs,
            dest: OutputDest::BufferForTest {
                stdout: Arc::clone(stdout),
                stderr: Arc::clone(stderr),
            },
            active_operations: Default::default(),
        }
    }

    /// Suppress output sent to the returned `Effects`.
    pub fn suppress(&self) -> Self {
        Self {
            dest: OutputDest::Suppress,
            ..self.clone()
        }
    }

    /// Start reporting progress for the specified operation type.
    ///
    /// A spinner is shown on stderr until the returned `ProgressHandle` is
    /// dropped. Nothing is drawn unless stderr is a terminal.
    pub fn start_operation(&self, operation_type: OperationType) -> ProgressHandle<'_> {
        lazy_static! {
            static ref SPINNER_STYLE: ProgressStyle =
                ProgressStyle::default_spinner().template("{spinner} {wide_msg}").unwrap();
        }

        let handle = ProgressHandle {
            effects: self,
            operation_type: operation_type.clone(),
        };
        match self.dest {
            OutputDest::Stdout => {}
            OutputDest::Suppress | OutputDest::BufferForTest { .. } => return handle,
        }
        if !console::user_attended_stderr() {
            return handle;
        }

        let progress_bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        progress_bar.set_style(SPINNER_STYLE.clone());
        progress_bar.set_message(operation_type.to_string());
        progress_bar.enable_steady_tick(Duration::from_millis(100));

        let mut active_operations = self.active_operations.lock().unwrap();
        active_operations
            .operations
            .push((operation_type, progress_bar));
        handle
    }

    fn on_drop_progress_handle(&self, operation_type: &OperationType) {
        match self.dest {
            OutputDest::Stdout => {}
            OutputDest::Suppress | OutputDest::BufferForTest { .. } => return,
        }

        let mut active_operations = self.active_operations.lock().unwrap();
        let position = active_operations
            .operations
            .iter()
            .rposition(|(active_type, _)| active_type == operation_type);
        match position {
            Some(position) => {
                let (_, progress_bar) = active_operations.operations.remove(position);
                progress_bar.finish_and_clear();
            }
            None if console::user_attended_stderr() => {
                drop(active_operations); // Avoid potential deadlock.
                warn!(?operation_type, "Progress operation ended without matching start call");
            }
            None => {}
        }
    }

    /// Get the set of glyphs associated with the output.
    pub fn get_glyphs(&self) -> &Glyphs {
        &self.glyphs
    }

    /// Create a stream that can be written to. The output might go to stdout or
    /// be rendered specially in the terminal.
    pub fn get_output_stream(&self) -> OutputStream {
        OutputStream {
            dest: self.dest.clone(),
            active_operations: Arc::clone(&self.active_operations),
        }
    }

    /// Create a stream that error output can be written to, rather than regular
    /// output.
    pub fn get_error_stream(&self) -> ErrorStream {
        ErrorStream {
            dest: self.dest.clone(),
            active_operations: Arc::clone(&self.active_operations),
        }
    }
}

/// A handle to stdout, but doesn't overwrite interactive progress notifications.
pub struct OutputStream {
    dest: OutputDest,
    active_operations: Arc<Mutex<ActiveOperations>>,
}

impl Write for OutputStream {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        match &self.dest {
            OutputDest::Stdout => {
                let active_operations = self.active_operations.lock().unwrap();
                active_operations
                    .suspend(|| {
                        let mut stdout = stdout();
                        stdout.write_all(s.as_bytes())?;
                        stdout.flush()
                    })
                    .map_err(|_| std::fmt::Error)?;
            }

            OutputDest::Suppress => {
                // Do nothing.
            }

            OutputDest::BufferForTest { stdout, stderr: _ } => {
                let mut buffer = stdout.lock().unwrap();
                buffer.extend_from_slice(s.as_bytes());
            }
        }
        Ok(())
    }
}

/// A handle to stderr, but doesn't overwrite interactive progress notifications.
pub struct ErrorStream {
    dest: OutputDest,
    active_operations: Arc<Mutex<ActiveOperations>>,
}

impl ErrorStream {
    fn write_bytes(&mut self, buf: &[u8]) -> io::Result<()> {
        match &self.dest {
            OutputDest::Stdout => {
                let active_operations = self.active_operations.lock().unwrap();
                active_operations.suspend(|| {
                    let mut stderr = stderr();
                    stderr.write_all(buf)?;
                    stderr.flush()
                })
            }

            OutputDest::Suppress => {
                // Do nothing.
                Ok(())
            }

            OutputDest::BufferForTest { stdout: _, stderr } => {
                let mut buffer = stderr.lock().unwrap();
                buffer.extend_from_slice(buf);
                Ok(())
            }
        }
    }
}

impl Write for ErrorStream {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.write_bytes(s.as_bytes()).map_err(|_| std::fmt::Error)
    }
}

/// You probably don't want this. This implementation is only for `tracing`'s `fmt_layer`, because
/// it needs a writer of type `io::Write`, but `Effects` normally uses its implementation of
/// `fmt::Write`.
impl io::Write for ErrorStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf.to_str_lossy().as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A handle to an operation in progress. This object should be kept live while
/// the operation is underway.
#[derive(Debug)]
pub struct ProgressHandle<'a> {
    effects: &'a Effects,
    operation_type: OperationType,
}

impl Drop for ProgressHandle<'_> {
    fn drop(&mut self) {
        self.effects.on_drop_progress_handle(&self.operation_type)
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write;

    use super::{Arc, Effects, Glyphs, Mutex, OperationType};

    #[test]
    fn test_buffered_streams() -> eyre::Result<()> {
        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let effects = Effects::new_from_buffer_for_test(Glyphs::text(), &stdout, &stderr);

        {
            let _progress = effects.start_operation(OperationType::GatherBranches);
            writeln!(effects.get_output_stream(), "table")?;
            writeln!(effects.get_error_stream(), "warning")?;
        }
        writeln!(effects.suppress().get_output_stream(), "hidden")?;

        assert_eq!(String::from_utf8(stdout.lock().unwrap().clone())?, "table\n");
        assert_eq!(String::from_utf8(stderr.lock().unwrap().clone())?, "warning\n");
        Ok(())
    }

    #[test]
    fn test_operation_display() {
        insta::assert_snapshot!(
            OperationType::RunGitCommand(Arc::new("git checkout main".to_string())),
            @"Running Git command: git checkout main"
        );
    }
}
