use crate::models::DriverConfig;
use regex::Regex;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use thiserror::Error;

/// Environment variable through which [`CommandDriver`] hands the sync
/// preamble to the external program, with non-printable bytes escaped.
pub const SYNC_PREFIX_ENV: &str = "UPDATER_SYNC_PREFIX";

/// Receives progress reports from an update driver.
///
/// Called zero or more times, in any order, from the thread running the driver.
pub trait ProgressSink: Send + Sync {
    /// `fraction` is in `[0, 1]` when known; `None` means indeterminate.
    fn report(&self, status_text: Option<&str>, fraction: Option<f64>);
}

/// The component that actually transfers an image to a device.
///
/// `update` blocks until the transfer finished or failed.
pub trait UpdateDriver: Send + Sync {
    fn update(
        &self,
        device_id: &str,
        image: &[u8],
        progress: &dyn ProgressSink,
        sync_prefix: &[u8],
    ) -> Result<(), DriverError>;
}

/// Failures raised by an update driver
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Protocol(String),

    #[error("{0}")]
    Failed(String),

    #[error("{0}")]
    NotConfigured(String),
}

impl DriverError {
    /// Stable name of the failure category
    pub fn category(&self) -> &'static str {
        match self {
            DriverError::Timeout(_) => "TimeoutError",
            DriverError::Io(_) => "IOError",
            DriverError::Protocol(_) => "ProtocolError",
            DriverError::Failed(_) => "DriverError",
            DriverError::NotConfigured(_) => "ConfigurationError",
        }
    }

    /// Category and message, as surfaced to the user when a run fails.
    ///
    /// e.g. `TimeoutError no response`
    pub fn describe(&self) -> String {
        format!("{} {}", self.category(), self)
    }
}

/// Update driver that delegates to an external flashing program.
///
/// The program is started with the configured arguments (`{device}` replaced by
/// the device identifier), receives the sync preamble in [`SYNC_PREFIX_ENV`] and
/// the image on stdin. Each line it prints on stdout becomes a progress report:
///
/// - `Writing [42%]` → status "Writing", 42 %
/// - `[7.5%]` → no status, 7.5 %
/// - `Erasing flash` → status "Erasing flash", indeterminate
///
/// A non-zero exit status fails the run with the last line printed on stderr.
pub struct CommandDriver {
    program: String,
    args: Vec<String>,

    /// Matches a trailing `[NN%]` progress marker
    progress_pattern: Regex,
}

impl CommandDriver {
    pub fn new(config: &DriverConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            progress_pattern: Regex::new(r"^(?P<text>.*?)\s*\[\s*(?P<pct>\d{1,3}(?:\.\d+)?)\s*%\s*\]\s*$")
                .expect("Invalid progress regex"),
        }
    }

    /// Arguments for a run against `device_id`
    pub fn build_args(&self, device_id: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace("{device}", device_id))
            .collect()
    }

    /// Translate one line of program output into `(status_text, fraction)`.
    ///
    /// Blank lines carry no report.
    pub fn parse_progress_line(&self, line: &str) -> Option<(Option<String>, Option<f64>)> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(caps) = self.progress_pattern.captures(line) {
            let text = caps
                .name("text")
                .map(|m| m.as_str().trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            let fraction = caps
                .name("pct")
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .map(|pct| pct / 100.0);
            return Some((text, fraction));
        }

        Some((Some(line.to_string()), None))
    }
}

impl UpdateDriver for CommandDriver {
    fn update(
        &self,
        device_id: &str,
        image: &[u8],
        progress: &dyn ProgressSink,
        sync_prefix: &[u8],
    ) -> Result<(), DriverError> {
        if self.program.is_empty() {
            return Err(DriverError::NotConfigured(
                "no update driver program configured".to_string(),
            ));
        }

        let args = self.build_args(device_id);
        tracing::info!("Executing: {} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .env(SYNC_PREFIX_ENV, sync_prefix.escape_ascii().to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (Some(mut stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            kill_and_reap(&mut child);
            return Err(DriverError::Failed(
                "update driver pipes were not available".to_string(),
            ));
        };

        // Feed stdin and drain stderr on their own threads so neither pipe can
        // fill up while stdout is being read
        let image = image.to_vec();
        let writer = thread::spawn(move || stdin.write_all(&image));
        let stderr_reader = thread::spawn(move || {
            let mut last = None;
            let _ = for_each_line(stderr, |line| {
                if !line.trim().is_empty() {
                    last = Some(line.to_string());
                }
            });
            last
        });

        let forwarded = for_each_line(stdout, |line| {
            tracing::debug!("driver: {}", line);
            if let Some((text, fraction)) = self.parse_progress_line(line) {
                progress.report(text.as_deref(), fraction);
            }
        });

        // The run is only over once the program is; never leave it running
        let status = match forwarded.and_then(|()| child.wait()) {
            Ok(status) => status,
            Err(e) => {
                tracing::error!("Lost track of update driver, terminating it: {}", e);
                kill_and_reap(&mut child);
                let _ = writer.join();
                let _ = stderr_reader.join();
                return Err(DriverError::Io(e));
            }
        };
        let write_result = writer.join();
        let last_stderr = stderr_reader.join().ok().flatten();

        if !status.success() {
            let detail = last_stderr.unwrap_or_else(|| "no diagnostic output".to_string());
            return Err(DriverError::Failed(format!("exited with {status}: {detail}")));
        }

        // A program that exits successfully without consuming the whole image is trusted
        match write_result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            Ok(Err(e)) => Err(DriverError::Io(e)),
            Err(_) => Err(DriverError::Failed(
                "image writer thread panicked".to_string(),
            )),
        }
    }
}

/// Call `f` with every line of `reader`, without line terminators.
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the stream.
fn for_each_line<R: Read, F: FnMut(&str)>(reader: R, mut f: F) -> io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        f(line.trim_end_matches(['\r', '\n']));
    }
}

fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::debug!("Update driver already exited: {}", e);
    }
    if let Err(e) = child.wait() {
        tracing::warn!("Failed to reap update driver: {}", e);
    }
}
