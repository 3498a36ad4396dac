use crate::error::{Error, Result};
use crossbeam::channel::unbounded;
use eyre::{eyre, WrapErr};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long output readers may run on after the child exits before they are detached. Pipes stay
/// open while a grandchild holds them.
const READER_GRACE: Duration = Duration::from_secs(2);

#[cfg(target_os = "macos")]
const LIBRARY_PATH_VAR: &str = "DYLD_LIBRARY_PATH";
#[cfg(not(target_os = "macos"))]
const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";

/// Outcome of running an external program to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutput {
    pub code: i32,
    /// Interleaved stdout and stderr.
    pub output: String,
    pub timed_out: bool,
}

impl BatchOutput {
    /// Maps a non-zero exit or a timeout to an error.
    pub fn into_result(self, program: &str) -> Result<String> {
        if self.timed_out {
            Err(Error::Timeout {
                program: program.to_string(),
                output: self.output,
            })
        } else if self.code != 0 {
            Err(Error::ExternalTool {
                code: self.code,
                output: self.output,
            })
        } else {
            Ok(self.output)
        }
    }
}

/// A non-interactive invocation of an external program.
#[derive(Debug, Clone)]
pub struct BatchProgram {
    exe: PathBuf,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
    logfile: Option<PathBuf>,
    library_dirs: Vec<PathBuf>,
    env: Vec<(OsString, OsString)>,
}

impl BatchProgram {
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self {
            exe: exe.into(),
            args: Vec::new(),
            cwd: None,
            timeout: None,
            logfile: None,
            library_dirs: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// File the collected output is written to once the program finishes.
    pub fn logfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.logfile = Some(path.into());
        self
    }

    /// Directories prepended to the dynamic library search path of the child.
    pub fn library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.library_dirs.push(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }

    fn command(&self) -> eyre::Result<Command> {
        let mut command = Command::new(&self.exe);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        if !self.library_dirs.is_empty() {
            let existing = std::env::var_os(LIBRARY_PATH_VAR);
            let paths = self
                .library_dirs
                .iter()
                .cloned()
                .chain(existing.iter().flat_map(std::env::split_paths));
            let joined = std::env::join_paths(paths).wrap_err("Invalid library directory")?;
            command.env(LIBRARY_PATH_VAR, joined);
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }
        Ok(command)
    }

    /// Runs the program to completion or until the timeout expires, collecting its output.
    pub fn run(&self) -> eyre::Result<BatchOutput> {
        if which_exists(&self.exe).is_none() {
            return Err(eyre!("Cannot find executable {:?}", self.exe));
        }

        log::debug!("Running {:?} with arguments {:?}", self.exe, self.args);
        let start = Instant::now();
        let mut child = self
            .command()?
            .spawn()
            .wrap_err_with(|| format!("Failed to start {:?}", self.exe))?;

        let output = Arc::new(Mutex::new(String::new()));
        let (done_sender, done_receiver) = unbounded();
        let mut readers = 0;
        let streams: [Option<Box<dyn Read + Send>>; 2] = [
            child.stdout.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
            child.stderr.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
        ];
        for stream in streams.into_iter().flatten() {
            let output = Arc::clone(&output);
            let done = done_sender.clone();
            std::thread::spawn(move || {
                read_stream(stream, &output);
                let _ = done.send(());
            });
            readers += 1;
        }
        drop(done_sender);

        let mut timed_out = false;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if self.timeout.map_or(false, |t| start.elapsed() > t) {
                // The child may exit between try_wait and kill
                let _ = child.kill();
                let _ = child.wait();
                timed_out = true;
                break None;
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let deadline = Instant::now() + READER_GRACE;
        for _ in 0..readers {
            if done_receiver.recv_deadline(deadline).is_err() {
                log::warn!("Output of {:?} is still open after exit, detaching its readers", self.exe);
                break;
            }
        }
        let mut output = output.lock().clone();

        let code = match status {
            Some(status) => status.code().unwrap_or(1),
            None => {
                output.insert_str(
                    0,
                    &format!(
                        "Process {:?} failed to complete after {:.3} seconds\n",
                        self.exe,
                        start.elapsed().as_secs_f64()
                    ),
                );
                1
            }
        };

        if let Some(logfile) = &self.logfile {
            std::fs::write(logfile, &output).wrap_err_with(|| format!("Failed to write log file {:?}", logfile))?;
        }
        log::debug!("{:?} exited with code {} after {:.3?}", self.exe, code, start.elapsed());

        Ok(BatchOutput {
            code,
            output,
            timed_out,
        })
    }
}

/// Copies `stream` into `output`, holding back a UTF-8 sequence cut by a read until it completes.
fn read_stream(mut stream: Box<dyn Read + Send>, output: &Mutex<String>) {
    let mut buffer = [0u8; 4096];
    let mut pending = Vec::new();
    while let Ok(n) = stream.read(&mut buffer) {
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&buffer[..n]);
        let text = decode_complete(&mut pending);
        output.lock().push_str(&text);
    }
    if !pending.is_empty() {
        output.lock().push_str(&String::from_utf8_lossy(&pending));
    }
}

/// Decodes and removes the leading part of `bytes` that forms complete characters. Invalid
/// sequences become U+FFFD; a truncated sequence at the end is left in `bytes`.
fn decode_complete(bytes: &mut Vec<u8>) -> String {
    let mut text = String::new();
    let mut start = 0;
    loop {
        match std::str::from_utf8(&bytes[start..]) {
            Ok(valid) => {
                text.push_str(valid);
                start = bytes.len();
                break;
            }
            Err(e) => {
                let valid_end = start + e.valid_up_to();
                text.push_str(&String::from_utf8_lossy(&bytes[start..valid_end]));
                match e.error_len() {
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        start = valid_end + len;
                    }
                    None => {
                        start = valid_end;
                        break;
                    }
                }
            }
        }
    }
    bytes.drain(..start);
    text
}

/// Resolves `exe` directly if it has a directory component, otherwise through `PATH`.
fn which_exists(exe: &Path) -> Option<PathBuf> {
    if exe.components().count() > 1 || exe.is_absolute() {
        return exe.is_file().then(|| exe.to_path_buf());
    }
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(exe))
            .find(|candidate| candidate.is_file())
    })
}

/// Runs `exe` with `args`, returning the exit code and collected output.
pub fn exec_batch_program<I, S>(exe: impl Into<PathBuf>, args: I, timeout: Option<Duration>) -> eyre::Result<BatchOutput>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let mut program = BatchProgram::new(exe).args(args);
    if let Some(timeout) = timeout {
        program = program.timeout(timeout);
    }
    program.run()
}
