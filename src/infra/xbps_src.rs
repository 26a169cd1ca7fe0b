//! External build tool execution
//!
//! Runs `xbps-src` from the root of the package collection, either capturing
//! its output or forwarding it live to this process's stdout and stderr.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error};

use crate::config::defaults::{BOOTSTRAP_OPERATION, DEFAULT_BUILD_TOOL};
use crate::error::BuildToolError;
use crate::infra::sandbox::Sandbox;

/// How the build tool's output is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Capture stdout and stderr and return them
    Buffered,
    /// Forward stdout and stderr line by line as they arrive
    Streamed,
}

/// Handle on the collection's build tool
#[derive(Debug, Clone)]
pub struct BuildTool {
    /// Root of the package collection (working directory of every call)
    collection: PathBuf,
    /// Executable, relative to the collection unless absolute
    program: PathBuf,
    /// Architecture of the build host
    host_arch: String,
}

impl BuildTool {
    /// Create a handle for the default `./xbps-src`
    pub fn new(collection: impl Into<PathBuf>, host_arch: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            program: PathBuf::from(DEFAULT_BUILD_TOOL),
            host_arch: host_arch.into(),
        }
    }

    /// Use a different executable
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Root of the package collection
    pub fn collection(&self) -> &Path {
        &self.collection
    }

    /// Architecture of the build host
    pub fn host_arch(&self) -> &str {
        &self.host_arch
    }

    /// Arguments for `operation`, with `-a` only when cross-building
    pub fn arguments(&self, operation: &[&str], target_arch: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(operation.len() + 2);
        let bootstrap = operation.first() == Some(&BOOTSTRAP_OPERATION);
        if !bootstrap && target_arch != self.host_arch {
            args.push("-a".to_string());
            args.push(target_arch.to_string());
        }
        args.extend(operation.iter().map(|s| (*s).to_string()));
        args
    }

    /// Populate the sandbox root for the host architecture
    ///
    /// This is the one operation that does not need an existing sandbox.
    pub async fn bootstrap(&self) -> Result<Vec<u8>, BuildToolError> {
        let args = self.arguments(&[BOOTSTRAP_OPERATION, &self.host_arch], &self.host_arch);
        self.exec(&args, OutputMode::Buffered).await
    }

    /// Run an operation inside `sandbox`
    ///
    /// A sandbox whose root is no longer bootstrapped is rebuilt first. Any
    /// failure tears the sandbox down, as its state can no longer be trusted.
    pub async fn run(
        &self,
        sandbox: &mut Sandbox,
        operation: &[&str],
        target_arch: &str,
        mode: OutputMode,
    ) -> Result<Vec<u8>, BuildToolError> {
        if operation.first() == Some(&BOOTSTRAP_OPERATION) {
            return self.bootstrap().await;
        }

        if !sandbox.is_bootstrapped() {
            debug!("Sandbox at {} is not bootstrapped, rebuilding", sandbox.path().display());
            if let Err(e) = sandbox.rebuild(self).await {
                sandbox.teardown();
                return Err(BuildToolError::Environment {
                    command: self.display_command(&self.arguments(operation, target_arch)),
                    message: e.to_string(),
                });
            }
        }

        let args = self.arguments(operation, target_arch);
        match self.exec(&args, mode).await {
            Ok(output) => Ok(output),
            Err(e) => {
                sandbox.teardown();
                Err(e)
            }
        }
    }

    /// Spawn the tool and handle its output according to `mode`
    async fn exec(&self, args: &[String], mode: OutputMode) -> Result<Vec<u8>, BuildToolError> {
        let command = self.display_command(args);
        debug!("Running `{command}` in {}", self.collection.display());

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .current_dir(&self.collection)
            .stdin(Stdio::null());

        let result = match mode {
            OutputMode::Buffered => Self::exec_buffered(cmd, &command).await,
            OutputMode::Streamed => Self::exec_streamed(cmd, &command).await,
        };

        if let Err(e) = &result {
            let output = e.output();
            if !output.is_empty() {
                error!("Output of `{command}`:\n{}", String::from_utf8_lossy(output));
            }
        }
        result
    }

    async fn exec_buffered(mut cmd: Command, command: &str) -> Result<Vec<u8>, BuildToolError> {
        let output = cmd.output().await.map_err(|e| BuildToolError::Spawn {
            command: command.to_string(),
            error: e.to_string(),
        })?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);

        if output.status.success() {
            Ok(combined)
        } else {
            Err(BuildToolError::Failed {
                command: command.to_string(),
                code: output.status.code(),
                output: combined,
            })
        }
    }

    async fn exec_streamed(mut cmd: Command, command: &str) -> Result<Vec<u8>, BuildToolError> {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| BuildToolError::Spawn {
            command: command.to_string(),
            error: e.to_string(),
        })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(BuildToolError::Spawn {
                command: command.to_string(),
                error: "child output pipes were not captured".to_string(),
            });
        };

        let out_task = tokio::spawn(forward_lines(stdout, tokio::io::stdout()));
        let err_task = tokio::spawn(forward_lines(stderr, tokio::io::stderr()));

        let (out_res, err_res, status) = tokio::join!(out_task, err_task, child.wait());

        let status = status.map_err(|e| BuildToolError::Spawn {
            command: command.to_string(),
            error: e.to_string(),
        })?;

        for forwarded in [out_res, err_res] {
            match forwarded {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    return Err(BuildToolError::Forward {
                        command: command.to_string(),
                        error: e.to_string(),
                    })
                }
                Err(e) => {
                    return Err(BuildToolError::Forward {
                        command: command.to_string(),
                        error: e.to_string(),
                    })
                }
            }
        }

        if status.success() {
            Ok(Vec::new())
        } else {
            Err(BuildToolError::Failed {
                command: command.to_string(),
                code: status.code(),
                output: Vec::new(),
            })
        }
    }

    /// Human-readable command line for logs and errors
    pub fn display_command(&self, args: &[String]) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(args.iter().cloned());
        parts.join(" ")
    }
}

/// Copy `reader` to `writer` one line at a time until end of stream
///
/// Returns the number of lines forwarded.
async fn forward_lines<R, W>(reader: R, mut writer: W) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut count = 0;
    while let Some(line) = lines.next_line().await? {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        count += 1;
    }
    Ok(count)
}
