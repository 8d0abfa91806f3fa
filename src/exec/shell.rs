// src/exec/shell.rs

//! Shell-backed surface: runs the invocation with `tokio::process`.

use std::process::Stdio;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::errors::{EngineError, Result};
use crate::exec::surface::{
    ExecutionOptions, ExecutorId, Surface, SurfaceEvent, SurfaceEventSender, SurfaceFactory,
};

/// Creates [`ShellSurface`]s. With `echo` set, banners and process output
/// are mirrored to the engine's stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellSurfaceFactory {
    echo: bool,
}

impl ShellSurfaceFactory {
    pub fn new(echo: bool) -> Self {
        Self { echo }
    }
}

impl SurfaceFactory for ShellSurfaceFactory {
    fn create(&self, executor: ExecutorId, options: &ExecutionOptions) -> Result<Box<dyn Surface>> {
        debug!(executor, name = %options.name, "creating shell surface");
        Ok(Box::new(ShellSurface {
            executor,
            echo: self.echo,
            kill_tx: None,
            removed: false,
        }))
    }
}

pub struct ShellSurface {
    executor: ExecutorId,
    echo: bool,
    /// Fires (or drops) to kill the current process.
    kill_tx: Option<oneshot::Sender<()>>,
    removed: bool,
}

impl Surface for ShellSurface {
    fn launch(&mut self, options: &ExecutionOptions, events: SurfaceEventSender) -> Result<()> {
        if self.removed {
            return Err(EngineError::Surface(format!(
                "surface of executor {} was removed",
                self.executor
            )));
        }

        info!(
            executor = self.executor,
            shell = %options.shell,
            cmd = %options.command_line(),
            cwd = %options.cwd,
            "starting task process"
        );

        let mut cmd = Command::new(&options.shell);
        cmd.args(&options.shell_args)
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !options.cwd.is_empty() {
            cmd.current_dir(&options.cwd);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for '{}'", options.name))?;

        let _ = events.send(SurfaceEvent::Attached { pid: child.id() });

        let stdout = child.stdout.take().map(|s| tokio::spawn(pump(s, events.clone(), self.echo)));
        let stderr = child.stderr.take().map(|s| tokio::spawn(pump(s, events.clone(), self.echo)));

        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        self.kill_tx = Some(kill_tx);

        let executor = self.executor;
        tokio::spawn(async move {
            // A dropped kill sender also kills: the surface is gone.
            let (status, killed) = tokio::select! {
                status = child.wait() => (status, false),
                _ = &mut kill_rx => {
                    if let Err(e) = child.kill().await {
                        warn!(executor, error = %e, "failed to kill child process");
                    }
                    (child.wait().await, true)
                }
            };

            for pump in [stdout, stderr].into_iter().flatten() {
                if killed {
                    pump.abort();
                } else {
                    let _ = pump.await;
                }
            }

            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(executor, error = %e, "waiting for task process failed");
                    None
                }
            };
            debug!(executor, exit_code = ?code, killed, "shell process finished");
            let _ = events.send(SurfaceEvent::Exited { code });
        });

        Ok(())
    }

    fn write_line(&mut self, text: &str) {
        if self.echo {
            println!("{text}");
        }
    }

    fn disable_input(&mut self) {
        debug!(executor = self.executor, "input disabled (stdin is not attached)");
    }

    fn dispose(&mut self) {
        if let Some(kill) = self.kill_tx.take() {
            debug!(executor = self.executor, "disposing shell surface process");
            let _ = kill.send(());
        }
    }

    fn kill(&mut self) {
        self.dispose();
    }

    fn remove(&mut self) {
        self.dispose();
        self.removed = true;
    }
}

/// Forward raw output chunks as surface events.
async fn pump<R>(mut reader: R, events: SurfaceEventSender, echo: bool)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 8192];
    let mut stdout = tokio::io::stdout();

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = buf[..n].to_vec();
                if echo {
                    let _ = stdout.write_all(&chunk).await;
                    let _ = stdout.flush().await;
                }
                if events.send(SurfaceEvent::Output(chunk)).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "output pipe read failed");
                break;
            }
        }
    }
}
