//! A real terminal backed by `portable-pty`.
//!
//! Each `ShellSession` owns a PTY pair, a spawned shell child process, and a
//! background OS thread that drains the master read-end into an in-memory
//! ring buffer so blocking PTY I/O never ties up a Tokio worker.

use crate::error::{Result, TerminalError};
use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use std::{
    io::{Read, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{debug, warn};

/// Output ring buffer cap (128 KiB); older bytes are dropped once exceeded.
const RING_BUFFER_CAP: usize = 131_072;

/// One live shell process behind a pseudo-terminal.
pub struct ShellSession {
    pub shell: String,
    pub cwd: String,
    pub created_at: u64,

    writer: Mutex<Box<dyn Write + Send>>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    output: Arc<Mutex<String>>,
    alive: Arc<AtomicBool>,
}

impl ShellSession {
    /// Spawn `shell` in `cwd` and start draining its output immediately.
    pub fn new(shell: &str, cwd: &str) -> Result<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize { rows: 24, cols: 80, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| TerminalError::PtySpawn(e.to_string()))?;

        let mut cmd = CommandBuilder::new(shell);
        cmd.cwd(cwd);
        pair.slave.spawn_command(cmd).map_err(|e| TerminalError::PtySpawn(e.to_string()))?;

        let writer = pair.master.take_writer().map_err(|e| TerminalError::PtySpawn(e.to_string()))?;
        let reader = pair.master.try_clone_reader().map_err(|e| TerminalError::PtySpawn(e.to_string()))?;

        let output: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
        let alive = Arc::new(AtomicBool::new(true));
        spawn_drain_thread(reader, Arc::clone(&output), Arc::clone(&alive));

        let created_at = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();

        Ok(Self {
            shell: shell.to_string(),
            cwd: cwd.to_string(),
            created_at,
            writer: Mutex::new(writer),
            master: Mutex::new(pair.master),
            output,
            alive,
        })
    }

    /// Write `input` bytes to the shell's stdin — e.g. `"ls\n"`, or control
    /// bytes like `"\x03"` (Ctrl-C) / `"\x04"` (Ctrl-D).
    pub fn write(&self, input: &str) -> Result<()> {
        let mut guard = self.writer.lock().unwrap();
        guard.write_all(input.as_bytes())?;
        guard.flush()?;
        Ok(())
    }

    /// Drain and return everything accumulated in the output buffer so far.
    pub fn read(&self) -> Result<String> {
        let mut guard = self.output.lock().unwrap();
        Ok(std::mem::take(&mut *guard))
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        let guard = self.master.lock().unwrap();
        guard
            .resize(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| TerminalError::IoError(std::io::Error::other(e.to_string())))
    }

    /// `false` once the drain thread has observed EOF or an I/O error.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Signal EOF (Ctrl-D) to ask the shell to exit on its own.
    pub fn kill(&self) -> Result<()> {
        let _ = self.write("\x04");
        Ok(())
    }
}

/// Background OS thread: blocking-reads the PTY master, strips ANSI escape
/// codes, and appends clean text into `output`, trimming the oldest bytes
/// once `RING_BUFFER_CAP` is exceeded.
fn spawn_drain_thread(
    mut reader: Box<dyn Read + Send>,
    output: Arc<Mutex<String>>,
    alive: Arc<AtomicBool>,
) {
    std::thread::spawn(move || {
        let mut raw = [0u8; 4096];
        loop {
            match reader.read(&mut raw) {
                Ok(0) => break,
                Ok(n) => {
                    let clean = strip_ansi_escapes::strip(&raw[..n]);
                    let text = String::from_utf8_lossy(&clean).into_owned();

                    let mut guard = output.lock().unwrap();
                    guard.push_str(&text);
                    if guard.len() > RING_BUFFER_CAP {
                        let excess = guard.len() - RING_BUFFER_CAP;
                        guard.drain(..excess);
                    }
                }
                Err(e) => {
                    warn!("shell session reader error: {e}");
                    break;
                }
            }
        }
        alive.store(false, Ordering::Release);
        debug!("shell session reader thread exited");
    });
}
