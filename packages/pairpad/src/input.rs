//! Line input from stdin on a dedicated thread.
//!
//! `tokio::io::stdin()` reads on the blocking pool, and runtime shutdown waits
//! for that read to return. This reader polls the fd with a short timeout
//! instead, so it notices the shutdown flag and never keeps the process alive.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

/// Poll interval for the shutdown and pause flags.
#[cfg(unix)]
const POLL_MS: i32 = 100;

/// Splits a byte stream into lines, keeping any partial tail for later.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Whatever is left once the input ends without a final newline.
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }
}

/// Handle to the reader thread. Dropping it stops the thread.
pub struct StdinLines {
    rx: mpsc::Receiver<String>,
    shutdown: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl StdinLines {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<String>(64);
        let shutdown = Arc::new(AtomicBool::new(false));
        let paused = Arc::new(AtomicBool::new(false));
        let (thread_shutdown, thread_paused) = (shutdown.clone(), paused.clone());
        std::thread::spawn(move || read_loop(tx, thread_shutdown, thread_paused));
        Self {
            rx,
            shutdown,
            paused,
        }
    }

    /// Next complete line, or `None` once stdin is closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Stop consuming stdin while a child process owns the terminal.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }
}

impl Drop for StdinLines {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

#[cfg(unix)]
fn read_loop(tx: mpsc::Sender<String>, shutdown: Arc<AtomicBool>, paused: Arc<AtomicBool>) {
    use std::io::Read;
    use std::os::fd::AsRawFd;

    let stdin = std::io::stdin();
    let stdin_fd = stdin.as_raw_fd();
    // At least as large as std's internal stdin buffer, so reads bypass it and
    // poll() sees everything that is still unread.
    let mut buf = [0u8; 8192];
    let mut lines = LineAssembler::default();
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        let mut pfd = nix::libc::pollfd {
            fd: stdin_fd,
            events: nix::libc::POLLIN,
            revents: 0,
        };
        let ret = unsafe { nix::libc::poll(&mut pfd, 1, POLL_MS) };
        if ret <= 0 {
            continue;
        }
        if paused.load(Ordering::SeqCst) {
            std::thread::sleep(std::time::Duration::from_millis(POLL_MS as u64));
            continue;
        }
        let mut handle = stdin.lock();
        match handle.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                drop(handle);
                for line in lines.push(&buf[..n]) {
                    if tx.blocking_send(line).is_err() {
                        return;
                    }
                }
            }
        }
    }
    if let Some(tail) = lines.finish() {
        let _ = tx.blocking_send(tail);
    }
}

#[cfg(not(unix))]
fn read_loop(tx: mpsc::Sender<String>, shutdown: Arc<AtomicBool>, _paused: Arc<AtomicBool>) {
    use std::io::BufRead;

    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        if shutdown.load(Ordering::Relaxed) || tx.blocking_send(line).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_complete_lines_and_keeps_tail() {
        let mut lines = LineAssembler::default();
        assert_eq!(lines.push(b"add a doc"), Vec::<String>::new());
        assert_eq!(lines.push(b"string\n/show\npartial"), vec!["add a docstring", "/show"]);
        assert_eq!(lines.finish().as_deref(), Some("partial"));
    }

    #[test]
    fn strips_carriage_returns_and_keeps_blank_lines() {
        let mut lines = LineAssembler::default();
        assert_eq!(lines.push(b"hi\r\n\n"), vec!["hi", ""]);
        assert!(lines.finish().is_none());
    }

    #[test]
    fn invalid_utf8_is_replaced_not_dropped() {
        let mut lines = LineAssembler::default();
        let out = lines.push(b"caf\xff\n");
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("caf"));
    }
}
