//! The half-duplex FIFO bridge between the driver and the Tcl child.
//!
//! The bridge owns a fresh temp directory with three named pipes:
//!
//! - `tcl2py` carries child-to-driver frames,
//! - `py2tcl` carries driver-to-child frames,
//! - `sentinel` is never written to; the child opens it for writing at
//!   startup and keeps it open, so its read end turning readable (EOF)
//!   is the sole signal of child death. This makes death detection a
//!   plain file descriptor that composes with any blocking wait, with
//!   no reliance on SIGCHLD.
//!
//! Each message uses one open/close cycle of its pipe; a frame ends when
//! the writer closes. Traffic strictly alternates between one receive
//! and one send.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::prelude::{AsRawFd, FromRawFd};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::{debug, trace};
use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::sys::select::{select, FdSet};
use nix::sys::stat::Mode;
use nix::sys::time::{TimeVal, TimeValLike};
use nix::unistd::mkfifo;
use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::message::{Message, RawMessage};
use crate::util::{bytes_available, make_blocking};

/// Retry interval while waiting for the child to connect a reader to
/// `py2tcl`.
const NO_READER_RETRY_MS: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitForRecv,
    WaitForSend,
}

/// Driver side of the bridge.
///
/// The FIFOs exist exactly as long as the value does; dropping it
/// unlinks the whole directory. A fresh bridge starts in the receiving
/// state, expecting the child's hello.
#[derive(Debug)]
pub struct BridgeServer {
    dir: TempDir,
    tcl2py: PathBuf,
    py2tcl: PathBuf,
    sentinel: PathBuf,
    sentinel_pipe: Option<File>,
    state: State,
}

impl BridgeServer {
    /// Creates the temp directory and the three FIFOs.
    pub fn open() -> Result<Self> {
        let dir = TempDir::new()?;
        let tcl2py = dir.path().join("tcl2py");
        let py2tcl = dir.path().join("py2tcl");
        let sentinel = dir.path().join("sentinel");
        for path in &[&tcl2py, &py2tcl, &sentinel] {
            mkfifo(path.as_path(), Mode::S_IRWXU)?;
        }

        debug!("bridge listening in {}", dir.path().display());

        Ok(Self {
            dir,
            tcl2py,
            py2tcl,
            sentinel,
            sentinel_pipe: None,
            state: State::WaitForRecv,
        })
    }

    /// Directory holding the FIFOs (and the companion script).
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn tcl2py_path(&self) -> &Path {
        &self.tcl2py
    }

    pub fn py2tcl_path(&self) -> &Path {
        &self.py2tcl
    }

    pub fn sentinel_path(&self) -> &Path {
        &self.sentinel
    }

    /// Opens the sentinel read end, non-blocking.
    ///
    /// Must happen after the child was spawned but before the first
    /// `recv`, so the child's blocking open of the write end can
    /// complete.
    pub fn open_sentinel(&mut self) -> Result<()> {
        let fd = open(
            self.sentinel.as_path(),
            OFlag::O_RDONLY | OFlag::O_NONBLOCK,
            Mode::empty(),
        )?;
        self.sentinel_pipe = Some(unsafe { File::from_raw_fd(fd) });
        Ok(())
    }

    /// Receives one frame from `tcl2py`, watching the sentinel while
    /// waiting.
    pub fn recv_raw(&mut self) -> Result<RawMessage> {
        if self.state != State::WaitForRecv {
            return Err(Error::Precondition("recv called while a send was due"));
        }

        trace!("opening {} to receive a message", self.tcl2py.display());
        let fd = open(
            self.tcl2py.as_path(),
            OFlag::O_RDONLY | OFlag::O_NONBLOCK,
            Mode::empty(),
        )?;
        let mut pipe = unsafe { File::from_raw_fd(fd) };

        loop {
            let mut readfds = FdSet::new();
            readfds.insert(fd);
            if let Some(sentinel) = &self.sentinel_pipe {
                readfds.insert(sentinel.as_raw_fd());
            }
            match select(None, Some(&mut readfds), None, None, None) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(err) => return Err(err.into()),
            }

            if let Some(sentinel) = &self.sentinel_pipe {
                if readfds.contains(sentinel.as_raw_fd()) {
                    debug!("sentinel signalled EOF while waiting for a message");
                    return Err(Error::ChildEarlyExit);
                }
            }
            if readfds.contains(fd) && bytes_available(fd)? > 0 {
                break;
            }
            // Readable with nothing buffered: no writer is connected.
        }

        // The writer is there; read the whole frame until it closes.
        make_blocking(fd)?;
        let mut frame = Vec::new();
        pipe.read_to_end(&mut frame)?;
        drop(pipe);
        trace!(
            "pipe {} closed after {} bytes",
            self.tcl2py.display(),
            frame.len()
        );

        self.state = State::WaitForSend;
        RawMessage::decode(&frame)
    }

    /// Sends one frame through `py2tcl`, watching the sentinel while the
    /// child has not connected its reader yet.
    pub fn send_raw(&mut self, msg: &RawMessage) -> Result<()> {
        if self.state != State::WaitForSend {
            return Err(Error::Precondition("send called while a recv was due"));
        }
        let frame = msg.encode()?;

        if self.child_died(0)? {
            return Err(Error::ChildEarlyExit);
        }

        trace!("opening {} to send a message", self.py2tcl.display());
        let fd = loop {
            match open(
                self.py2tcl.as_path(),
                OFlag::O_WRONLY | OFlag::O_NONBLOCK,
                Mode::empty(),
            ) {
                Ok(fd) => break fd,
                Err(Errno::ENXIO) => {
                    // No reader on the other end yet.
                    if self.child_died(NO_READER_RETRY_MS)? {
                        return Err(Error::ChildEarlyExit);
                    }
                }
                Err(err) => return Err(err.into()),
            }
        };
        let mut pipe = unsafe { File::from_raw_fd(fd) };
        make_blocking(fd)?;

        match pipe.write_all(&frame).and_then(|()| pipe.flush()) {
            Ok(()) => {}
            Err(ref err) if err.kind() == io::ErrorKind::BrokenPipe => {
                debug!("reader vanished mid-write");
                return Err(Error::ChildEarlyExit);
            }
            Err(err) => return Err(err.into()),
        }
        drop(pipe);
        trace!("pipe {} closed after {} bytes", self.py2tcl.display(), frame.len());

        self.state = State::WaitForRecv;
        Ok(())
    }

    /// Receives one frame and interprets it as `M`.
    pub fn recv<M: Message>(&mut self) -> Result<M> {
        self.recv_raw()?.into_message()
    }

    /// Sends one typed message.
    pub fn send<M: Message>(&mut self, msg: &M) -> Result<()> {
        self.send_raw(&msg.to_raw())
    }

    /// Polls the sentinel for EOF with the given timeout.
    ///
    /// Without an opened sentinel (bridge-level tests run without a
    /// child) this degrades to a plain sleep.
    fn child_died(&self, timeout_ms: i64) -> Result<bool> {
        let sentinel = match &self.sentinel_pipe {
            Some(sentinel) => sentinel,
            None => {
                if timeout_ms > 0 {
                    thread::sleep(Duration::from_millis(timeout_ms as u64));
                }
                return Ok(false);
            }
        };

        let fd = sentinel.as_raw_fd();
        loop {
            let mut readfds = FdSet::new();
            readfds.insert(fd);
            // select may mutate the timeout, build it fresh per attempt
            let mut timeout = TimeVal::milliseconds(timeout_ms);
            match select(None, Some(&mut readfds), None, None, Some(&mut timeout)) {
                Ok(_) => return Ok(readfds.contains(fd)),
                Err(Errno::EINTR) => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl Drop for BridgeServer {
    fn drop(&mut self) {
        debug!("bridge in {} closed", self.dir.path().display());
    }
}
