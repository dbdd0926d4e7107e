//! A dummy bridge client for exercising [`BridgeServer`] without a real
//! Tcl child.
//!
//! In production the other end of the bridge is the companion Tcl
//! script; this Rust twin speaks the same wire protocol and is driven
//! from a second thread by the bridge tests.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::bridge::BridgeServer;
use crate::error::{Error, Result};
use crate::message::{
    Message, PyExit, PyProcedureCall, RawMessage, TclHello, TclProcedureResult,
};

/// Driver-to-child traffic, decoded against the set of classes a child
/// is prepared to accept.
#[derive(Debug)]
pub enum DriverRequest {
    Call(PyProcedureCall),
    Exit(PyExit),
}

impl DriverRequest {
    pub fn from_raw(raw: RawMessage) -> Result<Self> {
        let class = raw.class().map(str::to_owned);
        match class.as_deref() {
            Some(c) if c == PyProcedureCall::CLASS => {
                raw.into_message().map(DriverRequest::Call)
            }
            Some(c) if c == PyExit::CLASS => raw.into_message().map(DriverRequest::Exit),
            other => Err(Error::WrongMessageClass(format!(
                "expected PyProcedureCall or PyExit, got {:?}",
                other
            ))),
        }
    }
}

/// Child side of the bridge, from the driver's point of view.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    tcl2py: PathBuf,
    py2tcl: PathBuf,
    sentinel: PathBuf,
}

impl BridgeClient {
    pub fn new<P: AsRef<Path>>(tcl2py: P, py2tcl: P, sentinel: P) -> Self {
        Self {
            tcl2py: tcl2py.as_ref().to_path_buf(),
            py2tcl: py2tcl.as_ref().to_path_buf(),
            sentinel: sentinel.as_ref().to_path_buf(),
        }
    }

    pub fn for_server(server: &BridgeServer) -> Self {
        Self::new(
            server.tcl2py_path(),
            server.py2tcl_path(),
            server.sentinel_path(),
        )
    }

    /// Opens the sentinel write end, blocking until the server listens.
    ///
    /// The returned handle must be kept alive for as long as the client
    /// is supposed to look alive; dropping it is how a child death is
    /// simulated.
    pub fn open_sentinel(&self) -> Result<File> {
        let pipe = OpenOptions::new().write(true).open(&self.sentinel)?;
        Ok(pipe)
    }

    /// Sends one message; blocks until the server opens its read end.
    pub fn send<M: Message>(&self, msg: &M) -> Result<()> {
        let frame = msg.to_raw().encode()?;
        let mut pipe = OpenOptions::new().write(true).open(&self.tcl2py)?;
        pipe.write_all(&frame)?;
        Ok(())
    }

    /// Receives the next driver request; blocks until one arrives.
    pub fn recv(&self) -> Result<DriverRequest> {
        let mut pipe = File::open(&self.py2tcl)?;
        let mut frame = Vec::new();
        pipe.read_to_end(&mut frame)?;
        DriverRequest::from_raw(RawMessage::decode(&frame)?)
    }

    /// Plays a whole child session: hello first, then every procedure
    /// call is answered with its command upper-cased, until the driver
    /// says quit.
    pub fn run(&self) -> Result<()> {
        let _sentinel = self.open_sentinel()?;
        self.send(&TclHello::new("8.6-dummy", "", "", "dummy_client"))?;

        let mut cmd_idx: u64 = 0;
        loop {
            match self.recv()? {
                DriverRequest::Exit(_) => break,
                DriverRequest::Call(call) => {
                    let result = call.command().to_uppercase();
                    self.send(&TclProcedureResult::new(
                        "0",
                        &result,
                        &cmd_idx.to_string(),
                    ))?;
                    cmd_idx += 1;
                }
            }
        }
        Ok(())
    }
}
