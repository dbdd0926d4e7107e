//! A library for driving Tcl-based interactive tools (EDA programs like
//! Vivado or Yosys, or plain `tclsh`) from Rust.
//!
//! Instead of embedding a Tcl interpreter, the tool runs as a child
//! process with a small companion script sourced at startup. Driver and
//! child talk over named pipes in a strict request/response rhythm, and
//! a third pipe acts as a liveness sentinel so a dying child never
//! leaves the driver blocked. Return values stay inside the tool; the
//! driver gets back [`TclRef`] handles that later commands can pass
//! around by identity.
//!
//! It targets Unix systems with FIFOs and a POSIX child-process model.
//!
//! ## Usage
//!
//! ```no_run
//! use notcl::{tcl_args, TclTool, Tclsh};
//!
//! fn main() -> notcl::Result<()> {
//!     Tclsh::new().run(|t| {
//!         // expr {20} {+} {3}
//!         let sum = t.call("expr", &tcl_args![20, "+", 3], &[])?;
//!
//!         // The handle goes back by reference: expr $cmd_results(0) * 2
//!         let doubled = t.call("expr", &tcl_args![&sum, "*", 2], &[])?;
//!         assert_eq!(doubled.to_i64().unwrap(), 46);
//!
//!         Ok(())
//!     })
//! }
//! ```

mod apps;
mod bridge;
mod client;
mod error;
mod message;
mod tclobj;
mod tool;
mod util;

pub use apps::{Tclsh, Vivado, Yosys};
pub use bridge::BridgeServer;
pub use client::{BridgeClient, DriverRequest};
pub use error::{Error, Result};
pub use message::{
    Message, PyExit, PyProcedureCall, RawMessage, TclHello, TclProcedureResult,
};
pub use tclobj::{escape_braces, TclRef, TclValue};
pub use tool::{CalledObjectPos, TclTool, ToolOptions, ToolSession};
