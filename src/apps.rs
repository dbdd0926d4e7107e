//! Adapters for concrete Tcl-based tools.

use std::env;
use std::path::{Path, PathBuf};

use crate::tool::{TclTool, ToolOptions};

/// Plain `tclsh`. The simplest host for the bridge, used by the demos
/// and the end-to-end tests.
#[derive(Debug, Default)]
pub struct Tclsh {
    opts: ToolOptions,
}

impl Tclsh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(opts: ToolOptions) -> Self {
        Self { opts }
    }

    pub fn options_mut(&mut self) -> &mut ToolOptions {
        &mut self.opts
    }
}

impl TclTool for Tclsh {
    fn cmdline(&self, script: &Path) -> Vec<String> {
        vec!["tclsh".to_owned(), script.display().to_string()]
    }

    fn options(&self) -> &ToolOptions {
        &self.opts
    }
}

/// Xilinx Vivado in `-mode tcl`.
#[derive(Debug, Default)]
pub struct Vivado {
    opts: ToolOptions,
}

impl Vivado {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(opts: ToolOptions) -> Self {
        Self { opts }
    }

    pub fn options_mut(&mut self) -> &mut ToolOptions {
        &mut self.opts
    }

    /// The `XILINX_VIVADO` directory, e.g. for locating Verilog models
    /// of the Xilinx cell libraries.
    pub fn vivado_dir() -> Option<PathBuf> {
        env::var_os("XILINX_VIVADO").map(PathBuf::from)
    }
}

impl TclTool for Vivado {
    fn cmdline(&self, script: &Path) -> Vec<String> {
        vec![
            "vivado".to_owned(),
            "-mode".to_owned(),
            "tcl".to_owned(),
            "-nojournal".to_owned(),
            "-source".to_owned(),
            script.display().to_string(),
        ]
    }

    fn options(&self) -> &ToolOptions {
        &self.opts
    }
}

/// Yosys with its Tcl frontend.
#[derive(Debug, Default)]
pub struct Yosys {
    opts: ToolOptions,
}

impl Yosys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(opts: ToolOptions) -> Self {
        Self { opts }
    }

    pub fn options_mut(&mut self) -> &mut ToolOptions {
        &mut self.opts
    }
}

impl TclTool for Yosys {
    fn cmdline(&self, script: &Path) -> Vec<String> {
        vec![
            "yosys".to_owned(),
            "-c".to_owned(),
            script.display().to_string(),
        ]
    }

    fn options(&self) -> &ToolOptions {
        &self.opts
    }
}
