//! Session controller for Tcl-based tools: spawning, the handshake, the
//! request/response loop, and the teardown with its exit-code policy.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use log::debug;

use crate::bridge::BridgeServer;
use crate::error::{Error, Result};
use crate::message::{PyExit, PyProcedureCall, TclHello, TclProcedureResult};
use crate::tclobj::{TclRef, TclValue};

/// Companion script the tool sources at startup. It is materialized in
/// the bridge's temp directory so the argv can point at a real file.
const COMPANION_SCRIPT: &str = include_str!("notcl.tcl");
const COMPANION_SCRIPT_NAME: &str = "notcl.tcl";

mod ansi {
    pub const FG_BRIGHT_YELLOW: &str = "\x1b[93m";
    pub const BG_RED: &str = "\x1b[41m";
    pub const BG_GREEN: &str = "\x1b[42m";
    pub const RESET: &str = "\x1b[0m";
}

/// Placement of a handle when one of its "methods" is called through
/// [`ToolSession::call_method`]. Tcl-based tools differ in how their
/// object-ish commands want the receiver spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalledObjectPos {
    /// The handle reference itself is the command name.
    First,
    /// The handle is inserted as the first positional argument.
    Second,
    /// The handle is appended after all positional arguments.
    Last,
}

/// Per-session configuration.
#[derive(Debug, Clone)]
pub struct ToolOptions {
    /// Directory the tool runs in; the current directory when `None`.
    pub cwd: Option<PathBuf>,
    /// Keep the tool open for the user once the body is done; the
    /// session then waits for the user to close the tool.
    pub interact: bool,
    /// Print every command sent to the tool.
    pub log_commands: bool,
    /// Print every return value received from the tool.
    pub log_retvals: bool,
    /// ANSI colours on the printed `[notcl]` lines.
    pub log_fancy: bool,
    /// Ask the companion script for verbose stderr traces.
    pub debug_tcl: bool,
    /// Emit driver-side traces through the `log` facade.
    pub debug_py: bool,
    /// Terminate the tool on a body error even when `interact` is set.
    pub abort_on_error: bool,
    pub called_object_pos: CalledObjectPos,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            interact: false,
            log_commands: true,
            log_retvals: false,
            log_fancy: true,
            debug_tcl: false,
            debug_py: false,
            abort_on_error: true,
            called_object_pos: CalledObjectPos::Second,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogKind {
    Command,
    Info,
    Retval,
    Error,
}

impl LogKind {
    fn symbol(self) -> &'static str {
        match self {
            LogKind::Command => "Cmd:",
            LogKind::Info => "Info:",
            LogKind::Retval => "Result:",
            LogKind::Error => "Error:",
        }
    }
}

fn format_log_line(kind: LogKind, fancy: bool, data: &str) -> String {
    let (style_notcl, style_reset) = if fancy {
        (ansi::FG_BRIGHT_YELLOW, ansi::RESET)
    } else {
        ("", "")
    };
    let style_symbol = if fancy {
        match kind {
            LogKind::Error => ansi::BG_RED,
            LogKind::Info => ansi::BG_GREEN,
            _ => "",
        }
    } else {
        ""
    };

    format!(
        "{}[notcl]{} {}{}{} {}",
        style_notcl,
        style_reset,
        style_symbol,
        kind.symbol(),
        style_reset,
        data
    )
}

fn log_line(opts: &ToolOptions, kind: LogKind, data: &str) {
    match kind {
        LogKind::Command => {
            if opts.debug_py {
                debug!("running command: {}", data);
            }
            if !opts.log_commands {
                return;
            }
        }
        LogKind::Retval => {
            if opts.debug_py {
                debug!("return value: {}", data);
            }
            if !opts.log_retvals {
                return;
            }
        }
        LogKind::Error => {
            if opts.debug_py {
                debug!("received error as return value: {}", data);
            }
        }
        LogKind::Info => {}
    }

    println!("{}", format_log_line(kind, opts.log_fancy, data));
}

/// Adapter naming a concrete Tcl-based tool.
///
/// Implementors provide the argv that makes the tool source the
/// companion script at startup; the provided [`TclTool::run`] does
/// everything else.
pub trait TclTool {
    /// Builds the argv. `script` is the on-disk path of the companion
    /// script, valid for the duration of the session.
    fn cmdline(&self, script: &Path) -> Vec<String>;

    fn options(&self) -> &ToolOptions;

    /// Spawns the tool, awaits its hello, hands a [`ToolSession`] to
    /// `body`, and tears the session down afterwards.
    ///
    /// Teardown: unless the child already died, a `PyExit` is sent
    /// (`quit=0` in interactive mode, forced to `quit=1` when the body
    /// failed and `abort_on_error` is set), then the child is reaped.
    /// A non-zero exit code, or any death before `PyExit`, turns into
    /// [`Error::ChildFailed`]. A body error always takes precedence
    /// over teardown errors.
    fn run<R, F>(&self, body: F) -> Result<R>
    where
        F: FnOnce(&mut ToolSession) -> Result<R>,
        Self: Sized,
    {
        run_tool(self, body)
    }
}

fn run_tool<T, R, F>(tool: &T, body: F) -> Result<R>
where
    T: TclTool + ?Sized,
    F: FnOnce(&mut ToolSession) -> Result<R>,
{
    let opts = tool.options().clone();

    let mut bridge = BridgeServer::open()?;
    let script = bridge.dir().join(COMPANION_SCRIPT_NAME);
    fs::write(&script, COMPANION_SCRIPT)?;
    let argv = tool.cmdline(&script);
    if argv.is_empty() {
        return Err(Error::Precondition("cmdline returned an empty argv"));
    }

    let mut command = Command::new(&argv[0]);
    command
        .args(&argv[1..])
        .env("NOTCL_PIPE_TCL2PY", bridge.tcl2py_path())
        .env("NOTCL_PIPE_PY2TCL", bridge.py2tcl_path())
        .env("NOTCL_PIPE_SENTINEL", bridge.sentinel_path())
        .env("NOTCL_DEBUG_TCL", if opts.debug_tcl { "1" } else { "0" });
    if let Some(cwd) = &opts.cwd {
        command.current_dir(cwd);
    }
    let mut child = ChildGuard(command.spawn()?);

    // Open our sentinel end right away so the child's blocking open of
    // the write end can complete before anything else happens.
    bridge.open_sentinel()?;

    let mut result = handshake_and_run(&mut bridge, &opts, body);

    let mut clean_exit = true;
    let mut quit = !opts.interact;
    match &result {
        Ok(_) => {}
        Err(Error::ChildEarlyExit) => clean_exit = false,
        Err(err) => {
            if opts.abort_on_error {
                quit = true;
            } else if opts.interact {
                log_line(
                    &opts,
                    LogKind::Error,
                    &format!(
                        "Following error is held back and will be raised \
                         once the Tcl child process exits:\n{}",
                        err
                    ),
                );
            }
        }
    }

    if clean_exit {
        if !quit {
            log_line(
                &opts,
                LogKind::Info,
                "Driver control finished. Please exit the Tcl tool to continue.",
            );
        }
        if opts.debug_py {
            debug!("sending PyExit (quit={})", quit as u8);
        }
        match bridge.send(&PyExit::new(if quit { "1" } else { "0" })) {
            Ok(()) => {}
            Err(Error::ChildEarlyExit) => clean_exit = false,
            Err(err) => {
                // The child never got its exit request and cannot be
                // waited for; put it down instead.
                let _ = child.0.kill();
                clean_exit = false;
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
    }

    if opts.debug_py {
        debug!("waiting for the child to terminate");
    }
    let code = match child.0.wait() {
        Ok(status) => status.code(),
        Err(err) => {
            return match result {
                Err(body_err) => Err(body_err),
                Ok(_) => Err(err.into()),
            };
        }
    };
    if opts.debug_py {
        debug!("child terminated with exit code {:?}", code);
    }

    match result {
        Err(Error::ChildEarlyExit) => Err(Error::ChildFailed { code, argv }),
        Err(err) => Err(err),
        Ok(value) => {
            if clean_exit && code == Some(0) {
                Ok(value)
            } else {
                Err(Error::ChildFailed { code, argv })
            }
        }
    }
}

/// Reaps the child if the scope unwinds before the regular wait.
struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            let _ = self.0.kill();
            let _ = self.0.wait();
        }
    }
}

fn handshake_and_run<R, F>(bridge: &mut BridgeServer, opts: &ToolOptions, body: F) -> Result<R>
where
    F: FnOnce(&mut ToolSession) -> Result<R>,
{
    let hello: TclHello = bridge.recv()?;
    if opts.debug_py {
        debug!(
            "received TclHello from {} (patchlevel {})",
            hello.nameofexecutable(),
            hello.patchlevel()
        );
    }

    let mut session = ToolSession {
        bridge,
        opts,
        hello,
    };
    body(&mut session)
}

/// Driver-facing interface of a live session, handed to the `run` body.
pub struct ToolSession<'a> {
    bridge: &'a mut BridgeServer,
    opts: &'a ToolOptions,
    hello: TclHello,
}

impl<'a> ToolSession<'a> {
    /// The handshake record the child sent at startup.
    pub fn hello(&self) -> &TclHello {
        &self.hello
    }

    pub fn options(&self) -> &ToolOptions {
        self.opts
    }

    /// Passes a string to Tcl for evaluation.
    ///
    /// A successful evaluation yields a [`TclRef`] to the child-side
    /// value. A Tcl-level error comes back as [`Error::Tcl`] and leaves
    /// the session usable.
    pub fn eval(&mut self, cmd: &str) -> Result<TclRef> {
        self.log(LogKind::Command, cmd);
        self.bridge.send(&PyProcedureCall::new(cmd))?;
        let reply: TclProcedureResult = self.bridge.recv()?;

        let cmd_idx: u64 = reply.cmd_idx().parse().map_err(|_| {
            Error::MalformedFrame(format!("cmd_idx is not an integer: {:?}", reply.cmd_idx()))
        })?;
        let err_code: i64 = reply.err_code().parse().map_err(|_| {
            Error::MalformedFrame(format!("err_code is not an integer: {:?}", reply.err_code()))
        })?;

        if err_code != 0 {
            self.log(LogKind::Error, reply.result());
            Err(Error::Tcl(reply.result().to_owned()))
        } else {
            self.log(LogKind::Retval, reply.result());
            Ok(TclRef::new(cmd_idx, reply.result().to_owned(), cmd.to_owned()))
        }
    }

    /// Calls a Tcl command or procedure with encoded arguments.
    ///
    /// Keyword arguments are rendered before positional ones as
    /// `-key value`; a `true` value becomes a bare `-key` flag and a
    /// `false` one is omitted entirely.
    pub fn call(
        &mut self,
        name: &str,
        args: &[TclValue],
        kwargs: &[(&str, TclValue)],
    ) -> Result<TclRef> {
        let cmd = build_command(name, args, kwargs);
        self.eval(&cmd)
    }

    /// Calls `name` as a method of the handle, placing the handle
    /// according to [`ToolOptions::called_object_pos`].
    pub fn call_method(
        &mut self,
        obj: &TclRef,
        name: &str,
        args: &[TclValue],
        kwargs: &[(&str, TclValue)],
    ) -> Result<TclRef> {
        let cmd = method_command(self.opts.called_object_pos, obj, name, args, kwargs);
        self.eval(&cmd)
    }

    fn log(&self, kind: LogKind, data: &str) {
        log_line(self.opts, kind, data);
    }
}

fn build_command(name: &str, args: &[TclValue], kwargs: &[(&str, TclValue)]) -> String {
    let mut words = vec![name.to_owned()];
    for (key, value) in kwargs {
        match value {
            TclValue::Bool(true) => words.push(format!("-{}", key)),
            TclValue::Bool(false) => {}
            other => {
                words.push(format!("-{}", key));
                words.push(other.encode());
            }
        }
    }
    for arg in args {
        words.push(arg.encode());
    }
    words.join(" ")
}

fn method_command(
    pos: CalledObjectPos,
    obj: &TclRef,
    name: &str,
    args: &[TclValue],
    kwargs: &[(&str, TclValue)],
) -> String {
    let mut full_args: Vec<TclValue>;
    let cmd_name: String;
    match pos {
        CalledObjectPos::First => {
            cmd_name = obj.ref_str();
            full_args = Vec::with_capacity(args.len() + 1);
            full_args.push(TclValue::from(name));
            full_args.extend_from_slice(args);
        }
        CalledObjectPos::Second => {
            cmd_name = name.to_owned();
            full_args = Vec::with_capacity(args.len() + 1);
            full_args.push(TclValue::from(obj));
            full_args.extend_from_slice(args);
        }
        CalledObjectPos::Last => {
            cmd_name = name.to_owned();
            full_args = args.to_vec();
            full_args.push(TclValue::from(obj));
        }
    }
    build_command(&cmd_name, &full_args, kwargs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcl_args;

    #[test]
    fn log_line_plain() {
        assert_eq!(
            format_log_line(LogKind::Command, false, "expr {9} {+} {3} {*} {11}"),
            "[notcl] Cmd: expr {9} {+} {3} {*} {11}"
        );
        assert_eq!(
            format_log_line(LogKind::Retval, false, "42"),
            "[notcl] Result: 42"
        );
    }

    #[test]
    fn log_line_fancy() {
        assert_eq!(
            format_log_line(LogKind::Command, true, "expr {9} {+} {3} {*} {11}"),
            "\x1b[93m[notcl]\x1b[0m Cmd:\x1b[0m expr {9} {+} {3} {*} {11}"
        );
        assert_eq!(
            format_log_line(LogKind::Error, true, "boom"),
            "\x1b[93m[notcl]\x1b[0m \x1b[41mError:\x1b[0m boom"
        );
        assert_eq!(
            format_log_line(LogKind::Info, true, "note"),
            "\x1b[93m[notcl]\x1b[0m \x1b[42mInfo:\x1b[0m note"
        );
    }

    #[test]
    fn command_with_kwargs() {
        let cmd = build_command(
            "list",
            &tcl_args!["hello", "world"],
            &[("whats", "up".into())],
        );
        assert_eq!(cmd, "list -whats {up} {hello} {world}");
    }

    #[test]
    fn boolean_kwargs() {
        let cmd = build_command("list", &[], &[("myarg", true.into())]);
        assert_eq!(cmd, "list -myarg");

        let cmd = build_command("list", &[], &[("myarg", false.into())]);
        assert_eq!(cmd, "list");
    }

    #[test]
    fn method_placement() {
        let obj = TclRef::new(7, "a b c d".into(), "list a b c d".into());
        let args = tcl_args!["hello", "world"];
        let kwargs = [("whats", TclValue::from("up"))];

        assert_eq!(
            method_command(CalledObjectPos::Second, &obj, "list", &args, &kwargs),
            "list -whats {up} $cmd_results(7) {hello} {world}"
        );
        assert_eq!(
            method_command(CalledObjectPos::Last, &obj, "list", &args, &kwargs),
            "list -whats {up} {hello} {world} $cmd_results(7)"
        );
        assert_eq!(
            method_command(CalledObjectPos::First, &obj, "mycmd", &args, &kwargs),
            "$cmd_results(7) -whats {up} {mycmd} {hello} {world}"
        );
    }

    #[test]
    fn default_options() {
        let opts = ToolOptions::default();
        assert!(opts.log_commands);
        assert!(!opts.log_retvals);
        assert!(opts.log_fancy);
        assert!(opts.abort_on_error);
        assert!(!opts.interact);
        assert_eq!(opts.called_object_pos, CalledObjectPos::Second);
    }
}
