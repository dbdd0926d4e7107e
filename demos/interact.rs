/// To run this demo run the following command
/// `cargo run --example interact`.
use notcl::{tcl_args, Result, TclTool, Tclsh, ToolOptions};

fn main() -> Result<()> {
    env_logger::init();

    let mut opts = ToolOptions::default();
    opts.interact = true;

    Tclsh::with_options(opts).run(|t| {
        t.call("set", &tcl_args!["greeting", "hello from the driver"], &[])?;
        println!("The tool is yours now; check $greeting and exit it to finish.");
        Ok(())
    })
}
