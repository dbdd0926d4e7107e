use notcl::{tcl_args, Result, TclTool, Tclsh};

fn main() -> Result<()> {
    env_logger::init();

    Tclsh::new().run(|t| {
        let version = t.eval("info patchlevel")?;
        println!("tclsh reports patchlevel {}", version);

        // results stay inside the tool and can be passed back by handle
        let sum = t.call("expr", &tcl_args![20, "+", 3], &[])?;
        let doubled = t.call("expr", &tcl_args![&sum, "*", 2], &[])?;
        println!("(20 + 3) * 2 = {}", doubled);

        Ok(())
    })
}
