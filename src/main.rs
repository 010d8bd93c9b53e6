use anyhow::Error;
use log::info;

use htsget_elsa_lib::stack::{App, Environment, register_htsget_elsa_stack};

fn main() -> Result<(), Error> {
    env_logger::init();

    let mut app = App::new();
    let stack = register_htsget_elsa_stack(&mut app, Environment::from_env())?;
    info!("registered {}", stack.id());

    let assembly = app.synth()?;
    info!("cloud assembly written to {}", assembly.directory.display());
    Ok(())
}
