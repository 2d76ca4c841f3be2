pub mod cli;

#[macro_use]
extern crate hiro_system_kit;

fn main() {
    cli::main();
}
