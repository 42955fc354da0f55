use clap::Parser;
use std::process;

#[macro_use]
extern crate log;

fn main() {
    let cli = parser::Cli::parse();
    logger::Logger::init(cli.verbose + (!cli.quiet as u8));

    if let Err(e) = cli.serialize() {
        warn!("failed to serialize command line arguments: {e}");
    }

    match vbwt_rs::run(cli) {
        Ok(()) => (),
        Err(e) => {
            error!("{e:?}");
            process::exit(1);
        }
    }
}
