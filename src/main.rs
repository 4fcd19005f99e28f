use clap::{CommandFactory, Parser};
use flatrec::cli::{args::Args, commands};
use std::process;

fn main() {
    let args = Args::parse();

    // If no subcommand was provided, show help and available commands
    if args.command.is_none() {
        let mut command = Args::command();
        if let Err(error) = command.print_long_help() {
            eprintln!("Error: {}", error);
            process::exit(1);
        }
        println!();
        process::exit(0);
    }

    match commands::run(args) {
        Ok(_summary) => process::exit(0),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}
