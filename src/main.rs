#![allow(missing_docs)]

use clap::{Parser, Subcommand};
use log::LevelFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "dynview", about = "Runtime layout resolution and value formatting for stopped processes")]
struct Cli {
	/// Raise log verbosity (-v debug, -vv trace).
	#[arg(short, long, action = clap::ArgAction::Count, global = true)]
	verbose: u8,
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	Types(cmd::types::Args),
	Layout(cmd::layout::Args),
	Format(cmd::format::Args),
}

fn main() {
	if let Err(err) = run() {
		eprintln!("error: {err}");
		std::process::exit(1);
	}
}

fn run() -> dynview::inspect::Result<()> {
	let cli = Cli::parse();

	let level = match cli.verbose {
		0 => LevelFilter::Warn,
		1 => LevelFilter::Debug,
		_ => LevelFilter::Trace,
	};
	if let Err(err) = simple_logger::SimpleLogger::new().with_level(level).init() {
		eprintln!("warning: logger unavailable: {err}");
	}

	match cli.command {
		Commands::Types(args) => cmd::types::run(args),
		Commands::Layout(args) => cmd::layout::run(args),
		Commands::Format(args) => cmd::format::run(args),
	}
}
