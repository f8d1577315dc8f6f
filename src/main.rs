use std::io;
use std::process;

use chibi::Emit;
use clap::{Parser, ValueEnum};
use tracing::Level;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitArg {
  Asm,
  Ast,
}

impl From<EmitArg> for Emit {
  fn from(arg: EmitArg) -> Self {
    match arg {
      EmitArg::Asm => Emit::Asm,
      EmitArg::Ast => Emit::Ast,
    }
  }
}

/// Compile a tiny block-structured expression language to x86-64 assembly.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
  /// Program text, e.g. '{ a=3; return a*2; }'
  source: String,

  /// Output to print on success
  #[arg(long, value_enum, default_value = "asm")]
  emit: EmitArg,

  /// Log pipeline progress to stderr (-v debug, -vv trace)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

fn main() {
  let cli = match Cli::try_parse() {
    Ok(cli) => cli,
    Err(err) => {
      // Help and version go to stdout and are not failures.
      let code = if err.use_stderr() { 1 } else { 0 };
      let _ = err.print();
      process::exit(code);
    }
  };

  let level = match cli.verbose {
    0 => Level::WARN,
    1 => Level::DEBUG,
    _ => Level::TRACE,
  };
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_target(false)
    .with_max_level(level)
    .init();

  match chibi::compile(&cli.source, cli.emit.into()) {
    Ok(output) => print!("{output}"),
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  }
}
