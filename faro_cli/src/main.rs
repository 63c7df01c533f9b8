mod theme;

use clap::{Parser as ClapParser, Subcommand};
use cliclack::{input, intro, set_theme};
use faro_vm::execution::{EvalMode, Runtime};
use theme::DefaultTheme;

/// A JavaScript engine
#[derive(Debug, ClapParser)]
#[command(name = "faro")]
#[command(about = "A JavaScript engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parses a file and prints out the AST
    Parse {
        /// The path of the file to parse
        path: String,
    },

    /// Evaluates a file
    Eval {
        /// Evaluates the file as an ECMAScript module rather than a script.
        #[arg(short, long)]
        module: bool,

        /// The file to evaluate.
        path: String,
    },

    /// Runs the REPL
    Repl,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    match args.command {
        Command::Parse { path } => {
            let file = std::fs::read_to_string(&path)?;
            match faro_parser::parse_program(&file) {
                Ok((_program, nodes)) => println!("{nodes:#?}"),
                Err(e) => faro_cli::exit_with_parse_error(&e, &path, &file),
            }
        }
        Command::Eval { module, path } => {
            let file = std::fs::read_to_string(&path)?;
            let runtime = Runtime::new();
            let mut ctx = runtime.create_context();
            faro_cli::initialize_globals(&mut ctx);

            let mode = if module { EvalMode::Module } else { EvalMode::Script };
            let result = ctx.eval(&file, &path, mode);
            ctx.run_microtasks();
            println!("{}", faro_cli::format_result(&mut ctx, result));
        }
        Command::Repl => {
            let runtime = Runtime::new();
            let mut ctx = runtime.create_context();
            faro_cli::initialize_globals(&mut ctx);

            set_theme(DefaultTheme);
            println!();

            let _ = ctrlc::set_handler(|| {
                std::process::exit(0);
            });

            let mut placeholder = "Enter a line of JavaScript".to_string();
            loop {
                intro("Faro Repl")?;
                let line: String = input("").placeholder(&placeholder).interact()?;

                if line == "exit" {
                    std::process::exit(0);
                }
                placeholder = line.clone();

                let result = ctx.eval(&line, "<repl>", EvalMode::Script);
                ctx.run_microtasks();
                println!("{}\n", faro_cli::format_result(&mut ctx, result));
            }
        }
    }
    Ok(())
}
