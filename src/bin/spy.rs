//! Command line entry point.
//!
//! Usage:
//!   spy [OPTIONS] <STEPS>...
//!
//! Reads standard input, runs it through the fragments given as steps and
//! prints every result. Errors go to stderr with exit status 1.

use std::cell::RefCell;
use std::io::{self, Write};
use std::process;
use std::rc::Rc;

use clap::{CommandFactory, FromArgMatches, Parser};
use tracing_subscriber::EnvFilter;

use spy::cli::{self, Options};
use spy::lang::PIPE_NAME;
use spy::{Error, Registry, format_raw, input};

/// Run code fragments over standard input.
#[derive(Parser, Debug)]
#[command(name = "spy", version)]
struct Args {
    /// Process lines as strings rather than all of stdin as one string
    #[arg(short = 'l', long)]
    each_line: bool,

    /// Don't print before this result (zero-based)
    #[arg(short, long, default_value_t = 0)]
    start: usize,

    /// Stop after getting this result (zero-based)
    #[arg(short, long)]
    end: Option<usize>,

    /// Code run once in the shared namespace before the pipeline
    #[arg(long, value_name = "CODE")]
    prelude: Vec<String>,

    /// Print the assembled chain instead of running it
    #[arg(long)]
    show_fragments: bool,

    /// Log debug output to stderr (SPY_LOG overrides)
    #[arg(short, long)]
    verbose: bool,

    #[arg(long, hide = true, default_value = PIPE_NAME)]
    pipe_name: String,

    #[arg(long, hide = true)]
    no_default_fragments: bool,

    #[arg(long, hide = true)]
    no_exception_handling: bool,

    /// Fragments, each optionally preceded by decorator flags
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "STEPS"
    )]
    steps: Vec<String>,
}

impl Args {
    fn options(&self) -> Options {
        Options {
            each_line: self.each_line,
            start: self.start,
            end: self.end,
            pipe_name: self.pipe_name.clone(),
            no_default_fragments: self.no_default_fragments,
            no_exception_handling: self.no_exception_handling,
            prelude: self.prelude.clone(),
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_env("SPY_LOG").unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(args: &Args, registry: &Registry) -> Result<(), Error> {
    let steps = cli::parse_steps(&args.steps, registry)?;
    let options = args.options();
    let out: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(io::stdout()));

    if args.show_fragments {
        let chain = cli::build_chain(&options, &steps, out)?;
        println!("{}", chain.format());
        return Ok(());
    }

    let data = input::read_input(io::stdin().lock(), options.each_line)?;
    cli::run(&options, &steps, data, out)
}

fn report(err: &Error) {
    match err {
        Error::Traceback(caught) => caught.print_traceback(),
        Error::Fragment(err) => eprint!("{}", format_raw(err)),
        Error::Syntax(err) => eprintln!("{err}"),
        other => eprintln!("spy: {other}"),
    }
}

fn main() {
    let registry = Registry::builtin();
    let matches = Args::command()
        .after_help(format!("Decorators:\n{}", registry.help()))
        .get_matches();
    let args = match Args::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };
    init_logging(args.verbose);

    if let Err(err) = run(&args, &registry) {
        report(&err);
        process::exit(1);
    }
}
