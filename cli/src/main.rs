mod spec_file;
mod test_runner;

use std::path::Path;
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use flang::ConstructKind;
use tracing_subscriber::EnvFilter;

use flang_engine::{EngineError, FileId, Session, SessionOptions, Spec};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "FLANG_LOG";

#[derive(Parser)]
#[command(name = "flang", version, about = "Frame-based pattern language: match, generate, complete")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load and link a grammar
    Check(CheckArgs),

    /// Match input against a grammar and print the fields as TOML
    Match(MatchArgs),

    /// Generate text from a spec
    Generate(GenerateArgs),

    /// Run .test.flang test files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Grammar file (or inline markup)
    grammar: String,

    /// List the global symbol table
    #[arg(long)]
    symbols: bool,
}

#[derive(clap::Args)]
struct MatchArgs {
    /// Grammar file (or inline markup)
    grammar: String,

    /// Input file, or the text itself with --text
    input: String,

    /// Treat INPUT as the text to match
    #[arg(long)]
    text: bool,

    /// Print the match tree instead of the fields
    #[arg(long)]
    tree: bool,

    /// Report a failed match without an error location
    #[arg(long)]
    lenient: bool,

    /// Accept input left over after the grammar is satisfied
    #[arg(long)]
    allow_trailing: bool,
}

#[derive(clap::Args)]
struct GenerateArgs {
    /// Grammar file (or inline markup)
    grammar: String,

    /// TOML file holding the fields to generate from
    #[arg(long)]
    spec: Option<String>,

    /// Set a spec field. Repeatable.
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Input file matched first to seed completion. Repeatable.
    #[arg(long)]
    sample: Vec<String>,

    /// Ignore spec fields the grammar does not use
    #[arg(long)]
    allow_unused: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.flang file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Check(args) => do_check(args, cli.no_color),
        Command::Match(args) => do_match(args, cli.no_color),
        Command::Generate(args) => do_generate(args, cli.no_color),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn do_check(args: CheckArgs, no_color: bool) {
    let mut session = Session::new(SessionOptions::default());
    let grammar = load_or_exit(&mut session, &args.grammar, no_color);

    if args.symbols {
        let registry = session.registry();
        for (key, at) in session.symbols().iter() {
            let construct = registry.construct(at);
            match &construct.kind {
                ConstructKind::Predicate { pattern } => {
                    println!("{}  predicate  {}", key, pattern.raw())
                }
                ConstructKind::Reference { target } => {
                    let target = match target.file() {
                        Some(file) => format!("{}:{}", file, target.path()),
                        None => target.path().to_string(),
                    };
                    println!("{}  use  -> {}", key, target)
                }
                kind => println!("{}  {}", key, kind.tag()),
            }
        }
        return;
    }

    let symbols = session.object(grammar).map(|o| o.symbols.len()).unwrap_or(0);
    eprintln!("ok: {} loaded ({} symbols)", args.grammar, symbols);
}

fn do_match(args: MatchArgs, no_color: bool) {
    let options = SessionOptions {
        stop_on_error: !args.lenient,
        allow_trailing: args.allow_trailing,
        ..SessionOptions::default()
    };
    let mut session = Session::new(options);
    let grammar = load_or_exit(&mut session, &args.grammar, no_color);

    let text = if args.text {
        args.input.clone()
    } else {
        read_input(&args.input)
    };

    match session.match_tree(grammar, &text) {
        Ok(Some(found)) if args.tree => print!("{}", found),
        Ok(Some(found)) => print!("{}", spec_file::to_toml(&found.to_flat_dict())),
        Ok(None) => {
            eprintln!("no match");
            process::exit(1);
        }
        Err(error) => {
            report(session.files(), &error, no_color);
            process::exit(1);
        }
    }
}

fn do_generate(args: GenerateArgs, no_color: bool) {
    let options = SessionOptions {
        strict_spec: !args.allow_unused,
        ..SessionOptions::default()
    };
    let mut session = Session::new(options);
    let grammar = load_or_exit(&mut session, &args.grammar, no_color);

    let spec = match build_spec(args.spec.as_deref(), &args.set) {
        Ok(spec) => spec,
        Err(message) => {
            eprintln!("error: {}", message);
            process::exit(1);
        }
    };

    for sample in &args.sample {
        let text = read_input(sample);
        if let Err(error) = session.match_text(grammar, &text) {
            eprintln!("error: sample '{}' does not match", sample);
            report(session.files(), &error, no_color);
            process::exit(1);
        }
    }

    let result = if args.sample.is_empty() {
        session.generate(grammar, &spec)
    } else {
        session.generate_completed(grammar, &spec)
    };

    match result {
        Ok(text) => println!("{}", text),
        Err(error) => {
            report(session.files(), &error, no_color);
            process::exit(1);
        }
    }
}

fn build_spec(file: Option<&str>, assignments: &[String]) -> Result<Spec, String> {
    let mut spec = match file {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read '{}': {}", path, e))?;
            spec_file::from_str(&source).map_err(|e| format!("{}: {}", path, e))?
        }
        None => Spec::new(),
    };
    for raw in assignments {
        let (key, value) = spec_file::parse_assignment(raw)?;
        spec.insert(key, value);
    }
    Ok(spec)
}

fn load_or_exit(session: &mut Session, grammar: &str, no_color: bool) -> FileId {
    match session.load(grammar) {
        Ok(file) => file,
        Err(error) => {
            report(session.files(), &error, no_color);
            process::exit(1);
        }
    }
}

/// Read an input file. A single trailing newline is not part of the input.
fn read_input(path: &str) -> String {
    match std::fs::read_to_string(path) {
        Ok(s) => {
            let trimmed = s
                .strip_suffix("\r\n")
                .or_else(|| s.strip_suffix('\n'))
                .unwrap_or(&s);
            trimmed.to_string()
        }
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", path, e);
            process::exit(1);
        }
    }
}

fn report(files: &SimpleFiles<String, String>, error: &EngineError, no_color: bool) {
    let diagnostics = error.to_diagnostics();
    if diagnostics.is_empty() {
        eprintln!("error: {}", error);
        return;
    }

    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let writer = StandardStream::stderr(color_choice);
    let config = term::Config::default();
    for diagnostic in &diagnostics {
        let _ = term::emit_to_write_style(&mut writer.lock(), &config, files, diagnostic);
    }
}
