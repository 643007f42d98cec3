//! Avalanche Compiler CLI
//!
//! Command-line interface driving the compiler core: compiling a module,
//! running the pipeline without emitting output, dumping P-Code in its
//! textual form, and a developer utility exercising the P-Code
//! serialisation round-trip.

use avalanche_compiler::pcode::serialize::{parse_program, serialize_program};
use avalanche_compiler::{compile_module, diagnostics, CompilerConfig};
use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::process;
use tracing::info;

#[derive(ClapParser)]
#[command(name = "avac")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Avalanche compiler core - compile .ava modules to P-Code", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .ava module, emitting its P-Code textual form to a file.
    Compile {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run the full pipeline (parse, macsub, codegen, validate) with no
    /// output beyond the diagnostic report and exit code.
    Check {
        input: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Serialise a compiled module's P-Code to stdout in the §6 textual
    /// list-of-lists format.
    DumpPcode {
        input: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Developer utility: parses a P-Code text file, re-serialises it, and
    /// reports whether the round trip is lossless.
    PcodeRoundtrip { input: PathBuf },

    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("avalanche_compiler=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile { input, output, config } => run_compile(&input, output.as_deref(), config.as_deref()),
        Commands::Check { input, config } => run_check(&input, config.as_deref()),
        Commands::DumpPcode { input, config } => run_dump_pcode(&input, config.as_deref()),
        Commands::PcodeRoundtrip { input } => run_roundtrip(&input),
        Commands::Completions { shell } => run_completions(shell),
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "avac", &mut io::stdout());
}

fn load_config(path: Option<&std::path::Path>) -> CompilerConfig {
    match path {
        None => CompilerConfig::default(),
        Some(path) => {
            let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("Error reading config {}: {}", path.display(), e);
                process::exit(1);
            });
            CompilerConfig::from_toml(&text).unwrap_or_else(|e| {
                eprintln!("Error parsing config {}: {}", path.display(), e);
                process::exit(1);
            })
        }
    }
}

fn read_source(input: &std::path::Path) -> String {
    std::fs::read_to_string(input).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {}", input.display(), e);
        process::exit(1);
    })
}

fn report_and_exit_if_failed(errors: &avalanche_compiler::ErrorList, config: &CompilerConfig) -> bool {
    let report = diagnostics::report(errors, config.max_report_lines, config.ansi_colour);
    if !report.is_empty() {
        eprint!("{report}");
    }
    println!("{}", diagnostics::summary_line(errors));
    !errors.is_empty()
}

fn run_compile(input: &std::path::Path, output: Option<&std::path::Path>, config_path: Option<&std::path::Path>) {
    let config = load_config(config_path);
    let source = read_source(input);
    let filename = input.to_string_lossy();
    let (program, errors) = compile_module(&source, &filename, &config);

    if report_and_exit_if_failed(&errors, &config) {
        process::exit(1);
    }
    let program = program.expect("no errors implies a program was produced");

    let text = serialize_program(&program);
    let output = output
        .map(PathBuf::from)
        .unwrap_or_else(|| input.with_extension("avam"));
    if let Err(e) = std::fs::write(&output, text) {
        eprintln!("Error writing {}: {}", output.display(), e);
        process::exit(1);
    }
    info!(path = %output.display(), "wrote P-Code module");
    println!("Compiled {} -> {}", input.display(), output.display());
}

fn run_check(input: &std::path::Path, config_path: Option<&std::path::Path>) {
    let config = load_config(config_path);
    let source = read_source(input);
    let filename = input.to_string_lossy();
    let (_program, errors) = compile_module(&source, &filename, &config);
    if report_and_exit_if_failed(&errors, &config) {
        process::exit(1);
    }
}

fn run_dump_pcode(input: &std::path::Path, config_path: Option<&std::path::Path>) {
    let config = load_config(config_path);
    let source = read_source(input);
    let filename = input.to_string_lossy();
    let (program, errors) = compile_module(&source, &filename, &config);
    if report_and_exit_if_failed(&errors, &config) {
        process::exit(1);
    }
    let program = program.expect("no errors implies a program was produced");
    print!("{}", serialize_program(&program));
}

fn run_roundtrip(input: &std::path::Path) {
    let text = read_source(input);
    let program = match parse_program(&text) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error parsing P-Code: {e}");
            process::exit(1);
        }
    };
    let reserialised = serialize_program(&program);
    let reparsed = match parse_program(&reserialised) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Round trip failed to reparse: {e}");
            process::exit(1);
        }
    };
    if program == reparsed {
        println!("round trip OK ({} global item(s))", program.items.len());
    } else {
        eprintln!("round trip produced a different program");
        process::exit(1);
    }
}
