use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use geode_core::lexer::lex;
use geode_core::parser::parse;
use geode_core::span::FileId;
use geode_core::{CompileOptions, CoreError, Diagnostic, SourceFile, compile, load_sources};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    Llvm,
    Ast,
    Tokens,
}

/// Compile Geode sources to LLVM IR.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source file or directory of `.g` files (stdin if omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output path, `-` for stdout
    #[arg(short, long, default_value = "-")]
    output: String,

    #[arg(long, value_enum, default_value_t = Emit::Llvm)]
    emit: Emit,

    /// Package of units without an `is` declaration
    #[arg(long, value_name = "NAME")]
    package: Option<String>,

    #[arg(long, value_name = "TRIPLE")]
    target: Option<String>,

    /// Make a missing return in a non-void function an error
    #[arg(long)]
    strict_returns: bool,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    execute(cli)
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn execute(cli: Cli) -> Result<()> {
    let sources = read_sources(cli.input.as_deref())?;
    tracing::debug!(units = sources.len(), emit = ?cli.emit, "loaded sources");
    let mut options = CompileOptions::default();
    if let Some(package) = cli.package {
        options.default_package = package;
    }
    if let Some(target) = cli.target {
        options.target_triple = target;
    }
    options.strict_returns = cli.strict_returns;

    let text = match cli.emit {
        Emit::Tokens => emit_tokens(&sources),
        Emit::Ast => emit_ast(&sources, &options)?,
        Emit::Llvm => {
            let artifact =
                compile(&sources, &options).map_err(|err| report(&sources, &err))?;
            for diagnostic in &artifact.diagnostics {
                eprintln!("{}", render(&sources, diagnostic));
            }
            artifact.ir
        }
    };
    write_output(&cli.output, text.as_bytes())
}

fn read_sources(input: Option<&Path>) -> Result<Vec<SourceFile>> {
    match input {
        Some(path) => load_sources(path)
            .with_context(|| format!("failed to read sources from {}", path.display())),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            Ok(vec![SourceFile::new("<stdin>", buffer)])
        }
    }
}

fn emit_tokens(sources: &[SourceFile]) -> String {
    let mut out = String::new();
    for (index, source) in sources.iter().enumerate() {
        let result = lex(FileId(index as u32), &source.contents);
        for token in &result.tokens {
            out.push_str(&format!(
                "{}:{} {:?} {:?}\n",
                token.span.line,
                token.span.column,
                token.kind,
                token.text(&source.contents)
            ));
        }
        for diagnostic in &result.diagnostics {
            eprintln!("{}", render(sources, diagnostic));
        }
    }
    out
}

fn emit_ast(sources: &[SourceFile], options: &CompileOptions) -> Result<String> {
    let mut out = String::new();
    for (index, source) in sources.iter().enumerate() {
        let unit = parse(FileId(index as u32), &source.contents, &options.default_package)
            .map_err(|err| report(sources, &err))?;
        out.push_str(&unit.to_string());
    }
    Ok(out)
}

/// `path:line:column: error[CODE]: message` for a core error.
fn report(sources: &[SourceFile], err: &CoreError) -> anyhow::Error {
    match err.span() {
        Some(_) => anyhow!(render(sources, &Diagnostic::from(err))),
        None => anyhow!("{err}"),
    }
}

fn render(sources: &[SourceFile], diagnostic: &Diagnostic) -> String {
    let path = sources
        .get(diagnostic.span.file.0 as usize)
        .map(|source| source.path.display().to_string())
        .unwrap_or_else(|| "<unknown>".to_string());
    diagnostic.render(&path)
}

fn write_output(path: &str, bytes: &[u8]) -> Result<()> {
    if path == "-" {
        let mut stdout = io::stdout().lock();
        stdout.write_all(bytes).context("failed to write to stdout")?;
        return Ok(());
    }
    if let Some(parent) = PathBuf::from(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {parent:?}"))?;
        }
    }
    fs::write(path, bytes).with_context(|| format!("failed to write output file {path}"))?;
    Ok(())
}
