use std::{
    fs,
    ops::Range,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context;
use c0c::{compile, tokenize, CompileError, Position};
use clap::{ArgGroup, Parser};
use codesnake::{Block, CodeWidth, Label, LineIndex};
use yansi::Paint;

/// Compile C0 source into stack-machine assembly
#[derive(Parser, Debug)]
#[command(version, about)]
#[command(group(ArgGroup::new("mode").required(true).args(["tokens", "assemble"])))]
struct Args {
    /// C0 source file
    input: PathBuf,
    /// Write the token list
    #[arg(short = 't')]
    tokens: bool,
    /// Write the compiled program
    #[arg(short = 's')]
    assemble: bool,
    /// Where to write the result
    #[arg(short, long)]
    output: PathBuf,
}

/// Byte range to underline for an error at `position`. Positions past the
/// last token point at whitespace, so those fall back to the character before.
fn label_range(source: &str, position: Position) -> Option<Range<usize>> {
    let line_start: usize = source
        .split_inclusive('\n')
        .take(position.line)
        .map(str::len)
        .sum();
    let start = line_start + position.column;
    match source.get(start..).and_then(|rest| rest.chars().next()) {
        Some(ch) if !ch.is_whitespace() => Some(start..start + ch.len_utf8()),
        _ => {
            let ch = source.get(..start)?.chars().next_back()?;
            Some(start - ch.len_utf8()..start)
        }
    }
}

fn print_excerpt(path: &Path, source: &str, err: &CompileError) {
    let Some(range) = label_range(source, err.position) else {
        return;
    };
    let idx = LineIndex::new(source);
    let label = Label::new(range)
        .with_text(err.kind.to_string().red().to_string())
        .with_style(|s| s.red().bold().to_string());
    let Some(block) = Block::new(&idx, [label]) else {
        return;
    };
    let block = block.map_code(|c| CodeWidth::new(c, c.len()));
    eprintln!("{}[{}]", block.prologue(), path.display());
    eprint!("{block}");
    eprintln!("{}", block.epilogue());
}

fn run(args: &Args) -> anyhow::Result<ExitCode> {
    let source = fs::read(&args.input)
        .with_context(|| format!("cannot read {}", args.input.display()))?;

    let output = if args.tokens {
        tokenize(&source).map(|tokens| {
            tokens
                .iter()
                .map(|token| format!("{token}\n"))
                .collect::<String>()
        })
    } else {
        compile(&source).map(|program| program.to_string())
    };

    match output {
        Ok(output) => {
            fs::write(&args.output, &output)
                .with_context(|| format!("cannot write {}", args.output.display()))?;
            log::info!("wrote {} bytes to {}", output.len(), args.output.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{}", err.red());
            // the excerpt needs text; non-UTF-8 input only gets the error line
            if let Ok(text) = std::str::from_utf8(&source) {
                print_excerpt(&args.input, text, &err);
            }
            Ok(ExitCode::from(2))
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(2)
        }
    }
}
