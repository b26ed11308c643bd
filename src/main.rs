use clap::Parser as CliParser;
use rtinyc::codegen::CodeGen;
use rtinyc::parser::Parser;
use rtinyc::semantic::SemanticAnalyzer;
use rtinyc::tokenizer::{self, Tokenizer};
use rtinyc::Diagnostic;
use std::fs;
use std::path::PathBuf;
use std::process::{self, Command};

#[derive(Debug, CliParser)]
#[clap(version, about = "TinyC to x86-64 System V assembly compiler")]
struct Args {
  /// Input file
  input: PathBuf,

  /// Assembly output path
  #[clap(short, long, default_value = "out.s")]
  output: PathBuf,

  /// Pretty-print the token stream before parsing
  #[clap(long)]
  debug_tokens: bool,

  /// Pretty-print the AST after parsing
  #[clap(long)]
  debug_ast: bool,

  /// Reserved for a future symbol-table dump
  #[clap(long)]
  debug_symbols: bool,

  /// Stop after writing assembly; do not assemble and link
  #[clap(long)]
  compile_only: bool,
}

fn main() {
  let args = Args::parse();
  process::exit(run(&args));
}

fn run(args: &Args) -> i32 {
  let source = match fs::read_to_string(&args.input) {
    Ok(source) => source,
    Err(err) => {
      eprintln!("Error: cannot read '{}': {err}", args.input.display());
      return 1;
    }
  };

  println!("TinyC Compiler");
  println!("Processing file: {}\n", args.input.display());

  let mut tokenizer = Tokenizer::new(&source);
  if args.debug_tokens {
    println!("=== LEXICAL ANALYSIS ===");
    print!("{}", tokenizer::dump_tokens(&mut tokenizer));
    println!();
  }

  println!("=== PARSING ===");
  let mut parser = Parser::new(tokenizer);
  let mut program = parser.parse_program();
  if parser.has_errors() {
    report("Parse", parser.diagnostics());
    return 1;
  }
  println!("Parsing completed successfully!\n");

  if args.debug_ast {
    println!("=== ABSTRACT SYNTAX TREE ===");
    print!("{}", program.dump());
    println!("============================\n");
  }

  println!("=== SEMANTIC ANALYSIS ===");
  let mut analyzer = SemanticAnalyzer::new();
  analyzer.analyze(&mut program);
  if analyzer.has_errors() {
    report("Semantic", analyzer.diagnostics());
    return 1;
  }
  println!("Semantic analysis completed successfully!\n");

  if args.debug_symbols {
    println!("=== SYMBOL TABLE DEBUG ===");
    println!("(Symbol table debugging not yet implemented)\n");
  }

  println!("=== CODE GENERATION ===");
  let assembly = CodeGen::new().generate(&program);
  if let Err(err) = fs::write(&args.output, assembly) {
    eprintln!("Error: cannot write '{}': {err}", args.output.display());
    return 1;
  }
  println!("Assembly written to: {}", args.output.display());

  if args.compile_only {
    return 0;
  }
  assemble_and_link(args)
}

fn report(stage: &str, diagnostics: &[Diagnostic]) {
  for diagnostic in diagnostics {
    eprintln!("{stage} error{diagnostic}");
  }
}

/// Assemble and link the emitted file against the C runtime with the system
/// toolchain. The executable lands next to the input, minus its extension.
fn assemble_and_link(args: &Args) -> i32 {
  println!("\n=== ASSEMBLY & LINKING ===");
  let executable = args.input.with_extension("");

  let status = Command::new("gcc")
    .args(["-m64", "-no-pie"])
    .arg(&args.output)
    .arg("runtime/runtime.c")
    .arg("-o")
    .arg(&executable)
    .status();

  match status {
    Ok(status) if status.success() => {
      println!("Executable created: {}", executable.display());
      0
    }
    Ok(_) => {
      eprintln!(
        "Error: assembly and linking failed; assembly kept at {}",
        args.output.display()
      );
      1
    }
    Err(err) => {
      eprintln!("Error: could not run gcc: {err}");
      1
    }
  }
}
