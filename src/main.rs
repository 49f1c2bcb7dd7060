//! Tessera CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command, ShowArgs};
use derive_more::{Display, Error, From};
use tessera::demos::{self, DEMOS};
use tessera::invoke::{InvocationError, expected_output, invoke};
use tessera_passes::{ConfigError, PipelineOptions, Target, run_pipeline};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Display, Error, From)]
enum CliError {
    #[from(ignore)]
    #[display("unknown demo `{_0}` (see `tessera list`)")]
    UnknownDemo(#[error(not(source))] String),

    #[display("invalid target: {_0}")]
    Config(ConfigError),

    #[display("{_0}")]
    Invocation(InvocationError),

    #[from(ignore)]
    #[display("{_0} output element(s) differ from the expected values")]
    WrongOutput(#[error(not(source))] usize),
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::List => {
            for demo in DEMOS {
                println!("{:<34} {}", demo.name, demo.description);
            }
            Ok(())
        }
        Command::Show(args) => show(&args),
    };
    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn show(args: &ShowArgs) -> Result<(), CliError> {
    let demo = demos::find(&args.demo).ok_or_else(|| CliError::UnknownDemo(args.demo.clone()))?;
    let target = match (&args.config, &args.target) {
        (Some(path), _) => Target::load(path)?,
        (None, Some(triple)) => Target::parse(triple)?,
        (None, None) => Target::host(),
    };

    let mut options = PipelineOptions::new(demo.name);
    options.raise = !args.no_raise;
    options.lower_intrinsics = args.lower;
    options.profile = args.profile;

    let input = demo.build();
    println!("=== {} ===", demo.name);
    print!("{input}");
    let output = run_pipeline(&input, &options, &target);
    for pass in &output.passes {
        if pass.unchanged {
            println!("\n=== after {}: unchanged ===", pass.pass);
        } else {
            println!("\n=== after {} ===", pass.pass);
            print!("{}", pass.stmt);
        }
    }
    if !output.diagnostics.is_empty() {
        println!("\nDiagnostics ({} total):", output.diagnostics.len());
        for diag in &output.diagnostics {
            println!("  {diag}");
        }
    }

    if !args.run {
        return Ok(());
    }
    let stmt = output.stmt().unwrap_or(&input);
    let width = args.width.unwrap_or(demo.default_size.0);
    let height = args.height.unwrap_or(demo.default_size.1);
    let invocation = invoke(demo, stmt, width, height)?;

    println!("\n=== run {}x{} ===", invocation.width, invocation.height);
    let mismatches: usize = demo
        .inputs
        .iter()
        .zip(demo.outputs)
        .map(|(input, output)| {
            let expected = expected_output(input, invocation.width, invocation.height);
            let actual = invocation.outputs.get(output.name).map_or(&[][..], Vec::as_slice);
            let missing = expected.len().abs_diff(actual.len());
            missing + expected.iter().zip(actual).filter(|(e, a)| e != a).count()
        })
        .sum();
    if mismatches > 0 {
        return Err(CliError::WrongOutput(mismatches));
    }
    println!("outputs match");
    if let Some(report) = tessera_runtime::report(demo.name) {
        print!("{report}");
    }
    Ok(())
}
