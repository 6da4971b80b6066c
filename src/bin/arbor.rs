use std::{
    cell::RefCell,
    fs::File,
    io::{BufReader, Write as _},
    path::{Path, PathBuf},
    rc::Rc,
};

use anyhow::Context as _;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "arbor", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` wins when set.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a JSON value against a descriptor.
    Check(CheckArgs),
    /// Mount a document and write its output tree as JSON.
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Descriptor JSON.
    #[arg(long)]
    schema: PathBuf,

    /// Value JSON to check.
    #[arg(long)]
    value: PathBuf,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input document JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Treat prop validation diagnostics as render failures.
    #[arg(long)]
    strict: bool,

    /// Print the output fingerprint to stderr.
    #[arg(long)]
    fingerprint: bool,

    /// Output path (stdout when omitted).
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Check(args) => cmd_check(args),
        Command::Render(args) => cmd_render(args),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let f = File::open(path).with_context(|| format!("open {what} '{}'", path.display()))?;
    let r = BufReader::new(f);
    serde_json::from_reader(r).with_context(|| format!("parse {what} JSON"))
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let def: arbor::DescriptorDef = read_json(&args.schema, "descriptor")?;
    let raw: serde_json::Value = read_json(&args.value, "value")?;

    let mut tags = arbor::TagTable::new();
    let descriptor = def.lower(&mut tags)?;
    let value = tags.json_to_value(&raw);

    let result = arbor::validate(&descriptor, &value);
    if result.ok() {
        println!("ok");
        return Ok(());
    }
    println!("{result}");
    anyhow::bail!(
        "value does not match descriptor ({} diagnostic(s))",
        result.diagnostics.len()
    );
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let doc: arbor::Document = read_json(&args.in_path, "document")?;
    let root = doc.build()?;

    let mut config = doc.config.clone();
    config.strict_validation |= args.strict;
    let mut runtime = arbor::Runtime::new(config);

    let uncaught = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&uncaught);
    runtime.on_uncaught_error(move |e| sink.borrow_mut().push(e.clone()));

    let handle = runtime.mount(root)?;
    let first_uncaught = uncaught.borrow().first().cloned();
    if let Some(e) = first_uncaught {
        return Err(arbor::ArborError::from(e).into());
    }
    let output = runtime
        .output(handle)
        .context("root produced no output")?;

    if args.fingerprint {
        eprintln!("fingerprint: {}", arbor::fingerprint_output(output));
    }

    let json = serde_json::to_string_pretty(output).context("serialize output tree")?;
    match &args.out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create output dir '{}'", parent.display()))?;
            }
            std::fs::write(path, json.as_bytes())
                .with_context(|| format!("write output '{}'", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}").context("write output to stdout")?;
        }
    }
    Ok(())
}
