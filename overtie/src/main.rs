//! overtie CLI: inspect class descriptions

use clap::{Parser, Subcommand};
use overtie::describe::HierarchyFile;
use overtie::{ClassId, Referent, Runtime, RuntimeConfig, Value};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "overtie", version, about = "Operator overloading and tie inspector")]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Runtime configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the method resolution order of a class
    Mro {
        /// Class description file
        file: PathBuf,
        class: String,
    },
    /// Dump the flattened operator table of a class as JSON
    Overloads {
        /// Class description file
        file: PathBuf,
        class: String,
    },
    /// Bless an empty hash into a class and show its conversions
    Convert {
        /// Class description file
        file: PathBuf,
        class: String,
    },
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Command::Mro { file, class } => print_mro(cli.config.as_deref(), &file, &class),
        Command::Overloads { file, class } => print_overloads(cli.config.as_deref(), &file, &class),
        Command::Convert { file, class } => print_conversions(cli.config.as_deref(), &file, &class),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load(config: Option<&Path>, file: &Path) -> Result<Runtime, Box<dyn std::error::Error>> {
    let config = match config {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default().with_env_overrides()?,
    };
    let rt = Runtime::with_config(config);
    HierarchyFile::load(file)?.install(&rt)?;
    Ok(rt)
}

fn described_class(rt: &Runtime, file: &Path, class: &str) -> Result<ClassId, Box<dyn std::error::Error>> {
    if !rt.classes().is_defined(class) {
        return Err(format!("class \"{class}\" is not described in {}", file.display()).into());
    }
    Ok(ClassId::new(class))
}

fn print_mro(config: Option<&Path>, file: &Path, class: &str) -> Result<(), Box<dyn std::error::Error>> {
    let rt = load(config, file)?;
    let class = described_class(&rt, file, class)?;
    for ancestor in rt.classes().mro(&class).iter() {
        println!("{ancestor}");
    }
    Ok(())
}

fn print_overloads(config: Option<&Path>, file: &Path, class: &str) -> Result<(), Box<dyn std::error::Error>> {
    let rt = load(config, file)?;
    let class = described_class(&rt, file, class)?;
    let summary = rt.overload_context(&class).map(|ctx| ctx.summary());
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn print_conversions(config: Option<&Path>, file: &Path, class: &str) -> Result<(), Box<dyn std::error::Error>> {
    let rt = load(config, file)?;
    let class = described_class(&rt, file, class)?;
    let obj = rt.bless(&Referent::empty_hash(), class);
    let number = match rt.numify(&obj)? {
        Value::Int(n) => serde_json::json!(n),
        Value::Float(x) => serde_json::json!(x),
        other => serde_json::json!(other.to_string()),
    };
    let report = serde_json::json!({
        "string": rt.stringify(&obj)?,
        "number": number,
        "bool": rt.boolify(&obj)?,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
