mod cli;

use hinv::secrets::{Redacting, SecretFilter};
use hinv::{Host, Inventory, Resolution};
use serde::Serialize;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("HINV_LOG"))
        .with_writer(Redacting::new(std::io::stderr, SecretFilter::global()))
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Hosts(query) => hosts(query),
        cli::Command::Host(query) => host(query),
        cli::Command::Target(query) => target(query),
        cli::Command::Groups(query) => groups(query),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn hosts(cli: cli::QueryArgs) -> anyhow::Result<()> {
    let inventory = inventory(&cli)?;
    let hosts: Vec<&Host> = inventory.hosts().values().map(|host| &**host).collect();
    output(&cli.output, &hosts)
}

pub fn host(cli: cli::NamedQuery) -> anyhow::Result<()> {
    let inventory = inventory(&cli.query)?;
    let Some(host) = inventory.host(&cli.name) else {
        anyhow::bail!("Unknown host `{}`", cli.name);
    };
    output(&cli.query.output, &**host)
}

pub fn target(cli: cli::NamedQuery) -> anyhow::Result<()> {
    let inventory = inventory(&cli.query)?;
    let Some(hosts) = inventory.target(&cli.name) else {
        anyhow::bail!("Unknown target `{}`", cli.name);
    };
    let hosts: Vec<&Host> = hosts.iter().map(|host| &**host).collect();
    output(&cli.query.output, &hosts)
}

pub fn groups(cli: cli::QueryArgs) -> anyhow::Result<()> {
    let inventory = inventory(&cli)?;
    let groups: indexmap::IndexMap<&str, Vec<&str>> = inventory
        .groups()
        .map(|(name, hosts)| (name, hosts.iter().map(|host| host.name()).collect()))
        .collect();
    output(&cli.output, &groups)
}

/// Loads, resolves and reports diagnostics
fn inventory(cli: &cli::QueryArgs) -> anyhow::Result<Inventory> {
    let documents = load(&cli.input)?;

    let mut options = hinv::ResolveOptions::default();
    if let Some(timeout) = cli.resolve.connection_timeout {
        options.default_connection_timeout = timeout;
    }

    let Resolution {
        inventory,
        diagnostics,
    } = hinv::Resolver::new(options).resolve(&documents);

    let filter = SecretFilter::global();
    for diagnostic in &diagnostics {
        eprintln!("{}", filter.filter(&diagnostic.to_string()));
    }

    match inventory {
        Some(inventory) => Ok(inventory),
        None => anyhow::bail!(
            "Inventory resolution failed with {} error(s)",
            diagnostics.errors().count()
        ),
    }
}

fn load(input: &cli::InputArgs) -> anyhow::Result<hinv::hcl_documents::HclDocuments> {
    let mut documents = hinv::hcl_documents::HclDocuments::default();

    if !input.workdir && input.files.is_empty() && input.directories.is_empty() {
        let stdin = std::io::read_to_string(std::io::stdin())?;
        documents.insert(stdin, None::<std::path::PathBuf>)?;
        return Ok(documents);
    }

    if input.workdir {
        documents.load_directory(&std::env::current_dir()?)?;
    }

    for file_path in &input.files {
        documents.load_file(file_path)?;
    }

    for dir_path in &input.directories {
        documents.load_directory(dir_path)?;
    }

    anyhow::ensure!(documents.source_count() > 0, "No files loaded");

    Ok(documents)
}

fn output(output: &cli::OutputArgs, value: &impl Serialize) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}

/// (hinv-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    let documents = load(&cli.input)?;

    match cli.command {
        cli::DevSubCommand::Documents => println!("{documents:#?}"),
        cli::DevSubCommand::Inventory => {
            let mut diagnostics = hinv::Diagnostics::new();
            let intermediate =
                hinv::intermediate::IntermediateInventory::build(&documents, &mut diagnostics);
            println!("{intermediate:#?}");
            eprintln!("{diagnostics}");
        }
    }

    Ok(())
}
