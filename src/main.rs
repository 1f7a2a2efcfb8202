use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mqtt_mapping_admin::{
    config::Config,
    mapping,
    serve,
    store::MappingStore,
    substitution::summarize,
};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "mapping-admin.toml")]
    config: PathBuf,

    /// Directory holding the mapping files, overrides the config file
    #[arg(short, long)]
    mappings_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace), overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serves the mapping administration UI
    Serve {
        /// Address to listen on
        #[arg(long)]
        listen: Option<String>,
    },
    /// Lists all mappings with their substitutions
    List,
    /// Validates all mappings against each other
    Check,
    /// Prints one mapping as stored
    Show {
        /// The mapping id
        id: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("could not load config {:?}", args.config))?;
    if let Some(dir) = args.mappings_dir {
        config.mappings_dir = dir;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    tracing_subscriber::fmt()
        .with_max_level(config.log_level()?)
        .init();

    match args.command {
        Commands::Serve { listen } => {
            if let Some(listen) = listen {
                config.listen = listen;
            }
            serve::run(config)?;
        }
        Commands::List => {
            let store = MappingStore::open(&config.mappings_dir)?;
            for m in store.list()? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    m.id,
                    m.topic,
                    m.target_api,
                    if m.active { "active" } else { "inactive" },
                    summarize(&m.substitutions)
                );
            }
        }
        Commands::Check => {
            let store = MappingStore::open(&config.mappings_dir)?;
            let mappings = store.list()?;
            let mut invalid = 0;
            for m in &mappings {
                let errors = mapping::validate(m, &mappings);
                for error in &errors {
                    warn!("Mapping {} ({}): {}", m.id, m.topic, error);
                }
                if !errors.is_empty() {
                    invalid += 1;
                }
            }
            if invalid > 0 {
                bail!("{} of {} mappings are invalid", invalid, mappings.len());
            }
            info!("All {} mappings are valid", mappings.len());
        }
        Commands::Show { id } => {
            let store = MappingStore::open(&config.mappings_dir)?;
            let m = store
                .get(&id)
                .with_context(|| format!("could not read mapping {}", id))?;
            print!("{}", toml::to_string(&m)?);
        }
    }

    Ok(())
}
