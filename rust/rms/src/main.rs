//! Command-line entry point: DB/vault lifecycle, registration, and
//! maintenance operations from spec.md §6's programmatic surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use rms::config::{logging, Config};
use rms::ResourceManagementSystem;
use rms_graph::PipeId;
use rms_pipes::PipeRegistry;
use rms_query::Predicate;
use rms_store::Store;
use rms_vault::Vault;

#[derive(Parser)]
#[command(name = "rms", about = "Provenance-aware resource management system")]
struct Cli {
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Create the database and vault at their configured locations
    Init,
    /// Register a file on disk as a FileResource
    RegisterFile {
        path: PathBuf,
        /// Re-register even if an unchanged FileResource already covers this path
        #[arg(long)]
        force: bool,
    },
    /// Check the on-disk integrity of every tracked, non-overwritten FileResource
    IntegrityCheck {
        /// Recompute and compare the MD5 digest, not just the file size
        #[arg(long)]
        deep: bool,
    },
    /// List outputs of every Task invoking a given Pipe
    QueryByPipe { pipe_id: i64 },
    /// Remove unreferenced Vault entries
    SweepVault,
}

fn open_system(config: &Config) -> color_eyre::Result<(Store, Vault)> {
    Ok((Store::open(&config.db_path)?, Vault::open(&config.vault_dir)?))
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let config = Config::load()?;
    logging::init(&config.logging);

    let cli = Cli::parse();

    match cli.action {
        Action::Init => {
            std::fs::create_dir_all(&config.vault_dir)?;
            rms::create_new_db(&config.db_path)?;
            config.save()?;
            println!("initialized database at {}", config.db_path.display());
        }
        Action::RegisterFile { path, force } => {
            let (store, vault) = open_system(&config)?;
            let pipes = PipeRegistry::new(&store);
            let system = ResourceManagementSystem::new(&store, &vault, &pipes);
            let file_resource = system.register_file(&path, force)?;
            println!(
                "registered {} as FileResource {}",
                file_resource.path.display(),
                file_resource.id
            );
        }
        Action::IntegrityCheck { deep } => {
            let (store, vault) = open_system(&config)?;
            let pipes = PipeRegistry::new(&store);
            let system = ResourceManagementSystem::new(&store, &vault, &pipes);
            for (id, status) in system.integrity_check_all(deep)? {
                println!("{id}: {status:?}");
            }
        }
        Action::QueryByPipe { pipe_id } => {
            let (store, vault) = open_system(&config)?;
            let pipes = PipeRegistry::new(&store);
            let system = ResourceManagementSystem::new(&store, &vault, &pipes);
            let found = system.search(&Predicate::ByPipe {
                pipe_id: PipeId(pipe_id),
                arg: None,
            })?;
            for node in found {
                println!("{node:?}");
            }
        }
        Action::SweepVault => {
            let (store, vault) = open_system(&config)?;
            let pipes = PipeRegistry::new(&store);
            let system = ResourceManagementSystem::new(&store, &vault, &pipes);
            let swept = system.sweep_vault()?;
            println!("removed {swept} unreferenced vault entries");
        }
    }

    Ok(())
}
