use archivist::config::{self, CatalogConfig};
use archivist::imaging::RustBackend;
use archivist::types::BuildStamp;
use archivist::walk::{Selection, Selector};
use archivist::{freeze, migrate, migrations, output, relocate, sync, unite};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Which leaves a file command acts on.
#[derive(clap::Args, Clone)]
struct Target {
    /// Branch directory name, or `all`
    #[arg(default_value = "all")]
    branch: Selector,

    /// Leaf directory name, or `all`
    #[arg(default_value = "all")]
    leaf: Selector,

    /// Overwrite outputs that already exist
    #[arg(long)]
    force: bool,
}

impl Target {
    fn selection(&self) -> Selection {
        Selection {
            branch: self.branch.clone(),
            leaf: self.leaf.clone(),
            force: self.force,
        }
    }
}

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once; called exactly once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "archivist")]
#[command(about = "Builds a media catalog database from hand-written leaf descriptors")]
#[command(long_about = "\
Builds a media catalog database from hand-written leaf descriptors

Every leaf is a directory with a source.json descriptor and the media files it
lists. Leaves are grouped into branches:

  sources/
  └── trips/                       # branch
      └── 2019_japan/              # leaf
          ├── source.json          # themes, groups, metas, synonyms, users
          └── places/              # theme route
              └── tokyo/           # group route: every media file is listed
                  ├── 001.jpg
                  └── 002.jpg

Pipeline (each stage can be run for `all` or one branch/leaf):

  unite            source.json      → storage/<branch>/<leaf>/unit.json
  make-migrations  unit.json        → migration.sql + relocation.json
  migrate          migration.sql    → migration.db
  relocate         relocation.json  → content/{content,preview,thumbnails}/...
  sync             migration.db     → <branch>/branch.db → root.db
  freeze           root.db          → database/database.db

Run 'archivist gen-config' to generate a documented archivist.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (default: ./archivist.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Sources folder (overrides config)
    #[arg(long, global = true)]
    sources: Option<PathBuf>,

    /// Storage folder (overrides config)
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    /// Content output folder (overrides config)
    #[arg(long, global = true)]
    content: Option<PathBuf>,

    /// Static database folder (overrides config)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve leaf descriptors into unit files
    Unite(Target),
    /// Turn unit files into migrations and relocation plans
    #[command(alias = "make_migrations")]
    MakeMigrations(Target),
    /// Apply migrations to fresh leaf databases
    Migrate(Target),
    /// Copy and scale media files into the content folder
    Relocate(Target),
    /// Merge leaf databases into branch databases, then into root
    Sync(Target),
    /// Rebuild the static database from root
    Freeze,
    /// Print a stock archivist.toml with all options documented
    GenConfig,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(ExitCode::SUCCESS);
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return Ok(ExitCode::from(1));
        }
    };
    let folders = &config.folders;

    let required = match cli.command {
        Command::Unite(_) | Command::MakeMigrations(_) => &folders.sources,
        _ => &folders.storage,
    };
    if !required.is_dir() {
        eprintln!("Folder {} does not exist", required.display());
        return Ok(ExitCode::from(1));
    }

    init_thread_pool(&config.processing);
    let backend = RustBackend::new();

    match &cli.command {
        Command::Unite(target) => {
            let stamp = BuildStamp::fresh();
            let report = unite::unite(
                &backend,
                folders,
                &config.media,
                &target.selection(),
                &stamp,
            )?;
            output::print_stage_report("unite", &report);
        }
        Command::MakeMigrations(target) => {
            let report =
                migrations::make_migrations(folders, &config.media, &target.selection())?;
            output::print_stage_report("make-migrations", &report);
        }
        Command::Migrate(target) => {
            let report = migrate::migrate(&folders.storage, &target.selection())?;
            output::print_stage_report("migrate", &report);
        }
        Command::Relocate(target) => {
            let report =
                relocate::relocate(&backend, folders, &config.media, &target.selection())?;
            output::print_stage_report("relocate", &report);
        }
        Command::Sync(target) => {
            let report = sync::sync(&folders.storage, &target.selection())?;
            output::print_stage_report("sync", &report);
        }
        Command::Freeze => {
            let summary = freeze::freeze(&folders.storage, &folders.database)?;
            output::print_freeze_summary(&summary);
        }
        Command::GenConfig => {}
    }

    Ok(ExitCode::SUCCESS)
}

/// Config file (explicit or from the working directory) with CLI folder
/// overrides applied.
fn load_config(cli: &Cli) -> Result<CatalogConfig, config::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => config::load_config_file(path)?,
        None => config::load_config(Path::new("."))?,
    };
    let overrides = [
        (&cli.sources, &mut config.folders.sources),
        (&cli.storage, &mut config.folders.storage),
        (&cli.content, &mut config.folders.content),
        (&cli.database, &mut config.folders.database),
    ];
    for (flag, folder) in overrides {
        if let Some(path) = flag {
            *folder = path.clone();
        }
    }
    Ok(config)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
