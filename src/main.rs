//! `docsync`: keep a documentation catalog in step with build output.

mod logging;

use clap::{Args, Parser, Subcommand};
use derive_more::{Display, Error};
use docsync_catalog::Inventory;
use docsync_catalog::models::BuildMarker;
use docsync_config::{AppConfig, load_build_config};
use docsync_database::{Database, Repository};
use docsync_storage::BackendHandle;
use docsync_storage::backend::LocalBackend;
use docsync_sync::{Context, SyncRequest, import_inventory, import_inventory_from_storage, sync_version};
use exn::{Exn, ResultExt};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// `EX_TEMPFAIL`: the pass may succeed if retried.
const EXIT_RETRYABLE: u8 = 75;

type Result<T> = std::result::Result<T, Exn<ErrorKind>>;

#[derive(Debug, Display, Error)]
enum ErrorKind {
    #[display("invalid configuration")]
    Config,
    #[display("cannot open catalog database {}", _0.display())]
    Database(#[error(not(source))] PathBuf),
    #[display("cannot open storage at {}", _0.display())]
    Storage(#[error(not(source))] PathBuf),
    #[display("cannot read inventory {}", _0.display())]
    InventoryFile(#[error(not(source))] PathBuf),
    #[display("pass aborted")]
    Pass { retryable: bool },
}

#[derive(Parser)]
#[command(name = "docsync", version, about = "Reconcile documentation build output with a searchable catalog")]
struct Cli {
    /// Configuration file (YAML, TOML or JSON).
    #[arg(long, short, global = true, env = "DOCSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Build configuration shipped with the build, replacing the one in the
    /// configuration file.
    #[arg(long, global = true)]
    build_config: Option<PathBuf>,

    /// Compute and report changes without writing them.
    #[arg(long, global = true)]
    dry_run: bool,

    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sync a version's catalog with its build output, then import the
    /// build's `objects.inv`.
    Sync(SyncArgs),
    /// Replace a version's domain objects from an inventory file.
    Import(ImportArgs),
}

#[derive(Args)]
struct BuildArgs {
    #[arg(long)]
    version_id: i64,
    /// Commit the build was produced from.
    #[arg(long)]
    commit: String,
    #[arg(long)]
    build_id: i64,
}
impl BuildArgs {
    fn marker(&self) -> BuildMarker {
        BuildMarker::new(self.commit.clone(), self.build_id)
    }
}

#[derive(Args)]
struct SyncArgs {
    #[command(flatten)]
    build: BuildArgs,
    /// Build output location, relative to the storage root.
    #[arg(long)]
    prefix: PathBuf,
    /// Catalog path to keep even if the build no longer has it.
    #[arg(long = "protect", value_name = "PATH")]
    protected: Vec<String>,
    /// Re-hash pages that already exist in the catalog.
    #[arg(long)]
    refresh_hashes: bool,
    /// Don't import `objects.inv` after syncing.
    #[arg(long)]
    skip_inventory: bool,
}

#[derive(Args)]
struct ImportArgs {
    #[command(flatten)]
    build: BuildArgs,
    /// `objects.inv`, or its decoded form as `.json`.
    file: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            match &*err {
                ErrorKind::Pass { retryable: true } => ExitCode::from(EXIT_RETRYABLE),
                _ => ExitCode::FAILURE,
            }
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    if let Some(path) = &cli.build_config {
        config.build = load_build_config(path).or_raise(|| ErrorKind::Config)?;
    }
    config.sync.dry_run |= cli.dry_run;
    let ctx = Context::from_app(&config).or_raise(|| ErrorKind::Config)?;

    let db = open_database(&config.database).await?;
    let repository = Repository::new(db.pool().clone(), config.sync.dry_run);
    let result = match cli.command {
        Command::Sync(args) => sync(&config, ctx, &repository, args).await,
        Command::Import(args) => import(&ctx, &repository, args).await,
    };
    db.close().await;
    result
}

async fn open_database(path: &Path) -> Result<Database> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Database(path.to_path_buf()))?;
    }
    Database::connect(path).await.or_raise(|| ErrorKind::Database(path.to_path_buf()))
}

fn aborted(err: Exn<docsync_sync::error::ErrorKind>) -> Exn<ErrorKind> {
    let retryable = err.is_retryable();
    err.raise(ErrorKind::Pass { retryable })
}

async fn sync(config: &AppConfig, ctx: Context, repository: &Repository, args: SyncArgs) -> Result<()> {
    let root = std::path::absolute(&config.storage_root).or_raise(|| ErrorKind::Storage(config.storage_root.clone()))?;
    let backend: BackendHandle = Arc::new(LocalBackend::new("local", &root).or_raise(|| ErrorKind::Storage(root.clone()))?);
    let ctx = match args.refresh_hashes {
        true => ctx.with_refresh_hashes(true),
        false => ctx,
    };

    let marker = args.build.marker();
    let request = SyncRequest::new(args.build.version_id, &args.prefix, marker.clone()).protect(args.protected);
    let report = sync_version(&backend, repository, &ctx, &request).await.map_err(aborted)?;
    for problem in &report.skipped {
        tracing::warn!(%problem, "skipped");
    }
    println!(
        "created {}, touched {}, deleted {}, retained {}, changed {} ({} skipped)",
        report.created.len(),
        report.touched.len(),
        report.deleted.len(),
        report.retained.len(),
        report.changed.len(),
        report.skipped.len(),
    );

    if args.skip_inventory {
        return Ok(());
    }
    let imported =
        import_inventory_from_storage(&backend, repository, &ctx, args.build.version_id, &args.prefix, &marker)
            .await
            .map_err(aborted)?;
    match imported {
        Some(report) => print_import(&report),
        None => println!("no inventory"),
    }
    Ok(())
}

async fn import(ctx: &Context, repository: &Repository, args: ImportArgs) -> Result<()> {
    let unreadable = || ErrorKind::InventoryFile(args.file.clone());
    let bytes = std::fs::read(&args.file).or_raise(unreadable)?;
    let inventory = match args.file.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
        true => Inventory::from_json(std::str::from_utf8(&bytes).or_raise(unreadable)?),
        false => Inventory::from_objects_inv(&bytes),
    }
    .or_raise(unreadable)?;

    let report = import_inventory(repository, ctx, args.build.version_id, &args.build.marker(), &inventory)
        .await
        .map_err(aborted)?;
    print_import(&report);
    Ok(())
}

fn print_import(report: &docsync_sync::ImportReport) {
    for problem in report.unresolved.iter().chain(&report.rejected) {
        tracing::warn!(%problem, "not imported");
    }
    println!(
        "imported {} domain objects, replaced {} ({} unresolved, {} rejected)",
        report.imported,
        report.cleared,
        report.unresolved.len(),
        report.rejected.len(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case(&["docsync", "sync", "--version-id", "1", "--commit", "abc", "--build-id", "2", "--prefix", "html/pip/latest"])]
    #[case(&["docsync", "--dry-run", "sync", "--version-id", "1", "--commit", "abc", "--build-id", "2", "--prefix", "p", "--protect", "index.html", "--protect", "api/index.html"])]
    #[case(&["docsync", "import", "--version-id", "1", "--commit", "abc", "--build-id", "2", "objects.inv"])]
    fn test_parse(#[case] args: &[&str]) {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Sync(sync) => {
                assert_eq!(sync.build.marker(), BuildMarker::new("abc", 2));
                assert_eq!(cli.dry_run, !sync.protected.is_empty());
            },
            Command::Import(import) => assert_eq!(import.file, PathBuf::from("objects.inv")),
        }
    }

    #[test]
    fn test_missing_build_marker_is_rejected() {
        assert!(Cli::try_parse_from(["docsync", "sync", "--version-id", "1", "--prefix", "p"]).is_err());
    }
}
