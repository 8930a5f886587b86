//! Command implementations.

use crate::args::{GlobalOpts, MigrateArgs, OutputFormat, SearchArgs, StructureArgs};
use miette::{miette, IntoDiagnostic, Result};
use rusqlite::Connection;
use yggdrasil_core::{
    open_db, open_db_in_memory, search_resources, LogTarget, MigrationMode,
    MigrationOrchestrator, SearchQuery, SqliteTaxonomyRepository, TaxonomyService,
    YggdrasilConfig,
};

const QUIET_LOG_LEVEL: &str = "warn";

/// Stderr logging stays quiet unless a level is asked for; file logging
/// defaults to the build-mode level.
pub fn init_logging(global: &GlobalOpts) -> Result<()> {
    let target = LogTarget::from_dir(global.log_dir.as_deref()).map_err(|err| miette!("{err}"))?;
    let level = match (&global.log_level, &target) {
        (Some(level), _) => level.as_str(),
        (None, LogTarget::Stderr) => QUIET_LOG_LEVEL,
        (None, LogTarget::Directory(_)) => yggdrasil_core::default_log_level(),
    };
    yggdrasil_core::init_logging(level, target).map_err(|err| miette!("{err}"))
}

pub fn migrate(args: MigrateArgs, global: &GlobalOpts) -> Result<()> {
    let mut config = YggdrasilConfig::load(args.config.as_deref()).map_err(|err| miette!("{err}"))?;
    if args.recursive {
        config.recursive = true;
    }
    if args.emit_leaves.is_some() {
        config.leaf_output_dir = args.emit_leaves.clone();
    }

    let mode = if args.execute {
        MigrationMode::Execute
    } else {
        MigrationMode::DryRun
    };
    let classifier = config.classifier().map_err(|err| miette!("{err}"))?;
    let patterns = config.canonical_patterns().map_err(|err| miette!("{err}"))?;

    // A dry run never creates the store file.
    let conn = if mode == MigrationMode::DryRun && !global.db.exists() {
        open_db_in_memory()
    } else {
        open_db(&global.db)
    }
    .map_err(|err| miette!("cannot open store `{}`: {err}", global.db.display()))?;
    let service = taxonomy_service(&conn)?;

    log::info!(
        "event=cli_migrate module=cli status=start execute={} recursive={}",
        args.execute,
        config.recursive
    );
    let orchestrator =
        MigrationOrchestrator::new(&service, classifier, patterns, config.migration_options(mode));
    let report = orchestrator
        .run(&args.root)
        .map_err(|err| miette!("{err}"))?;

    match args.format {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?)
        }
    }
    Ok(())
}

pub fn structure(args: StructureArgs, global: &GlobalOpts) -> Result<()> {
    let conn = open_existing(global)?;
    let service = taxonomy_service(&conn)?;
    let summary = service.structure().map_err(|err| miette!("{err}"))?;

    match args.format {
        OutputFormat::Text => print!("{}", summary.render_text()),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary).into_diagnostic()?)
        }
    }
    Ok(())
}

pub fn search(args: SearchArgs, global: &GlobalOpts) -> Result<()> {
    let conn = open_existing(global)?;
    let mut query = SearchQuery::new(args.query).with_limit(args.limit);
    if let Some(tree) = args.tree {
        query = query.with_tree(tree);
    }
    let hits = search_resources(&conn, &query).map_err(|err| miette!("{err}"))?;
    log::info!("event=cli_search module=cli status=ok hits={}", hits.len());

    match args.format {
        OutputFormat::Text => {
            for hit in &hits {
                println!("{}\n    {}", hit.tree_path, hit.snippet);
            }
            println!("{} hit(s)", hits.len());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&hits).into_diagnostic()?)
        }
    }
    Ok(())
}

fn open_existing(global: &GlobalOpts) -> Result<Connection> {
    if !global.db.exists() {
        return Err(miette!("store `{}` does not exist", global.db.display()));
    }
    open_db(&global.db).map_err(|err| miette!("cannot open store `{}`: {err}", global.db.display()))
}

fn taxonomy_service(conn: &Connection) -> Result<TaxonomyService<SqliteTaxonomyRepository<'_>>> {
    let repo = SqliteTaxonomyRepository::try_new(conn).map_err(|err| miette!("{err}"))?;
    Ok(TaxonomyService::new(repo))
}
