use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};
use picbase::config::default_database_path;
use picbase::database::models::{FolderFilter, IdentityKey};
use picbase::database::repositories::default_review_cutoff;
use picbase::services::audit::{AuditLog, MERGE_LOG_NAME, RESOLVE_LOG_NAME};
use picbase::services::editor::{Navigator, PictureCommand, PictureEditor, parse_date_text};
use picbase::services::enricher::{GeoEnricher, backfill_locations};
use picbase::services::geocoder::NominatimGeocoder;
use picbase::services::merge::MergeSelector;
use picbase::services::quarantine::Quarantine;
use picbase::services::resolver::{
    Decision, DuplicateResolver, Presenter, ResolveError, ReviewGroup, validate_reviewer,
};
use picbase::services::sync::SyncReconciler;
use picbase::services::{Progress, ProgressCallback};
use picbase::CatalogStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "picbase", version, about = "Picture catalog maintenance")]
struct Cli {
    /// Catalog database file
    #[arg(long, global = true, env = "PICBASE_DB", value_name = "FILE")]
    db: Option<PathBuf>,

    /// Do not ask before destructive operations
    #[arg(long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Empty the catalog and rebuild it from a folder
    Rebuild {
        #[arg(value_name = "DIR")]
        path: PathBuf,
    },

    /// Add new pictures below a folder and mark the rest as seen
    Sync {
        #[arg(value_name = "DIR")]
        path: PathBuf,
    },

    /// Delete catalog entries whose file was not seen by the last sync
    PurgeOrphans,

    /// Review duplicate groups one by one
    Dedup {
        /// Folder that deleted files are moved into
        #[arg(short, long, value_name = "DIR")]
        quarantine: PathBuf,
        /// signature or capture-date
        #[arg(short, long, default_value = "signature")]
        key: IdentityKey,
        /// Pictures last reviewed after this moment are not shown again
        /// (default: 1900-01-01, so any recorded review counts)
        #[arg(long, value_name = "DATE")]
        cutoff: Option<String>,
        #[arg(long)]
        reviewer: Option<String>,
    },

    /// Remove catalog entries by file id, moving their files away
    RemoveRange {
        #[arg(short, long, value_name = "DIR")]
        quarantine: PathBuf,
        #[arg(long)]
        start: i64,
        /// Inclusive; open ended when omitted
        #[arg(long)]
        end: Option<i64>,
    },

    /// Move pictures the catalog does not know from SOURCE into DESTINATION
    Merge {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,
        #[arg(value_name = "DESTINATION")]
        destination: PathBuf,
    },

    /// Look up place names for locations with id in [start, end)
    Geocode {
        #[arg(long)]
        start: i64,
        #[arg(long)]
        end: i64,
        #[arg(long, default_value_t = 100)]
        batch: i64,
    },

    /// Create missing locations from picture GPS data
    Locations,

    /// Mark the pictures listed in a JSON id array as reviewed
    ReviewFlag {
        #[arg(value_name = "FILE")]
        ids: PathBuf,
    },

    /// Show or change one picture
    Edit {
        id: i64,
        #[command(subcommand)]
        action: EditCmd,
    },

    /// Step through the pictures of a folder, confirming or rotating each
    Browse {
        /// Case-insensitive fragment of the folder path
        folder: String,
        /// Only pictures without GPS data
        #[arg(long)]
        without_gps: bool,
    },

    /// Stored settings
    Config {
        #[command(subcommand)]
        command: ConfigCmd,
    },

    /// List an audit log
    History {
        /// Log file, or the folder holding it
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Row counts
    Stats,
}

#[derive(Subcommand, Debug)]
enum EditCmd {
    Show,
    /// Turn the thumbnail a quarter clockwise
    Rotate {
        #[arg(long)]
        anticlockwise: bool,
    },
    /// Mark reviewed and store the location
    Confirm,
    /// Clear reviewed and drop the location
    Reset,
    /// Thumbnail from the original file again
    Regenerate,
    /// Thumbnail and signature from the original file again
    RefreshSignature,
    /// Change attributes; omitted ones keep their value
    Set {
        #[arg(long)]
        make: Option<String>,
        #[arg(long)]
        model: Option<String>,
        /// "YYYY-MM-DD[ HH:MM[:SS]]", empty to clear
        #[arg(long)]
        date: Option<String>,
        /// "lat, lon[, alt]", empty to clear
        #[arg(long)]
        location: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCmd {
    Show,
    Set { key: String, value: String },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let db_path = match cli.db {
        Some(path) => path,
        None => default_database_path().context("Could not locate the documents folder")?,
    };
    let store = CatalogStore::open(&db_path)
        .with_context(|| format!("Failed to open catalog {}", db_path.display()))?;
    let config = store.load_config().context("Failed to load settings")?;
    log::debug!("Catalog {}", db_path.display());

    match cli.command {
        Commands::Rebuild { path } => {
            if !confirm(cli.yes, "Delete every catalog entry and rebuild?")? {
                return Ok(());
            }
            store.clear_catalog()?;
            let (bar, callback) = progress_bar();
            let report = SyncReconciler::new(&store, &config)?
                .with_progress(callback)
                .full_rebuild(&path)?;
            bar.finish_and_clear();
            println!("▶ Rebuilt from {}: {:?}", path.display(), report);
        }

        Commands::Sync { path } => {
            let (bar, callback) = progress_bar();
            let report = SyncReconciler::new(&store, &config)?
                .with_progress(callback)
                .sync(&path)?;
            bar.finish_and_clear();
            println!(
                "▶ {} found, {} new, {} known, {} skipped, {} failed, {} orphaned",
                report.discovered,
                report.inserted,
                report.already_present,
                report.skipped,
                report.failed,
                report.orphans
            );
        }

        Commands::PurgeOrphans => {
            let orphans = store.unchecked_picture_ids()?;
            if orphans.is_empty() {
                println!("No orphans.");
                return Ok(());
            }
            let prompt = format!("Delete {} catalog entries without a file?", orphans.len());
            if !confirm(cli.yes, &prompt)? {
                return Ok(());
            }
            let purged = SyncReconciler::new(&store, &config)?.purge_orphans()?;
            println!("🗑️  Purged {} entries", purged.len());
        }

        Commands::Dedup {
            quarantine,
            key,
            cutoff,
            reviewer,
        } => {
            let cutoff = review_cutoff(cutoff.as_deref())?;
            let reviewer = match reviewer.or_else(|| config.reviewer_name.clone()) {
                Some(name) => name,
                None => ask_reviewer()?,
            };

            let resolver = DuplicateResolver::new(&store, &quarantine, &reviewer)?;
            let report = resolver.resolve(key, cutoff, &mut TerminalPresenter)?;
            println!(
                "\n✅ {} groups: {} deleted, {} skipped, {} already reviewed, {} failed{}",
                report.groups,
                report.deleted,
                report.skipped,
                report.suppressed,
                report.failed,
                if report.aborted { ", aborted" } else { "" }
            );
            println!("   Log: {}", resolver.audit_log().path().display());
        }

        Commands::RemoveRange {
            quarantine,
            start,
            end,
        } => {
            let entries = store.file_entries_in_id_range(start, end)?;
            let prompt = format!("Remove {} catalog entries and move their files?", entries.len());
            if entries.is_empty() || !confirm(cli.yes, &prompt)? {
                return Ok(());
            }
            let quarantine = Quarantine::new(&quarantine)?;
            let audit = AuditLog::in_folder(quarantine.folder(), RESOLVE_LOG_NAME);
            let report = quarantine.remove_file_range(&store, &audit, start, end)?;
            println!("🗑️  {} removed, {} kept", report.deleted, report.kept);
        }

        Commands::Merge {
            source,
            destination,
        } => {
            let (bar, callback) = progress_bar();
            let report = MergeSelector::new(&store, &config)
                .with_progress(callback)
                .select(&source, &destination)?;
            bar.finish_and_clear();
            println!(
                "📦 {} examined, {} moved to {}, {} already catalogued, {} failed",
                report.examined,
                report.selected,
                destination.display(),
                report.kept,
                report.failed
            );
        }

        Commands::Geocode { start, end, batch } => {
            let geocoder = NominatimGeocoder::new(&config)?;
            let (bar, callback) = progress_bar();
            let report = GeoEnricher::new(&store, &geocoder)
                .with_progress(callback)
                .enrich_in_batches(start, end, batch)?;
            bar.finish_and_clear();
            println!(
                "🌍 {} pending, {} resolved, {} failed",
                report.pending, report.resolved, report.failed
            );
        }

        Commands::Locations => {
            let created = backfill_locations(&store)?;
            println!("🌍 Created {} locations", created);
        }

        Commands::ReviewFlag { ids } => {
            let text = fs::read_to_string(&ids)
                .with_context(|| format!("Could not read {}", ids.display()))?;
            let flagged = PictureEditor::new(&store).mark_reviewed(&text)?;
            println!("✅ Flagged {} pictures", flagged);
        }

        Commands::Edit { id, action } => edit(&store, id, action)?,

        Commands::Browse {
            folder,
            without_gps,
        } => {
            let filter = if without_gps {
                FolderFilter::WithoutGps
            } else {
                FolderFilter::All
            };
            browse(&store, store.folder_picture_ids(&folder, filter)?)?;
        }

        Commands::Config { command } => match command {
            ConfigCmd::Show => {
                for (key, value) in config.entries()? {
                    println!("{:<26} {}", key, value);
                }
            }
            ConfigCmd::Set { key, value } => {
                let mut config = config;
                if !config.apply(&key, &value) {
                    bail!("Unknown key or bad value: {} = {}", key, value);
                }
                store.save_config(&config)?;
                println!("✅ {} = {}", key, value);
            }
        },

        Commands::History { path } => history(&path)?,

        Commands::Stats => {
            let stats = store.stats()?;
            println!("pictures          {}", stats.pictures);
            println!("files             {}", stats.files);
            println!("unchecked files   {}", stats.unchecked_files);
            println!("locations         {}", stats.locations);
            println!("pending locations {}", stats.pending_locations);
            println!("reviews           {}", stats.reviews);
        }
    }

    Ok(())
}

fn edit(store: &CatalogStore, id: i64, action: EditCmd) -> Result<()> {
    let editor = PictureEditor::new(store);
    let command = match action {
        EditCmd::Show => {
            println!("{}", editor.view(id)?.text);
            return Ok(());
        }
        EditCmd::Rotate { anticlockwise } => {
            if anticlockwise {
                PictureCommand::RotateAnticlockwise
            } else {
                PictureCommand::RotateClockwise
            }
        }
        EditCmd::Confirm => PictureCommand::Confirm,
        EditCmd::Reset => PictureCommand::Reset,
        EditCmd::Regenerate => PictureCommand::RegenerateThumbnail,
        EditCmd::RefreshSignature => PictureCommand::RefreshSignature,
        EditCmd::Set {
            make,
            model,
            date,
            location,
        } => {
            let current = editor.view(id)?.picture;
            let current_location = current.location().map(|l| match l.altitude {
                Some(alt) => format!("{}, {}, {}", l.latitude, l.longitude, alt),
                None => format!("{}, {}", l.latitude, l.longitude),
            });
            PictureCommand::SetAttributes {
                camera_make: make.or(current.camera_make),
                camera_model: model.or(current.camera_model),
                capture_date: date.unwrap_or_else(|| {
                    current
                        .capture_date
                        .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default()
                }),
                location: location.or(current_location).unwrap_or_default(),
            }
        }
    };

    editor.dispatch(id, command)?;
    println!("{}", editor.view(id)?.text);
    Ok(())
}

fn browse(store: &CatalogStore, ids: Vec<i64>) -> Result<()> {
    let mut navigator = Navigator::new(ids);
    let editor = PictureEditor::new(store);
    println!("▶ {} pictures to review", navigator.len());

    while let Some(id) = navigator.current() {
        println!("\n[{}/{}]\n{}", navigator.position() + 1, navigator.len(), editor.view(id)?.text);
        let answer: String = Input::new()
            .with_prompt("n)ext p)revious r)otate a)nticlockwise c)onfirm x) reset q)uit")
            .allow_empty(true)
            .interact_text()?;

        let command = match answer.trim() {
            "" | "n" => {
                navigator.next();
                continue;
            }
            "p" => {
                navigator.previous();
                continue;
            }
            "q" => break,
            "r" => PictureCommand::RotateClockwise,
            "a" => PictureCommand::RotateAnticlockwise,
            "c" => PictureCommand::Confirm,
            "x" => PictureCommand::Reset,
            other => {
                println!("⚠️  Unknown answer {:?}", other);
                continue;
            }
        };
        if let Err(e) = editor.dispatch(id, command) {
            println!("⚠️  {}", e);
        }
    }
    Ok(())
}

fn history(path: &Path) -> Result<()> {
    let logs: Vec<PathBuf> = if path.is_dir() {
        [RESOLVE_LOG_NAME, MERGE_LOG_NAME]
            .iter()
            .map(|name| path.join(name))
            .filter(|p| p.exists())
            .collect()
    } else {
        vec![path.to_path_buf()]
    };
    if logs.is_empty() {
        bail!("No audit log in {}", path.display());
    }

    for log_path in logs {
        let records = AuditLog::new(log_path.clone())
            .read_all()
            .with_context(|| format!("Could not open audit log {:?}", log_path))?;
        println!("🗂️  {}:", log_path.display());
        for (i, rec) in records.iter().enumerate() {
            println!(
                "[{}] {} {:?} picture={} {} {} {}",
                i,
                rec.timestamp,
                rec.action,
                rec.picture_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
                rec.source.as_deref().unwrap_or(""),
                rec.destination.as_deref().map(|d| format!("→ {}", d)).unwrap_or_default(),
                rec.detail.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}

/// Asks the reviewer for each group on the terminal.
struct TerminalPresenter;

impl Presenter for TerminalPresenter {
    fn decide(&mut self, group: &ReviewGroup) -> Result<Decision, ResolveError> {
        println!(
            "\n✨ Group {}/{} ({})",
            group.position, group.total, group.key
        );
        for candidate in &group.candidates {
            println!(
                "   {}  ({} KB thumbnail)",
                candidate.display,
                candidate.thumbnail.len() / 1024
            );
        }

        loop {
            let answer: String = Input::new()
                .with_prompt("Delete which? (numbers, 0 aborts, blank skips)")
                .allow_empty(true)
                .interact_text()
                .map_err(|e| ResolveError::Presenter(e.to_string()))?;

            match parse_answer(&answer, group.candidates.len()) {
                Some(decision) => return Ok(decision),
                None => println!("⚠️  Answer with numbers 1..={}", group.candidates.len()),
            }
        }
    }
}

/// Blank skips, `0` aborts, otherwise indices separated by spaces or commas.
fn parse_answer(answer: &str, count: usize) -> Option<Decision> {
    let answer = answer.trim();
    if answer.is_empty() {
        return Some(Decision::Skip);
    }
    if answer == "0" {
        return Some(Decision::Abort);
    }

    let mut indices = Vec::new();
    for part in answer.split(|c: char| c == ',' || c.is_whitespace()) {
        if part.is_empty() {
            continue;
        }
        match part.parse::<usize>() {
            Ok(index) if (1..=count).contains(&index) => indices.push(index),
            _ => return None,
        }
    }
    Some(Decision::Delete(indices))
}

fn ask_reviewer() -> Result<String> {
    let name: String = Input::new()
        .with_prompt("Reviewer name")
        .validate_with(|input: &String| -> Result<(), String> {
            validate_reviewer(input).map_err(|e| e.to_string())
        })
        .interact_text()?;
    Ok(name)
}

fn confirm(assume_yes: bool, prompt: &str) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

fn review_cutoff(text: Option<&str>) -> Result<NaiveDateTime> {
    let parsed = match text {
        Some(text) => parse_date_text(text)?,
        None => None,
    };
    Ok(parsed.unwrap_or_else(default_review_cutoff))
}

fn progress_bar() -> (ProgressBar, ProgressCallback) {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{bar:40}] {pos}/{len} {msg}") {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(100));

    let handle = bar.clone();
    let callback: ProgressCallback = Box::new(move |progress: Progress| {
        handle.set_length(progress.total as u64);
        handle.set_position(progress.processed as u64);
        handle.set_message(format!("{:?} {}", progress.phase, progress.current));
    });
    (bar, callback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("", 3), Some(Decision::Skip));
        assert_eq!(parse_answer("   ", 3), Some(Decision::Skip));
        assert_eq!(parse_answer("0", 3), Some(Decision::Abort));
        assert_eq!(parse_answer("1, 3", 3), Some(Decision::Delete(vec![1, 3])));
        assert_eq!(parse_answer("2 1", 3), Some(Decision::Delete(vec![2, 1])));
        assert_eq!(parse_answer("4", 3), None);
        assert_eq!(parse_answer("one", 3), None);
    }

    #[test]
    fn test_review_cutoff_defaults_to_any_review() {
        assert_eq!(review_cutoff(None).unwrap(), default_review_cutoff());
        assert_eq!(review_cutoff(Some("  ")).unwrap(), default_review_cutoff());
        assert_eq!(
            review_cutoff(Some("2024-02-03 10:00")).unwrap().to_string(),
            "2024-02-03 10:00:00"
        );
        assert!(review_cutoff(Some("yesterday")).is_err());
    }
}
