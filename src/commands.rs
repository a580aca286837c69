use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};

use logdeck_logs::{
    ExportError, ExportFormat, ExportSink, Exporter, FileSink, FilterUpdate, IngestOptions,
    LogIngestor, LogParser, LogStore, SessionBrowser, SourceError, format_text_line,
    format_timestamp,
};
use logdeck_native::{FollowOptions, NativeBackend};
use logdeck_types::{LogLevel, SessionFileContent, TimeRange, now_millis};

use crate::config::Settings;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List session log files, newest first
    List,

    /// Print the raw content of a session log file
    Show {
        /// File name as shown by `list`
        name: String,
    },

    /// Filter a session log file and export the matching entries
    Export {
        name: String,

        #[arg(long, default_value = "txt")]
        format: ExportFormat,

        /// Write a timestamped file into this directory instead of stdout
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Tail a session log file, printing matching entries as they arrive
    Follow {
        name: String,

        /// Replay the existing content before following
        #[arg(long)]
        from_start: bool,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct FilterArgs {
    /// Include this level (repeatable)
    #[arg(long = "level", value_name = "LEVEL", value_parser = parse_level)]
    pub levels: Vec<LogLevel>,

    /// Include this level and everything more severe
    #[arg(long, value_name = "LEVEL", value_parser = parse_level, conflicts_with = "levels")]
    pub min_level: Option<LogLevel>,

    /// Case-insensitive text to search for
    #[arg(long)]
    pub search: Option<String>,

    /// Treat --search as a regular expression
    #[arg(long)]
    pub regex: bool,

    /// Only search messages, not structured fields
    #[arg(long)]
    pub no_field_search: bool,

    /// Earliest timestamp, epoch ms
    #[arg(long, value_name = "MS")]
    pub since: Option<i64>,

    /// Latest timestamp, epoch ms
    #[arg(long, value_name = "MS")]
    pub until: Option<i64>,

    /// Relative window: 5m, 15m, 30m, 1h, 6h, 24h or all
    #[arg(long, value_name = "RANGE", conflicts_with_all = ["since", "until"])]
    pub last: Option<TimeRange>,
}

fn parse_level(s: &str) -> Result<LogLevel, String> {
    LogLevel::recognize(s).ok_or_else(|| format!("unknown level '{s}'"))
}

impl FilterArgs {
    /// Build the filter update for these flags.
    ///
    /// With `open_ended` a relative window only sets the lower bound, so
    /// entries arriving later still match.
    pub fn to_update(&self, settings: &Settings, now_ms: i64, open_ended: bool) -> FilterUpdate {
        let mut update = FilterUpdate::default()
            .use_regex(self.regex || settings.use_regex)
            .search_fields(settings.search_fields && !self.no_field_search);

        if let Some(min) = self.min_level {
            update = update.levels(LogLevel::at_least(min));
        } else if !self.levels.is_empty() {
            update = update.levels(self.levels.iter().copied());
        }

        if let Some(search) = &self.search {
            update = update.search(search.clone());
        }

        let (start, end) = match self.last {
            Some(range) => {
                let (start, end) = range.window(now_ms);
                (start, if open_ended { None } else { end })
            }
            None => (self.since, self.until),
        };
        if start.is_some() || end.is_some() {
            update = update.time_range(start, end);
        }

        update
    }
}

/// Shared state for running a command
pub struct App {
    pub settings: Settings,
    pub backend: Arc<NativeBackend>,
    pub store: LogStore,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        let backend = Arc::new(NativeBackend::with_session_dir(settings.session_dir()));
        let store = LogStore::new(settings.store_config());
        Self {
            settings,
            backend,
            store,
        }
    }

    fn browser(&self) -> SessionBrowser<NativeBackend> {
        SessionBrowser::new(Arc::clone(&self.backend), self.store.clone())
    }

    /// Refresh the file list and open `name`
    async fn open(&self, name: &str) -> Result<SessionFileContent> {
        let browser = self.browser();
        browser
            .refresh()
            .await
            .context("failed to list session files")?;

        match browser.open(name).await {
            Ok(Some(content)) => Ok(content),
            Ok(None) => bail!("read of '{name}' was superseded"),
            Err(SourceError::NotFound(_)) => bail!(
                "no session file named '{name}' in {}",
                self.backend.sessions().dir().display()
            ),
            Err(e) => Err(e).with_context(|| format!("failed to read '{name}'")),
        }
    }

    /// Apply a filter update, failing on an invalid pattern
    fn apply_filter(&self, update: FilterUpdate) -> Result<()> {
        self.store.set_filter(update);
        if let Some(error) = self.store.filter_error() {
            bail!("invalid search pattern: {error}");
        }
        Ok(())
    }
}

pub async fn run(command: Command, app: &App) -> Result<()> {
    match command {
        Command::List => list(app, &mut std::io::stdout()).await,
        Command::Show { name } => {
            let content = app.open(&name).await?;
            let mut out = std::io::stdout().lock();
            out.write_all(content.content.as_bytes())?;
            out.flush()?;
            Ok(())
        }
        Command::Export {
            name,
            format,
            out,
            filter,
        } => {
            let count = export(app, &name, format, &filter, out.as_deref()).await?;
            tracing::info!(count, "export finished");
            Ok(())
        }
        Command::Follow {
            name,
            from_start,
            filter,
        } => follow(app, &name, from_start, &filter).await,
    }
}

async fn list(app: &App, out: &mut impl Write) -> Result<()> {
    let files = app
        .browser()
        .refresh()
        .await
        .context("failed to list session files")?;

    if files.is_empty() {
        writeln!(
            out,
            "No session files in {}",
            app.backend.sessions().dir().display()
        )?;
        return Ok(());
    }

    let width = files.iter().map(|f| f.name.len()).max().unwrap_or_default();
    for file in &files {
        writeln!(
            out,
            "{:<width$}  {:>10}  {}",
            file.name,
            file.size_bytes,
            format_timestamp(file.modified_at),
        )?;
    }
    Ok(())
}

/// Parse a session file into the store, filter it and export the result.
/// Returns the number of exported entries.
async fn export(
    app: &App,
    name: &str,
    format: ExportFormat,
    filter: &FilterArgs,
    out_dir: Option<&Path>,
) -> Result<usize> {
    let content = app.open(name).await?;
    let entries = LogParser::parse_content(&content.content, now_millis());
    let parsed = entries.len();
    app.store.append(entries);

    if parsed > app.store.len() {
        tracing::warn!(
            parsed,
            kept = app.store.len(),
            "file has more entries than max_logs, exporting the newest"
        );
    }

    app.apply_filter(filter.to_update(&app.settings, now_millis(), false))?;

    match out_dir {
        Some(dir) => {
            let sink = Arc::new(FileSink::new(dir));
            let exporter = Exporter::new({
                let sink = Arc::clone(&sink);
                move |content: &str, format: ExportFormat| -> Result<(), ExportError> {
                    sink.deliver(content, format)
                }
            });
            let count = exporter.export(&app.store, format)?;
            if let Some(path) = sink.last_path() {
                eprintln!("Exported {count} entries to {}", path.display());
            }
            Ok(count)
        }
        None => {
            let exporter = Exporter::new(
                |content: &str, _: ExportFormat| -> Result<(), ExportError> {
                    let mut out = std::io::stdout().lock();
                    writeln!(out, "{content}")?;
                    out.flush()?;
                    Ok(())
                },
            );
            Ok(exporter.export(&app.store, format)?)
        }
    }
}

async fn follow(app: &App, name: &str, from_start: bool, filter: &FilterArgs) -> Result<()> {
    let files = app
        .browser()
        .refresh()
        .await
        .context("failed to list session files")?;
    if !files.iter().any(|f| f.name == name) {
        bail!(
            "no session file named '{name}' in {}",
            app.backend.sessions().dir().display()
        );
    }
    let path = app.backend.sessions().path_of(name);

    app.apply_filter(filter.to_update(&app.settings, now_millis(), true))?;

    let mut ingestor = LogIngestor::start(
        Arc::clone(&app.backend),
        app.store.clone(),
        IngestOptions {
            reconnect_delay: app.settings.reconnect_delay(),
        },
    );
    let mut follower = app.backend.follow(
        name,
        FollowOptions {
            poll_interval: app.settings.follow_poll(),
            from_start,
        },
    );
    tracing::debug!(path = %path.display(), "following session file");

    let mut revisions = app.store.subscribe();
    let mut cursor = 0;
    loop {
        let (entries, next) = app.store.filtered_since(cursor);
        cursor = next;
        if !entries.is_empty() {
            let mut out = std::io::stdout().lock();
            for entry in &entries {
                writeln!(out, "{}", format_text_line(entry))?;
            }
            out.flush()?;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    follower.stop();
    ingestor.stop();
    tracing::debug!(stats = ?ingestor.stats(), "stopped following");
    Ok(())
}
