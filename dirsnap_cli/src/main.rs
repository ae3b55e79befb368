use anyhow::{bail, Context};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use dirsnap_common::{
    load_config, AppConfig, CompareMode, DiffState, DiffSummary, FileMetadata, FileNode,
    SearchRoot, WalkerConfig,
};
use dirsnap_core::{
    ComparisonEngine, ContentComparator, DirectoryWalker, MetadataComparator, SnapshotBuilder,
    WalkEvent, WalkReport,
};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dirsnap")]
#[command(author = "Dirsnap Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Snapshot directory trees and diff them against a baseline", long_about = None)]
struct Cli {
    /// Read the configuration file next to the executable
    #[arg(long, global = true)]
    portable: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List matching files below one or more folders
    Walk {
        /// Folders to walk
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// Do not descend into subfolders
        #[arg(long)]
        flat: bool,

        /// Folders to skip (exact path, can be specified multiple times)
        #[arg(short = 'x', long)]
        exclude: Vec<PathBuf>,

        /// Extensions to match, e.g. ".txt" (defaults to every file)
        #[arg(short = 'e', long = "ext")]
        extensions: Vec<String>,

        /// Skip entries carrying the system attribute
        #[arg(long)]
        no_system: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build a snapshot of a folder and print it
    Snapshot {
        /// Folder to snapshot
        root: PathBuf,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare a folder against a baseline folder
    Diff {
        /// Current folder
        source: PathBuf,

        /// Baseline folder
        baseline: PathBuf,

        /// File comparison: none, metadata or content
        #[arg(short = 'm', long)]
        compare: Option<CompareMode>,

        /// Show only differences (hide unchanged entries)
        #[arg(short = 'd', long)]
        diff_only: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,

        /// Disable ANSI colors in output
        #[arg(long)]
        no_color: bool,
    },
}

fn main() {
    // Initialize tracing to stderr (so JSON output can go cleanly to stdout)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = load_config(cli.portable)
        .context("failed to load configuration")
        .and_then(|loaded| {
            debug!("Configuration from {}", loaded.path.display());
            run(cli.command, loaded.config)
        });

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands, config: AppConfig) -> anyhow::Result<()> {
    match command {
        Commands::Walk {
            roots,
            flat,
            exclude,
            extensions,
            no_system,
            json,
        } => {
            let walker_config =
                build_walker_config(&config, roots, flat, exclude, extensions, no_system);
            run_walk(walker_config, json)
        }
        Commands::Snapshot { root, json } => run_snapshot(&root, json),
        Commands::Diff {
            source,
            baseline,
            compare,
            diff_only,
            json,
            no_color,
        } => {
            let mode = compare.unwrap_or(config.compare_mode);
            run_diff(&source, &baseline, mode, diff_only, json, no_color)
        }
    }
}

fn build_walker_config(
    config: &AppConfig,
    roots: Vec<PathBuf>,
    flat: bool,
    exclude: Vec<PathBuf>,
    extensions: Vec<String>,
    no_system: bool,
) -> WalkerConfig {
    let mut walker_config = config.walker_config();

    walker_config.roots = roots
        .into_iter()
        .map(|root| SearchRoot {
            path: absolute(root),
            recursive: !flat,
        })
        .collect();
    walker_config
        .excluded_folders
        .extend(exclude.into_iter().map(absolute));
    if !extensions.is_empty() {
        walker_config.extensions = extensions;
    }
    if no_system {
        walker_config.include_system = false;
    }

    walker_config
}

/// Exclusions match by exact path, so roots and exclusions share one spelling.
fn absolute(path: PathBuf) -> PathBuf {
    path.canonicalize().unwrap_or(path)
}

fn run_walk(config: WalkerConfig, json: bool) -> anyhow::Result<()> {
    for root in &config.roots {
        info!("Walking {}", root.path.display());
    }

    let handle = DirectoryWalker::new(config).start()?;
    for event in handle.events().iter() {
        match event {
            WalkEvent::FolderEntered(path) => debug!("Entered {}", path.display()),
            WalkEvent::Progress { path, .. } => info!("Scanning {}", path.display()),
            WalkEvent::FileMatched(file) if !json => println!("{}", file.path.display()),
            WalkEvent::FileMatched(_) => {}
            WalkEvent::Completed => break,
        }
    }
    let report = handle.join()?;

    for skipped in &report.errors {
        warn!("Skipped {}: {}", skipped.path.display(), skipped.reason);
    }

    if json {
        let output = serde_json::to_string_pretty(&json_walk_report(&report))?;
        println!("{output}");
    } else {
        info!(
            "Matched {} files in {} folders",
            report.files.len(),
            report.folders_entered
        );
    }

    Ok(())
}

fn run_snapshot(root: &Path, json: bool) -> anyhow::Result<()> {
    if !root.is_dir() {
        bail!("Not a directory: {}", root.display());
    }

    let root = absolute(root.to_path_buf());
    info!("Building snapshot of {}", root.display());
    let tree = SnapshotBuilder::new().build(&root)?;

    if json {
        let output = serde_json::to_string_pretty(&json_node(&tree, false, false))?;
        println!("{output}");
    } else {
        print!("{}", render_snapshot(&tree));
    }

    Ok(())
}

fn run_diff(
    source: &Path,
    baseline: &Path,
    mode: CompareMode,
    diff_only: bool,
    json: bool,
    no_color: bool,
) -> anyhow::Result<()> {
    // Validate paths
    if !source.is_dir() {
        bail!("Source path is not a directory: {}", source.display());
    }
    if !baseline.is_dir() {
        bail!("Baseline path is not a directory: {}", baseline.display());
    }

    let source = absolute(source.to_path_buf());
    let baseline = absolute(baseline.to_path_buf());

    info!("Comparing:");
    info!("  Source:   {}", source.display());
    info!("  Baseline: {}", baseline.display());

    let builder = SnapshotBuilder::new();
    info!("Scanning source...");
    let source_tree = builder.build(&source)?;
    info!("Scanning baseline...");
    let baseline_tree = builder.build(&baseline)?;

    let engine = match mode {
        CompareMode::None => ComparisonEngine::new(),
        CompareMode::Metadata => ComparisonEngine::new().with_comparator(MetadataComparator),
        CompareMode::Content => ComparisonEngine::new().with_comparator(ContentComparator),
    };
    info!("Comparing trees ({} comparison)...", mode);
    let result = engine.compare_folders(source_tree, baseline_tree)?;
    let summary = result.summary();

    if json {
        let report = JsonDiffReport {
            source: source.to_string_lossy().to_string(),
            baseline: baseline.to_string_lossy().to_string(),
            compare_mode: mode,
            summary,
            tree: json_node(&result, true, diff_only),
        };
        let output = serde_json::to_string_pretty(&report)?;
        println!("{output}");
        return Ok(());
    }

    let use_color = !no_color && std::io::stdout().is_terminal();

    println!("\n{}", "=".repeat(80));
    println!("Comparison Results");
    println!("{}", "=".repeat(80));
    print!("{}", render_diff(&result, diff_only, use_color));
    println!("\n{}", "=".repeat(80));
    print!("{}", render_summary(&summary, use_color));
    println!("{}", "=".repeat(80));

    Ok(())
}

#[derive(Serialize)]
struct JsonDiffReport {
    source: String,
    baseline: String,
    compare_mode: CompareMode,
    summary: DiffSummary,
    tree: JsonNode,
}

#[derive(Serialize)]
struct JsonNode {
    name: String,
    path: String,
    is_folder: bool,
    size: Option<u64>,
    file_count: u64,
    modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<DiffState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<JsonNode>,
}

#[derive(Serialize)]
struct JsonWalkReport {
    session: String,
    folders_entered: usize,
    cancelled: bool,
    files: Vec<JsonFile>,
    errors: Vec<JsonSkipped>,
}

#[derive(Serialize)]
struct JsonFile {
    path: String,
    size: u64,
    modified: Option<String>,
}

#[derive(Serialize)]
struct JsonSkipped {
    path: String,
    reason: String,
}

/// Render a tree for JSON output; `diff_only` drops unchanged subtrees.
fn json_node(node: &FileNode, with_state: bool, diff_only: bool) -> JsonNode {
    JsonNode {
        name: node.name.clone(),
        path: node.path.to_string_lossy().to_string(),
        is_folder: node.is_folder,
        size: node.size,
        file_count: node.file_count,
        modified: node.modified_at.map(rfc3339),
        state: with_state.then_some(node.diff_state),
        checksum: node.checksum.clone(),
        children: node
            .children
            .iter()
            .filter(|child| !diff_only || child.is_changed())
            .map(|child| json_node(child, with_state, diff_only))
            .collect(),
    }
}

fn json_walk_report(report: &WalkReport) -> JsonWalkReport {
    JsonWalkReport {
        session: report.session.to_string(),
        folders_entered: report.folders_entered,
        cancelled: report.cancelled,
        files: report.files.iter().map(json_file).collect(),
        errors: report
            .errors
            .iter()
            .map(|e| JsonSkipped {
                path: e.path.to_string_lossy().to_string(),
                reason: e.reason.clone(),
            })
            .collect(),
    }
}

fn json_file(file: &FileMetadata) -> JsonFile {
    JsonFile {
        path: file.path.to_string_lossy().to_string(),
        size: file.size,
        modified: file.modified_at.map(rfc3339),
    }
}

fn rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339()
}

fn state_symbol(state: DiffState) -> &'static str {
    match state {
        DiffState::Unchanged => "==",
        DiffState::New => "++",
        DiffState::Deleted => "--",
        DiffState::Changed => "!=",
        DiffState::Unknown => "??",
    }
}

fn state_color(state: DiffState) -> &'static str {
    match state {
        DiffState::Unchanged => "\x1b[32m", // Green
        DiffState::Changed => "\x1b[31m",   // Red
        DiffState::New => "\x1b[33m",       // Yellow
        DiffState::Deleted => "\x1b[34m",   // Blue
        DiffState::Unknown => "\x1b[36m",   // Cyan
    }
}

fn render_diff(root: &FileNode, diff_only: bool, use_color: bool) -> String {
    let mut out = String::new();
    render_diff_node(root, 0, diff_only, use_color, &mut out);
    out
}

fn render_diff_node(node: &FileNode, depth: usize, diff_only: bool, use_color: bool, out: &mut String) {
    let (color, reset) = if use_color {
        (state_color(node.diff_state), "\x1b[0m")
    } else {
        ("", "")
    };
    out.push_str(&format!(
        "{}{}{} {}{}{}\n",
        color,
        state_symbol(node.diff_state),
        reset,
        "  ".repeat(depth),
        node.name,
        if node.is_folder { "/" } else { "" }
    ));

    for child in &node.children {
        if diff_only && !child.is_changed() {
            continue;
        }
        render_diff_node(child, depth + 1, diff_only, use_color, out);
    }
}

fn render_summary(summary: &DiffSummary, use_color: bool) -> String {
    let mark = |state: DiffState| {
        if use_color {
            format!("{}({}){}", state_color(state), state_symbol(state), "\x1b[0m")
        } else {
            format!("({})", state_symbol(state))
        }
    };

    let mut out = String::from("Summary:\n");
    out.push_str(&format!("  Total entries:   {}\n", summary.total()));
    out.push_str(&format!("  Unchanged:       {} {}\n", summary.unchanged, mark(DiffState::Unchanged)));
    out.push_str(&format!("  Changed:         {} {}\n", summary.changed, mark(DiffState::Changed)));
    out.push_str(&format!("  New:             {} {}\n", summary.new, mark(DiffState::New)));
    out.push_str(&format!("  Deleted:         {} {}\n", summary.deleted, mark(DiffState::Deleted)));
    out.push_str(&format!("  Unknown:         {} {}\n", summary.unknown, mark(DiffState::Unknown)));
    out
}

fn render_snapshot(root: &FileNode) -> String {
    let mut out = String::new();
    render_snapshot_node(root, 0, &mut out);
    out
}

fn render_snapshot_node(node: &FileNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    if node.is_folder {
        out.push_str(&format!(
            "{}{}/  [{} files, {} bytes]\n",
            indent,
            node.name,
            node.file_count,
            node.size.unwrap_or(0)
        ));
    } else {
        let modified = node
            .modified_at
            .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        out.push_str(&format!(
            "{}{}  {} bytes  {}\n",
            indent,
            node.name,
            node.size.unwrap_or(0),
            modified
        ));
    }

    for child in &node.children {
        render_snapshot_node(child, depth + 1, out);
    }
}
