//! etc-proposals command line.
//!
//! Lists, decides and applies pending configuration update proposals in
//! batch mode. Decisions persist between runs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use etc_proposals::application::{ChangeFilter, ChangeId, Registry, Session};
use etc_proposals::domain::{Decision, DecisionAction};
use etc_proposals::infra::app_config::{load_config, load_config_from, save_config};
use etc_proposals::infra::oracle::Backend;

#[derive(Parser, Debug)]
#[command(name = "etc-proposals")]
#[command(version)]
#[command(about = "Review and merge configuration file update proposals", long_about = None)]
struct Args {
    /// Configuration file (default: $ETC_PROPOSALS_CONFIG or ./etc-proposals.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Package manager to ask for protected directories (portage, pkgcore)
    #[arg(long, global = true)]
    backend: Option<Backend>,

    /// More logging; repeat for debug output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Live files with pending proposals
    Files,

    /// Pending proposals and whether they are fully decided
    Proposals,

    /// Changes matching the selection, numbered
    List(Selector),

    /// Diffs of the selected changes
    Show(Selector),

    /// Take the proposed lines for undecided selected changes
    Use(Selector),

    /// Keep the current lines for undecided selected changes
    Zap(Selector),

    /// Forget the decision of every selected change
    Undo(Selector),

    /// Write every fully decided proposal
    Apply,

    /// Forget all decisions
    Reset,

    /// Print the effective configuration, or save it to a file
    Config {
        /// Write here instead of printing
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

/// Which changes a command acts on. Flags combine; none selects everything.
#[derive(clap::Args, Debug)]
struct Selector {
    /// Changes to this live file
    #[arg(long)]
    file: Option<PathBuf>,

    /// Changes to files under this directory
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Changes of one `._cfgNNNN_` artifact
    #[arg(long)]
    proposal: Option<PathBuf>,

    /// Changes that only touch blank lines
    #[arg(long)]
    whitespace: bool,

    /// Changes that only touch CVS `$Header` lines
    #[arg(long)]
    cvs_header: bool,

    /// Changes to files never edited locally
    #[arg(long)]
    unmodified: bool,

    /// Changes with this status (use, zap, undecided)
    #[arg(long)]
    status: Option<Decision>,

    /// Pick changes by their number in `list` output
    #[arg(short = 'n', long = "change")]
    changes: Vec<usize>,
}

impl Selector {
    fn filters(&self) -> Result<Vec<ChangeFilter>> {
        let mut filters = Vec::new();
        if let Some(file) = &self.file {
            filters.push(ChangeFilter::File(absolute(file)?));
        }
        if let Some(dir) = &self.dir {
            filters.push(ChangeFilter::Dir(absolute(dir)?));
        }
        if let Some(proposal) = &self.proposal {
            filters.push(ChangeFilter::Proposal(absolute(proposal)?));
        }
        if self.whitespace {
            filters.push(ChangeFilter::WhitespaceOnly);
        }
        if self.cvs_header {
            filters.push(ChangeFilter::CvsHeader);
        }
        if self.unmodified {
            filters.push(ChangeFilter::Unmodified);
        }
        if let Some(status) = self.status {
            filters.push(ChangeFilter::Status(status));
        }
        if filters.is_empty() {
            filters.push(ChangeFilter::All);
        }
        Ok(filters)
    }

    /// Numbered changes of the selection, before `--change` narrows it.
    fn listed(&self, registry: &mut Registry) -> Result<Vec<ChangeId>> {
        let filters = self.filters()?;
        let mut ids = registry.change_ids(&filters[0])?;
        for filter in &filters[1..] {
            let matching = registry.change_ids(filter)?;
            ids.retain(|id| matching.contains(id));
        }
        Ok(ids)
    }

    fn resolve(&self, registry: &mut Registry) -> Result<Vec<ChangeId>> {
        let ids = self.listed(registry)?;
        if self.changes.is_empty() {
            return Ok(ids);
        }
        self.changes
            .iter()
            .map(|&n| {
                n.checked_sub(1)
                    .and_then(|i| ids.get(i))
                    .cloned()
                    .with_context(|| format!("No change numbered {} ({} selected)", n, ids.len()))
            })
            .collect()
    }
}

/// Bulk use/zap skips changes already decided; numbered picks and undo always apply.
fn decide(registry: &mut Registry, selector: &Selector, action: DecisionAction) -> Result<usize> {
    if selector.changes.is_empty() && action != DecisionAction::Undo {
        return registry.decide_matching(&selector.filters()?, action);
    }
    let ids = selector.resolve(registry)?;
    registry.decide(&ids, action)
}

fn absolute(path: &std::path::Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("resolve {}", path.display()))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = match &args.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    };
    if let Some(backend) = args.backend {
        config.backend = backend;
    }

    if let Commands::Config { save } = &args.command {
        match save {
            Some(path) => {
                save_config(&config, path)
                    .with_context(|| format!("save config to {}", path.display()))?;
                println!("Saved configuration to {}", path.display());
            }
            None => print!("{}", toml::to_string_pretty(&config)?),
        }
        return Ok(());
    }

    let session = Session::from_config(config)?;
    let mut registry = Registry::open(session)?;

    match args.command {
        Commands::Files => {
            for file in registry.files() {
                println!("{}", file.display());
            }
        }
        Commands::Proposals => {
            for proposal in registry.proposals()? {
                println!("{}", proposal);
            }
        }
        Commands::List(selector) => {
            let ids = selector.listed(&mut registry)?;
            for (n, id) in ids.iter().enumerate() {
                let change = registry.change(id)?;
                let mut flags = String::new();
                if change.is_whitespace_only() {
                    flags.push_str(" whitespace");
                }
                if change.is_cvs_header() {
                    flags.push_str(" cvs-header");
                }
                if change.is_unmodified() {
                    flags.push_str(" unmodified");
                }
                println!(
                    "{:>4} [{}] {} {}{}",
                    n + 1,
                    change.status(),
                    change,
                    change.kind(),
                    flags
                );
            }
        }
        Commands::Show(selector) => {
            let ids = selector.resolve(&mut registry)?;
            for id in &ids {
                let change = registry.change(id)?;
                println!("[{}] {}", change.status(), change);
                println!("{}", change.describe());
                for line in change.render() {
                    println!("{}", line);
                }
                println!();
            }
        }
        Commands::Use(selector) => {
            let n = decide(&mut registry, &selector, DecisionAction::Use)?;
            println!("Using {} changes", n);
        }
        Commands::Zap(selector) => {
            let n = decide(&mut registry, &selector, DecisionAction::Zap)?;
            println!("Zapped {} changes", n);
        }
        Commands::Undo(selector) => {
            let n = decide(&mut registry, &selector, DecisionAction::Undo)?;
            println!("Undid {} changes", n);
        }
        Commands::Apply => {
            let report = registry.apply_all()?;
            for artifact in &report.applied {
                println!("applied {}", artifact.display());
            }
            for artifact in &report.skipped {
                println!("skipped {}", artifact.display());
            }
            for (artifact, err) in &report.failed {
                eprintln!("failed {}: {}", artifact.display(), err);
            }
            if !report.failed.is_empty() {
                anyhow::bail!("{} proposals could not be applied", report.failed.len());
            }
        }
        Commands::Reset => {
            let n = registry.reset_decisions()?;
            println!("Cleared decisions of {} proposals", n);
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}
