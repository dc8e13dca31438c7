use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "tsync", about = concat!("tsync v", env!("CARGO_PKG_VERSION"), " - checklists, tasks and bases in plain markdown"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different vault directory
    #[arg(short = 'C', long = "vault-dir", global = true)]
    pub vault_dir: Option<String>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a vault in the current directory
    Init(InitArgs),
    /// Validate settings and promoted-task provenance
    Check,
    /// Show how a single line is recognized
    Parse(ParseArgs),
    /// List the checklist items in a document
    Scan(ScanArgs),
    /// Generate or refresh base files
    Bases(BasesCmd),
    /// Turn a checklist item into a tracked task
    Promote(LineArgs),
    /// Turn a promoted task link back into a checklist item
    Revert(LineArgs),
    /// Reconcile checklist marks and task done-states
    Sync(SyncArgs),
    /// Watch the vault and sync on every change
    Watch,
    /// Manage task categories
    Category(NameCmd),
    /// Manage task priorities
    Priority(NameCmd),
    /// Manage entity folders
    Folder(FolderCmd),
}

// ---------------------------------------------------------------------------
// Init args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct InitArgs {
    /// Create this category (repeatable)
    #[arg(long)]
    pub category: Vec<String>,
    /// Don't create the Tasks/Areas/Projects/Bases folders
    #[arg(long)]
    pub no_folders: bool,
    /// Reinitialize even if .tasksync/ already exists
    #[arg(long)]
    pub force: bool,
}

// ---------------------------------------------------------------------------
// Read command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ParseArgs {
    /// The line of text to parse
    pub line: String,
}

#[derive(Args)]
pub struct ScanArgs {
    /// Vault-relative document path
    pub document: String,
}

// ---------------------------------------------------------------------------
// Bases
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct BasesCmd {
    #[command(subcommand)]
    pub action: BasesAction,
}

#[derive(Subcommand)]
pub enum BasesAction {
    /// Print (or write) the base for one scope
    Generate(GenerateArgs),
    /// Regenerate the global base and every area and project base
    Refresh,
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Base filtered to an area
    #[arg(long, conflicts_with_all = ["project", "parent_task"])]
    pub area: Option<String>,
    /// Base filtered to a project
    #[arg(long, conflicts_with = "parent_task")]
    pub project: Option<String>,
    /// Base of a task's sub-tasks
    #[arg(long)]
    pub parent_task: Option<String>,
    /// Write to the bases folder instead of printing
    #[arg(long)]
    pub write: bool,
}

// ---------------------------------------------------------------------------
// Promotion
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct LineArgs {
    /// Vault-relative document path
    pub document: String,
    /// Line number (1-based)
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    pub line: u64,
}

#[derive(Args)]
pub struct SyncArgs {
    /// Sync only tasks promoted from this document
    #[arg(conflicts_with = "entity")]
    pub document: Option<String>,
    /// Push one task's done-state to its checklist line
    #[arg(long)]
    pub entity: Option<String>,
}

// ---------------------------------------------------------------------------
// Settings edits
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct NameCmd {
    #[command(subcommand)]
    pub action: NameAction,
}

#[derive(Subcommand)]
pub enum NameAction {
    /// Add a name
    Add(NameArg),
    /// Remove a name
    Remove(NameArg),
}

#[derive(Args)]
pub struct NameArg {
    pub name: String,
}

#[derive(Args)]
pub struct FolderCmd {
    #[command(subcommand)]
    pub action: FolderAction,
}

#[derive(Subcommand)]
pub enum FolderAction {
    /// Point an entity kind (or the bases) at a folder
    Set(FolderSetArgs),
}

#[derive(Args)]
pub struct FolderSetArgs {
    pub kind: FolderKind,
    /// Vault-relative folder
    pub path: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FolderKind {
    Tasks,
    Areas,
    Projects,
    Bases,
}

impl FolderKind {
    /// Key under `[folders]` in settings.toml
    pub fn key(self) -> &'static str {
        match self {
            FolderKind::Tasks => "tasks",
            FolderKind::Areas => "areas",
            FolderKind::Projects => "projects",
            FolderKind::Bases => "bases",
        }
    }
}
