mod init;
pub use init::cmd_init;

use std::path::PathBuf;
use std::time::Duration;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::fs_store::FsDocuments;
use crate::io::lock::VaultLock;
use crate::io::settings_io::{self, NamedList};
use crate::io::vault::Vault;
use crate::io::watcher::VaultWatcher;
use crate::model::config::Settings;
use crate::model::property::PropertyRegistry;
use crate::model::scope::Scope;
use crate::ops::promote::TodoPromoter;
use crate::ops::refresh::{self, WriteOutcome};
use crate::ops::sync::{CompletionSync, SyncReport, SyncSession};
use crate::ops::{base_gen, check};
use crate::parse::{parse_bare_reference, parse_checklist_line};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let dir = cli.vault_dir.as_deref();

    match cli.command {
        // Init is handled in main.rs before vault discovery
        Commands::Init(args) => cmd_init(args, dir),

        // No vault needed
        Commands::Parse(args) => cmd_parse(args, json),

        // Settings checks and edits work on broken settings too
        Commands::Check => cmd_check(&open_vault(dir, false)?, json),
        Commands::Category(args) => cmd_named(NamedList::Categories, args, dir),
        Commands::Priority(args) => cmd_named(NamedList::Priorities, args, dir),
        Commands::Folder(args) => cmd_folder(args, dir),

        Commands::Scan(args) => cmd_scan(&open_vault(dir, true)?, args, json),
        Commands::Bases(args) => {
            let ctx = open_vault(dir, true)?;
            match args.action {
                BasesAction::Generate(args) => cmd_bases_generate(&ctx, args, json),
                BasesAction::Refresh => cmd_bases_refresh(&ctx, json),
            }
        }
        Commands::Promote(args) => cmd_promote(&open_vault(dir, true)?, args, json),
        Commands::Revert(args) => cmd_revert(&open_vault(dir, true)?, args, json),
        Commands::Sync(args) => cmd_sync(&open_vault(dir, true)?, args, json),
        Commands::Watch => cmd_watch(&open_vault(dir, true)?, json),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Everything a vault command needs
struct VaultContext {
    root: PathBuf,
    settings: Settings,
    registry: PropertyRegistry,
    vault: Vault<FsDocuments>,
}

impl VaultContext {
    fn lock(&self) -> Result<VaultLock, crate::io::lock::LockError> {
        VaultLock::acquire_default(&self.root)
    }

    fn promoter(&self) -> TodoPromoter<'_, Vault<FsDocuments>> {
        TodoPromoter::new(&self.vault, &self.settings, &self.registry)
    }

    fn sync(&self) -> CompletionSync<'_, Vault<FsDocuments>> {
        CompletionSync::new(&self.vault, &self.settings, &self.registry)
    }
}

fn start_dir(dir: Option<&str>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match dir {
        Some(dir) => Ok(std::fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?),
        None => Ok(std::env::current_dir()?),
    }
}

fn vault_root(dir: Option<&str>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    Ok(settings_io::discover_vault(&start_dir(dir)?)?)
}

/// Discover and load the vault. With `validate`, bad settings stop the
/// command before anything is read or written.
fn open_vault(dir: Option<&str>, validate: bool) -> Result<VaultContext, Box<dyn std::error::Error>> {
    let root = vault_root(dir)?;
    let settings = settings_io::load_settings(&root)?;
    let registry = PropertyRegistry::standard();
    if validate {
        check::validate_settings(&settings, &registry)?;
    }
    tracing::debug!(root = %root.display(), "opened vault");
    let vault = Vault::open(&root, &settings);
    Ok(VaultContext {
        root,
        settings,
        registry,
        vault,
    })
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

/// CLI line numbers are 1-based
fn zero_based(line: u64) -> Result<usize, Box<dyn std::error::Error>> {
    let line = usize::try_from(line)?;
    line.checked_sub(1)
        .ok_or_else(|| "line numbers start at 1".into())
}

// ---------------------------------------------------------------------------
// Read command handlers
// ---------------------------------------------------------------------------

fn cmd_parse(args: ParseArgs, json: bool) -> CmdResult {
    let m = parse_checklist_line(&args.line, 0);
    let bare = parse_bare_reference(&args.line);

    if json {
        let out = ParseJson {
            matched: m.is_some(),
            promotion_target: m
                .as_ref()
                .and_then(|m| m.promotion_target().map(str::to_string)),
            checklist: m,
            bare_reference: bare,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_lines(&format_parse(m.as_ref(), bare.as_deref()));
    }
    Ok(())
}

fn cmd_check(ctx: &VaultContext, json: bool) -> CmdResult {
    let result = check::check_vault(&ctx.settings, &ctx.registry, &ctx.vault)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_lines(&format_check_result(&result));
        if !result.valid {
            println!("Vault has errors");
        }
    }
    Ok(())
}

fn cmd_scan(ctx: &VaultContext, args: ScanArgs, json: bool) -> CmdResult {
    let lines = ctx.promoter().scan(&args.document)?;
    if json {
        let out = scan_to_json(&args.document, &lines);
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if lines.is_empty() {
        println!("No checklist items in {}", args.document);
    } else {
        for line in &lines {
            println!("{}", format_scanned_line(line));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Bases
// ---------------------------------------------------------------------------

fn generate_scope(args: &GenerateArgs) -> Scope {
    if let Some(area) = &args.area {
        Scope::Area(area.clone())
    } else if let Some(project) = &args.project {
        Scope::Project(project.clone())
    } else if let Some(task) = &args.parent_task {
        Scope::ParentTask(task.clone())
    } else {
        Scope::Global
    }
}

fn cmd_bases_generate(ctx: &VaultContext, args: GenerateArgs, json: bool) -> CmdResult {
    let scope = generate_scope(&args);
    let path = scope.base_path(&ctx.settings.folders.bases);

    if !args.write {
        let content = base_gen::render_base(&ctx.settings, &ctx.registry, &scope)?;
        if json {
            let out = BaseJson {
                path: &path,
                written: None,
                content: &content,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        } else {
            print!("{}", content);
        }
        return Ok(());
    }

    let _lock = ctx.lock()?;
    let (path, outcome) = refresh::write_base(&ctx.vault, &ctx.settings, &ctx.registry, &scope)?;
    if json {
        let content = base_gen::render_base(&ctx.settings, &ctx.registry, &scope)?;
        let out = BaseJson {
            path: &path,
            written: Some(outcome == WriteOutcome::Written),
            content: &content,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        match outcome {
            WriteOutcome::Written => println!("wrote {}", path),
            WriteOutcome::Unchanged => println!("{} is up to date", path),
        }
    }
    Ok(())
}

fn cmd_bases_refresh(ctx: &VaultContext, json: bool) -> CmdResult {
    let _lock = ctx.lock()?;
    let report = refresh::refresh_all_bases(&ctx.settings, &ctx.registry, &ctx.vault)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_lines(&format_refresh_report(&report));
    }
    if report.is_success() {
        Ok(())
    } else {
        Err(format!("{} base(s) could not be written", report.failed.len()).into())
    }
}

// ---------------------------------------------------------------------------
// Promotion
// ---------------------------------------------------------------------------

fn cmd_promote(ctx: &VaultContext, args: LineArgs, json: bool) -> CmdResult {
    let line = zero_based(args.line)?;
    let _lock = ctx.lock()?;
    let promoted = ctx.promoter().promote_todo_to_task(&args.document, line)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&promoted)?);
    } else {
        print_lines(&format_promoted(&promoted));
    }
    Ok(())
}

fn cmd_revert(ctx: &VaultContext, args: LineArgs, json: bool) -> CmdResult {
    let line = zero_based(args.line)?;
    let _lock = ctx.lock()?;
    let reverted = ctx.promoter().revert_promoted_todo(&args.document, line)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&reverted)?);
    } else {
        print_lines(&format_reverted(&reverted));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

fn cmd_sync(ctx: &VaultContext, args: SyncArgs, json: bool) -> CmdResult {
    let _lock = ctx.lock()?;
    let sync = ctx.sync();

    let report = if let Some(id) = &args.entity {
        SyncReport {
            changes: sync.sync_entity_to_document(id)?.into_iter().collect(),
            failed: Vec::new(),
        }
    } else if let Some(document) = &args.document {
        SyncReport {
            changes: sync.sync_document_to_entities(document)?,
            failed: Vec::new(),
        }
    } else {
        sync.sync_all()?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_lines(&format_sync_report(&report));
    }
    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(format!("{} document(s) could not be synced", report.failed.len()).into())
    }
}

fn cmd_watch(ctx: &VaultContext, json: bool) -> CmdResult {
    let watcher = VaultWatcher::start(&ctx.root)?;
    let mut session = SyncSession::new(ctx.sync())?;
    tracing::info!(
        root = %ctx.root.display(),
        tracked = session.tracked(),
        "watching vault"
    );
    if !json {
        println!(
            "Watching {} ({} promoted tasks), Ctrl-C to stop",
            ctx.root.display(),
            session.tracked()
        );
    }

    loop {
        let paths = watcher.wait(Duration::from_secs(1));
        if paths.is_empty() {
            continue;
        }
        let report = {
            let _lock = ctx.lock()?;
            session.handle_paths(&paths)
        };
        for change in &report.changes {
            if json {
                println!("{}", serde_json::to_string(change)?);
            } else {
                println!("{}", format_sync_change(change));
            }
        }
        for failure in &report.failed {
            eprintln!("sync failed for {}: {}", failure.path, failure.error);
        }
    }
}

// ---------------------------------------------------------------------------
// Settings edits
// ---------------------------------------------------------------------------

fn cmd_named(list: NamedList, args: NameCmd, dir: Option<&str>) -> CmdResult {
    let root = vault_root(dir)?;
    let _lock = VaultLock::acquire_default(&root)?;
    let (_, mut doc) = settings_io::read_settings(&root)?;
    let label = match list {
        NamedList::Categories => "category",
        NamedList::Priorities => "priority",
    };

    match args.action {
        NameAction::Add(arg) => {
            if !settings_io::add_named(&mut doc, list, &arg.name) {
                return Err(format!("{} \"{}\" already exists", label, arg.name.trim()).into());
            }
            settings_io::write_settings(&root, &doc)?;
            println!("Added {} {}", label, arg.name.trim());
        }
        NameAction::Remove(arg) => {
            if !settings_io::remove_named(&mut doc, list, &arg.name) {
                return Err(format!("no {} named \"{}\"", label, arg.name.trim()).into());
            }
            settings_io::write_settings(&root, &doc)?;
            println!("Removed {} {}", label, arg.name.trim());
        }
    }
    Ok(())
}

fn cmd_folder(args: FolderCmd, dir: Option<&str>) -> CmdResult {
    let root = vault_root(dir)?;
    let _lock = VaultLock::acquire_default(&root)?;
    let (_, mut doc) = settings_io::read_settings(&root)?;

    match args.action {
        FolderAction::Set(args) => {
            let folder = settings_io::set_folder(&mut doc, args.kind.key(), &args.path)?;
            // Refuse edits that would leave the vault unusable
            let settings: Settings = toml::from_str(&doc.to_string())?;
            check::validate_settings(&settings, &PropertyRegistry::standard())?;
            settings_io::write_settings(&root, &doc)?;
            println!("folders.{} = \"{}\"", args.kind.key(), folder);
        }
    }
    Ok(())
}
