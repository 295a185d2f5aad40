use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::cli::{AddArgs, Command, EditArgs, KeyVal};
use crate::config::Config;
use crate::datetime::parse_due_expr;
use crate::drag::{DragCoordinator, DragEvent, DragOutcome};
use crate::render::Renderer;
use crate::state::SettingsPatch;
use crate::store::TaskStore;
use crate::task::{Category, Priority, TaskOptions, TaskPatch};
use crate::transfer::{self, ExportFormat};

#[instrument(skip(store, cfg, renderer, out))]
pub fn dispatch<W: Write>(
    store: &mut TaskStore,
    cfg: &Config,
    renderer: &Renderer,
    out: &mut W,
    command: Command,
) -> anyhow::Result<()> {
    debug!(revision = store.revision(), "dispatching command");

    match command {
        Command::Add(args) => cmd_add(store, out, args),
        Command::List { filter, search } => {
            cmd_list(store, cfg, renderer, out, filter.as_deref(), search.as_deref())
        }
        Command::Info { id } => cmd_info(store, renderer, out, &id),
        Command::Toggle { id } => cmd_toggle(store, out, &id),
        Command::Edit(args) => cmd_edit(store, out, args),
        Command::Delete { id } => cmd_delete(store, out, &id),
        Command::Move { id, onto } => cmd_move(store, out, &id, &onto),
        Command::ClearCompleted => {
            let removed = store.clear_completed()?;
            writeln!(out, "Removed {removed} completed task(s).")?;
            Ok(())
        }
        Command::Stats => renderer.write_stats(out, &store.stats()),
        Command::Theme { value } => cmd_theme(store, out, value.as_deref()),
        Command::Settings { pairs } => cmd_settings(store, renderer, out, &pairs),
        Command::Export { format, output } => cmd_export(store, out, &format, output.as_deref()),
        Command::Import { source } => cmd_import(store, out, &source),
    }
}

fn parse_category(raw: Option<&str>) -> anyhow::Result<Option<Category>> {
    raw.map(|value| Category::parse(value).ok_or_else(|| anyhow!("unknown category: {value}")))
        .transpose()
}

fn parse_priority(raw: Option<&str>) -> anyhow::Result<Option<Priority>> {
    raw.map(|value| Priority::parse(value).ok_or_else(|| anyhow!("unknown priority: {value}")))
        .transpose()
}

#[instrument(skip(store, out))]
fn cmd_add<W: Write>(store: &mut TaskStore, out: &mut W, args: AddArgs) -> anyhow::Result<()> {
    info!("command add");

    let due_date = args
        .due
        .as_deref()
        .map(|expr| parse_due_expr(expr, store.now()))
        .transpose()
        .context("invalid --due")?;

    let options = TaskOptions {
        category: parse_category(args.category.as_deref())?,
        priority: parse_priority(args.priority.as_deref())?,
        due_date,
        tags: args.tags,
        notes: args.notes,
        estimated_time: args.estimate.map(Value::from),
        ..TaskOptions::default()
    };

    let task = store.create_task(&args.text.join(" "), options)?;
    writeln!(out, "Created task {}.", task.id.short())?;
    Ok(())
}

#[instrument(skip(store, cfg, renderer, out))]
fn cmd_list<W: Write>(
    store: &mut TaskStore,
    cfg: &Config,
    renderer: &Renderer,
    out: &mut W,
    filter: Option<&str>,
    search: Option<&str>,
) -> anyhow::Result<()> {
    info!("command list");

    match filter {
        Some(key) => store.set_filter(key)?,
        None => store.set_filter(cfg.default_filter().as_str())?,
    }
    store.set_search_term(search.unwrap_or_default())?;

    let now = store.now();
    let state = store.snapshot();
    let visible = store.filtered_tasks();
    if visible.is_empty() {
        writeln!(out, "No matches.")?;
    } else {
        renderer.write_task_table(&mut *out, &visible, now)?;
    }

    let completed = state.tasks.iter().filter(|task| task.completed).count();
    renderer.write_list_footer(out, visible.len(), state.tasks.len(), completed, &state.settings)
}

fn cmd_info<W: Write>(store: &TaskStore, renderer: &Renderer, out: &mut W, raw_id: &str) -> anyhow::Result<()> {
    let id = store.resolve_id(raw_id)?;
    let task = store
        .state()
        .task(&id)
        .ok_or_else(|| anyhow!("task {id} vanished while reading"))?;
    renderer.write_task_info(out, task)
}

#[instrument(skip(store, out))]
fn cmd_toggle<W: Write>(store: &mut TaskStore, out: &mut W, raw_id: &str) -> anyhow::Result<()> {
    info!("command toggle");
    let id = store.resolve_id(raw_id)?;
    store.toggle_task(&id)?;

    let completed = store.state().task(&id).is_some_and(|task| task.completed);
    let verb = if completed { "Completed" } else { "Reopened" };
    writeln!(out, "{verb} task {}.", id.short())?;
    Ok(())
}

#[instrument(skip(store, out))]
fn cmd_edit<W: Write>(store: &mut TaskStore, out: &mut W, args: EditArgs) -> anyhow::Result<()> {
    info!("command edit");
    let id = store.resolve_id(&args.id)?;

    let due_date = if args.no_due {
        Some(None)
    } else {
        args.due
            .as_deref()
            .map(|expr| parse_due_expr(expr, store.now()).map(Some))
            .transpose()
            .context("invalid --due")?
    };

    let tags = if args.clear_tags {
        Some(Vec::new())
    } else if args.tags.is_empty() {
        None
    } else {
        Some(args.tags)
    };

    let patch = TaskPatch {
        text: args.text,
        category: parse_category(args.category.as_deref())?,
        priority: parse_priority(args.priority.as_deref())?,
        due_date,
        tags,
        notes: args.notes,
        estimated_time: args.estimate.map(|minutes| Some(Value::from(minutes))),
        actual_time: args.actual.map(|minutes| Some(Value::from(minutes))),
        ..TaskPatch::default()
    };
    if patch.is_empty() {
        return Err(anyhow!("edit: nothing to change"));
    }

    store.update_task(&id, patch)?;
    writeln!(out, "Updated task {}.", id.short())?;
    Ok(())
}

#[instrument(skip(store, out))]
fn cmd_delete<W: Write>(store: &mut TaskStore, out: &mut W, raw_id: &str) -> anyhow::Result<()> {
    info!("command delete");
    let id = store.resolve_id(raw_id)?;
    store.delete_task(&id)?;
    writeln!(out, "Deleted task {}.", id.short())?;
    Ok(())
}

#[instrument(skip(store, out))]
fn cmd_move<W: Write>(store: &mut TaskStore, out: &mut W, raw_id: &str, raw_onto: &str) -> anyhow::Result<()> {
    info!("command move");
    let dragged = store.resolve_id(raw_id)?;
    let target = store.resolve_id(raw_onto)?;

    let mut drag = DragCoordinator::new();
    drag.handle(DragEvent::PickUp(dragged.clone()), store)?;
    drag.handle(DragEvent::DragOver(target.clone()), store)?;
    match drag.handle(DragEvent::Drop(target.clone()), store)? {
        DragOutcome::Reordered => {
            let position = store.state().position(&dragged).map_or(0, |idx| idx + 1);
            writeln!(out, "Moved task {} to position {position}.", dragged.short())?;
        }
        _ => writeln!(out, "Nothing to move.")?,
    }
    Ok(())
}

fn cmd_theme<W: Write>(store: &mut TaskStore, out: &mut W, value: Option<&str>) -> anyhow::Result<()> {
    match value {
        None => {}
        Some("toggle") => {
            store.toggle_theme()?;
        }
        Some(theme) => store.set_theme(theme)?,
    }
    writeln!(out, "Theme: {}", store.state().theme)?;
    Ok(())
}

fn cmd_settings<W: Write>(
    store: &mut TaskStore,
    renderer: &Renderer,
    out: &mut W,
    pairs: &[KeyVal],
) -> anyhow::Result<()> {
    if !pairs.is_empty() {
        let patch = SettingsPatch::from_pairs(pairs.iter().map(|kv| (kv.key.as_str(), kv.value.as_str())))?;
        store.update_settings(patch)?;
    }
    let state = store.state();
    renderer.write_settings(out, state.theme, &state.settings)
}

#[instrument(skip(store, out))]
fn cmd_export<W: Write>(
    store: &TaskStore,
    out: &mut W,
    format: &str,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    info!("command export");
    let format = ExportFormat::parse(format)?;
    let now = store.now();
    let tasks = &store.state().tasks;
    let content = transfer::export(tasks, format, now)?;

    let Some(output) = output else {
        writeln!(out, "{content}")?;
        return Ok(());
    };

    let path: PathBuf = if output.is_dir() {
        output.join(transfer::backup_file_name(format, now))
    } else {
        output.to_path_buf()
    };
    fs::write(&path, content).with_context(|| format!("failed writing {}", path.display()))?;
    writeln!(out, "Exported {} task(s) to {}.", tasks.len(), path.display())?;
    Ok(())
}

#[instrument(skip(store, out))]
fn cmd_import<W: Write>(store: &mut TaskStore, out: &mut W, source: &str) -> anyhow::Result<()> {
    info!("command import");

    let raw = if source == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed reading stdin")?;
        buf
    } else {
        fs::read_to_string(source).with_context(|| format!("failed reading {source}"))?
    };

    let tasks = transfer::parse_import(&raw, store.now())?;
    let count = tasks.len();
    store.replace_tasks(tasks)?;

    writeln!(out, "Imported {count} task(s).")?;
    Ok(())
}
