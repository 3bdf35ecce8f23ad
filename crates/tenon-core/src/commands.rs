use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use chrono::{Local, NaiveDate};
use tracing::{debug, info, instrument, warn};

use crate::board::TaskBoard;
use crate::cli::Invocation;
use crate::config::Config;
use crate::dataflow::{self, MappingConfig};
use crate::datastore::DataStore;
use crate::datetime::parse_date_expr;
use crate::export::{self, ExportFormat};
use crate::notes::{self, NoteWrite};
use crate::profile::ExportProfile;
use crate::render::Renderer;
use crate::task::{self, DisplayItem, Priority, ProjectDataItem};
use crate::timesheet::{TimeEntry, TimeSheet};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "tree",
        "add",
        "project",
        "subtask",
        "select",
        "deselect",
        "edit",
        "rename",
        "priority",
        "delete",
        "expand",
        "collapse",
        "expand-all",
        "collapse-all",
        "info",
        "time",
        "note",
        "flow",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let today = Local::now().date_naive();
    let command = inv.command.as_str();

    debug!(command, args = ?inv.args, "dispatching command");

    match command {
        "tree" => cmd_tree(store, renderer, today),
        "add" => cmd_add(store, &inv.args, today),
        "project" => cmd_project(store, &inv.args, today),
        "subtask" => cmd_subtask(store, &inv.args, today),
        "select" => cmd_select(store, &inv.args),
        "deselect" => cmd_deselect(store),
        "edit" => cmd_edit(store),
        "rename" => cmd_rename(store, &inv.args),
        "priority" => cmd_priority(store, &inv.args, today),
        "delete" => cmd_delete(store),
        "expand" => cmd_expand(store, true),
        "collapse" => cmd_expand(store, false),
        "expand-all" => cmd_expand_all(store, true),
        "collapse-all" => cmd_expand_all(store, false),
        "info" => cmd_info(store, renderer, &inv.args, today),
        "time" => cmd_time(store, renderer, &inv.args, today),
        "note" => cmd_note(store, &inv.args),
        "flow" => cmd_flow(store, &inv.args, today),
        "_show" => cmd_show(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn load_board(store: &DataStore) -> anyhow::Result<TaskBoard> {
    let forest = store.load_forest()?;
    let selection = store.get_selection()?;
    Ok(TaskBoard::new(forest, selection))
}

fn save_board(store: &DataStore, board: &TaskBoard) -> anyhow::Result<()> {
    store.save_forest(&board.items)?;
    store.set_selection(board.selected())?;
    Ok(())
}

/// `N` or `N.M` into the id pair.
fn parse_id_token(token: &str) -> anyhow::Result<(i64, Option<i64>)> {
    let (id1, id2) = match token.split_once('.') {
        Some((a, b)) => (a, Some(b)),
        None => (token, None),
    };
    let id1 = id1
        .parse::<i64>()
        .with_context(|| format!("invalid task id: {token}"))?;
    let id2 = match id2 {
        Some(raw) => Some(
            raw.parse::<i64>()
                .with_context(|| format!("invalid task id: {token}"))?,
        ),
        None => None,
    };
    Ok((id1, id2))
}

fn joined_or(args: &[String], fallback: &str) -> String {
    if args.is_empty() {
        fallback.to_string()
    } else {
        args.join(" ")
    }
}

#[instrument(skip(store, renderer, today))]
fn cmd_tree(store: &mut DataStore, renderer: &mut Renderer, today: NaiveDate) -> anyhow::Result<()> {
    info!("command tree");
    let board = load_board(store)?;
    renderer.print_forest(&board.items, board.selected(), today)
}

#[instrument(skip(store, args, today))]
fn cmd_add(store: &mut DataStore, args: &[String], today: NaiveDate) -> anyhow::Result<()> {
    info!("command add");

    let mut board = load_board(store)?;
    board.new_task(joined_or(args, "New Task"), today);
    save_board(store, &board)?;

    let item = board.selected_item().ok_or_else(|| anyhow!("new task vanished"))?;
    println!("Created task {}.", item.reference());
    Ok(())
}

#[instrument(skip(store, args, today))]
fn cmd_project(store: &mut DataStore, args: &[String], today: NaiveDate) -> anyhow::Result<()> {
    info!("command project");

    let mut board = load_board(store)?;
    board.new_project(joined_or(args, "New Project"), today);
    save_board(store, &board)?;

    let item = board.selected_item().ok_or_else(|| anyhow!("new project vanished"))?;
    println!("Created project {}.", item.reference());
    Ok(())
}

#[instrument(skip(store, args, today))]
fn cmd_subtask(store: &mut DataStore, args: &[String], today: NaiveDate) -> anyhow::Result<()> {
    info!("command subtask");

    let mut board = load_board(store)?;
    if board
        .new_subtask(joined_or(args, "New Task"), today)
        .is_none()
    {
        println!("No task selected.");
        return Ok(());
    }
    save_board(store, &board)?;

    let item = board.selected_item().ok_or_else(|| anyhow!("new subtask vanished"))?;
    println!("Created subtask {}.", item.reference());
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_select(store: &mut DataStore, args: &[String]) -> anyhow::Result<()> {
    info!("command select");

    let token = args
        .first()
        .ok_or_else(|| anyhow!("select requires a task id"))?;
    let (id1, id2) = parse_id_token(token)?;

    let mut board = load_board(store)?;
    let target = task::find_by_ids(&board.items, id1, id2)
        .map(|item| (item.uuid, item.reference(), item.name.clone()))
        .ok_or_else(|| anyhow!("no matching task: {token}"))?;

    board.select(target.0);
    store.set_selection(board.selected())?;
    println!("Selected {} {}.", target.1, target.2);
    Ok(())
}

#[instrument(skip(store))]
fn cmd_deselect(store: &mut DataStore) -> anyhow::Result<()> {
    info!("command deselect");
    store.set_selection(None)?;
    println!("Selection cleared.");
    Ok(())
}

#[instrument(skip(store))]
fn cmd_edit(store: &mut DataStore) -> anyhow::Result<()> {
    info!("command edit");

    let mut board = load_board(store)?;
    match board.toggle_edit() {
        Some(true) => println!("Edit mode on."),
        Some(false) => println!("Edit mode off."),
        None => println!("No task selected."),
    }
    save_board(store, &board)?;
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_rename(store: &mut DataStore, args: &[String]) -> anyhow::Result<()> {
    info!("command rename");

    if args.is_empty() {
        return Err(anyhow!("rename requires a name"));
    }
    let name = args.join(" ");

    let mut board = load_board(store)?;
    if !board.rename(&name) {
        println!("No task selected.");
        return Ok(());
    }
    save_board(store, &board)?;
    println!("Renamed to {name}.");
    Ok(())
}

#[instrument(skip(store, args, today))]
fn cmd_priority(store: &mut DataStore, args: &[String], today: NaiveDate) -> anyhow::Result<()> {
    info!("command priority");

    let raw = args
        .first()
        .ok_or_else(|| anyhow!("priority requires low, medium or high"))?;
    let priority: Priority = raw.parse()?;

    let mut board = load_board(store)?;
    if !board.set_priority(priority, today) {
        println!("No task selected.");
        return Ok(());
    }
    save_board(store, &board)?;
    println!("Priority set to {priority}.");
    Ok(())
}

#[instrument(skip(store))]
fn cmd_delete(store: &mut DataStore) -> anyhow::Result<()> {
    info!("command delete");

    let mut board = load_board(store)?;
    if board.selected().is_none() {
        println!("No task selected.");
        return Ok(());
    }

    match board.delete_selected() {
        Some(removed) => {
            save_board(store, &board)?;
            println!(
                "Deleted task {} ({} node(s)).",
                removed.reference(),
                task::count_nodes(std::slice::from_ref(&removed))
            );
        }
        None => {
            // The stale pointer was already logged; clear it so the next
            // command starts clean.
            store.set_selection(None)?;
            println!("Nothing deleted.");
        }
    }
    Ok(())
}

#[instrument(skip(store))]
fn cmd_expand(store: &mut DataStore, expanded: bool) -> anyhow::Result<()> {
    info!(expanded, "command expand/collapse");

    let mut board = load_board(store)?;
    let changed = if expanded {
        board.expand()
    } else {
        board.collapse()
    };
    if !changed {
        println!("No task selected.");
        return Ok(());
    }
    save_board(store, &board)?;
    println!("{}", if expanded { "Expanded." } else { "Collapsed." });
    Ok(())
}

#[instrument(skip(store))]
fn cmd_expand_all(store: &mut DataStore, expanded: bool) -> anyhow::Result<()> {
    info!(expanded, "command expand-all/collapse-all");

    let mut board = load_board(store)?;
    let changed = if expanded {
        board.expand_all()
    } else {
        board.collapse_all()
    };
    save_board(store, &board)?;

    info!(changed, "bulk expansion complete");
    println!(
        "{} {changed} node(s).",
        if expanded { "Expanded" } else { "Collapsed" }
    );
    Ok(())
}

#[instrument(skip(store, renderer, args, today))]
fn cmd_info(
    store: &mut DataStore,
    renderer: &mut Renderer,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command info");

    let board = load_board(store)?;
    let item = match args.first() {
        Some(token) => {
            let (id1, id2) = parse_id_token(token)?;
            task::find_by_ids(&board.items, id1, id2)
        }
        None => board.selected_item(),
    }
    .ok_or_else(|| anyhow!("no matching tasks"))?;

    println!("{}  {}", item.reference(), item.name);

    let format_date = |date: Option<NaiveDate>| {
        date.map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    let rows = vec![
        ProjectDataItem::new("priority", item.priority.to_string()),
        ProjectDataItem::new("assigned", item.assigned.format("%Y-%m-%d").to_string()),
        ProjectDataItem::new("due", format_date(item.due)),
        ProjectDataItem::new("bring forward", format_date(item.bring_forward)),
        ProjectDataItem::new("children", item.children.len().to_string()),
        ProjectDataItem::new(
            "high priority today",
            if item.is_high_priority_today(today) { "yes" } else { "no" },
        ),
    ];
    let refs: Vec<&dyn DisplayItem> = rows.iter().map(|row| row as &dyn DisplayItem).collect();
    renderer.print_outline(&refs)?;
    Ok(())
}

#[instrument(skip(store, renderer, args, today))]
fn cmd_time(
    store: &mut DataStore,
    renderer: &mut Renderer,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    let sub = args.first().map(String::as_str).unwrap_or("week");
    info!(sub, "command time");

    let entries = store.load_entries()?;
    let cursor = store.get_cursor()?.unwrap_or(today);
    let mut sheet = TimeSheet::new(entries, cursor);

    match sub {
        "add" => {
            let usage = || anyhow!("usage: time add <id1[.id2]> <date> <hours> [description]");
            let token = args.get(1).ok_or_else(usage)?;
            let (id1, id2) = parse_id_token(token)?;
            let date = parse_date_expr(args.get(2).ok_or_else(usage)?, today)?;
            let hours: f64 = args
                .get(3)
                .ok_or_else(usage)?
                .parse()
                .context("invalid hours")?;
            let description = args[4..].join(" ");

            let entry = TimeEntry::new(id1, id2, date, hours, description);
            if entry.date() != date {
                warn!(requested = %date, recorded = %entry.date(), "weekend date moved to Friday");
            }
            println!(
                "Logged {}h on {} for {}.",
                entry.hours(),
                entry.date().format("%Y-%m-%d"),
                entry.project_reference()
            );
            sheet.entries.push(entry);
            store.save_entries(&sheet.entries)?;
        }
        "week" | "day" => {
            if let Some(expr) = args.get(1) {
                let date = parse_date_expr(expr, today)?;
                if !sheet.set_selected_date(date) {
                    println!("Weekend dates are not selectable.");
                }
                store.set_cursor(sheet.selected_date())?;
            }
            if sub == "week" {
                renderer.print_week(&sheet)?;
            } else {
                renderer.print_day(&sheet, sheet.selected_date())?;
            }
        }
        "next-day" | "prev-day" | "next-week" | "prev-week" | "today" | "current-week" => {
            match sub {
                "next-day" => sheet.next_day(),
                "prev-day" => sheet.previous_day(),
                "next-week" => sheet.next_week(),
                "prev-week" => sheet.previous_week(),
                "today" => sheet.today(today),
                _ => sheet.current_week(),
            }
            store.set_cursor(sheet.selected_date())?;
            if matches!(sub, "next-day" | "prev-day" | "today") {
                renderer.print_day(&sheet, sheet.selected_date())?;
            } else {
                renderer.print_week(&sheet)?;
            }
        }
        "export" => {
            if let Some(expr) = args.get(1) {
                let date = parse_date_expr(expr, today)?;
                if !sheet.set_selected_date(date) {
                    println!("Weekend dates are not selectable.");
                }
            }
            match export::weekly_timesheet_block(&sheet.entries, sheet.week_start()) {
                Some(block) => println!("{block}"),
                None => println!(
                    "Nothing to export for the week of {}.",
                    sheet.week_start().format("%Y-%m-%d")
                ),
            }
        }
        other => return Err(anyhow!("unknown time subcommand: {other}")),
    }

    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_note(store: &mut DataStore, args: &[String]) -> anyhow::Result<()> {
    let sub = args.first().map(String::as_str).unwrap_or("show");
    info!(sub, "command note");

    let usage = || anyhow!("usage: note <show|write> <id1> <type>");
    let id1: i64 = args
        .get(1)
        .ok_or_else(usage)?
        .parse()
        .context("invalid task id")?;
    let note_type = args.get(2).map(String::as_str).unwrap_or("general");

    let forest = store.load_forest()?;
    let item = task::find_by_ids(&forest, id1, None).ok_or_else(|| anyhow!("no matching tasks"))?;
    let path = notes::note_path(&store.notes_dir, item.id1, &item.name, note_type);

    match sub {
        "show" => match notes::read_note(&path)? {
            Some(content) => print!("{content}"),
            None => println!("No note."),
        },
        "write" => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("failed reading stdin")?;

            let now = Local::now().naive_local();
            match notes::write_note(&path, &content, now)? {
                NoteWrite::Unchanged => println!("Note unchanged."),
                NoteWrite::Created => println!("Note created: {}.", path.display()),
                NoteWrite::Updated { backup } => {
                    println!("Note updated (backup {}).", backup.display());
                }
            }
        }
        other => return Err(anyhow!("unknown note subcommand: {other}")),
    }

    Ok(())
}

#[derive(Debug, Default)]
struct FlowArgs {
    config: Option<PathBuf>,
    profile: Option<String>,
    fields: Option<Vec<String>>,
    format: Option<ExportFormat>,
    output: Option<PathBuf>,
    name: Option<String>,
    preview: bool,
    force: bool,
}

fn parse_flow_flags(args: &[String]) -> anyhow::Result<FlowArgs> {
    let mut parsed = FlowArgs::default();
    let mut iter = args.iter();

    let value_of = |flag: &str, iter: &mut std::slice::Iter<'_, String>| {
        iter.next()
            .cloned()
            .ok_or_else(|| anyhow!("{flag} requires a value"))
    };

    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--config" => parsed.config = Some(PathBuf::from(value_of("--config", &mut iter)?)),
            "--profile" => parsed.profile = Some(value_of("--profile", &mut iter)?),
            "--fields" => {
                let raw = value_of("--fields", &mut iter)?;
                parsed.fields = Some(
                    raw.split(',')
                        .map(|field| field.trim().to_string())
                        .filter(|field| !field.is_empty())
                        .collect(),
                );
            }
            "--format" => parsed.format = Some(value_of("--format", &mut iter)?.parse()?),
            "--output" => parsed.output = Some(PathBuf::from(value_of("--output", &mut iter)?)),
            "--name" => parsed.name = Some(value_of("--name", &mut iter)?),
            "--preview" => parsed.preview = true,
            "--force" => parsed.force = true,
            other => return Err(anyhow!("unknown flow flag: {other}")),
        }
    }

    Ok(parsed)
}

#[instrument(skip(store, args, today))]
fn cmd_flow(store: &mut DataStore, args: &[String], today: NaiveDate) -> anyhow::Result<()> {
    let Some(sub) = args.first() else {
        return Err(anyhow!(
            "usage: flow <run|fields|export|profiles|save-profile|delete-profile>"
        ));
    };
    info!(sub, "command flow");

    let flags = parse_flow_flags(&args[1..])?;
    let config_path = flags
        .config
        .clone()
        .unwrap_or_else(|| store.data_dir.join("dataflow.json"));

    match sub.as_str() {
        "run" => {
            let config = MappingConfig::load(&config_path)?;
            let copied = dataflow::run_transfer(&config)?;
            println!(
                "Copied {copied} cell(s) to {}.",
                config.destination_file_path.display()
            );
        }
        "fields" => {
            let config = MappingConfig::load(&config_path)?;
            for mapping in &config.mappings {
                println!(
                    "{} ({} -> {}){}",
                    mapping.field_name,
                    mapping.source_cell,
                    mapping.destination_cell,
                    if mapping.use_in_t2020 { "" } else { " [excluded]" }
                );
            }
        }
        "export" => cmd_flow_export(store, &config_path, &flags, today)?,
        "profiles" => {
            let profiles = store.load_profiles()?;
            let listed = profiles.list();
            if listed.is_empty() {
                println!("No profiles.");
            }
            for profile in listed {
                println!(
                    "{}  {}  fields={}  uses={}  last={}",
                    profile.name,
                    profile.format,
                    profile.fields.join(","),
                    profile.usage_count,
                    profile
                        .last_used
                        .map(|date| date.format("%Y-%m-%d").to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }
        "save-profile" => {
            let name = flags
                .name
                .clone()
                .ok_or_else(|| anyhow!("save-profile requires --name"))?;
            let fields = flags
                .fields
                .clone()
                .ok_or_else(|| anyhow!("save-profile requires --fields"))?;
            let format = flags
                .format
                .ok_or_else(|| anyhow!("save-profile requires --format"))?;

            let mut profiles = store.load_profiles()?;
            profiles.upsert(ExportProfile {
                name: name.clone(),
                fields,
                format,
                usage_count: 0,
                last_used: None,
            });
            store.save_profiles(&profiles)?;
            println!("Saved profile {name}.");
        }
        "delete-profile" => {
            let name = flags
                .name
                .clone()
                .ok_or_else(|| anyhow!("delete-profile requires --name"))?;
            let mut profiles = store.load_profiles()?;
            if !profiles.remove(&name) {
                return Err(anyhow!("unknown profile: {name}"));
            }
            store.save_profiles(&profiles)?;
            println!("Deleted profile {name}.");
        }
        other => return Err(anyhow!("unknown flow subcommand: {other}")),
    }

    Ok(())
}

#[instrument(skip(store, flags, today))]
fn cmd_flow_export(
    store: &mut DataStore,
    config_path: &std::path::Path,
    flags: &FlowArgs,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let config = MappingConfig::load(config_path)?;
    let mut profiles = store.load_profiles()?;

    // Explicit flags win over the profile's presets.
    let (fields_sel, format) = match &flags.profile {
        Some(name) => {
            let profile = profiles
                .get(name)
                .ok_or_else(|| anyhow!("unknown profile: {name}"))?;
            (
                Some(flags.fields.clone().unwrap_or_else(|| profile.fields.clone())),
                flags.format.unwrap_or(profile.format),
            )
        }
        None => (flags.fields.clone(), flags.format.unwrap_or(ExportFormat::Csv)),
    };

    let fields = dataflow::extract_fields(&config, fields_sel.as_deref())?;
    if fields.is_empty() {
        println!("No fields to export.");
        return Ok(());
    }
    let payload = export::render_flat(&fields, format)?;

    if flags.preview {
        print!("{payload}");
        return Ok(());
    }

    let output = flags
        .output
        .clone()
        .ok_or_else(|| anyhow!("flow export requires --output or --preview"))?;
    if output.exists() && !flags.force {
        return Err(anyhow!(
            "refusing to overwrite {} without --force",
            output.display()
        ));
    }
    std::fs::write(&output, &payload)
        .with_context(|| format!("failed to write {}", output.display()))?;

    if let Some(name) = &flags.profile {
        profiles.record_use(name, today)?;
        store.save_profiles(&profiles)?;
    }

    println!("Exported {} field(s) to {}.", fields.len(), output.display());
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<(String, String)> = cfg
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    entries.sort();
    for (key, value) in entries {
        println!("{key}={value}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!("usage: tenon [options] <command> [args]");
    println!();
    println!("  tree                          show the task forest (default)");
    println!("  add|project|subtask [name]    create under the selection / at the root");
    println!("  select <id1[.id2]>            move the selection; deselect clears it");
    println!("  edit | rename <name>          toggle edit mode / rename the selection");
    println!("  priority <low|medium|high>    set priority on the selection");
    println!("  delete                        delete the selected subtree");
    println!("  expand|collapse[-all]         expansion state, single or bulk");
    println!("  info [id1[.id2]]              task details");
    println!("  time add|week|day|export ...  weekly time ledger");
    println!("  note show|write <id1> <type>  per-task notes (write reads stdin)");
    println!("  flow run|fields|export ...    mapped cell transfer and flat export");
    Ok(())
}
