use std::io::Write;

use anyhow::anyhow;
use chrono_tz::Tz;
use tracing::{debug, info, instrument};

use crate::cli::Invocation;
use crate::datetime::{parse_due_date, today_in};
use crate::ordering::SortPolicy;
use crate::pipeline::{ConfirmOutcome, DeletionState};
use crate::render::Renderer;
use crate::session::Session;
use crate::storage::KeyValueStore;
use crate::task::TaskId;
use crate::timer::Clock;

const DUE_PREFIX: &str = "due:";

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add", "voice", "list", "info", "done", "star", "notes", "move", "sort", "rm", "yes",
        "no", "undo", "dismiss", "select", "toggle", "clear", "bulk", "bin", "restore", "purge",
        "empty", "status", "help", "quit",
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

/// What the caller should do after a command ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, Clone, Copy)]
pub struct CommandContext {
    pub timezone: Option<Tz>,
    /// Whether a later line can still answer the delete dialog. A
    /// one-shot `rm` confirms on the spot instead.
    pub interactive: bool,
}

#[instrument(skip(session, renderer, ctx, inv, out), fields(command = %inv.command))]
pub fn dispatch<S, C, W>(
    session: &mut Session<S, C>,
    renderer: &Renderer,
    ctx: &CommandContext,
    inv: Invocation,
    out: &mut W,
) -> anyhow::Result<Flow>
where
    S: KeyValueStore,
    C: Clock,
    W: Write,
{
    debug!(args = ?inv.args, "dispatching command");
    let args = inv.args.as_slice();

    match inv.command.as_str() {
        "add" => cmd_add(session, ctx, args, out)?,
        "voice" => cmd_voice(session, args, out)?,
        "list" => cmd_list(session, renderer, ctx, out)?,
        "info" => cmd_info(session, renderer, ctx, args, out)?,
        "done" => cmd_done(session, args, out)?,
        "star" => cmd_star(session, args, out)?,
        "notes" => cmd_notes(session, args, out)?,
        "move" => cmd_move(session, args, out)?,
        "sort" => cmd_sort(session, args, out)?,
        "rm" => cmd_rm(session, ctx, args, out)?,
        "yes" => cmd_yes(session, renderer, out)?,
        "no" => cmd_no(session, out)?,
        "undo" => cmd_undo(session, out)?,
        "dismiss" => cmd_dismiss(session, out)?,
        "select" => cmd_select(session, args, out)?,
        "toggle" => cmd_toggle(session, args, out)?,
        "clear" => {
            session.clear_selection();
            writeln!(out, "Selection cleared.")?;
        }
        "bulk" => cmd_bulk(session, ctx, args, out)?,
        "bin" => cmd_bin(session, renderer, out)?,
        "restore" => cmd_restore(session, args, out)?,
        "purge" => cmd_purge(session, args, out)?,
        "empty" => {
            let emptied = session.empty_bin();
            writeln!(out, "Permanently deleted {emptied} task(s).")?;
        }
        "status" => renderer.print_status(out, &session.status())?,
        "help" => cmd_help(out)?,
        "quit" => return Ok(Flow::Quit),
        other => return Err(anyhow!("unknown command: {other}")),
    }

    Ok(Flow::Continue)
}

fn cmd_add<S: KeyValueStore, C: Clock, W: Write>(
    session: &mut Session<S, C>,
    ctx: &CommandContext,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    let mut words = Vec::with_capacity(args.len());
    let mut due_expr = None;
    for arg in args {
        match arg.strip_prefix(DUE_PREFIX) {
            Some(expr) => due_expr = Some(expr.to_string()),
            None => words.push(arg.as_str()),
        }
    }

    let due_date = match due_expr.as_deref().map(str::trim) {
        Some(expr) if !expr.is_empty() => {
            let today = today_in(ctx.timezone, session.clock().now());
            Some(parse_due_date(expr, today)?)
        }
        _ => None,
    };

    let id = session.add(&words.join(" "), due_date)?;
    info!(%id, "command add");
    writeln!(out, "Added task {}.", short(id))?;
    Ok(())
}

fn cmd_voice<S: KeyValueStore, C: Clock, W: Write>(
    session: &mut Session<S, C>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    let id = session.add_transcript(&args.join(" "))?;
    let text = session.get(id).map(|t| t.text.as_str()).unwrap_or_default();
    writeln!(out, "Added task {}: {text}", short(id))?;
    Ok(())
}

fn cmd_list<S: KeyValueStore, C: Clock, W: Write>(
    session: &Session<S, C>,
    renderer: &Renderer,
    ctx: &CommandContext,
    out: &mut W,
) -> anyhow::Result<()> {
    let today = today_in(ctx.timezone, session.clock().now());
    renderer.print_task_table(out, &session.visible(), session.selection(), today)?;
    renderer.print_undo_notice(out, &session.status())
}

fn cmd_info<S: KeyValueStore, C: Clock, W: Write>(
    session: &Session<S, C>,
    renderer: &Renderer,
    ctx: &CommandContext,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    let [address] = args else {
        return Err(anyhow!("usage: info N"));
    };
    let id = resolve_task(session, address)?;
    let Some(task) = session.get(id) else {
        return Err(anyhow!("no task matches {address}"));
    };
    let today = today_in(ctx.timezone, session.clock().now());
    renderer.print_task_info(out, task, today)
}

fn cmd_done<S: KeyValueStore, C: Clock, W: Write>(
    session: &mut Session<S, C>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    for id in resolve_tasks(session, args, "done N...")? {
        session.toggle_completed(id);
        let state = session
            .get(id)
            .map(|t| if t.completed { "completed" } else { "not completed" })
            .unwrap_or_default();
        writeln!(out, "Marked task {} {state}.", short(id))?;
    }
    Ok(())
}

fn cmd_star<S: KeyValueStore, C: Clock, W: Write>(
    session: &mut Session<S, C>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    for id in resolve_tasks(session, args, "star N...")? {
        session.toggle_important(id);
        let state = session
            .get(id)
            .map(|t| if t.is_important { "important" } else { "not important" })
            .unwrap_or_default();
        writeln!(out, "Marked task {} {state}.", short(id))?;
    }
    Ok(())
}

fn cmd_notes<S: KeyValueStore, C: Clock, W: Write>(
    session: &mut Session<S, C>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    let Some((address, words)) = args.split_first() else {
        return Err(anyhow!("usage: notes N TEXT"));
    };
    let id = resolve_task(session, address)?;
    session.set_notes(id, &words.join(" "));
    if words.is_empty() {
        writeln!(out, "Cleared notes on task {}.", short(id))?;
    } else {
        writeln!(out, "Updated notes on task {}.", short(id))?;
    }
    Ok(())
}

fn cmd_move<S: KeyValueStore, C: Clock, W: Write>(
    session: &mut Session<S, C>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    let [from, to] = args else {
        return Err(anyhow!("usage: move N M"));
    };
    let moved = resolve_task(session, from)?;
    let target = resolve_task(session, to)?;
    if moved == target {
        debug!("move onto itself ignored");
        return Ok(());
    }
    session.reorder(moved, target);
    writeln!(out, "Moved task {}. Sort: {}.", short(moved), session.policy().label())?;
    Ok(())
}

fn cmd_sort<S: KeyValueStore, C: Clock, W: Write>(
    session: &mut Session<S, C>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    match args {
        [] => {
            for policy in SortPolicy::ALL {
                let marker = if policy == session.policy() { '*' } else { ' ' };
                writeln!(out, "{marker} {:<10} {}", policy.wire_name(), policy.label())?;
            }
        }
        [name] => {
            let policy: SortPolicy = name.parse()?;
            session.set_policy(policy);
            writeln!(out, "Sort: {}.", policy.label())?;
        }
        _ => return Err(anyhow!("usage: sort [POLICY]")),
    }
    Ok(())
}

fn cmd_rm<S: KeyValueStore, C: Clock, W: Write>(
    session: &mut Session<S, C>,
    ctx: &CommandContext,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    let ids = resolve_tasks(session, args, "rm N...")?;
    if ctx.interactive {
        let count = ids.len();
        session.request_delete(ids);
        writeln!(out, "Delete {count} task(s)? Answer `yes` or `no`.")?;
        return Ok(());
    }

    let outcome = session.delete(&ids);
    report_confirm(out, outcome, false)
}

fn cmd_yes<S: KeyValueStore, C: Clock, W: Write>(
    session: &mut Session<S, C>,
    renderer: &Renderer,
    out: &mut W,
) -> anyhow::Result<()> {
    if !matches!(session.deletion_state(), DeletionState::Requested(_)) {
        writeln!(out, "No deletion is waiting for confirmation.")?;
        return Ok(());
    }
    let outcome = session.confirm_delete();
    report_confirm(out, outcome, true)?;
    renderer.print_undo_notice(out, &session.status())
}

fn report_confirm<W: Write>(
    out: &mut W,
    outcome: ConfirmOutcome,
    interactive: bool,
) -> anyhow::Result<()> {
    if outcome.flushed > 0 {
        writeln!(out, "Moved {} earlier task(s) to the recycle bin.", outcome.flushed)?;
    }
    if outcome.pending == 0 {
        writeln!(out, "Nothing to delete.")?;
    } else if !interactive {
        writeln!(out, "Moved {} task(s) to the recycle bin.", outcome.pending)?;
    }
    Ok(())
}

fn cmd_no<S: KeyValueStore, C: Clock, W: Write>(
    session: &mut Session<S, C>,
    out: &mut W,
) -> anyhow::Result<()> {
    match session.cancel_delete() {
        Some(ids) => writeln!(out, "Kept {} task(s).", ids.len())?,
        None => writeln!(out, "No deletion is waiting for confirmation.")?,
    }
    Ok(())
}

fn cmd_undo<S: KeyValueStore, C: Clock, W: Write>(
    session: &mut Session<S, C>,
    out: &mut W,
) -> anyhow::Result<()> {
    match session.undo() {
        0 => writeln!(out, "Nothing to undo.")?,
        restored => writeln!(out, "Restored {restored} task(s).")?,
    }
    Ok(())
}

fn cmd_dismiss<S: KeyValueStore, C: Clock, W: Write>(
    session: &mut Session<S, C>,
    out: &mut W,
) -> anyhow::Result<()> {
    match session.dismiss_undo() {
        0 => writeln!(out, "Nothing pending.")?,
        moved => writeln!(out, "Moved {moved} task(s) to the recycle bin.")?,
    }
    Ok(())
}

fn cmd_select<S: KeyValueStore, C: Clock, W: Write>(
    session: &mut Session<S, C>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    let [address] = args else {
        return Err(anyhow!("usage: select N"));
    };
    let id = resolve_task(session, address)?;
    session.enter_selection(id);
    writeln!(out, "Selected {} task(s).", session.selection().len())?;
    Ok(())
}

fn cmd_toggle<S: KeyValueStore, C: Clock, W: Write>(
    session: &mut Session<S, C>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    if !session.selection().is_active() {
        return Err(anyhow!("not selecting; start with `select N`"));
    }
    for id in resolve_tasks(session, args, "toggle N...")? {
        session.toggle_selection(id);
    }
    if session.selection().is_active() {
        writeln!(out, "Selected {} task(s).", session.selection().len())?;
    } else {
        writeln!(out, "Selection cleared.")?;
    }
    Ok(())
}

fn cmd_bulk<S: KeyValueStore, C: Clock, W: Write>(
    session: &mut Session<S, C>,
    ctx: &CommandContext,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    if !session.selection().is_active() {
        return Err(anyhow!("nothing selected; start with `select N`"));
    }
    match args.first().map(|a| a.to_ascii_lowercase()).as_deref() {
        Some("done") => {
            let changed = session.bulk_mark_complete();
            writeln!(out, "Completed {changed} task(s).")?;
        }
        Some("star") => {
            let changed = session.bulk_mark_important();
            writeln!(out, "Starred {changed} task(s).")?;
        }
        Some("rm") => {
            let count = session.selection().len();
            session.bulk_delete();
            if ctx.interactive {
                writeln!(out, "Delete {count} task(s)? Answer `yes` or `no`.")?;
            } else {
                let outcome = session.confirm_delete();
                report_confirm(out, outcome, false)?;
            }
        }
        _ => return Err(anyhow!("usage: bulk done|star|rm")),
    }
    Ok(())
}

fn cmd_bin<S: KeyValueStore, C: Clock, W: Write>(
    session: &Session<S, C>,
    renderer: &Renderer,
    out: &mut W,
) -> anyhow::Result<()> {
    let bin = session.bin();
    renderer.print_bin_table(out, &bin.list(), session.clock().now(), bin.retention())
}

fn cmd_restore<S: KeyValueStore, C: Clock, W: Write>(
    session: &mut Session<S, C>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    for id in resolve_bin_entries(session, args, "restore N...")? {
        match session.restore(id) {
            Some(restored) if restored != id => writeln!(
                out,
                "Restored task {} as {}.",
                short(id),
                short(restored)
            )?,
            Some(restored) => writeln!(out, "Restored task {}.", short(restored))?,
            None => {}
        }
    }
    Ok(())
}

fn cmd_purge<S: KeyValueStore, C: Clock, W: Write>(
    session: &mut Session<S, C>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    for id in resolve_bin_entries(session, args, "purge N...")? {
        if session.purge(id) {
            writeln!(out, "Permanently deleted task {}.", short(id))?;
        }
    }
    Ok(())
}

fn cmd_help<W: Write>(out: &mut W) -> anyhow::Result<()> {
    let lines = [
        ("add TEXT [due:EXPR]", "add a task; EXPR is a date, today, friday, +3d, ..."),
        ("voice TEXT", "add a task from dictated text"),
        ("list", "show tasks in the current sort order"),
        ("info N", "show one task"),
        ("done N...", "toggle completion"),
        ("star N...", "toggle importance"),
        ("notes N TEXT", "replace a task's notes"),
        ("move N M", "move task N to M's place (switches to manual order)"),
        ("sort [POLICY]", "show or set the sort order"),
        ("rm N...", "ask to delete tasks"),
        ("yes | no", "answer the delete question"),
        ("undo | dismiss", "bring back or let go of the last deletion"),
        ("select N", "start selecting with task N"),
        ("toggle N...", "add or remove tasks from the selection"),
        ("clear", "leave selection mode"),
        ("bulk done|star|rm", "act on the selection"),
        ("bin", "show the recycle bin"),
        ("restore N... | purge N...", "recover or drop bin entries"),
        ("empty", "empty the recycle bin"),
        ("status", "summary of the session"),
        ("quit", "exit"),
    ];
    for (usage, about) in lines {
        writeln!(out, "  {usage:<26} {about}")?;
    }
    Ok(())
}

fn resolve_tasks<S: KeyValueStore, C: Clock>(
    session: &Session<S, C>,
    args: &[String],
    usage: &str,
) -> anyhow::Result<Vec<TaskId>> {
    if args.is_empty() {
        return Err(anyhow!("usage: {usage}"));
    }
    args.iter().map(|arg| resolve_task(session, arg)).collect()
}

fn resolve_task<S: KeyValueStore, C: Clock>(
    session: &Session<S, C>,
    address: &str,
) -> anyhow::Result<TaskId> {
    let view: Vec<TaskId> = session.visible().iter().map(|t| t.id).collect();
    resolve_address(address, &view, "task")
}

fn resolve_bin_entries<S: KeyValueStore, C: Clock>(
    session: &Session<S, C>,
    args: &[String],
    usage: &str,
) -> anyhow::Result<Vec<TaskId>> {
    if args.is_empty() {
        return Err(anyhow!("usage: {usage}"));
    }
    let view: Vec<TaskId> = session.bin().list().iter().map(|e| e.id()).collect();
    args.iter()
        .map(|arg| resolve_address(arg, &view, "recycle bin entry"))
        .collect()
}

/// A 1-based position in `view`, or a unique prefix of an id in it.
pub fn resolve_address(address: &str, view: &[TaskId], what: &str) -> anyhow::Result<TaskId> {
    if let Ok(position) = address.parse::<usize>() {
        return position
            .checked_sub(1)
            .and_then(|idx| view.get(idx))
            .copied()
            .ok_or_else(|| anyhow!("no {what} at position {position}"));
    }

    let prefix: String = address
        .chars()
        .filter(|c| *c != '-')
        .collect::<String>()
        .to_ascii_lowercase();
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!("expected a position or id prefix, got: {address}"));
    }

    let mut matches = view
        .iter()
        .filter(|id| id.simple().to_string().starts_with(&prefix));
    let first = matches
        .next()
        .ok_or_else(|| anyhow!("no {what} matches {address}"))?;
    if matches.next().is_some() {
        return Err(anyhow!("id prefix {address} is ambiguous"));
    }
    Ok(*first)
}

fn short(id: TaskId) -> String {
    id.simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{expand_command_abbrev, known_command_names, resolve_address};

    #[test]
    fn abbreviations_resolve_only_when_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("pur", &known), Some("purge"));
        assert_eq!(expand_command_abbrev("no", &known), Some("no"));
        assert_eq!(expand_command_abbrev("to", &known), Some("toggle"));
        assert_eq!(expand_command_abbrev("d", &known), None);
    }

    #[test]
    fn addresses_by_position_and_prefix() {
        let a = Uuid::parse_str("aaaa1111-0000-4000-8000-000000000000").expect("uuid");
        let b = Uuid::parse_str("aaaa2222-0000-4000-8000-000000000000").expect("uuid");
        let view = vec![a, b];

        assert_eq!(resolve_address("2", &view, "task").expect("pos"), b);
        assert_eq!(resolve_address("AAAA1", &view, "task").expect("prefix"), a);
        assert!(resolve_address("0", &view, "task").is_err());
        assert!(resolve_address("3", &view, "task").is_err());
        assert!(resolve_address("aaaa", &view, "task").is_err());
        assert!(resolve_address("zz", &view, "task").is_err());
    }
}
