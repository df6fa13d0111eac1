use std::io::{BufRead, Write};

use tracing::{debug, info, warn};

use crate::cli::Invocation;
use crate::commands::{CommandContext, Flow, dispatch};
use crate::render::Renderer;
use crate::session::Session;
use crate::storage::KeyValueStore;
use crate::timer::Clock;

const PROMPT: &str = "cairn> ";

/// Reads commands line by line until `quit` or end of input. The undo
/// countdown is polled before every line, so an expired window is
/// finalized before the next command sees the collection.
#[tracing::instrument(skip_all)]
pub fn run_shell<S, C, R, W>(
    session: &mut Session<S, C>,
    renderer: &Renderer,
    ctx: &CommandContext,
    input: R,
    out: &mut W,
    show_prompt: bool,
) -> anyhow::Result<()>
where
    S: KeyValueStore,
    C: Clock,
    R: BufRead,
    W: Write,
{
    info!("shell started");
    let mut lines = input.lines();

    loop {
        if show_prompt {
            write!(out, "{PROMPT}")?;
            out.flush()?;
        }

        let Some(line) = lines.next() else {
            debug!("end of input");
            break;
        };
        let line = line?;

        if run_line(session, renderer, ctx, &line, out)? == Flow::Quit {
            break;
        }
    }

    info!("shell finished");
    Ok(())
}

/// Ticks the session, then runs one command line. Command errors are
/// reported on `out` and do not end the shell; only I/O failures on
/// `out` propagate.
pub fn run_line<S, C, W>(
    session: &mut Session<S, C>,
    renderer: &Renderer,
    ctx: &CommandContext,
    line: &str,
    out: &mut W,
) -> anyhow::Result<Flow>
where
    S: KeyValueStore,
    C: Clock,
    W: Write,
{
    let finalized = session.tick();
    if finalized > 0 {
        writeln!(out, "Moved {finalized} task(s) to the recycle bin.")?;
    }

    let inv = match Invocation::from_line(line) {
        Ok(Some(inv)) => inv,
        Ok(None) => return Ok(Flow::Continue),
        Err(err) => {
            writeln!(out, "error: {err:#}")?;
            return Ok(Flow::Continue);
        }
    };

    match dispatch(session, renderer, ctx, inv, out) {
        Ok(flow) => Ok(flow),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "command failed");
            writeln!(out, "error: {err:#}")?;
            Ok(Flow::Continue)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::{run_line, run_shell};
    use crate::commands::{CommandContext, Flow};
    use crate::render::Renderer;
    use crate::session::{Session, SessionSettings};
    use crate::storage::{DELETED_TASKS_KEY, MemoryStore, TASKS_KEY, save_list};
    use crate::task::{DeletedTask, Task};
    use crate::timer::ManualClock;

    fn session() -> (Session<MemoryStore, ManualClock>, ManualClock) {
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
                .single()
                .expect("valid now"),
        );
        let session = Session::open(MemoryStore::new(), clock.clone(), SessionSettings::default());
        (session, clock)
    }

    fn ctx() -> CommandContext {
        CommandContext {
            timezone: Some(chrono_tz::UTC),
            interactive: true,
        }
    }

    fn run(session: &mut Session<MemoryStore, ManualClock>, line: &str) -> String {
        let mut out = Vec::new();
        run_line(session, &Renderer::plain(), &ctx(), line, &mut out).expect("run line");
        String::from_utf8(out).expect("utf8")
    }

    fn texts(session: &Session<MemoryStore, ManualClock>) -> Vec<String> {
        session.visible().iter().map(|t| t.text.clone()).collect()
    }

    #[test]
    fn add_with_due_expression() {
        let (mut session, _) = session();
        let out = run(&mut session, "add pay rent due:tomorrow");
        assert!(out.starts_with("Added task "));

        let task = &session.tasks()[0];
        assert_eq!(task.text, "pay rent");
        assert_eq!(
            task.due_date,
            chrono::NaiveDate::from_ymd_opt(2026, 2, 18)
        );
    }

    #[test]
    fn errors_are_reported_and_the_shell_continues() {
        let (mut session, _) = session();
        assert_eq!(run(&mut session, "add   "), "error: task text cannot be empty\n");
        assert!(run(&mut session, "add x due:someday").starts_with("error: "));
        assert!(run(&mut session, "done 4").starts_with("error: no task at position 4"));
        assert!(session.tasks().is_empty());
    }

    #[test]
    fn delete_dialog_then_undo() {
        let (mut session, _) = session();
        run(&mut session, "add A");
        run(&mut session, "add B");

        assert_eq!(
            run(&mut session, "rm 1"),
            "Delete 1 task(s)? Answer `yes` or `no`.\n"
        );
        assert_eq!(session.tasks().len(), 2);

        let out = run(&mut session, "yes");
        assert!(out.contains("Deleted 1 task(s)."));
        assert_eq!(texts(&session), vec!["B".to_string()]);

        assert_eq!(run(&mut session, "undo"), "Restored 1 task(s).\n");
        assert_eq!(texts(&session), vec!["B".to_string(), "A".to_string()]);
    }

    #[test]
    fn declining_keeps_tasks() {
        let (mut session, _) = session();
        run(&mut session, "add A");
        run(&mut session, "rm 1");
        assert_eq!(run(&mut session, "no"), "Kept 1 task(s).\n");
        assert_eq!(
            run(&mut session, "yes"),
            "No deletion is waiting for confirmation.\n"
        );
        assert_eq!(session.tasks().len(), 1);
    }

    #[test]
    fn tick_before_each_line_finalizes_expired_batch() {
        let (mut session, clock) = session();
        run(&mut session, "add A");
        run(&mut session, "rm 1");
        run(&mut session, "yes");

        clock.advance(Duration::seconds(11));
        let out = run(&mut session, "bin");
        assert!(out.starts_with("Moved 1 task(s) to the recycle bin.\n"));
        assert!(out.contains(" A"));
        assert_eq!(run(&mut session, "undo"), "Nothing to undo.\n");

        let id = session.bin().list()[0].id();
        assert_eq!(
            run(&mut session, "restore 1"),
            format!("Restored task {}.\n", &id.simple().to_string()[..8])
        );
        assert_eq!(texts(&session), vec!["A".to_string()]);
        assert!(session.bin().is_empty());
    }

    #[test]
    fn move_switches_to_manual_order() {
        let (mut session, _) = session();
        for line in ["add A", "add B", "add C"] {
            run(&mut session, line);
        }
        let out = run(&mut session, "move 3 1");
        assert!(out.ends_with("Sort: Manual Order.\n"));
        assert_eq!(
            texts(&session),
            vec!["C".to_string(), "A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn selection_and_bulk_actions() {
        let (mut session, _) = session();
        for line in ["add A", "add B", "add C"] {
            run(&mut session, line);
        }

        assert!(run(&mut session, "toggle 1").starts_with("error: not selecting"));
        assert_eq!(run(&mut session, "select 1"), "Selected 1 task(s).\n");
        assert_eq!(run(&mut session, "toggle 2"), "Selected 2 task(s).\n");
        assert_eq!(run(&mut session, "bulk star"), "Starred 2 task(s).\n");
        assert!(!session.selection().is_active());

        run(&mut session, "select 3");
        run(&mut session, "bulk rm");
        run(&mut session, "yes");
        assert_eq!(session.tasks().len(), 2);
        assert!(!session.selection().is_active());
    }

    #[test]
    fn shell_stops_at_quit() {
        let (mut session, _) = session();
        let input = "add A\nquit\nadd B\n".as_bytes();
        let mut out = Vec::new();
        run_shell(&mut session, &Renderer::plain(), &ctx(), input, &mut out, false)
            .expect("shell");
        assert_eq!(texts(&session), vec!["A".to_string()]);
    }

    #[test]
    fn restore_reports_the_new_id_when_rekeyed() {
        let shared = uuid::Uuid::new_v4();
        let mut storage = MemoryStore::new();
        save_list(
            &mut storage,
            TASKS_KEY,
            &[Task::new(shared, "active".to_string(), None)],
        )
        .expect("seed tasks");
        save_list(
            &mut storage,
            DELETED_TASKS_KEY,
            &[DeletedTask::new(
                Task::new(shared, "binned".to_string(), None),
                Utc.with_ymd_and_hms(2026, 2, 16, 12, 0, 0)
                    .single()
                    .expect("valid date"),
            )],
        )
        .expect("seed bin");
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
                .single()
                .expect("valid now"),
        );
        let mut session = Session::open(storage, clock, SessionSettings::default());

        let out = run(&mut session, "restore 1");
        let new_id = session
            .tasks()
            .iter()
            .find(|t| t.text == "binned")
            .map(|t| t.id)
            .expect("restored task");
        assert_ne!(new_id, shared);
        assert_eq!(
            out,
            format!(
                "Restored task {} as {}.\n",
                &shared.simple().to_string()[..8],
                &new_id.simple().to_string()[..8]
            )
        );
    }

    #[test]
    fn one_shot_rm_confirms_immediately() {
        let (mut session, _) = session();
        run(&mut session, "add A");
        let one_shot = CommandContext {
            interactive: false,
            ..ctx()
        };
        let mut out = Vec::new();
        let flow = run_line(&mut session, &Renderer::plain(), &one_shot, "rm 1", &mut out)
            .expect("run line");
        assert_eq!(flow, Flow::Continue);
        assert!(session.tasks().is_empty());
        assert_eq!(session.shutdown(), 1);
        assert_eq!(session.bin().len(), 1);
    }
}
