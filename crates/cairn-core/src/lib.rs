pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod error;
pub mod ordering;
pub mod pipeline;
pub mod recycle_bin;
pub mod render;
pub mod selection;
pub mod session;
pub mod shell;
pub mod storage;
pub mod store;
pub mod task;
pub mod timer;
pub mod transcript;

use std::ffi::OsString;
use std::io::{
  self,
  IsTerminal
};

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::commands::{
  CommandContext,
  dispatch
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting cairn"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let storage =
    storage::FileStore::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open data \
           directory {}",
          data_dir.display()
        )
      })?;

  let settings = cfg
    .session_settings()
    .context("invalid configuration")?;
  let renderer =
    render::Renderer::new(&cfg)?;
  let timezone =
    datetime::resolve_timezone(
      cfg.get("time.timezone").as_deref()
    );

  let mut session =
    session::Session::open(
      storage,
      timer::SystemClock,
      settings
    );

  let invocation =
    cli::Invocation::from_os_args(
      cli.rest
    )?;
  let mut out = io::stdout().lock();

  let result = match invocation {
    | Some(inv) => {
      let ctx = CommandContext {
        timezone,
        interactive: false
      };
      dispatch(
        &mut session,
        &renderer,
        &ctx,
        inv,
        &mut out
      )
      .map(|_| ())
    }
    | None => {
      let ctx = CommandContext {
        timezone,
        interactive: true
      };
      let stdin = io::stdin();
      let show_prompt =
        stdin.is_terminal();
      shell::run_shell(
        &mut session,
        &renderer,
        &ctx,
        stdin.lock(),
        &mut out,
        show_prompt
      )
    }
  };

  session.shutdown();
  result?;

  info!("done");
  Ok(())
}
