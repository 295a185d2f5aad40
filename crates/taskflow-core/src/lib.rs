pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod drag;
pub mod error;
pub mod persistence;
pub mod reducer;
pub mod render;
pub mod state;
pub mod store;
pub mod task;
pub mod transfer;
pub mod views;

use std::ffi::OsString;
use std::io::{
  self,
  Write
};

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use error::StoreError;
pub use persistence::{
  FileStorage,
  MemoryStorage,
  PersistenceBridge,
  StateStorage
};
pub use state::{
  FilterKey,
  Settings,
  StoreState,
  Theme
};
pub use store::{
  Clock,
  ManualClock,
  SystemClock,
  TaskStore
};
pub use task::{
  Task,
  TaskId
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
    "starting taskflow CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.taskflowrc.as_deref()
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
    FileStorage::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open storage at \
           {}",
          data_dir.display()
        )
      })?;

  let mut store = TaskStore::open(
    PersistenceBridge::new(Box::new(
      storage
    )),
    Box::new(SystemClock)
  );

  let renderer =
    render::Renderer::new(&cfg);
  let stdout = io::stdout();
  let mut out = stdout.lock();

  commands::dispatch(
    &mut store,
    &cfg,
    &renderer,
    &mut out,
    cli.command.unwrap_or_default()
  )?;
  out.flush()?;

  if let Some(err) =
    store.last_persist_error()
  {
    eprintln!(
      "warning: changes were not \
       saved: {err}"
    );
  }

  info!("done");
  Ok(())
}
