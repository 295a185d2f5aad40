use std::collections::BTreeMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::state::FilterKey;

const DEFAULTS: [(&str, &str); 3] = [
  ("data.location", "~/.taskflow"),
  ("color", "on"),
  ("default.filter", "all")
];

/// Flat `key=value` settings read from
/// a taskflowrc file and `--rc`
/// overrides.
#[derive(Debug, Clone)]
pub struct Config {
  map: BTreeMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      map:          DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match resolve_rc_path(rc_override)?
    {
      | Some(path) => {
        info!(rc = %path.display(), "loading taskflowrc");
        cfg.load_file(&path)?;
      }
      | None => {
        debug!(
          "no taskflowrc; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<&str> {
    self
      .map
      .get(key)
      .map(String::as_str)
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self.get(key).map(parse_bool)
  }

  pub fn color_enabled(&self) -> bool {
    self
      .get_bool("color")
      .unwrap_or(true)
  }

  /// Filter `list` uses when none is
  /// given. Unknown values read as
  /// `all`.
  pub fn default_filter(
    &self
  ) -> FilterKey {
    let raw = self
      .get("default.filter")
      .unwrap_or("all");
    FilterKey::parse(raw)
      .unwrap_or_else(|err| {
        warn!(error = %err, "ignoring default.filter");
        FilterKey::All
      })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    if self.loaded_files.contains(&path)
    {
      warn!(file = %path.display(), "include cycle; skipping");
      return Ok(());
    }

    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = raw_line
        .split_once('#')
        .map_or(raw_line, |(before, _)| {
          before
        })
        .trim();
      if line.is_empty() {
        continue;
      }

      if let Some(include) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include.trim()
          )?;
        debug!(
          file = %path.display(),
          include = %include_path.display(),
          line = line_num + 1,
          "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

/// Directory for the file storage:
/// `--data` first, then
/// `data.location`.
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  if let Some(path) = override_dir {
    return Ok(path.to_path_buf());
  }

  match cfg.get("data.location") {
    | Some(value)
      if !value.trim().is_empty() =>
    {
      Ok(expand_tilde(Path::new(
        value.trim()
      )))
    }
    | _ => default_data_dir()
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var("TASKFLOWRC")
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    debug!(
      "no home directory; skipping \
       ~/.taskflowrc"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".taskflowrc");
  Ok(
    candidate
      .exists()
      .then_some(candidate)
  )
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".taskflow"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;

  #[test]
  fn defaults_without_rc_file() {
    let cfg = Config::default();
    assert!(cfg.color_enabled());
    assert_eq!(
      cfg.default_filter(),
      FilterKey::All
    );
    assert_eq!(
      cfg.get("data.location"),
      Some("~/.taskflow")
    );
  }

  #[test]
  fn rc_file_with_include_and_overrides()
  {
    let temp = tempfile::tempdir()
      .expect("tempdir");
    let extra =
      temp.path().join("extra.rc");
    fs::write(
      &extra,
      "default.filter = overdue\n"
    )
    .expect("write include");

    let rc =
      temp.path().join("taskflowrc");
    fs::write(
      &rc,
      "# personal setup\ncolor=off  \
       # no ansi\ninclude extra.rc\n\
       include missing.rc\n"
    )
    .expect("write rc");

    let mut cfg = Config::load(Some(
      rc.as_path()
    ))
    .expect("load rc");
    assert!(!cfg.color_enabled());
    assert_eq!(
      cfg.default_filter(),
      FilterKey::Overdue
    );
    assert_eq!(
      cfg.loaded_files.len(),
      2
    );

    cfg.apply_overrides([(
      "rc.default.filter".to_string(),
      "bogus".to_string()
    )]);
    assert_eq!(
      cfg.default_filter(),
      FilterKey::All
    );
  }

  #[test]
  fn malformed_line_is_an_error() {
    let temp = tempfile::tempdir()
      .expect("tempdir");
    let rc =
      temp.path().join("taskflowrc");
    fs::write(&rc, "color on\n")
      .expect("write rc");

    let err = Config::load(Some(
      rc.as_path()
    ))
    .expect_err("no equals sign");
    assert!(
      err
        .to_string()
        .contains("invalid config line")
    );
  }

  #[test]
  fn data_dir_prefers_cli_override() {
    let cfg = Config::default();
    let dir = resolve_data_dir(
      &cfg,
      Some(Path::new("/tmp/tf-data"))
    )
    .expect("resolve");
    assert_eq!(
      dir,
      PathBuf::from("/tmp/tf-data")
    );
  }
}
