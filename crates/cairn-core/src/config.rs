use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::Duration;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::ordering::SortPolicy;
use crate::pipeline::DEFAULT_UNDO_SECONDS;
use crate::recycle_bin::DEFAULT_RETENTION_DAYS;
use crate::session::SessionSettings;

pub const CONFIG_ENV_VAR: &str =
  "CAIRN_CONFIG";
const CONFIG_FILE_NAME: &str =
  "cairn.toml";
const MAX_UNDO_SECONDS: i64 = 86_400;
const MAX_RETENTION_DAYS: i64 = 36_500;

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "data.location".to_string(),
      "~/.cairn".to_string()
    );
    map.insert(
      "sort.default".to_string(),
      SortPolicy::default()
        .wire_name()
        .to_string()
    );
    map.insert(
      "undo.seconds".to_string(),
      DEFAULT_UNDO_SECONDS.to_string()
    );
    map.insert(
      "bin.retention_days".to_string(),
      DEFAULT_RETENTION_DAYS.to_string()
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    config_override
  ))]
  pub fn load(
    config_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let path = resolve_config_path(
      config_override
    )?;
    if let Some(path) = path {
      info!(config = %path.display(), "loading config");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no config file found; using \
         defaults"
      );
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
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn get_i64(
    &self,
    key: &str
  ) -> anyhow::Result<Option<i64>> {
    self
      .map
      .get(key)
      .map(|v| {
        v.trim().parse::<i64>().with_context(
          || {
            format!(
              "config key {key} must \
               be an integer, got {v}"
            )
          }
        )
      })
      .transpose()
  }

  /// Session tuning read from
  /// `sort.default`, `undo.seconds`,
  /// and `bin.retention_days`.
  pub fn session_settings(
    &self
  ) -> anyhow::Result<SessionSettings>
  {
    let initial_policy = match self
      .get("sort.default")
    {
      | Some(raw) => raw.parse()?,
      | None => SortPolicy::default()
    };

    let undo_seconds = self
      .get_i64("undo.seconds")?
      .unwrap_or(DEFAULT_UNDO_SECONDS);
    if !(1..=MAX_UNDO_SECONDS)
      .contains(&undo_seconds)
    {
      return Err(anyhow!(
        "undo.seconds must be between \
         1 and {MAX_UNDO_SECONDS}, got \
         {undo_seconds}"
      ));
    }

    let retention_days = self
      .get_i64("bin.retention_days")?
      .unwrap_or(DEFAULT_RETENTION_DAYS);
    if !(1..=MAX_RETENTION_DAYS)
      .contains(&retention_days)
    {
      return Err(anyhow!(
        "bin.retention_days must be \
         between 1 and \
         {MAX_RETENTION_DAYS}, got \
         {retention_days}"
      ));
    }

    Ok(SessionSettings {
      undo_window: Duration::seconds(
        undo_seconds
      ),
      retention: Duration::days(
        retention_days
      ),
      initial_policy
    })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self.load_str(&text).with_context(
      || {
        format!(
          "invalid config file {}",
          path.display()
        )
      }
    )?;
    self.loaded_files.push(path);
    Ok(())
  }

  /// Merges a TOML document, flattening
  /// nested tables into dotted keys.
  pub fn load_str(
    &mut self,
    text: &str
  ) -> anyhow::Result<()> {
    let table =
      toml::from_str::<toml::Table>(text)
        .context("failed to parse toml")?;
    flatten_into(
      &mut self.map,
      "",
      &table
    );
    Ok(())
  }
}

fn flatten_into(
  map: &mut HashMap<String, String>,
  prefix: &str,
  table: &toml::Table
) {
  for (k, v) in table {
    let key = if prefix.is_empty() {
      k.clone()
    } else {
      format!("{prefix}.{k}")
    };

    match v {
      | toml::Value::Table(inner) => {
        flatten_into(map, &key, inner);
      }
      | toml::Value::String(s) => {
        trace!(key = %key, value = %s, "loaded config key");
        map.insert(key, s.clone());
      }
      | other => {
        let value = other.to_string();
        trace!(key = %key, value = %value, "loaded config key");
        map.insert(key, value);
      }
    }
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_config_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(config_env) =
    std::env::var(CONFIG_ENV_VAR)
  {
    if config_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      config_env
    )));
  }

  let Some(config_dir) =
    dirs::config_dir()
  else {
    warn!(
      "cannot determine config \
       directory"
    );
    return Ok(None);
  };
  let candidate = config_dir
    .join("cairn")
    .join(CONFIG_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
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
  Ok(home.join(".cairn"))
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
  use chrono::Duration;
  use tempfile::tempdir;

  use super::Config;
  use crate::ordering::SortPolicy;

  #[test]
  fn defaults_match_session_defaults() {
    let cfg = Config::default();
    let settings = cfg
      .session_settings()
      .expect("settings");
    assert_eq!(
      settings.undo_window,
      Duration::seconds(10)
    );
    assert_eq!(
      settings.retention,
      Duration::days(30)
    );
    assert_eq!(
      settings.initial_policy,
      SortPolicy::Smart
    );
    assert_eq!(
      cfg.get_bool("color"),
      Some(true)
    );
  }

  #[test]
  fn toml_tables_flatten_to_dotted_keys()
  {
    let mut cfg = Config::default();
    cfg
      .load_str(
        "color = false\n\n[sort]\n\
         default = \"dueDate\"\n\n\
         [undo]\nseconds = 5\n"
      )
      .expect("load");

    assert_eq!(
      cfg.get("sort.default").as_deref(),
      Some("dueDate")
    );
    assert_eq!(
      cfg.get_bool("color"),
      Some(false)
    );
    let settings = cfg
      .session_settings()
      .expect("settings");
    assert_eq!(
      settings.undo_window,
      Duration::seconds(5)
    );
    assert_eq!(
      settings.initial_policy,
      SortPolicy::DueDate
    );
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![(
      "rc.bin.retention_days".to_string(),
      "7".to_string()
    )]);
    let settings = cfg
      .session_settings()
      .expect("settings");
    assert_eq!(
      settings.retention,
      Duration::days(7)
    );
  }

  #[test]
  fn rejects_bad_values() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![(
      "undo.seconds".to_string(),
      "soon".to_string()
    )]);
    assert!(
      cfg.session_settings().is_err()
    );

    for (key, value) in [
      ("undo.seconds", "0"),
      ("undo.seconds", "1000000000000000"),
      ("bin.retention_days", "-3"),
      ("bin.retention_days", "100000000")
    ] {
      let mut cfg = Config::default();
      cfg.apply_overrides(vec![(
        key.to_string(),
        value.to_string()
      )]);
      assert!(
        cfg.session_settings().is_err(),
        "{key}={value} accepted"
      );
    }

    let mut cfg = Config::default();
    cfg.apply_overrides(vec![(
      "sort.default".to_string(),
      "random".to_string()
    )]);
    assert!(
      cfg.session_settings().is_err()
    );
  }

  #[test]
  fn loads_explicit_file() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("cairn.toml");
    std::fs::write(
      &path,
      "[data]\nlocation = \"/tmp/cairn-data\"\n"
    )
    .expect("write config");

    let cfg = Config::load(Some(path.as_path()))
      .expect("load config");
    assert_eq!(
      cfg.get("data.location").as_deref(),
      Some("/tmp/cairn-data")
    );
    assert_eq!(cfg.loaded_files, vec![path]);
  }
}
