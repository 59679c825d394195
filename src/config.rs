//! Optional YAML settings file. Every key has a default, so an empty file (or
//! no file) yields a working configuration; command-line flags win over it.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::import::{DEFAULT_MAX_LOG_ERRORS, DEFAULT_RECLAIM_EVERY};
use crate::sources::SourceKind;

pub const DEFAULT_DATABASE: &str = "report-intake.db";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub database: PathBuf,
    pub max_log_errors: usize,
    pub reclaim_every: usize,
    pub busy_timeout_ms: u64,
    /// Destination table per source name, e.g. `remittance: rm_detail_report_2024`.
    pub tables: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            max_log_errors: DEFAULT_MAX_LOG_ERRORS,
            reclaim_every: DEFAULT_RECLAIM_EVERY,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            tables: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let settings: Option<Settings> =
            serde_yaml::from_reader(BufReader::new(file)).context("Parsing config YAML")?;
        let settings = settings.unwrap_or_default();
        settings.validate()?;
        Ok(settings)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.reclaim_every > 0, "reclaim_every must be at least 1");
        for source in self.tables.keys() {
            ensure!(
                SourceKind::from_str_name(source).is_some(),
                "tables: unknown source '{source}'"
            );
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn table_for(&self, source: SourceKind) -> Option<&str> {
        self.tables.get(source.as_str()).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_file_uses_defaults() {
        let file = write_config("");
        assert_eq!(Settings::load(file.path()).unwrap(), Settings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let file = write_config(
            "database: /tmp/intake.db\nmax_log_errors: 5\ntables:\n  remittance: rm_2024\n",
        );
        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.database, PathBuf::from("/tmp/intake.db"));
        assert_eq!(settings.max_log_errors, 5);
        assert_eq!(settings.reclaim_every, DEFAULT_RECLAIM_EVERY);
        assert_eq!(settings.table_for(SourceKind::Remittance), Some("rm_2024"));
        assert_eq!(settings.table_for(SourceKind::SaleInvoice), None);
    }

    #[test]
    fn rejects_unknown_keys_and_sources() {
        let typo = write_config("max_log_error: 5\n");
        assert!(Settings::load(typo.path()).is_err());
        let unknown = write_config("tables:\n  payroll: wages\n");
        let err = Settings::load(unknown.path()).unwrap_err();
        assert!(format!("{err:#}").contains("payroll"));
        let zero = write_config("reclaim_every: 0\n");
        assert!(Settings::load(zero.path()).is_err());
    }
}
