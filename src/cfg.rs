use anyhow::{Context, Result};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use crate::args::Args;

pub const ENV_PREFIX: &str = "DRIVE_LINKS";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Cfg {
    pub database: DatabaseConfig,
    pub workbook: WorkbookConfig,
    pub audio: AudioConfig,
    pub browser: BrowserConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub log: LogConfig,

    #[serde(default)]
    pub relocate: bool,
    #[serde(default)]
    pub dry_run: bool,

    /// What happened while loading, kept until logging is up.
    #[serde(skip)]
    pub notes: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub name: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Full record table: `Nro. Identificação`, `id_aeroportos`, `Data_Inicio`
    pub records_query: String,
    /// Airport lookup returning `ICAO`; the airport id is bound to `?` or appended
    pub airport_query: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkbookConfig {
    pub path: String,
    pub sheet_name: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AudioConfig {
    pub source_dir: String,
    pub destination_dir: String,
    #[serde(default = "default_locale")]
    pub locale: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BrowserConfig {
    pub profile_directory: String,
    pub user_data_dir: String,
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "default_search_url")]
    pub search_url: String,
    #[serde(default = "default_result_label_template")]
    pub result_label_template: String,
    #[serde(default = "default_copy_link_label")]
    pub copy_link_label: String,
    #[serde(default)]
    pub headless: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    pub delay_secs: u64,
    pub result_timeout_secs: u64,
    pub copy_timeout_secs: u64,
    pub clipboard_pause_secs: u64,
    /// 0 disables the abort
    pub error_budget: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogConfig {
    pub file: String,
    #[serde(default = "default_file_level")]
    pub file_level: String,
}

fn default_port() -> u16 {
    3306
}

fn default_id_column() -> String {
    "ID".to_string()
}

fn default_locale() -> String {
    "pt_BR".to_string()
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_search_url() -> String {
    "https://drive.google.com/drive/search?q=".to_string()
}

fn default_result_label_template() -> String {
    "{name} Áudio Mais informações (Alt + →)".to_string()
}

fn default_copy_link_label() -> String {
    "Copiar link".to_string()
}

fn default_file_level() -> String {
    "warn".to_string()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_secs: 5,
            result_timeout_secs: 10,
            copy_timeout_secs: 30,
            clipboard_pause_secs: 5,
            error_budget: 50,
        }
    }
}

impl Cfg {
    /// Nothing is logged here: the subscriber needs `log` from this config. See `notes`.
    pub fn load(args: &Args) -> Result<Self> {
        let env_note = if std::path::Path::new(&args.env_file).exists() {
            dotenvy::from_path_override(&args.env_file)
                .with_context(|| format!("Failed to read env file {}", args.env_file))?;
            format!("Loaded environment from {}", args.env_file)
        } else {
            "Env file not found, using process environment only".to_string()
        };

        let builder = Config::builder()
            .add_source(File::with_name(&args.config).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut cfg = Self::from_builder(builder)?;
        cfg.notes.push(format!("Configuration read from {}", args.config));
        cfg.notes.push(env_note);
        cfg.apply_overrides(args);
        Ok(cfg)
    }

    pub fn apply_overrides(&mut self, args: &Args) {
        // Override with command line arguments if provided
        if let Some(source_dir) = &args.source_dir {
            self.notes.push("Overriding source_dir from command line".to_string());
            self.audio.source_dir = source_dir.clone();
        }
        if let Some(destination_dir) = &args.destination_dir {
            self.notes.push("Overriding destination_dir from command line".to_string());
            self.audio.destination_dir = destination_dir.clone();
        }
        if let Some(workbook) = &args.workbook {
            self.notes.push("Overriding workbook path from command line".to_string());
            self.workbook.path = workbook.clone();
        }

        self.relocate = !args.no_relocate;
        self.dry_run = args.dry_run;
    }

    /// Serialized config for the debug log; the password is skipped by `Serialize`.
    pub fn redacted(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize::<Cfg>()
            .context("Missing or invalid configuration value")
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("database.host", &self.database.host),
            ("database.name", &self.database.name),
            ("database.user", &self.database.user),
            ("database.records_query", &self.database.records_query),
            ("database.airport_query", &self.database.airport_query),
            ("workbook.path", &self.workbook.path),
            ("workbook.sheet_name", &self.workbook.sheet_name),
            ("workbook.id_column", &self.workbook.id_column),
            ("audio.source_dir", &self.audio.source_dir),
            ("audio.destination_dir", &self.audio.destination_dir),
            ("browser.profile_directory", &self.browser.profile_directory),
            ("browser.user_data_dir", &self.browser.user_data_dir),
            ("browser.webdriver_url", &self.browser.webdriver_url),
            ("browser.search_url", &self.browser.search_url),
            ("browser.copy_link_label", &self.browser.copy_link_label),
            ("log.file", &self.log.file),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", key);
            }
        }

        if !self.browser.result_label_template.contains("{name}") {
            anyhow::bail!("browser.result_label_template must contain {{name}}");
        }

        if self.retry.attempts == 0 {
            anyhow::bail!("retry.attempts must be >= 1");
        }

        if chrono::Locale::try_from(self.audio.locale.as_str()).is_err() {
            anyhow::bail!("audio.locale '{}' is not a known locale", self.audio.locale);
        }

        Ok(())
    }

    pub fn month_locale(&self) -> chrono::Locale {
        chrono::Locale::try_from(self.audio.locale.as_str()).unwrap_or(chrono::Locale::pt_BR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use config::FileFormat;

    const MINIMAL: &str = r#"
        [database]
        host = "db.local"
        name = "coleta"
        user = "reader"
        password = "secret"
        records_query = "SELECT * FROM coletas"
        airport_query = "SELECT ICAO FROM aeroportos WHERE id = "

        [workbook]
        path = "tracking.xlsx"
        sheet_name = "Consultas"

        [audio]
        source_dir = "/audio/in"
        destination_dir = "/audio/out"

        [browser]
        profile_directory = "Profile 1"
        user_data_dir = "/home/op/.config/chrome"

        [log]
        file = "drive_links.log"
    "#;

    fn from_toml(toml: &str) -> Result<Cfg> {
        Cfg::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let cfg = from_toml(MINIMAL).unwrap();
        assert_eq!(cfg.database.port, 3306);
        assert_eq!(cfg.workbook.id_column, "ID");
        assert_eq!(cfg.retry.attempts, 3);
        assert_eq!(cfg.retry.error_budget, 50);
        assert_eq!(cfg.log.file_level, "warn");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_required_section_fails() {
        let without_log = MINIMAL.replace("[log]\n        file = \"drive_links.log\"", "");
        assert!(from_toml(&without_log).is_err());
    }

    #[test]
    fn validate_rejects_empty_and_bad_values() {
        let mut cfg = from_toml(MINIMAL).unwrap();
        cfg.workbook.sheet_name = " ".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = from_toml(MINIMAL).unwrap();
        cfg.retry.attempts = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = from_toml(MINIMAL).unwrap();
        cfg.browser.result_label_template = "Mais informações".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overrides_are_noted_for_logging_later() {
        let mut cfg = from_toml(MINIMAL).unwrap();
        let args = Args::parse_from(["drive_links", "--source-dir", "/mnt/lote7", "--no-relocate"]);
        cfg.apply_overrides(&args);

        assert_eq!(cfg.audio.source_dir, "/mnt/lote7");
        assert_eq!(cfg.audio.destination_dir, "/audio/out");
        assert!(!cfg.relocate);
        assert_eq!(cfg.notes, vec!["Overriding source_dir from command line"]);
        assert!(!cfg.redacted().contains("secret"));
    }
}
