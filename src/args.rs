use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "drive_links")]
#[command(about = "Organize field audio recordings and record their Drive share links in the tracking workbook")]
#[command(version)]
pub struct Args {
    /// Directory walked for audio files named "<id> <free text>"
    #[arg(long, value_name = "DIR")]
    pub source_dir: Option<String>,

    /// Root of the <airport>/<year>/<month> tree
    #[arg(long, value_name = "DIR")]
    pub destination_dir: Option<String>,

    /// Path to the tracking workbook (.xlsx or .csv)
    #[arg(long, value_name = "PATH")]
    pub workbook: Option<String>,

    /// Only retrieve links, never copy files
    #[arg(long)]
    pub no_relocate: bool,

    /// Resolve and print what would happen without touching files, browser or workbook
    #[arg(long)]
    pub dry_run: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Path to config file
    #[arg(long, default_value = "config/drive_links.toml")]
    pub config: String,

    /// Dotenv file loaded before reading the environment
    #[arg(long, default_value = ".env")]
    pub env_file: String,
}
