//! Minimal CLI parsing for command selection and overrides.

use std::env;
use std::path::PathBuf;

/// What the invocation asks for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Command {
    /// Reconcile and write the missing report (the default)
    #[default]
    Report,
    /// Rename local files to canonical catalog titles
    Rename,
    /// Submit magnets from the missing report to a download client
    Download,
    /// Rebuild the episode index from a full catalog walk
    RefreshIndex,
    /// Export the checksum cache to CSV
    ExportCache,
}

#[derive(Debug, Default)]
pub struct CliOptions {
    pub command: Command,
    pub url: Option<String>,
    pub folder: Option<PathBuf>,
    pub client: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub download_folder: Option<String>,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub force_refresh: bool,
}

impl CliOptions {
    pub fn from_args() -> Self {
        Self::parse(env::args().skip(1))
    }

    fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut options = CliOptions::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
                None => (arg, None),
            };
            let value = |args: &mut dyn Iterator<Item = String>| {
                inline.clone().or_else(|| args.next())
            };
            match flag.as_str() {
                "--rename" => options.command = Command::Rename,
                "--download" => options.command = Command::Download,
                "--episodes-update" => options.command = Command::RefreshIndex,
                "--db" => options.command = Command::ExportCache,
                "--force-refresh" => options.force_refresh = true,
                "--url" => options.url = value(&mut args),
                "--folder" => options.folder = value(&mut args).map(PathBuf::from),
                "--client" => options.client = value(&mut args),
                "--host" => options.host = value(&mut args),
                "--port" => options.port = value(&mut args).and_then(|v| v.parse().ok()),
                "--username" => options.username = value(&mut args),
                "--password" => options.password = value(&mut args),
                "--download-folder" => options.download_folder = value(&mut args),
                "--tag" => {
                    if let Some(tag) = value(&mut args) {
                        options.tags.push(tag);
                    }
                }
                "--category" => options.category = value(&mut args),
                _ => {}
            }
        }
        options
    }
}
