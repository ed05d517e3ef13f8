use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;

/// Scroll and live-tail the logs of one source.
#[derive(Parser, Debug, Clone)]
#[command(name = "tide", version, about)]
pub struct Args {
    /// Source to view
    pub source_id: String,

    /// History service base url (overrides config and TIDE_SERVER)
    #[arg(short, long)]
    pub server: Option<String>,

    /// Only show these instances; may be repeated
    #[arg(short, long = "instance", value_name = "ID")]
    pub instances: Vec<String>,

    /// Initial search term
    #[arg(long)]
    pub search: Option<String>,

    /// Colour theme (default, nord, solarized)
    #[arg(long)]
    pub theme: Option<String>,

    /// Config file to use instead of the default location
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Fold command line overrides into a loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(server) = &self.server {
            config.server = server.clone();
        }
        if let Some(theme) = &self.theme {
            config.theme = theme.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command_line() {
        let args = Args::try_parse_from([
            "tide", "billing", "-i", "api-1", "--instance", "api-2", "--search", "timeout",
            "--server", "http://logs:8080", "-vv",
        ])
        .unwrap();
        assert_eq!(args.source_id, "billing");
        assert_eq!(args.instances, vec!["api-1", "api-2"]);
        assert_eq!(args.search.as_deref(), Some("timeout"));
        assert_eq!(args.verbose, 2);

        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.server, "http://logs:8080");
        assert_eq!(config.theme, "default");
    }

    #[test]
    fn test_source_is_required() {
        assert!(Args::try_parse_from(["tide"]).is_err());
    }
}
