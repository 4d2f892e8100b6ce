//! Command-line interface definition and selection helpers.

use clap::{Args, Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

use crate::ai::Provider;
use crate::config::Overrides;
use crate::export::ExportMode;
use crate::slack::{SlackChannel, UserDirectory};

/// Export Slack channel history to Markdown and summarize it with an LLM.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/slack-extract/config.toml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Export root directory (overrides EXPORT_ROOT and the config file).
    #[arg(long, global = true, value_name = "DIR")]
    pub export_root: Option<PathBuf>,

    /// Log debug detail to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List channels visible to the token.
    Channels(ChannelsArgs),
    /// Export channel history to Markdown.
    Sync(SyncArgs),
    /// Summarize existing exports with an LLM.
    Analyze(AnalyzeArgs),
    /// Manage the cached channel list and user directory.
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Args, Debug, Default)]
pub struct ChannelsArgs {
    /// Ignore the cache and fetch from Slack.
    #[arg(long)]
    pub refresh: bool,

    #[command(flatten)]
    pub filter: ChannelFilter,
}

/// Which kinds of channel to show. No flag means everything but archived channels.
#[derive(Args, Debug, Default, Clone, Copy)]
pub struct ChannelFilter {
    /// Public channels.
    #[arg(long)]
    pub public: bool,
    /// Private channels.
    #[arg(long)]
    pub private: bool,
    /// Include archived channels.
    #[arg(long)]
    pub archived: bool,
    /// Direct and group messages.
    #[arg(long)]
    pub dms: bool,
}

impl ChannelFilter {
    pub fn matches(&self, channel: &SlackChannel) -> bool {
        if channel.is_archived && !self.archived {
            return false;
        }
        let any_kind = self.public || self.private || self.dms;
        if !any_kind {
            return true;
        }
        if channel.is_dm() {
            self.dms
        } else if channel.is_private {
            self.private
        } else {
            self.public
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Channel name or ID; repeat for several. Prompts when omitted.
    #[arg(short, long = "channel", value_name = "NAME_OR_ID")]
    pub channels: Vec<String>,

    /// What to do with channels that were exported before.
    #[arg(long, value_enum)]
    pub mode: Option<ExportMode>,

    /// Subfolder of the export root to write into.
    #[arg(long, value_name = "SUB")]
    pub folder: Option<String>,

    /// Download attached files next to the export.
    #[arg(long)]
    pub attachments: bool,

    /// Ignore the cache and fetch channels and users from Slack.
    #[arg(long)]
    pub refresh: bool,
}

#[derive(Args, Debug, Default)]
pub struct AnalyzeArgs {
    /// Export files or directories of exports.
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    #[arg(long, value_enum)]
    pub provider: Option<Provider>,

    #[arg(long)]
    pub model: Option<String>,

    /// Language of the written summary.
    #[arg(long)]
    pub language: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Drop the cached channel list and user directory.
    Invalidate,
}

impl Cli {
    /// Config values set by flags on this invocation.
    pub fn overrides(&self) -> Overrides {
        let mut overrides = Overrides {
            export_root: self.export_root.clone(),
            ..Default::default()
        };
        match &self.command {
            Command::Sync(args) => {
                overrides.mode = args.mode;
                overrides.download_attachments = args.attachments.then_some(true);
            }
            Command::Analyze(args) => {
                overrides.provider = args.provider;
                overrides.model = args.model.clone();
                overrides.language = args.language.clone();
            }
            Command::Channels(_) | Command::Cache(_) => {}
        }
        overrides
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Invalid selection: {0}")]
    Invalid(String),
    #[error("Selection {value} is out of range (1-{max})")]
    OutOfRange { value: usize, max: usize },
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),
}

/// Parse a 1-based selection such as `1,3-5` into sorted 0-based indices.
pub fn parse_selection(input: &str, max: usize) -> Result<Vec<usize>, SelectionError> {
    let mut picked = BTreeSet::new();

    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some((a, b)) => (parse_index(a)?, parse_index(b)?),
            None => {
                let n = parse_index(part)?;
                (n, n)
            }
        };
        if start > end {
            return Err(SelectionError::Invalid(part.to_string()));
        }
        for value in [start, end] {
            if value == 0 || value > max {
                return Err(SelectionError::OutOfRange { value, max });
            }
        }
        picked.extend((start..=end).map(|n| n - 1));
    }

    if picked.is_empty() {
        return Err(SelectionError::Invalid(input.trim().to_string()));
    }
    Ok(picked.into_iter().collect())
}

fn parse_index(s: &str) -> Result<usize, SelectionError> {
    s.trim()
        .parse()
        .map_err(|_| SelectionError::Invalid(s.trim().to_string()))
}

/// Resolve `--channel` values against the channel list, by ID or by name
/// (a leading `#` is ignored). Output keeps the list order, without duplicates.
pub fn select_channels(channels: &[SlackChannel], wanted: &[String]) -> Result<Vec<SlackChannel>, SelectionError> {
    let mut picked = BTreeSet::new();
    for want in wanted {
        let want = want.trim().trim_start_matches('#');
        let position = channels
            .iter()
            .position(|c| c.id == want || c.display_name() == want)
            .ok_or_else(|| SelectionError::UnknownChannel(want.to_string()))?;
        picked.insert(position);
    }
    Ok(picked.into_iter().map(|i| channels[i].clone()).collect())
}

/// Give direct messages a readable name (`dm-<person>`) so their exports
/// are not named after an opaque ID. The list stays sorted by name.
pub fn label_direct_messages(channels: &mut [SlackChannel], users: &UserDirectory) {
    let mut renamed = false;
    for channel in channels.iter_mut().filter(|c| c.is_im && c.name.is_empty()) {
        if let Some(name) = channel.user.as_deref().and_then(|id| users.get(id)) {
            channel.name = format!("dm-{}", name);
            renamed = true;
        }
    }
    if renamed {
        channels.sort_by(|a, b| a.display_name().cmp(b.display_name()));
    }
}

pub fn channel_kind_label(channel: &SlackChannel) -> &'static str {
    if channel.is_im {
        "dm"
    } else if channel.is_mpim {
        "group"
    } else if channel.is_private {
        "private"
    } else {
        "public"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chan(id: &str, name: &str) -> SlackChannel {
        SlackChannel {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("1,3-5", 6).unwrap(), vec![0, 2, 3, 4]);
        assert_eq!(parse_selection(" 2 , 2, 1-2 ", 3).unwrap(), vec![0, 1]);
        assert_eq!(parse_selection("4,", 4).unwrap(), vec![3]);
    }

    #[test]
    fn test_parse_selection_errors() {
        assert_eq!(
            parse_selection("7", 6),
            Err(SelectionError::OutOfRange { value: 7, max: 6 })
        );
        assert_eq!(
            parse_selection("0", 6),
            Err(SelectionError::OutOfRange { value: 0, max: 6 })
        );
        assert!(matches!(parse_selection("5-3", 6), Err(SelectionError::Invalid(_))));
        assert!(matches!(parse_selection("abc", 6), Err(SelectionError::Invalid(_))));
        assert!(matches!(parse_selection("  ", 6), Err(SelectionError::Invalid(_))));
    }

    #[test]
    fn test_select_channels_by_name_or_id() {
        let channels = vec![chan("C1", "general"), chan("C2", "ops"), chan("C3", "random")];
        let picked = select_channels(&channels, &["random".into(), "#general".into(), "C1".into()]).unwrap();
        let ids: Vec<_> = picked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["C1", "C3"]);

        assert_eq!(
            select_channels(&channels, &["nope".into()]),
            Err(SelectionError::UnknownChannel("nope".into()))
        );
    }

    #[test]
    fn test_channel_filter() {
        let public = chan("C1", "general");
        let private = SlackChannel {
            is_private: true,
            ..chan("G1", "secret")
        };
        let archived = SlackChannel {
            is_archived: true,
            ..chan("C2", "old")
        };
        let dm = SlackChannel {
            is_im: true,
            ..chan("D1", "")
        };

        let all = ChannelFilter::default();
        assert!(all.matches(&public) && all.matches(&private) && all.matches(&dm));
        assert!(!all.matches(&archived));

        let only_private = ChannelFilter {
            private: true,
            ..Default::default()
        };
        assert!(only_private.matches(&private));
        assert!(!only_private.matches(&public));
        assert!(!only_private.matches(&dm));

        let with_archived = ChannelFilter {
            public: true,
            archived: true,
            ..Default::default()
        };
        assert!(with_archived.matches(&archived));
    }

    #[test]
    fn test_label_direct_messages() {
        let mut channels = vec![
            SlackChannel {
                is_im: true,
                user: Some("U1".into()),
                ..chan("D1", "")
            },
            SlackChannel {
                is_im: true,
                user: Some("U9".into()),
                ..chan("D2", "")
            },
        ];
        let users: UserDirectory = [("U1".to_string(), "Alice".to_string())].into_iter().collect();

        label_direct_messages(&mut channels, &users);
        // Unresolved DMs keep their ID, which sorts ahead of lowercase names
        assert_eq!(channels[0].display_name(), "D2");
        assert_eq!(channels[1].name, "dm-Alice");
    }

    #[test]
    fn test_cli_parses_sync() {
        let cli = Cli::try_parse_from([
            "slack-extract",
            "sync",
            "-c",
            "general",
            "--channel",
            "ops",
            "--mode",
            "overwrite",
            "--attachments",
        ])
        .unwrap();
        let overrides = cli.overrides();
        assert_eq!(overrides.mode, Some(ExportMode::Overwrite));
        assert_eq!(overrides.download_attachments, Some(true));
        match cli.command {
            Command::Sync(args) => assert_eq!(args.channels, vec!["general", "ops"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parses_analyze_and_cache() {
        let cli = Cli::try_parse_from([
            "slack-extract",
            "-v",
            "analyze",
            "exports/general.md",
            "--provider",
            "gemini",
            "--language",
            "Korean",
        ])
        .unwrap();
        assert!(cli.verbose);
        let overrides = cli.overrides();
        assert_eq!(overrides.provider, Some(Provider::Gemini));
        assert_eq!(overrides.language.as_deref(), Some("Korean"));

        let cli = Cli::try_parse_from(["slack-extract", "cache", "invalidate"]).unwrap();
        assert!(matches!(cli.command, Command::Cache(CacheCommand::Invalidate)));

        assert!(Cli::try_parse_from(["slack-extract", "analyze"]).is_err());
    }
}
