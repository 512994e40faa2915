use crate::presets::Preset;
use clap::Parser;
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "debate-chat")]
#[command(version)]
#[command(about = "Terminal client for a debate chat backend with streamed, editable replies")]
pub struct Args {
    /// Backend base URL (overrides config file and DEBATE_API_HOST)
    #[arg(long)]
    pub api_host: Option<String>,

    /// TOML config file with api_host, session_cookie and log_filter
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Topic to open on start
    #[arg(long)]
    pub topic: Option<String>,

    /// Prefill the input with a canned prompt
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,

    /// Debug-level logging
    #[arg(long, short)]
    pub verbose: bool,

    /// Print shell completions and exit
    #[arg(long, value_enum)]
    pub completions: Option<Shell>,
}

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// Plain text: send it as the next turn.
    Send(String),
    Regenerate,
    Edit { index: usize, text: String },
    Stop,
    Topic(String),
    History,
    Preset(Preset),
    Help,
    Quit,
    Empty,
}

pub const HELP: &str = "\
commands:
  <text>            send a new argument
  /regen            regenerate the last reply
  /edit N <text>    rewrite turn N (as numbered in /history) and redo the rest
  /stop             stop the streaming reply
  /topic ID         switch to another debate topic
  /history          print the whole conversation
  /judge            prefill the judge prompt
  /clash            prefill the clash summary prompt
  /themes           prefill the themes summary prompt
  /help             show this help
  /quit             exit";

/// Parse one input line.
pub fn parse_line(line: &str) -> Result<ReplCommand, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ReplCommand::Empty);
    }
    if !line.starts_with('/') {
        return Ok(ReplCommand::Send(line.to_string()));
    }

    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    if let Some(preset) = Preset::from_command(cmd) {
        return Ok(ReplCommand::Preset(preset));
    }

    match cmd {
        "/regen" | "/regenerate" => Ok(ReplCommand::Regenerate),
        "/stop" => Ok(ReplCommand::Stop),
        "/history" => Ok(ReplCommand::History),
        "/help" => Ok(ReplCommand::Help),
        "/quit" | "/exit" => Ok(ReplCommand::Quit),
        "/topic" => {
            if rest.is_empty() {
                Err("usage: /topic ID".to_string())
            } else {
                Ok(ReplCommand::Topic(rest.to_string()))
            }
        }
        "/edit" => {
            let (index, text) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "usage: /edit N <text>".to_string())?;
            let index = index
                .parse::<usize>()
                .map_err(|_| format!("not a turn number: {}", index))?;
            let text = text.trim();
            if text.is_empty() {
                return Err("usage: /edit N <text>".to_string());
            }
            Ok(ReplCommand::Edit { index, text: text.to_string() })
        }
        other => Err(format!("unknown command {} (try /help)", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_minimal() {
        let args = Args::parse_from(["debate-chat"]);
        assert!(args.api_host.is_none());
        assert!(args.config.is_none());
        assert!(args.topic.is_none());
        assert!(args.preset.is_none());
        assert!(!args.verbose);
        assert!(args.completions.is_none());
    }

    #[test]
    fn test_args_parse_full() {
        let args = Args::parse_from([
            "debate-chat",
            "--api-host",
            "http://localhost:9000",
            "--config",
            "chat.toml",
            "--topic",
            "abc",
            "--preset",
            "judge",
            "-v",
        ]);
        assert_eq!(args.api_host.as_deref(), Some("http://localhost:9000"));
        assert_eq!(args.config, Some(PathBuf::from("chat.toml")));
        assert_eq!(args.topic.as_deref(), Some("abc"));
        assert_eq!(args.preset, Some(Preset::Judge));
        assert!(args.verbose);
    }

    #[test]
    fn test_args_parse_completions() {
        let args = Args::parse_from(["debate-chat", "--completions", "bash"]);
        assert_eq!(args.completions, Some(Shell::Bash));
    }

    #[test]
    fn test_plain_text_is_send() {
        assert_eq!(parse_line("  taxes are theft "), Ok(ReplCommand::Send("taxes are theft".into())));
        assert_eq!(parse_line("   "), Ok(ReplCommand::Empty));
    }

    #[test]
    fn test_edit_command() {
        assert_eq!(
            parse_line("/edit 2 a better opening"),
            Ok(ReplCommand::Edit { index: 2, text: "a better opening".into() })
        );
        assert!(parse_line("/edit two words").is_err());
        assert!(parse_line("/edit 2").is_err());
        assert!(parse_line("/edit").is_err());
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse_line("/regen"), Ok(ReplCommand::Regenerate));
        assert_eq!(parse_line("/stop"), Ok(ReplCommand::Stop));
        assert_eq!(parse_line("/quit"), Ok(ReplCommand::Quit));
        assert_eq!(parse_line("/clash"), Ok(ReplCommand::Preset(Preset::SummarizeClash)));
        assert_eq!(parse_line("/topic  t-42 "), Ok(ReplCommand::Topic("t-42".into())));
        assert!(parse_line("/topic").is_err());
    }

    #[test]
    fn test_unknown_command() {
        let err = parse_line("/shout").unwrap_err();
        assert!(err.contains("/shout"));
    }
}
