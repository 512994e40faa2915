//! Canned prompts offered next to the input box.

use clap::ValueEnum;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// Ask the model to pick a winner.
    Judge,
    /// Summarize the main areas of clash.
    SummarizeClash,
    /// Summarize recurring themes.
    SummarizeThemes,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Judge, Preset::SummarizeClash, Preset::SummarizeThemes];

    pub fn prompt(self) -> &'static str {
        match self {
            Preset::Judge => "You are the Debate judge who must decide a winner in the debate, reason to the best degree who won this debate, respond either \"affirmative\" or \"negative\". Then explain why.",
            Preset::SummarizeClash => "Summarize the main areas of clash that occurred in this debate",
            Preset::SummarizeThemes => "Summarize the themes of our debate thus far",
        }
    }

    /// REPL command that applies this preset.
    pub fn command(self) -> &'static str {
        match self {
            Preset::Judge => "/judge",
            Preset::SummarizeClash => "/clash",
            Preset::SummarizeThemes => "/themes",
        }
    }

    pub fn from_command(cmd: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.command() == cmd)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preset::Judge => write!(f, "Judge the debate"),
            Preset::SummarizeClash => write!(f, "Summarize clash"),
            Preset::SummarizeThemes => write!(f, "Summarize themes"),
        }
    }
}
