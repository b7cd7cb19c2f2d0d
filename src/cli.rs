//! Command-line definition.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ApiOverrides;

/// Pipe text through a chat model.
///
/// Reads everything from stdin, asks the model with the given prompt and
/// prints the answer to stdout. Tasks defined in the config file become
/// subcommands.
///
///   git diff --staged | pipegpt -p "code review for this change"
///   cat sample.json | pipegpt -p "convert JSON to YAML"
#[derive(Parser, Debug)]
#[command(name = "pipegpt", author, version, about, verbatim_doc_comment)]
pub struct Cli {
    #[command(flatten)]
    pub api: ApiArgs,

    /// Role of the assistant (PIPEGPT_DEFAULT_ROLE or default.role); also overrides a task's role.
    #[arg(short, long)]
    pub role: Option<String>,

    /// Prompt to send along with the piped input; also overrides a task's prompt.
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Continue interactively after the first answer.
    #[arg(short, long)]
    pub chat: bool,

    /// Show debug logs on stderr.
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub task: Option<TaskCommand>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ApiArgs {
    /// Config file (default is ./.pipegpt.yaml or $HOME/.pipegpt.yaml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// API key (PIPEGPT_API_KEY or api.key).
    #[arg(short, long)]
    pub key: Option<String>,

    /// Model name (PIPEGPT_API_MODEL or api.model), default gpt-4.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Request timeout such as 240s or 2m (PIPEGPT_API_TIMEOUT or api.timeout).
    #[arg(short, long)]
    pub timeout: Option<String>,

    /// Azure OpenAI compatible gateway endpoint (PIPEGPT_API_ENDPOINT or api.endpoint).
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// Gateway deployment names, e.g. 'gpt-4=foo-gpt-4, gpt-3=bar-gpt-3'.
    #[arg(long)]
    pub conversion: Option<String>,

    /// Base URL of the direct API (PIPEGPT_API_BASE_URL or api.base_url).
    #[arg(long)]
    pub base_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Run a task defined in the config file.
    #[command(external_subcommand)]
    Task(Vec<String>),
}

/// Flags accepted after a task name.
#[derive(Parser, Debug, Default)]
pub struct TaskArgs {
    /// Override the task's role.
    #[arg(short, long)]
    pub role: Option<String>,

    /// Override the task's prompt.
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Continue interactively after the first answer.
    #[arg(short, long)]
    pub chat: bool,
}

impl TaskArgs {
    /// Parses `[task, args...]` as captured by the external subcommand.
    pub fn parse_task(raw: &[String]) -> Result<(String, Self), clap::Error> {
        let name = raw.first().cloned().unwrap_or_default();
        let args = Self::try_parse_from(raw)?;
        Ok((name, args))
    }
}

impl Cli {
    pub fn api_overrides(&self) -> ApiOverrides {
        ApiOverrides {
            key: self.api.key.clone(),
            model: self.api.model.clone(),
            timeout: self.api.timeout.clone(),
            endpoint: self.api.endpoint.clone(),
            conversion: self.api.conversion.clone(),
            base_url: self.api.base_url.clone(),
            role: self.role.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, TaskArgs, TaskCommand};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn root_flags_parse() {
        let cli = Cli::try_parse_from([
            "pipegpt",
            "-p",
            "review",
            "-c",
            "--endpoint",
            "https://gw",
            "--conversion",
            "gpt-4=dept-gpt4",
        ])
        .expect("parse");

        assert_eq!(cli.prompt.as_deref(), Some("review"));
        assert!(cli.chat);
        assert!(cli.task.is_none());
        let overrides = cli.api_overrides();
        assert_eq!(overrides.endpoint.as_deref(), Some("https://gw"));
        assert_eq!(overrides.conversion.as_deref(), Some("gpt-4=dept-gpt4"));
    }

    #[test]
    fn unknown_subcommand_is_captured_as_task() {
        let cli = Cli::try_parse_from(["pipegpt", "-m", "gpt-3.5", "review", "-p", "be strict", "-c"])
            .expect("parse");
        let Some(TaskCommand::Task(raw)) = cli.task else {
            panic!("expected task subcommand");
        };
        assert_eq!(cli.api.model.as_deref(), Some("gpt-3.5"));

        let (name, args) = TaskArgs::parse_task(&raw).expect("task args");
        assert_eq!(name, "review");
        assert_eq!(args.prompt.as_deref(), Some("be strict"));
        assert!(args.chat);
        assert_eq!(args.role, None);
    }

    #[test]
    fn task_args_reject_unknown_flags() {
        let raw = vec!["review".to_string(), "--temperature".to_string()];
        assert!(TaskArgs::parse_task(&raw).is_err());
    }
}
