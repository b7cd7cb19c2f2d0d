pub mod chat;
pub mod cli;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod input;
pub mod logging;
pub mod model;
pub mod output;
pub mod providers;
pub mod render;
pub mod session;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::io::{self, Write};
use tracing::info;

use chat::{ChatSession, LineSource};
use cli::{Cli, TaskArgs, TaskCommand};
use client::ModelClient;
use config::{Config, TaskKind};
use input::{TerminalLines, read_piped_input};
use model::{FirstResponse, SchemaDefinition};
use output::TerminalOutput;
use providers::ChatBackend;

#[derive(Debug, Clone, PartialEq)]
enum Mode {
    Generic,
    FunctionCall(Vec<SchemaDefinition>),
}

/// Fully resolved request for one process run.
#[derive(Debug, Clone, PartialEq)]
struct Invocation {
    role: String,
    prompt: String,
    mode: Mode,
    chat: bool,
}

impl Invocation {
    fn from_cli(cli: &Cli, config: &Config) -> Result<Self> {
        let Some(TaskCommand::Task(raw)) = &cli.task else {
            let prompt = cli
                .prompt
                .clone()
                .ok_or_else(|| anyhow!("--prompt is required unless a configured task is given"))?;
            return Ok(Self {
                role: config.default_role.clone(),
                prompt,
                mode: Mode::Generic,
                chat: cli.chat,
            });
        };

        let (name, args) = TaskArgs::parse_task(raw)?;
        let task = config.task(&name).ok_or_else(|| {
            let known: Vec<&str> = config.tasks.keys().map(String::as_str).collect();
            anyhow!(
                "unknown task '{}'; configured tasks: {}",
                name,
                if known.is_empty() {
                    "(none)".to_string()
                } else {
                    known.join(", ")
                }
            )
        })?;

        // Flags after the task name win over root flags, which win over the task.
        Ok(Self {
            role: args
                .role
                .or_else(|| cli.role.clone())
                .unwrap_or_else(|| task.role.clone()),
            prompt: args
                .prompt
                .or_else(|| cli.prompt.clone())
                .unwrap_or_else(|| task.prompt.clone()),
            mode: match &task.kind {
                TaskKind::Generic => Mode::Generic,
                TaskKind::FunctionCall(schemas) => Mode::FunctionCall(schemas.clone()),
            },
            chat: cli.chat || args.chat,
        })
    }
}

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::try_parse()?;
    let _log_guard = logging::init(cli.verbose);

    let config = Config::load(cli.api.config.as_deref(), &cli.api_overrides())
        .context("Failed to load configuration")?;
    info!(
        model = %config.client.model,
        timeout_secs = config.client.timeout.as_secs_f64(),
        gateway = matches!(config.client.target, config::ApiTarget::Gateway { .. }),
        task_count = config.tasks.len(),
        "loaded runtime configuration"
    );
    let invocation = Invocation::from_cli(&cli, &config)?;
    let client =
        ModelClient::new(config.client).context("Failed to initialize model client")?;

    let input = read_piped_input(io::stdin().lock()).context("Failed to read piped input")?;
    let mut output = TerminalOutput::stdout();
    execute(&client, &invocation, &input, &mut output, TerminalLines::open).await
}

async fn execute<B, W, L>(
    client: &ModelClient<B>,
    invocation: &Invocation,
    input: &str,
    output: &mut TerminalOutput<W>,
    open_lines: impl FnOnce() -> io::Result<L>,
) -> Result<()>
where
    B: ChatBackend,
    W: Write,
    L: LineSource,
{
    info!(
        function_call = matches!(invocation.mode, Mode::FunctionCall(_)),
        chat = invocation.chat,
        input_len = input.len(),
        "running invocation"
    );

    let Invocation {
        role, prompt, mode, ..
    } = invocation;
    let first_response = match mode {
        Mode::Generic => {
            let answer = dispatch::ask_generic(client, role, prompt, input).await?;
            if !invocation.chat {
                output
                    .write_block(&answer)
                    .context("Failed to write answer")?;
                return Ok(());
            }
            FirstResponse::Text(answer)
        }
        Mode::FunctionCall(schemas) => {
            let result =
                dispatch::extract_structured(client, role, prompt, input, schemas).await?;
            if !invocation.chat {
                let raw = serde_json::to_string(&result).context("Failed to encode result")?;
                output.write_block(&raw).context("Failed to write result")?;
                return Ok(());
            }
            FirstResponse::Structured(result)
        }
    };

    let history = session::build_history(role, prompt, input, &first_response);
    let mut lines = open_lines().context("Failed to open terminal for interactive chat")?;
    ChatSession::new(client, history)
        .run(&mut lines, output)
        .await
        .context("Interactive chat ended")?;
    Ok(())
}
