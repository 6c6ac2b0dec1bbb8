use clap::Parser;
use kubetalk::audit::AuditLogger;
use kubetalk::config::Config;
use kubetalk::error_translation::ErrorTranslator;
use kubetalk::llm::{AnthropicClient, LLMError};
use kubetalk::{AppError, AppResult, Pipeline, PipelineRequest, Policy};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Ask questions about a Kubernetes cluster in plain language
#[derive(Parser, Debug)]
#[command(name = "kubetalk", version, about)]
struct Args {
    /// Config file (default: ~/.config/kubetalk/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Policy file, overrides the config setting
    #[arg(long, value_name = "PATH")]
    policy: Option<PathBuf>,

    /// Write the reference policy file if it does not exist, then exit
    #[arg(long)]
    init_policy: bool,

    /// Run a single request and exit instead of starting the prompt loop
    #[arg(trailing_var_arg = true)]
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Diagnostics go to stderr so stdout only carries summaries
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kubetalk=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", ErrorTranslator::translate_app_error(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> AppResult<ExitCode> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let policy_path = args.policy.clone().unwrap_or_else(|| config.policy.path.clone());

    if args.init_policy {
        if Policy::write_default(&policy_path)? {
            println!("Wrote default policy to {}", policy_path.display());
        } else {
            println!("Policy file {} already exists, left unchanged", policy_path.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    // No policy, no service
    let policy = Arc::new(Policy::load(&policy_path)?);

    let api_key = config.get_api_key().ok_or_else(|| {
        AppError::Llm(LLMError::ApiError(format!(
            "no API key: set {} or llm.api_key in the config file",
            config.llm.api_key_env
        )))
    })?;
    let client = Arc::new(AnthropicClient::from_config(&config.llm, api_key)?);

    let mut pipeline = Pipeline::from_config(policy, client, &config);
    if config.audit.enabled {
        let audit = AuditLogger::with_path(config.audit_log_path()?)?;
        tracing::info!(path = %audit.log_path().display(), "audit log enabled");
        pipeline = pipeline.with_audit(audit);
    }

    if !args.prompt.is_empty() {
        let request = PipelineRequest {
            user_prompt: args.prompt.join(" "),
        };
        let response = pipeline.handle(&request).await;
        println!("{}", response.summary);
        return Ok(if response.approved {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(2)
        });
    }

    repl(&pipeline).await?;
    Ok(ExitCode::SUCCESS)
}

async fn repl(pipeline: &Pipeline) -> std::io::Result<()> {
    println!("kubetalk: ask about your cluster. Type 'exit' or 'quit' to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("kubetalk> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            // EOF
            println!();
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        let response = pipeline
            .handle(&PipelineRequest {
                user_prompt: input.to_string(),
            })
            .await;
        println!("{}\n", response.summary);
    }

    Ok(())
}
