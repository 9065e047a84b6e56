//! CLI for PromptPix - text-to-image generation with history.

use clap::{Args, Parser, Subcommand};
use promptpix::image::ImageProvider;
use promptpix::persistence::RecordStore;
use promptpix::shell::{write_image, Shell};
use promptpix::{
    Credentials, GenerationController, GoTrueProvider, HuggingFaceProvider, PersistenceGateway,
    Session, SessionAdapter, Settings, SqliteRecordStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "promptpix")]
#[command(about = "Generate images from text prompts and keep a per-user history")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to ./promptpix.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive shell
    Shell,

    /// Generate one image and record it
    Generate(GenerateArgs),

    /// List your generated images
    History(LoginArgs),

    /// Check the inference token and the record store
    Check,
}

#[derive(Args)]
struct LoginArgs {
    /// Account email
    #[arg(long)]
    email: String,

    /// Account password
    #[arg(long)]
    password: String,
}

#[derive(Args)]
struct GenerateArgs {
    /// The text prompt describing the image
    prompt: String,

    /// Output file path (defaults to a timestamped file in the output directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Seed for deterministic generation
    #[arg(long)]
    seed: Option<u64>,

    #[command(flatten)]
    login: LoginArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("promptpix=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    tracing::debug!(?settings, "loaded settings");

    match cli.command {
        Commands::Shell => run_shell(&settings).await?,
        Commands::Generate(args) => generate(&settings, args, cli.json).await?,
        Commands::History(args) => history(&settings, args, cli.json).await?,
        Commands::Check => check(&settings, cli.json).await?,
    }

    Ok(())
}

fn inference_provider(settings: &Settings) -> promptpix::Result<HuggingFaceProvider> {
    let mut builder = HuggingFaceProvider::builder()
        .base_url(&settings.endpoint)
        .model_id(&settings.model);
    if let Some(token) = &settings.api_token {
        builder = builder.api_key(token);
    }
    builder.build()
}

fn controller(settings: &Settings, seed: Option<u64>) -> promptpix::Result<GenerationController> {
    let provider = inference_provider(settings)?;
    let mut parameters = settings.parameters.clone();
    if seed.is_some() {
        parameters.seed = seed;
    }
    Ok(GenerationController::builder(Arc::new(provider))
        .style_suffix(&settings.style_suffix)
        .deadline(settings.timeout())
        .parameters(parameters)
        .build())
}

fn sessions(settings: &Settings) -> promptpix::Result<SessionAdapter> {
    let mut builder = GoTrueProvider::builder();
    if let Some(url) = &settings.auth_url {
        builder = builder.base_url(url);
    }
    if let Some(key) = &settings.auth_key {
        builder = builder.api_key(key);
    }
    Ok(SessionAdapter::new(Arc::new(builder.build()?)))
}

async fn gateway(settings: &Settings) -> promptpix::Result<PersistenceGateway> {
    let store = SqliteRecordStore::connect(&settings.database_url).await?;
    Ok(PersistenceGateway::new(Arc::new(store)))
}

async fn run_shell(settings: &Settings) -> anyhow::Result<()> {
    let shell = Shell::new(
        controller(settings, None)?,
        gateway(settings).await?,
        sessions(settings)?,
        &settings.output_dir,
    );
    eprintln!("PromptPix shell. Type 'help' for commands.");
    shell.run().await?;
    Ok(())
}

async fn generate(settings: &Settings, args: GenerateArgs, json_output: bool) -> anyhow::Result<()> {
    let controller = controller(settings, args.seed)?;
    let gateway = gateway(settings).await?;
    let sessions = sessions(settings)?;
    let session = sessions
        .sign_in(&Credentials::new(args.login.email, args.login.password))
        .await?;

    let outcome = generate_and_record(
        settings,
        &controller,
        &gateway,
        &session,
        &args.prompt,
        args.output,
        json_output,
    )
    .await;
    sessions.sign_out().await;
    outcome
}

async fn generate_and_record(
    settings: &Settings,
    controller: &GenerationController,
    gateway: &PersistenceGateway,
    session: &Session,
    prompt: &str,
    output: Option<PathBuf>,
    json_output: bool,
) -> anyhow::Result<()> {
    let result = controller.generate(prompt, session).await?;

    // Record first so a failed file write does not lose the generation.
    let saved = gateway.save(session, &result).await;
    if let Err(e) = &saved {
        eprintln!("Warning: {}", e.user_message());
    }

    let output = match output {
        Some(path) => result.image.save(&path).map(|()| path),
        None => write_image(&settings.output_dir, &result),
    };
    let output = match output {
        Ok(path) => path,
        Err(e) => {
            if saved.is_ok() {
                eprintln!("Image kept in history; writing the file failed.");
            }
            return Err(e.into());
        }
    };
    let image = &result.image;

    if json_output {
        let result = serde_json::json!({
            "success": true,
            "output": output.display().to_string(),
            "size_bytes": image.size(),
            "format": image.format.extension(),
            "model": image.metadata.model,
            "seed": image.metadata.seed,
            "attempts": image.metadata.attempts,
            "duration_ms": image.metadata.duration_ms,
            "record_id": saved.as_ref().ok().map(|r| r.id.0),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Generated image: {} ({} bytes, {} attempt(s))",
            output.display(),
            image.size(),
            image.metadata.attempts
        );
        if let Some(duration) = image.metadata.duration_ms {
            println!("Duration: {}ms", duration);
        }
    }

    Ok(())
}

async fn history(settings: &Settings, args: LoginArgs, json_output: bool) -> anyhow::Result<()> {
    let gateway = gateway(settings).await?;
    let sessions = sessions(settings)?;
    let session = sessions
        .sign_in(&Credentials::new(args.email, args.password))
        .await?;

    let outcome = print_history(&gateway, &session, json_output).await;
    sessions.sign_out().await;
    outcome
}

async fn print_history(
    gateway: &PersistenceGateway,
    session: &Session,
    json_output: bool,
) -> anyhow::Result<()> {
    let records = gateway.list_for_owner(session).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else if records.is_empty() {
        println!("No images yet.");
    } else {
        for record in &records {
            println!(
                "#{:<4} {}  {}",
                record.id.0,
                record.created_at.format("%Y-%m-%d %H:%M:%S"),
                record.prompt
            );
        }
    }
    Ok(())
}

async fn check(settings: &Settings, json_output: bool) -> anyhow::Result<()> {
    let provider = inference_provider(settings)?;
    let inference = provider.health_check().await;
    let store = SqliteRecordStore::connect(&settings.database_url).await?;
    let storage = store.health_check().await;

    if json_output {
        let result = serde_json::json!({
            "inference": {
                "provider": provider.name(),
                "model": provider.model_id(),
                "ok": inference.is_ok(),
                "error": inference.as_ref().err().map(|e| e.to_string()),
            },
            "store": {
                "ok": storage.is_ok(),
                "error": storage.as_ref().err().map(|e| e.to_string()),
            },
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        match &inference {
            Ok(()) => println!("Inference: ok ({})", provider.model_id()),
            Err(e) => println!("Inference: {}", e.user_message()),
        }
        match &storage {
            Ok(()) => println!("Store: ok"),
            Err(e) => println!("Store: {}", e.user_message()),
        }
    }

    if inference.is_err() || storage.is_err() {
        anyhow::bail!("health check failed");
    }
    Ok(())
}
