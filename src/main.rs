use clap::{Parser, Subcommand};
use llama_assistant::config::Config;
use llama_assistant::error::Result;
use llama_assistant::hotkey::parse_hotkey;
use llama_assistant::models::{LlamaServerLoader, ModelLifecycleManager, ModelSource};
use llama_assistant::wakeword::CpalMicrophone;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "llama-assistant")]
#[command(about = "Local model assistant with wake word and hotkey support", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List models in the catalog
    Models,
    /// Send one message to a model and print the reply
    Chat {
        /// Catalog id of the model to use
        #[arg(short, long)]
        model: String,
        /// Image URL or data URI to attach (image models only)
        #[arg(short, long)]
        image: Option<String>,
        /// Message text
        message: String,
    },
    /// List audio input devices
    Devices,
    /// Show the configured hotkey, or validate one
    Hotkey {
        /// Hotkey string to check, e.g. "<ctrl>+<shift>+a"
        shortcut: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Models => list_models(&Config::load()?),
        Commands::Chat {
            model,
            image,
            message,
        } => chat(&Config::load()?, &model, &message, image.as_deref()).await,
        Commands::Devices => {
            let configured = Config::load()?.wakeword.device;
            let devices = CpalMicrophone::list_devices();
            if devices.is_empty() {
                println!("No input devices found");
            }
            for device in devices {
                let marker = if configured.as_deref() == Some(device.as_str()) { "*" } else { " " };
                println!("{marker} {device}");
            }
            Ok(())
        }
        Commands::Hotkey { shortcut } => {
            let shortcut = match shortcut {
                Some(shortcut) => shortcut,
                None => Config::load()?.hotkey.shortcut,
            };
            parse_hotkey(&shortcut)?;
            println!("{shortcut}");
            Ok(())
        }
    }
}

fn list_models(config: &Config) -> Result<()> {
    for entry in config.catalog()? {
        let source = match &entry.source {
            ModelSource::Local { path } => path.display().to_string(),
            ModelSource::Remote(remote) => format!("{}/{}", remote.repo_id, remote.filename),
        };
        println!(
            "{:<16} {:<6} {:<32} {source}",
            entry.model_id,
            entry.model_type.as_str(),
            entry.display_name
        );
    }
    Ok(())
}

async fn chat(config: &Config, model_id: &str, message: &str, image: Option<&str>) -> Result<()> {
    let loader = Arc::new(LlamaServerLoader::new(&config.lifecycle));
    let manager = ModelLifecycleManager::new(loader, &config.lifecycle, config.catalog()?)?;

    let reply = manager.chat_completion(model_id, message, image).await;
    manager.unload_model().await;

    println!("{}", reply?);
    Ok(())
}
