use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use texgen::config::GeneratorConfig;
use texgen::generator::TextureGenerator;
use texgen::name_finder::{self, NameIndex};
use texgen::prompt_builder::PromptTemplate;

#[derive(Parser)]
#[command(name = "texgen")]
#[command(about = "Brush texture prompts, Replicate texture generation and a fuzzy name finder")]
struct Cli {
    /// Generator configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the texture prompt for a material
    Prompt {
        texture: String,

        /// Tera template to use instead of the built-in prompt
        #[arg(short, long)]
        template: Option<PathBuf>,
    },
    /// Generate a texture image and save it to the output directory
    Generate {
        texture: String,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Tera template to use instead of the built-in prompt
        #[arg(short, long)]
        template: Option<PathBuf>,
    },
    /// Fuzzy search a CSV register
    Names {
        query: String,

        #[arg(long)]
        csv: PathBuf,

        #[arg(long, default_value = name_finder::DEFAULT_KEY_COLUMN)]
        key_column: String,

        #[arg(long, default_value = name_finder::DEFAULT_DISPLAY_COLUMN)]
        display_column: String,

        #[arg(long, default_value_t = name_finder::DEFAULT_THRESHOLD)]
        threshold: f64,
    },
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {info}");
        if let Some(loc) = info.location() {
            eprintln!("at: {}:{}", loc.file(), loc.line());
        }
    }));
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Prompt { texture, template } => {
            let template = match template {
                Some(path) => PromptTemplate::from_file(&path)?,
                None => match GeneratorConfig::load(cli.config.as_deref())?.template {
                    Some(path) => PromptTemplate::from_file(&path)?,
                    None => PromptTemplate::builtin(),
                },
            };
            println!("{}", template.render(&texture)?);
        }
        Command::Generate {
            texture,
            output_dir,
            template,
        } => {
            let mut config = GeneratorConfig::load(cli.config.as_deref())?;
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if template.is_some() {
                config.template = template;
            }
            let generator = TextureGenerator::new(config)?;
            info!("Writing textures to {}", generator.output_dir().display());
            for saved in generator.generate(&texture).await? {
                info!(
                    "Wrote {} bytes from {}",
                    saved.bytes, saved.source_url
                );
                println!("{}", saved.path.display());
            }
        }
        Command::Names {
            query,
            csv,
            key_column,
            display_column,
            threshold,
        } => {
            let index = NameIndex::from_path(&csv, &key_column, &display_column)?;
            for found in index.search(&query, threshold) {
                println!("{found}");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Keep stdout clean for the prompt / result lines.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    install_panic_hook();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            error!("Failed to load .env: {}", e);
        }
    }

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
