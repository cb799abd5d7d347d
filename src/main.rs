use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fungid::{api, config::AppCfg, database, matcher::Matcher, store};

#[derive(Parser)]
#[command(name = "fungid", about = "Identify fungi photos against a labeled reference collection")]
struct Cli {
    /// YAML config file; FUNGID_* env vars override it
    #[arg(short, long, global = true, env = "FUNGID_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the web app
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Match one photo and print the result as JSON
    Identify { image: PathBuf },
    /// Add a labeled reference image
    Add {
        image: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List database entries
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fungid=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = AppCfg::load(cli.config.as_deref()).await?;

    match cli.cmd {
        Cmd::Serve { bind } => {
            if let Some(b) = bind { cfg.bind = b; }
            api::serve(cfg).await
        }
        Cmd::Identify { image } => {
            let res = Matcher::from_cfg(&cfg).identify(&image).await?;
            println!("{}", serde_json::to_string_pretty(&res)?);
            Ok(())
        }
        Cmd::Add { image, name, description } => {
            let bytes = tokio::fs::read(&image)
                .await
                .context(format!("Failed to read {}", image.display()))?;
            let file_name = image.file_name().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
            let entry = store::add_entry(&cfg.db_dir, &name, &description, &file_name, &bytes).await?;
            println!("added {} -> {}", entry.name, entry.image_path.display());
            Ok(())
        }
        Cmd::List => {
            for e in database::load_database(&cfg.db_dir).await {
                let marker = if e.has_description() { "" } else { " (no description)" };
                println!("{}\t{}{}", e.name, e.image_path.display(), marker);
            }
            Ok(())
        }
    }
}
