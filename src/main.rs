use axum::Router;
use clap::{Args, Parser, Subcommand};
use reqwest::Client;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shukin_envelopes::{
    EnvelopeConfig, EnvelopeService, FontSettings, LayoutPreset, RosterConfiguration, compose,
    helpers::{font::DEFAULT_FONT_PATH, roster_csv},
    models::roster::{DEFAULT_FEE, current_fiscal_year, default_extra_item_labels},
    resolve_typeface, suggested_filename,
};

/// Collection envelope label maker
#[derive(Parser, Debug)]
#[command(name = "shukin-envelopes")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    sheet: SheetArgs,

    #[command(flatten)]
    font: FontArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the roster editor and PDF download over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, env = "ENVELOPE_BIND", default_value = "0.0.0.0:3000")]
        bind: String,
    },
    /// Compose envelopes for a roster CSV straight to a PDF file
    Render {
        /// Roster CSV with 名前/月謝/備考 (or name/fee/note) columns
        #[arg(short, long)]
        input: PathBuf,

        /// Output PDF path (default: shukin_bukuro_<year>.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct SheetArgs {
    /// Sheet layout
    #[arg(long, env = "ENVELOPE_PRESET", value_enum, default_value_t = LayoutPreset::Landscape)]
    preset: LayoutPreset,

    /// Fiscal year printed on every label (default: current April-start year)
    #[arg(long, env = "ENVELOPE_FISCAL_YEAR")]
    fiscal_year: Option<i32>,

    /// Monthly fee for members without one
    #[arg(long, env = "ENVELOPE_DEFAULT_FEE", default_value_t = DEFAULT_FEE)]
    default_fee: u32,

    /// Extra-items row label, repeat up to six times
    #[arg(long = "extra-item")]
    extra_items: Vec<String>,
}

#[derive(Args, Debug)]
struct FontArgs {
    /// Local TrueType font with Japanese glyphs
    #[arg(long, env = "ENVELOPE_FONT_PATH", default_value = DEFAULT_FONT_PATH)]
    font_path: PathBuf,

    /// Remote font downloaded when the local one is missing
    #[arg(long, env = "ENVELOPE_FONT_URL")]
    font_url: Option<String>,

    /// Where downloaded fonts are kept
    #[arg(long, env = "ENVELOPE_FONT_CACHE_DIR", default_value = ".font-cache")]
    font_cache_dir: PathBuf,
}

impl SheetArgs {
    fn roster_configuration(&self) -> anyhow::Result<RosterConfiguration> {
        let labels = if self.extra_items.is_empty() {
            default_extra_item_labels()
        } else {
            self.extra_items.clone()
        };
        let config = RosterConfiguration::new(
            self.fiscal_year.unwrap_or_else(current_fiscal_year),
            self.default_fee,
            labels,
        )?;
        Ok(config)
    }
}

impl From<FontArgs> for FontSettings {
    fn from(args: FontArgs) -> Self {
        FontSettings {
            path: Some(args.font_path),
            url: args.font_url,
            cache_dir: args.font_cache_dir,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = cli.sheet.roster_configuration()?;
    let preset = cli.sheet.preset;

    info!(
        "Fiscal year {}, default fee {}, preset {}",
        settings.fiscal_year, settings.default_fee, preset
    );

    let typeface = resolve_typeface(&Client::new(), &FontSettings::from(cli.font)).await;

    match cli.command {
        Command::Serve { bind } => {
            let service = EnvelopeService::new(typeface, EnvelopeConfig { settings, preset });

            let app = Router::new()
                .nest("/api", service.router())
                .route("/health", axum::routing::get(|| async { "OK" }));

            let listener = TcpListener::bind(&bind).await?;
            info!("Server running on http://{}", bind);

            axum::serve(listener, app).await?;
        }
        Command::Render { input, output } => {
            let members = roster_csv::read_roster_file(&input)?;
            if members.is_empty() {
                warn!("Roster {} has no members, nothing to render", input.display());
                anyhow::bail!("no data: {} contains no members", input.display());
            }

            let pdf = compose(&members, &settings, preset.geometry(), &typeface)?;
            let output =
                output.unwrap_or_else(|| PathBuf::from(suggested_filename(settings.fiscal_year)));
            std::fs::write(&output, &pdf)?;
            info!(
                "Wrote {} label(s) to {}, size: {} bytes",
                members.len(),
                output.display(),
                pdf.len()
            );
        }
    }

    Ok(())
}
