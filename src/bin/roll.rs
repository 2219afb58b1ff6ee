//! tabletop-roll - Roll dice from the command line
//!
//! Prints the roll narrative, or the full result as JSON with `--json`.
//! Passing back the echoed seed reproduces a roll exactly.

use anyhow::Result;
use clap::Parser;
use tabletop::dice::{self, AdvantageMode, RollOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Seeded dice roller
#[derive(Parser, Debug)]
#[command(name = "tabletop-roll", version, about = "Roll dice notation such as 2d6+3")]
struct Args {
    /// Dice notation, e.g. "1d20+5" or "2d6-1d4"
    notation: String,

    /// Roll a lone d20 twice and keep the higher
    #[arg(long, conflicts_with = "disadvantage")]
    advantage: bool,

    /// Roll a lone d20 twice and keep the lower
    #[arg(long)]
    disadvantage: bool,

    /// Reroll and add on a die's maximum face
    #[arg(long)]
    explode: bool,

    /// Seed for a reproducible roll
    #[arg(long)]
    seed: Option<String>,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn options(&self) -> RollOptions {
        let advantage = if self.advantage {
            AdvantageMode::Advantage
        } else if self.disadvantage {
            AdvantageMode::Disadvantage
        } else {
            AdvantageMode::None
        };

        RollOptions {
            advantage,
            exploding: self.explode,
            seed: self.seed.clone(),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabletop=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let result = dice::roll(&args.notation, &args.options())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.narrative);
        println!("seed: {}", result.seed);
    }

    Ok(())
}
