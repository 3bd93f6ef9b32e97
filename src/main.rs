use std::str::FromStr;

use clap::Parser;
use rust_decimal::Decimal;

use trader_base::cli::{Cli, Commands};
use trader_base::commands::{run_demo, RunOptions};
use trader_base::observability::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from the .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli.verbose);

    match cli.command {
        Commands::Run {
            codes,
            cancel_after,
            interval,
            quantity,
            price,
            stuck,
        } => {
            let price = Decimal::from_str(&price)?;
            run_demo(RunOptions {
                codes,
                cancel_after,
                interval,
                quantity,
                price,
                stuck,
            })
            .await?;
        }
    }

    Ok(())
}
