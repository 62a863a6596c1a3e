//! Instance pricing commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;
use wizard_lib::cost::format_currency;

use crate::client::ApiClient;
use crate::output::{format_hourly, print_heading, print_json, print_success, render_table, OutputFormat};

#[derive(Tabled)]
struct RateRow {
    #[tabled(rename = "Capacity")]
    capacity: String,
    #[tabled(rename = "Hourly")]
    hourly: String,
    #[tabled(rename = "Monthly")]
    monthly: String,
    #[tabled(rename = "Discount")]
    discount: String,
}

/// Show on-demand and spot price for one instance type
pub async fn show_quote(
    client: &ApiClient,
    region: &str,
    instance_type: &str,
    format: OutputFormat,
) -> Result<()> {
    let quote = client.price_quote(region, instance_type).await?;

    match format {
        OutputFormat::Json => print_json(&quote)?,
        OutputFormat::Table => {
            print_heading(&format!("{} in {}", quote.instance_type, quote.region), 50);

            let mut rows = vec![RateRow {
                capacity: "on-demand".to_string(),
                hourly: format_hourly(quote.on_demand.price),
                monthly: format_currency(quote.monthly.on_demand),
                discount: "-".to_string(),
            }];
            match &quote.spot {
                Some(spot) => rows.push(RateRow {
                    capacity: "spot".cyan().to_string(),
                    hourly: format_hourly(spot.price),
                    monthly: format_currency(quote.monthly.spot),
                    discount: spot.discount.clone(),
                }),
                None => rows.push(RateRow {
                    capacity: "spot".cyan().to_string(),
                    hourly: "unavailable".dimmed().to_string(),
                    monthly: "-".to_string(),
                    discount: "-".to_string(),
                }),
            }
            println!("{}", render_table(rows));

            if quote.spot.is_some() {
                println!(
                    "\n{} {}/month per node",
                    "Spot saves".bold(),
                    format_currency(quote.monthly.savings).green()
                );
            }
        }
    }

    Ok(())
}

/// Ask the server to refetch its pricing source
pub async fn refresh(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result = client.refresh_pricing().await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Pricing refreshed from {} ({} region(s))",
                result.provider, result.regions
            ));
            if let Some(at) = result.refreshed_at {
                println!("As of {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
    }

    Ok(())
}
