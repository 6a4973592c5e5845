//! Agent health query

use anyhow::Result;
use colored::Colorize;
use sync_lib::{HealthResponse, ReadinessResponse};
use tabled::Tabled;

use crate::client::AgentClient;
use crate::output::{color_status, print_json, print_warning, OutputFormat};

/// Row for the components table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Last Check")]
    last_check: String,
}

/// Show `/healthz` and `/readyz` of a running agent
pub async fn show(client: &AgentClient, format: OutputFormat) -> Result<()> {
    let (_, health): (_, HealthResponse) = client.get("healthz").await?;
    let (_, readiness): (_, ReadinessResponse) = client.get("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "health": health,
            "readiness": readiness,
        }))?,
        OutputFormat::Table => {
            let ready = if readiness.ready { "ready" } else { "not ready" };

            println!("{}", "Agent Health".bold());
            println!("{}", "=".repeat(50));
            println!("Agent:      {}", client.base_url().as_str().cyan());
            println!("Status:     {}", color_status(health.status.as_str()));
            println!("Readiness:  {}", color_status(ready));
            if let Some(reason) = &readiness.reason {
                println!("Reason:     {}", reason);
            }
            println!();

            if health.components.is_empty() {
                print_warning("Agent reports no components yet");
                return Ok(());
            }

            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, c)| ComponentRow {
                    name: name.clone(),
                    status: color_status(c.status.as_str()),
                    message: c.message.clone().unwrap_or_else(|| "-".to_string()),
                    last_check: c.last_check.format("%Y-%m-%d %H:%M:%S").to_string(),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}
