//! The `discover` subcommand: connect, handshake, and enumerate the
//! server's capabilities.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use stress_domain::error::{Error, Result};
use stress_mcp_client::McpClient;

use super::TargetArgs;

/// Enumerate capabilities; exit 1 on connection failure.
pub async fn run(args: TargetArgs) -> Result<i32> {
    let target = args.resolve()?;
    let timeout = Duration::from_millis(args.timeout);

    let transport = target.build_transport(timeout);
    transport
        .connect()
        .await
        .map_err(|e| Error::Handshake(e.to_string()))?;
    let client = Arc::new(McpClient::new(Arc::clone(&transport)));
    let handshake = client
        .initialize()
        .await
        .map_err(|f| Error::Handshake(f.to_string()))?;

    let info = &handshake.result.server_info;
    println!();
    println!("  server      {} {}", info.name, info.version);
    println!("  protocol    {}", handshake.result.protocol_version);
    println!("  transport   {}", target.kind());
    if let Some(caps) = handshake.result.capabilities.as_object() {
        let names: Vec<&str> = caps.keys().map(String::as_str).collect();
        println!("  capabilities {}", names.join(", "));
    }

    if let Ok((list, _)) = client.list_tools().await {
        println!();
        println!("  tools ({})", list.tools.len());
        for tool in &list.tools {
            println!("    {:<28} {}", tool.name, summarize(&tool.description));
            let required = tool
                .input_schema
                .get("required")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            if !required.is_empty() {
                println!("    {:<28} required: {required}", "");
            }
        }
    }

    if let Ok((list, _)) = client.list_resources().await {
        if !list.resources.is_empty() {
            println!();
            println!("  resources ({})", list.resources.len());
            for resource in &list.resources {
                println!("    {}", resource.uri);
            }
        }
    }

    if let Ok((list, _)) = client.list_resource_templates().await {
        if !list.resource_templates.is_empty() {
            println!();
            println!("  resource templates ({})", list.resource_templates.len());
            for template in &list.resource_templates {
                println!("    {}", template.uri_template);
            }
        }
    }

    if let Ok((list, _)) = client.list_prompts().await {
        if !list.prompts.is_empty() {
            println!();
            println!("  prompts ({})", list.prompts.len());
            for prompt in &list.prompts {
                println!("    {:<28} {}", prompt.name, summarize(&prompt.description));
            }
        }
    }

    println!();
    client.close().await;
    Ok(0)
}

fn summarize(text: &str) -> String {
    let line = text.lines().next().unwrap_or("");
    let mut out: String = line.chars().take(60).collect();
    if line.chars().count() > 60 {
        out.push_str("...");
    }
    out
}
