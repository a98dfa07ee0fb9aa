//! The `diagnose` subcommand: a step-by-step connectivity probe.
//!
//! Each step prints ok / skipped / FAILED. A JSON-RPC -32601 ("method
//! not found") marks an optional capability as skipped rather than
//! failed; anything else failing sets the exit code.

use std::sync::Arc;
use std::time::Duration;

use stress_domain::error::{Error, Result};
use stress_mcp_client::protocol::CODE_METHOD_NOT_FOUND;
use stress_mcp_client::{McpClient, RequestFailure, TransportError};

use crate::sampler;

use super::TargetArgs;

enum StepResult {
    Ok(String),
    Skipped,
    Failed(String),
}

fn print_step(name: &str, result: &StepResult) {
    match result {
        StepResult::Ok(detail) if detail.is_empty() => println!("  [ ok ] {name}"),
        StepResult::Ok(detail) => println!("  [ ok ] {name} — {detail}"),
        StepResult::Skipped => println!("  [skip] {name} — not supported"),
        StepResult::Failed(reason) => println!("  [FAIL] {name} — {reason}"),
    }
}

fn classify(failure: &RequestFailure) -> StepResult {
    match &failure.error {
        TransportError::Server {
            code: CODE_METHOD_NOT_FOUND,
            ..
        } => StepResult::Skipped,
        other => StepResult::Failed(other.to_string()),
    }
}

/// Probe the target; exit 1 if any step fails.
pub async fn run(args: TargetArgs) -> Result<i32> {
    let target = args.resolve()?;
    let timeout = Duration::from_millis(args.timeout);

    println!("diagnosing {} ({})", target.describe(), target.kind());

    let transport = target.build_transport(timeout);
    if let Err(e) = transport.connect().await {
        print_step("connect", &StepResult::Failed(e.to_string()));
        return Err(Error::Handshake(e.to_string()));
    }
    print_step("connect", &StepResult::Ok(String::new()));

    let client = Arc::new(McpClient::new(Arc::clone(&transport)));
    match client.initialize().await {
        Ok(handshake) => {
            let info = &handshake.result.server_info;
            print_step(
                "initialize",
                &StepResult::Ok(format!(
                    "{} {} (protocol {}, {:.1}ms)",
                    info.name,
                    info.version,
                    handshake.result.protocol_version,
                    handshake.latency_ms
                )),
            );
        }
        Err(f) => {
            print_step("initialize", &StepResult::Failed(f.to_string()));
            client.close().await;
            return Err(Error::Handshake(f.to_string()));
        }
    }

    let mut failed = false;
    let mut note = |result: StepResult, name: &str| {
        if matches!(result, StepResult::Failed(_)) {
            failed = true;
        }
        print_step(name, &result);
    };

    match client.ping().await {
        Ok(reply) => note(StepResult::Ok(format!("{:.1}ms", reply.latency_ms)), "ping"),
        Err(f) => note(classify(&f), "ping"),
    }

    let mut first_tool = None;
    match client.list_tools().await {
        Ok((list, latency)) => {
            first_tool = list.tools.first().cloned();
            note(
                StepResult::Ok(format!("{} tools ({latency:.1}ms)", list.tools.len())),
                "tools/list",
            );
        }
        Err(f) => note(classify(&f), "tools/list"),
    }

    if let Some(tool) = first_tool {
        let args_value = sampler::generate_args(&tool.input_schema);
        match client.call_tool(&tool.name, args_value).await {
            Ok((result, latency)) => {
                if result.is_error {
                    note(
                        StepResult::Failed("tool returned isError".into()),
                        &format!("tools/call {}", tool.name),
                    );
                } else {
                    note(
                        StepResult::Ok(format!("{latency:.1}ms")),
                        &format!("tools/call {}", tool.name),
                    );
                }
            }
            Err(f) => note(classify(&f), &format!("tools/call {}", tool.name)),
        }
    }

    match client.list_resources().await {
        Ok((list, latency)) => note(
            StepResult::Ok(format!("{} resources ({latency:.1}ms)", list.resources.len())),
            "resources/list",
        ),
        Err(f) => note(classify(&f), "resources/list"),
    }

    match client.list_resource_templates().await {
        Ok((list, latency)) => note(
            StepResult::Ok(format!(
                "{} templates ({latency:.1}ms)",
                list.resource_templates.len()
            )),
            "resources/templates/list",
        ),
        Err(f) => note(classify(&f), "resources/templates/list"),
    }

    match client.list_prompts().await {
        Ok((list, latency)) => note(
            StepResult::Ok(format!("{} prompts ({latency:.1}ms)", list.prompts.len())),
            "prompts/list",
        ),
        Err(f) => note(classify(&f), "prompts/list"),
    }

    client.close().await;
    Ok(if failed { 1 } else { 0 })
}
