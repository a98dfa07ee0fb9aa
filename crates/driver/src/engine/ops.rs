//! Operations dispatcher: expands a profile's weighted mix into a flat
//! round-robin slice and executes one operation per call, recording the
//! outcome.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;

use stress_domain::workload::{OpKind, WorkloadProfile};
use stress_domain::ErrorCategory;
use stress_mcp_client::McpClient;

use crate::recorder::Recorder;
use crate::rng::Mulberry32;
use crate::sampler;

/// A discovered tool the dispatcher can call, with its own interned
/// method id so per-method statistics stay meaningful.
struct ToolTarget {
    name: String,
    method_id: u16,
    schema: Value,
}

/// A discovered prompt with pre-built arguments.
struct PromptTarget {
    name: String,
    args: Value,
}

/// Intern a plain operation once and hand back its slot.
fn simple_slot(
    kind: OpKind,
    recorder: &Recorder,
    ids: &mut std::collections::HashMap<OpKind, u16>,
) -> Slot {
    let method_id = *ids
        .entry(kind)
        .or_insert_with(|| recorder.register_method(kind.method_name()));
    Slot::Simple { kind, method_id }
}

/// One entry of the expanded round-robin slice.
#[derive(Clone, Copy)]
enum Slot {
    Simple { kind: OpKind, method_id: u16 },
    /// Round-robin over discovered tools.
    ToolCall,
    /// Pinned to a single discovered tool.
    ToolCallFixed { index: usize },
    ResourceRead { method_id: u16 },
    PromptGet { method_id: u16 },
}

/// Weight-expanded dispatcher. `next` cycles the flat slice; tool,
/// resource and prompt slots additionally cycle their own target lists.
pub struct Dispatcher {
    slots: Vec<Slot>,
    cursor: AtomicUsize,
    tools: Vec<ToolTarget>,
    tool_cursor: AtomicUsize,
    resources: Vec<String>,
    resource_cursor: AtomicUsize,
    prompts: Vec<PromptTarget>,
    prompt_cursor: AtomicUsize,
    rng: parking_lot::Mutex<Mulberry32>,
}

impl Dispatcher {
    /// Discover what the mix needs and build the dispatch slice.
    ///
    /// Fallbacks, each logged: `tools/call` with no tools degrades to
    /// `ping`; `resources/read` with no resources degrades to
    /// `resources/list`; `prompts/get` with no prompts degrades to
    /// `prompts/list`.
    pub async fn build(
        client: &McpClient,
        profile: &WorkloadProfile,
        recorder: &Recorder,
        seed: u32,
    ) -> Self {
        let needs_tools = profile.operations.iter().any(|m| m.op == OpKind::ToolsCall);
        let needs_resources = profile
            .operations
            .iter()
            .any(|m| m.op == OpKind::ResourcesRead);
        let needs_prompts = profile.operations.iter().any(|m| m.op == OpKind::PromptsGet);

        let pinned_tool = profile
            .operations
            .iter()
            .find_map(|m| (m.op == OpKind::ToolsCall).then(|| m.tool.clone()).flatten());

        let mut tools = Vec::new();
        if needs_tools {
            match client.list_tools().await {
                Ok((list, _latency)) => {
                    for tool in list.tools {
                        let keep = match &pinned_tool {
                            Some(name) => &tool.name == name,
                            None => true,
                        };
                        if keep {
                            let method_id =
                                recorder.register_method(&format!("tools/call:{}", tool.name));
                            tools.push(ToolTarget {
                                name: tool.name,
                                method_id,
                                schema: tool.input_schema,
                            });
                        }
                    }
                    if let Some(name) = &pinned_tool {
                        if tools.is_empty() {
                            tracing::warn!(tool = %name, "requested tool not found on server");
                        }
                    }
                }
                Err(f) => {
                    tracing::warn!(error = %f, "tools/list failed during discovery");
                }
            }
            if tools.is_empty() {
                tracing::info!("no tools available, tools/call operations fall back to ping");
            }
        }

        let mut resources = Vec::new();
        if needs_resources {
            match client.list_resources().await {
                Ok((list, _latency)) => {
                    resources = list.resources.into_iter().map(|r| r.uri).collect();
                }
                Err(f) => tracing::warn!(error = %f, "resources/list failed during discovery"),
            }
            if resources.is_empty() {
                tracing::info!(
                    "no resources available, resources/read operations fall back to resources/list"
                );
            }
        }

        let mut prompts = Vec::new();
        if needs_prompts {
            match client.list_prompts().await {
                Ok((list, _latency)) => {
                    for prompt in list.prompts {
                        let mut args = serde_json::Map::new();
                        for arg in &prompt.arguments {
                            if arg.required {
                                args.insert(arg.name.clone(), Value::String("test".into()));
                            }
                        }
                        prompts.push(PromptTarget {
                            name: prompt.name,
                            args: Value::Object(args),
                        });
                    }
                }
                Err(f) => tracing::warn!(error = %f, "prompts/list failed during discovery"),
            }
            if prompts.is_empty() {
                tracing::info!(
                    "no prompts available, prompts/get operations fall back to prompts/list"
                );
            }
        }

        // Expand weights into the flat round-robin slice.
        let mut slots = Vec::new();
        let mut simple_ids: std::collections::HashMap<OpKind, u16> =
            std::collections::HashMap::new();

        for mix in &profile.operations {
            let slot = match mix.op {
                OpKind::ToolsCall if !tools.is_empty() => {
                    if pinned_tool.is_some() || tools.len() == 1 {
                        Slot::ToolCallFixed { index: 0 }
                    } else {
                        Slot::ToolCall
                    }
                }
                OpKind::ToolsCall => simple_slot(OpKind::Ping, recorder, &mut simple_ids),
                OpKind::ResourcesRead if !resources.is_empty() => Slot::ResourceRead {
                    method_id: recorder.register_method(OpKind::ResourcesRead.method_name()),
                },
                OpKind::ResourcesRead => {
                    simple_slot(OpKind::ResourcesList, recorder, &mut simple_ids)
                }
                OpKind::PromptsGet if !prompts.is_empty() => Slot::PromptGet {
                    method_id: recorder.register_method(OpKind::PromptsGet.method_name()),
                },
                OpKind::PromptsGet => simple_slot(OpKind::PromptsList, recorder, &mut simple_ids),
                kind => simple_slot(kind, recorder, &mut simple_ids),
            };
            for _ in 0..mix.weight.max(1) {
                slots.push(slot);
            }
        }
        if slots.is_empty() {
            slots.push(simple_slot(OpKind::Ping, recorder, &mut simple_ids));
        }

        Self {
            slots,
            cursor: AtomicUsize::new(0),
            tools,
            tool_cursor: AtomicUsize::new(0),
            resources,
            resource_cursor: AtomicUsize::new(0),
            prompts,
            prompt_cursor: AtomicUsize::new(0),
            rng: parking_lot::Mutex::new(Mulberry32::new(seed)),
        }
    }

    fn next_slot(&self) -> Slot {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        self.slots[idx]
    }

    /// Execute one operation from the mix and record its outcome.
    pub async fn run_one(&self, client: &McpClient, recorder: &Recorder) {
        match self.next_slot() {
            Slot::Simple { kind, method_id } => {
                self.run_simple(kind, method_id, client, recorder).await;
            }
            Slot::ToolCall => {
                let idx = self.tool_cursor.fetch_add(1, Ordering::Relaxed) % self.tools.len();
                self.run_tool(idx, client, recorder).await;
            }
            Slot::ToolCallFixed { index } => {
                self.run_tool(index, client, recorder).await;
            }
            Slot::ResourceRead { method_id } => {
                let idx =
                    self.resource_cursor.fetch_add(1, Ordering::Relaxed) % self.resources.len();
                let uri = self.resources[idx].clone();
                match client.read_resource(&uri).await {
                    Ok(reply) => recorder.success(method_id, reply.latency_ms),
                    Err(f) => recorder.transport_failure(method_id, &f),
                }
            }
            Slot::PromptGet { method_id } => {
                let idx = self.prompt_cursor.fetch_add(1, Ordering::Relaxed) % self.prompts.len();
                let target = &self.prompts[idx];
                match client.get_prompt(&target.name, target.args.clone()).await {
                    Ok(reply) => recorder.success(method_id, reply.latency_ms),
                    Err(f) => recorder.transport_failure(method_id, &f),
                }
            }
        }
    }

    async fn run_simple(
        &self,
        kind: OpKind,
        method_id: u16,
        client: &McpClient,
        recorder: &Recorder,
    ) {
        let outcome = match kind {
            OpKind::Ping => client.ping().await.map(|r| r.latency_ms),
            OpKind::ToolsList => client.list_tools().await.map(|(_, l)| l),
            OpKind::ResourcesList => client.list_resources().await.map(|(_, l)| l),
            OpKind::ResourcesTemplatesList => {
                client.list_resource_templates().await.map(|(_, l)| l)
            }
            OpKind::PromptsList => client.list_prompts().await.map(|(_, l)| l),
            // Remaining kinds have dedicated slots; reaching here means a
            // fallback substituted them already.
            _ => client.ping().await.map(|r| r.latency_ms),
        };
        match outcome {
            Ok(latency_ms) => recorder.success(method_id, latency_ms),
            Err(f) => recorder.transport_failure(method_id, &f),
        }
    }

    async fn run_tool(&self, index: usize, client: &McpClient, recorder: &Recorder) {
        let target = &self.tools[index];
        let args = {
            let mut rng = self.rng.lock();
            sampler::generate_random_args(&target.schema, &mut rng)
        };
        match client.call_tool(&target.name, args).await {
            Ok((result, latency_ms)) => {
                if result.is_error {
                    // Logical failure: the transport call succeeded but the
                    // tool reported an error. Latency is preserved.
                    let message = result
                        .content
                        .first()
                        .map(|c| c.text.clone())
                        .unwrap_or_else(|| "tool reported isError".into());
                    recorder.failure(
                        target.method_id,
                        latency_ms,
                        ErrorCategory::Server,
                        -1,
                        &message,
                    );
                } else {
                    recorder.success(target.method_id, latency_ms);
                }
            }
            Err(f) => recorder.transport_failure(target.method_id, &f),
        }
    }
}
