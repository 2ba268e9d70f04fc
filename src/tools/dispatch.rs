use anyhow::{Result, anyhow};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::llm::types::ToolCall;
use crate::tools::common::LookupTools;

fn arg_str<'a>(args: &'a JsonValue, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn arg_usize(args: &JsonValue, key: &str) -> Option<usize> {
    args.get(key).and_then(|v| v.as_u64()).map(|v| v as usize)
}

/// Execute one tool call requested by the model. The returned JSON is fed
/// back verbatim as the tool message content.
pub async fn dispatch_tool_call(tools: &LookupTools, tc: ToolCall) -> Result<JsonValue> {
    let name = tc.function.name.as_str();
    let args: JsonValue = serde_json::from_str(&tc.function.arguments)
        .map_err(|e| anyhow!("invalid arguments for {name}: {e}"))?;
    debug!(tool = name, ?args, "dispatching tool call");

    match name {
        "web_search" => {
            let query = arg_str(&args, "query")
                .ok_or_else(|| anyhow!("web_search requires a query argument"))?;
            tools.web_search(query, arg_usize(&args, "max_results")).await
        }
        "wikipedia" => {
            let query = arg_str(&args, "query")
                .ok_or_else(|| anyhow!("wikipedia requires a query argument"))?;
            tools.wikipedia(query, arg_usize(&args, "sentences")).await
        }
        other => Err(anyhow!("unknown tool: {other}")),
    }
}
