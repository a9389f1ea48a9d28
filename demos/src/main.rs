//! Minimal stdio demo: a single `hello` tool, JSON-RPC only on stdout.
//!
//! No logging to stdout — stdio transport reserves it for protocol frames
//!. Diagnostics go to stderr via `tracing-subscriber`.

use mcp::prelude::*;

async fn hello(ctx: ToolContext, arguments: serde_json::Value) -> McpResult<ToolOutcome> {
    let name = arguments.get("name").and_then(|v| v.as_str()).unwrap_or("World");
    ctx.info(serde_json::json!({ "message": format!("greeting {name}") })).await?;
    Ok(ToolOutcome::text(format!("Hello, {name}! Welcome to MCP.")))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let tool = ToolDescriptor::new(
        "hello",
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "The name to greet" }
            }
        }),
    )
    .with_description("Say hello to someone");

    let server = McpServer::builder("mcp-demo", "0.1.0")
        .capability_tools()
        .capability_logging()
        .tool(tool, hello)
        .build();

    server.run_stdio().await?;
    Ok(())
}
