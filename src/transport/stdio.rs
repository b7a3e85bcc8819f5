use anyhow::Result;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing::info;

use crate::tools::GitLabTools;

/// Serves `tools` over stdin/stdout until the client disconnects
pub async fn run_stdio_server(tools: GitLabTools) -> Result<()> {
    let server = tools.serve(stdio()).await?;
    info!("MCP stdio session initialized");

    server.waiting().await?;
    Ok(())
}
