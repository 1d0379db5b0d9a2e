//! Tools listing command

use anyhow::Result;
use colored::Colorize;
use sandloop_core::tools::ToolName;
use tracing::info;

/// Show available tools
pub async fn tools_command() -> Result<()> {
    info!("Listing available tools");

    println!("🛠️  Available Tools\n");

    for tool in ToolName::ALL {
        println!("📦 {}", tool.as_str().bold());
        println!("   {}", tool.description());
        for param in tool.params() {
            let marker = if param.required {
                "required".yellow()
            } else {
                "optional".dimmed()
            };
            let mut line = format!("     - {} ({})", param.name, marker);
            if let Some(default) = param.default {
                line.push_str(&format!(" default: {}", default));
            }
            if let Some(allowed) = param.allowed {
                line.push_str(&format!(" one of: {}", allowed.join(", ")));
            }
            println!("{}", line);
        }
        println!();
    }

    Ok(())
}
