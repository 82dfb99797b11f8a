//! MCP session CLI with a demo tool server and client.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use mcp_session::config::{resolve_listen_addr, SessionConfig};
use mcp_session::tools::ToolRegistry;
use mcp_session::types::{ServerCapabilities, CRATE_NAME};
use mcp_session::{server, McpClient};

#[derive(Parser)]
#[command(
    name = "mcp-session",
    about = "Bidirectional MCP session engine with a demo tool server and client",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the tool server over stdio (default).
    Serve,

    /// Start the tool server over TCP, one session per connection.
    ServeTcp {
        /// Listen address (host:port). Also reads MCP_LISTEN_ADDR.
        #[arg(long)]
        addr: Option<String>,
    },

    /// Connect to a TCP server, list its tools and call one.
    Call {
        /// Server address (host:port).
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,

        /// Tool to call.
        #[arg(long, default_value = "echo")]
        tool: String,

        /// Tool arguments as a JSON object.
        #[arg(long, default_value = r#"{"message":"Hello, MCP!"}"#)]
        args: String,
    },

    /// Print server capabilities as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   mcp-session completions bash > ~/.local/share/bash-completion/completions/mcp-session
    ///   mcp-session completions zsh > ~/.zfunc/_mcp-session
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = SessionConfig::from_env();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            server::serve_stdio(config).await?;
        }

        Commands::ServeTcp { addr } => {
            let addr = resolve_listen_addr(addr.as_deref());
            server::serve_tcp(&addr, config).await?;
        }

        Commands::Call { addr, tool, args } => {
            let arguments: serde_json::Value = serde_json::from_str(&args)?;
            let client = McpClient::connect_tcp(&addr, config).await?;

            let init = client.initialize().await?;
            println!(
                "Connected to {} v{} (protocol {})",
                init.server_info.name, init.server_info.version, init.protocol_version
            );

            let tools = client.list_tools().await?;
            println!("Available tools:");
            for t in &tools {
                println!("  - {}: {}", t.name, t.description.as_deref().unwrap_or(""));
            }

            let result = client.call_tool(&tool, arguments).await;
            client.close().await?;
            println!("{}", serde_json::to_string_pretty(&result?)?);
        }

        Commands::Info => {
            let tools = ToolRegistry::list_tools();
            let info = serde_json::json!({
                "server": config.implementation,
                "protocol_version": config.protocol_version,
                "supported_versions": config.supported_versions,
                "capabilities": ServerCapabilities::tools_only(true),
                "tools": tools.iter().map(|t| &t.name).collect::<Vec<_>>(),
                "tool_count": tools.len(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, CRATE_NAME, &mut std::io::stdout());
        }
    }

    Ok(())
}
