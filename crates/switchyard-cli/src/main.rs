//! Switchyard CLI: connect to tool servers and call their tools.

mod render;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::io;
use std::path::PathBuf;
use switchyard_client::{CancellationToken, ToolCallResult, ToolClient};

#[derive(Parser)]
#[command(name = "switchyard", version, about = "Multi-transport tool-server client")]
struct Cli {
    /// Server descriptor file (overrides SWITCHYARD_SERVERS)
    #[arg(long, global = true)]
    servers: Option<PathBuf>,

    /// Enable verbose/debug logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Print the configured servers without connecting
    Servers,
    /// Connect to every server and print its state
    Status,
    /// Connect and list every discovered tool
    Tools {
        /// Include each tool's input schema
        #[arg(long)]
        schema: bool,
    },
    /// Invoke a tool by qualified name
    Call {
        /// Qualified tool name, e.g. `files.read_file`
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Read a resource from one server
    Read { server: String, uri: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let path = switchyard_config::descriptor_path(cli.servers.as_deref());
    let configs = switchyard_config::load_servers(&path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    tracing::debug!("Loaded {} server(s) from {}", configs.len(), path.display());

    if let Command::Servers = cli.command {
        render::servers(&path, &configs);
        return Ok(());
    }
    if configs.is_empty() {
        bail!("No servers configured in {}", path.display());
    }

    let client = ToolClient::new(configs);
    let outcome = run(&client, cli.command).await;
    client.disconnect_all().await;
    outcome
}

async fn run(client: &ToolClient, command: Command) -> Result<()> {
    let connected = client.connect_all().await;

    match command {
        Command::Servers => Ok(()),
        Command::Status => {
            render::status(&client.server_status().await);
            Ok(())
        }
        Command::Tools { schema } => {
            require_connection(connected)?;
            render::tools(&client.list_tools().await, schema);
            Ok(())
        }
        Command::Call { tool, params } => {
            require_connection(connected)?;
            let params: serde_json::Value =
                serde_json::from_str(&params).context("--params is not valid JSON")?;
            if !params.is_object() {
                bail!("--params must be a JSON object");
            }

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });
            let result = client.invoke_tool_with_cancel(&tool, params, &cancel).await;
            interrupt.abort();

            let value = result.with_context(|| format!("Tool '{tool}' failed"))?;
            match ToolCallResult::from_value(&value) {
                Some(parsed) => {
                    render::tool_result(&parsed);
                    if parsed.is_error {
                        bail!("Tool '{tool}' reported an error");
                    }
                }
                None => render::json(&value),
            }
            Ok(())
        }
        Command::Read { server, uri } => {
            require_connection(connected)?;
            let value = client
                .read_resource(&server, &uri)
                .await
                .with_context(|| format!("Failed to read {uri} from '{server}'"))?;
            render::json(&value);
            Ok(())
        }
    }
}

fn require_connection(connected: bool) -> Result<()> {
    if !connected {
        bail!("No server could be connected (run `switchyard status` for details)");
    }
    Ok(())
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_with_params() {
        let cli = Cli::parse_from([
            "switchyard",
            "--servers",
            "/tmp/servers.json",
            "call",
            "files.read_file",
            "--params",
            r#"{"path":"/etc/hosts"}"#,
        ]);
        assert_eq!(cli.servers, Some(PathBuf::from("/tmp/servers.json")));
        match cli.command {
            Command::Call { tool, params } => {
                assert_eq!(tool, "files.read_file");
                assert!(params.contains("/etc/hosts"));
            }
            _ => panic!("Expected call command"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["switchyard", "tools", "--verbose", "--log-format", "json"]);
        assert!(cli.verbose);
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(matches!(cli.command, Command::Tools { schema: false }));
    }

    #[test]
    fn call_params_default_to_empty_object() {
        let cli = Cli::parse_from(["switchyard", "call", "a.b"]);
        match cli.command {
            Command::Call { params, .. } => assert_eq!(params, "{}"),
            _ => panic!("Expected call command"),
        }
    }

    #[test]
    fn read_takes_server_and_uri() {
        let cli = Cli::parse_from(["switchyard", "read", "docs", "file:///readme"]);
        assert!(matches!(
            cli.command,
            Command::Read { ref server, ref uri } if server == "docs" && uri == "file:///readme"
        ));
    }

    #[test]
    fn no_connection_is_an_error() {
        assert!(require_connection(false).is_err());
        assert!(require_connection(true).is_ok());
    }
}
