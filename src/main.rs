use clap::{Parser, Subcommand};
use gmail_assistant::credentials::{default_credentials_path, linked_account};
use gmail_assistant::logging::setup_stderr_logging;
use gmail_assistant::{oauth, setup_logging, AssistantServer, Config};
use log::{debug, error, info, LevelFilter};
use mcp_attr::server::serve_stdio;
use std::env;
use std::process::exit;

type MainResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[clap(name = "Gmail Assistant")]
#[clap(version = "0.3.0")]
#[clap(about = "Personal-assistant MCP server for Gmail and Google Calendar", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Log to stderr only, never to a file
    #[clap(long, short, action)]
    memory_only: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over stdio (the default)
    #[clap(name = "server")]
    Server,

    /// Link a Google account through the browser consent flow
    #[clap(name = "auth")]
    Auth,

    /// Check that the linked account's credentials still work
    #[clap(name = "test")]
    Test,

    /// Look up email addresses for names in the linked mailbox
    #[clap(name = "resolve")]
    Resolve {
        /// Names to look up
        #[clap(required = true)]
        names: Vec<String>,
    },
}

fn load_config() -> Config {
    Config::from_env().unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        eprintln!("Set GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET in your .env file.");
        exit(1)
    })
}

async fn link_account() -> MainResult {
    let config = load_config();
    println!("Opening Google consent screen...");
    match oauth::run_oauth_flow(&config).await {
        Ok(account) => println!("✅ Linked {}", account.email),
        Err(e) => {
            eprintln!("Linking failed: {}", e);
            exit(1);
        }
    }
    Ok(())
}

async fn check_credentials() -> MainResult {
    let config = load_config();
    let Some(account) = linked_account(&config, default_credentials_path().as_deref())? else {
        eprintln!("❌ No Google account linked. Run the 'auth' command first.");
        exit(1);
    };

    match oauth::test_credentials(&config, &account).await {
        Ok(summary) => println!("{}\n\n✅ {} is linked and reachable.", summary, account.email),
        Err(e) => {
            eprintln!("❌ Credentials for {} were rejected: {}", account.email, e);
            eprintln!("\nRun the 'auth' command to link the account again.");
            exit(1);
        }
    }
    Ok(())
}

async fn resolve(names: Vec<String>) -> MainResult {
    let server = AssistantServer::from_config(load_config()).await;
    let response = server.resolve_names(&names).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn run_server(stderr_only: bool) -> MainResult {
    let log_target = if stderr_only {
        setup_stderr_logging(LevelFilter::Debug);
        String::from("stderr")
    } else {
        setup_logging(LevelFilter::Debug, None)?
    };
    info!("Gmail Assistant starting, logging to {}", log_target);

    let server = AssistantServer::from_config(load_config()).await;
    info!("Serving MCP over stdio for {}", server.owner());

    let served = serve_stdio(server).await;
    match &served {
        Ok(()) => info!("MCP session ended"),
        Err(e) => error!("MCP server stopped with an error: {}", e),
    }

    debug!("Exiting");
    served.map_err(|e| e.into())
}

#[tokio::main]
async fn main() -> MainResult {
    let cli = Cli::parse();
    let stderr_only = cli.memory_only || env::var("MCP_READ_ONLY").is_ok();

    match cli.command {
        Some(Commands::Auth) => {
            setup_stderr_logging(LevelFilter::Info);
            link_account().await
        }
        Some(Commands::Test) => {
            setup_stderr_logging(LevelFilter::Info);
            check_credentials().await
        }
        Some(Commands::Resolve { names }) => {
            setup_stderr_logging(LevelFilter::Info);
            resolve(names).await
        }
        Some(Commands::Server) | None => run_server(stderr_only).await,
    }
}
