use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use a3s_agent_wallet::artifact::{self, DeploymentArtifact, DEFAULT_ARTIFACT_PATH};
use a3s_agent_wallet::decision::{decide, RandomSource, StdRandom};
use a3s_agent_wallet::provider::memory::MemoryChain;
use a3s_agent_wallet::provider::rpc::{RpcConfig, RpcProvider};
use a3s_agent_wallet::provider::WalletProvider;
use a3s_agent_wallet::units::shorten_address;
use a3s_agent_wallet::{AgentWallet, Notice, OperationReport, Result, WalletConfig, WalletError};

#[derive(Parser)]
#[command(
    name = "a3s-agent",
    about = "a3s-agent: operate an autonomous on-chain agent wallet"
)]
struct Cli {
    /// JSON-RPC endpoint of the wallet node
    #[arg(long, env = "A3S_RPC_URL", default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// Deployment artifact holding the factory address
    #[arg(long, env = "A3S_ARTIFACT", default_value = DEFAULT_ARTIFACT_PATH)]
    artifact: PathBuf,

    /// Optional TOML file with agent name, amounts and timeouts
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive operator session
    Session {
        /// Attach to an existing agent contract
        #[arg(long)]
        agent: Option<String>,
        /// Seed the decision routine for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
        /// Use an in-process simulated chain instead of the RPC node
        #[arg(long)]
        simulate: bool,
    },
    /// Deploy the agent factory and write the deployment artifact
    DeployFactory {
        /// Creation bytecode: hex file or compiler JSON artifact
        #[arg(long)]
        bytecode: PathBuf,
    },
    /// Print one agent decision as JSON
    Decide {
        #[arg(long)]
        seed: Option<u64>,
    },
}

const HELP: &str = "\
commands:
  connect        authorize the wallet account
  deploy         deploy a new agent through the factory
  balance        refresh the agent balance
  deposit        fund the agent
  pay            have the agent pay the mock API
  send           have the agent send funds back to you
  decide         let the agent decide what to do
  attach <addr>  use an existing agent contract
  reset          forget the current agent
  agents         list agents recorded by the factory
  status         show session details
  help           show this help
  quit           leave the session";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .without_time()
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {e}", "[a3s-agent]".red().bold());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => WalletConfig::from_file(path)?,
        None => WalletConfig::default(),
    };

    match &cli.command {
        Commands::Session {
            agent,
            seed,
            simulate,
        } => {
            let (provider, factory) = if *simulate {
                let chain = Arc::new(MemoryChain::default());
                let factory = chain.install_factory();
                println!("{} simulated chain, factory {}", "→".cyan(), factory);
                (Some(chain as Arc<dyn WalletProvider>), Some(factory))
            } else {
                (detect_rpc(&cli.rpc_url).await, load_factory(&cli.artifact))
            };

            let random: Box<dyn RandomSource> = match seed {
                Some(seed) => Box::new(StdRandom::seeded(*seed)),
                None => Box::new(StdRandom::from_entropy()),
            };
            let wallet = AgentWallet::new(provider, factory, config)?.with_random_source(random);

            if wallet.start().await {
                println!(
                    "{} session restored for {}",
                    "✓".green(),
                    wallet.snapshot().account_display().cyan()
                );
            }
            if let Some(addr) = agent {
                wallet.orchestrator().attach_agent(addr)?;
            }
            session(&wallet).await
        }

        Commands::DeployFactory { bytecode } => {
            let raw = tokio::fs::read_to_string(bytecode).await.map_err(|e| {
                WalletError::Config(format!("Failed to read {}: {}", bytecode.display(), e))
            })?;
            let code = artifact::parse_bytecode(&raw)?;
            let provider = RpcProvider::connect(RpcConfig::new(&cli.rpc_url)).await?;

            let factory = artifact::deploy_factory(&provider, code, &cli.artifact).await?;
            println!("{} factory deployed at {}", "✓".green(), factory.to_string().cyan());
            println!("  artifact written to {}", cli.artifact.display());
            Ok(())
        }

        Commands::Decide { seed } => {
            let amounts = config.validate()?;
            let mut random = match seed {
                Some(seed) => StdRandom::seeded(*seed),
                None => StdRandom::from_entropy(),
            };
            let decision = decide(random.next_unit(), config.decision_threshold, amounts.api_payment);
            println!("{}", serde_json::to_string(&decision)?);
            Ok(())
        }
    }
}

/// A node that does not answer counts as "no wallet detected"
async fn detect_rpc(url: &str) -> Option<Arc<dyn WalletProvider>> {
    match RpcProvider::connect(RpcConfig::new(url)).await {
        Ok(provider) => Some(Arc::new(provider)),
        Err(e) => {
            tracing::warn!(url, error = %e, "No wallet node reachable");
            None
        }
    }
}

fn load_factory(path: &std::path::Path) -> Option<alloy_primitives::Address> {
    match DeploymentArtifact::load(path) {
        Ok(artifact) => Some(artifact.factory),
        Err(e) => {
            tracing::warn!(error = %e, "Factory address unavailable; deploy is disabled");
            None
        }
    }
}

async fn session(wallet: &AgentWallet) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    println!("{}", HELP.dimmed());

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };

        let orchestrator = wallet.orchestrator();
        // failures are recorded in the shared state and shown as its notice
        let outcome: Result<()> = match command {
            "connect" => wallet.connection().connect().await.map(|_| ()),
            "deploy" => orchestrator.deploy_agent().await.map(|r| print_report(&r)),
            "balance" => orchestrator.refresh_balance().await.map(|_| ()),
            "deposit" => orchestrator.deposit().await.map(|r| print_report(&r)),
            "pay" => orchestrator.pay_for_api().await.map(|r| print_report(&r)),
            "send" => orchestrator.send_to_owner().await.map(|r| print_report(&r)),
            "decide" => orchestrator.run_decision().await.map(|report| {
                println!("  draw {:.4} → {}", report.draw, serde_json::json!(report.decision));
            }),
            "attach" => match words.next() {
                Some(addr) => orchestrator.attach_agent(addr).map(|_| ()),
                None => {
                    println!("usage: attach <address>");
                    continue;
                }
            },
            "reset" => orchestrator.reset_agent(),
            "agents" => {
                match orchestrator.deployed_agents().await {
                    Ok(agents) if agents.is_empty() => println!("  no agents recorded"),
                    Ok(agents) => {
                        for agent in agents {
                            println!("  {}", agent);
                        }
                    }
                    Err(e) => println!("{} {e}", "✗".red()),
                }
                continue;
            }
            "status" => {
                print_status(wallet);
                continue;
            }
            "help" => {
                println!("{HELP}");
                continue;
            }
            "quit" | "exit" => return Ok(()),
            other => {
                println!("unknown command '{}', try 'help'", other);
                continue;
            }
        };

        if let Err(e) = &outcome {
            tracing::debug!(command, error = %e, "Command failed");
        }
        print_notice(wallet);
    }
}

fn print_report(report: &OperationReport) {
    if let Some(tx) = report.tx {
        println!(
            "  {} {} at {}",
            "tx".dimmed(),
            shorten_address(&tx.to_string()),
            report.finished_at.format("%H:%M:%S")
        );
    }
}

fn print_notice(wallet: &AgentWallet) {
    match wallet.snapshot().notice() {
        Notice::Working(message) => println!("{} {}", "…".yellow(), message),
        Notice::Error(message) => println!("{} {}", "✗".red(), message.red()),
        Notice::Success(message) => println!("{} {}", "✓".green(), message),
        Notice::Idle => {}
    }
}

fn print_status(wallet: &AgentWallet) {
    let state = wallet.snapshot();
    let agent = state.agent.display();
    let provider = state
        .session
        .provider()
        .map(|p| p.name().to_string())
        .unwrap_or_else(|| "none".to_string());

    println!("  wallet   {}", provider);
    println!("  account  {}", state.account_display().cyan());
    if state.agent.is_deployed() {
        println!("  agent    {}", shorten_address(&agent).cyan());
        println!(
            "  balance  {} ({})",
            state.balance_display(),
            state.balance_friendly().unwrap_or_else(|| "not fetched".to_string())
        );
    } else {
        println!("  agent    {}", "not deployed".dimmed());
    }
    if let Some(factory) = wallet.orchestrator().factory() {
        println!("  factory  {}", shorten_address(&factory.to_string()));
    }
}
