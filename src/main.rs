use std::path::PathBuf;
use std::sync::Arc;

use clap::{Arg, ArgAction, Command};

use agentcore_memory::{provider_from_config, EmbeddingConfig, MemoryStore, MemoryStoreConfig, SqliteVectorIndex};
use agentcore_orchestrator::{intent::RuleBasedIntentParser, Orchestrator, TurnRequest};
use agentcore_runtime::ToolRuntime;
use agentcore_store::Store;
use agentcore_types::{Environment, Modality, Session, SessionId, UserId};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn environment_from_env() -> Environment {
    match std::env::var("AGENTCORE_ENV").as_deref() {
        Ok("production") => Environment::Production,
        Ok("test") => Environment::Test,
        _ => Environment::Development,
    }
}

struct Wiring {
    store: Arc<Store>,
    memory: Arc<MemoryStore>,
    orchestrator: Arc<Orchestrator>,
}

fn build(db_path: &str) -> anyhow::Result<Wiring> {
    let store = Arc::new(Store::open(&PathBuf::from(db_path))?);
    let embedding_config = EmbeddingConfig::from_env();
    let embedding = provider_from_config(&embedding_config);
    let vector = Box::new(SqliteVectorIndex::new(store.clone()));
    let memory = Arc::new(MemoryStore::new(
        store.clone(),
        embedding,
        vector,
        MemoryStoreConfig::default(),
        environment_from_env(),
    ));
    let runtime = Arc::new(ToolRuntime::new(store.clone(), memory.clone()));
    let parser = Arc::new(RuleBasedIntentParser::new());
    let orchestrator = Arc::new(Orchestrator::new(store.clone(), memory.clone(), runtime, parser));
    Ok(Wiring { store, memory, orchestrator })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let matches = Command::new("agentcore")
        .version(VERSION)
        .about("Agent execution core: sessions, orchestration, policy-gated tools, and long-term memory")
        .arg(
            Arg::new("db")
                .long("db")
                .value_name("PATH")
                .help("Path to the SQLite database file")
                .default_value("agentcore.db")
                .global(true),
        )
        .subcommand(
            Command::new("serve")
                .about("Start the dev-only HTTP API")
                .arg(
                    Arg::new("addr")
                        .long("addr")
                        .value_name("ADDR")
                        .help("Address to bind the HTTP listener to")
                        .default_value("127.0.0.1:8080"),
                ),
        )
        .subcommand(
            Command::new("turn")
                .about("Send one message through the orchestrator and print the reply")
                .arg(
                    Arg::new("user")
                        .long("user")
                        .value_name("USER_ID")
                        .help("User id (generated if omitted)"),
                )
                .arg(
                    Arg::new("session")
                        .long("session")
                        .value_name("SESSION_ID")
                        .help("Session id (generated if omitted)"),
                )
                .arg(
                    Arg::new("scope")
                        .long("scope")
                        .action(ArgAction::Append)
                        .value_name("SCOPE")
                        .help("Effective scope granted for this turn (repeatable)"),
                )
                .arg(Arg::new("content").required(true).help("Message content")),
        )
        .get_matches();

    let db_path = matches.get_one::<String>("db").unwrap().clone();

    match matches.subcommand() {
        Some(("serve", sub)) => {
            #[cfg(feature = "http-api")]
            {
                let wiring = build(&db_path)?;
                let state = Arc::new(agentcore_api::AppState {
                    store: wiring.store,
                    memory: wiring.memory,
                    orchestrator: wiring.orchestrator,
                });
                let addr: std::net::SocketAddr = sub.get_one::<String>("addr").unwrap().parse()?;
                agentcore_api::serve(state, addr).await?;
            }
            #[cfg(not(feature = "http-api"))]
            {
                let _ = sub;
                eprintln!("built without the http-api feature");
                std::process::exit(1);
            }
        }
        Some(("turn", sub)) => {
            let wiring = build(&db_path)?;
            let user_id = sub
                .get_one::<String>("user")
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or_else(UserId::new);
            let session_id = sub
                .get_one::<String>("session")
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or_else(SessionId::new);
            let effective_scopes = sub
                .get_many::<String>("scope")
                .map(|vals| vals.cloned().collect())
                .unwrap_or_default();
            let content = sub.get_one::<String>("content").unwrap().clone();

            // The CLI has no separate session-provisioning step (unlike the
            // HTTP API's `POST /sessions`), so it bootstraps both rows here.
            wiring.store.ensure_user(user_id).await?;
            if wiring.store.get_session(session_id).await?.is_none() {
                wiring
                    .store
                    .create_session(&Session {
                        id: session_id,
                        user_id,
                        started_at: chrono::Utc::now(),
                        expires_at: None,
                        revoked_at: None,
                        scopes_override: None,
                    })
                    .await?;
            }

            let response = wiring
                .orchestrator
                .turn(TurnRequest {
                    session_id,
                    user_id,
                    content,
                    modality: Modality::Text,
                    idempotency_key: None,
                    effective_scopes,
                })
                .await?;
            println!("{}", response.assistant_text);
            if let Some(pending) = response.pending_confirmation {
                println!("(pending confirmation {}: {})", pending.id, pending.prompt);
            }
        }
        _ => {
            println!("agentcore v{VERSION}");
            println!("Use --help for available commands");
        }
    }

    Ok(())
}
