use std::sync::Arc;

use clap::{Parser, Subcommand};
use sessiongate::{
    AccessPolicy, AuthError, ErrorCode, GoTrueClient, NavigationError, ProviderConfig, Router, SessionStore,
    StoreOptions, routes::RouteKind,
};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{message} ({source})")]
    Auth {
        message: String,
        #[source]
        source: AuthError,
    },
    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

#[derive(Parser, Debug)]
#[command(name = "sessiongate", about = "Session store and route guard against a Supabase Auth project")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the route table and access policies.
    Routes,
    /// Navigate without signing in and print where each path settles.
    Visit { paths: Vec<String> },
    /// Sign in, navigate, then sign out.
    Login {
        #[arg(long, env = "SESSIONGATE_EMAIL")]
        email: String,
        #[arg(long, env = "SESSIONGATE_PASSWORD", hide_env_values = true)]
        password: String,
        /// Paths to visit while signed in.
        #[arg(long = "visit")]
        visit: Vec<String>,
    },
    /// Create an account.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Missing config is reported here once; the store still starts and every
/// provider call fails with `NotConfigured`.
fn build_store() -> SessionStore {
    let (client, options) = match ProviderConfig::from_env() {
        Ok(config) => (GoTrueClient::from_config_or_unconfigured(&config), StoreOptions::from_config(&config)),
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "identity provider not configured");
            (GoTrueClient::unconfigured(), StoreOptions::default())
        }
    };
    SessionStore::new(Arc::new(client), options)
}

async fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Routes => {
            print_routes();
            Ok(())
        }
        Command::Visit { paths } => {
            let store = build_store();
            store.check_session().await;
            visit_all(&Router::for_store(&store), &paths).await
        }
        Command::Login { email, password, visit } => run_login(&email, &password, &visit).await,
        Command::Register { email, password } => run_register(&email, &password).await,
    }
}

fn print_routes() {
    for route in sessiongate::RouteTable::application().iter() {
        match &route.kind {
            RouteKind::View { name, policy } => {
                let policy = match policy {
                    AccessPolicy::Open => "open",
                    AccessPolicy::RequiresAuth => "requires auth",
                    AccessPolicy::RequiresAnonymous => "requires anonymous",
                };
                println!("{:<24} {name:<20} {policy}", route.path);
            }
            RouteKind::Redirect { to } => println!("{:<24} -> {to}", route.path),
        }
    }
}

async fn visit_all(router: &Router, paths: &[String]) -> Result<(), CliError> {
    for path in paths {
        let nav = router.navigate(path).await?;
        if nav.was_redirected() {
            println!("{} -> {} ({}, {:?})", nav.requested, nav.settled, nav.route, nav.guard_outcome());
        } else {
            println!("{} ({})", nav.settled, nav.route);
        }
    }
    Ok(())
}

async fn run_login(email: &str, password: &str, visit: &[String]) -> Result<(), CliError> {
    let store = build_store();
    store.check_session().await;

    if let Err(source) = store.login(email, password).await {
        let message = store.error().unwrap_or_default();
        return Err(CliError::Auth { message, source });
    }
    if let Some(user) = store.user() {
        println!("signed in as {} ({})", user.display_name(), user.id);
    }

    let result = visit_all(&Router::for_store(&store), visit).await;

    store.logout().await;
    match store.error() {
        Some(message) => eprintln!("{message}"),
        None => println!("signed out"),
    }
    store.teardown();
    result
}

async fn run_register(email: &str, password: &str) -> Result<(), CliError> {
    let store = build_store();
    match store.register(email, password).await {
        Ok(response) if response.session.is_some() => println!("registered and signed in"),
        Ok(_) => println!("registered; confirm the email before signing in"),
        Err(source) => {
            let message = store.error().unwrap_or_default();
            return Err(CliError::Auth { message, source });
        }
    }
    store.teardown();
    Ok(())
}
