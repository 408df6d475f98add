use std::sync::Arc;

use admin_session::{
    FileStore, Navigation, NavigationGuard, RouteTarget, Session, SessionConfig, SessionError,
};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "admin-session", about = "Admin console session CLI")]
struct Cli {
    /// Overrides `ADMIN_API_BASE_URL`.
    #[arg(long)]
    base_url: Option<String>,

    /// Overrides `ADMIN_TOKEN_STORE`.
    #[arg(long)]
    token_store: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        email: String,
        #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    /// Validate the stored token and print the user.
    Whoami,
    Refresh,
    Health,
    /// Authenticated GET against the admin API.
    Get {
        path: String,
    },
    /// Print what the navigation guard decides for a route.
    Guard {
        path: String,
        #[arg(long, default_value_t = false)]
        public: bool,
    },
    /// Adopt the token from an auth-service callback URL.
    Adopt {
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), SessionError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = SessionConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.api_base_url = base_url.trim_end_matches('/').to_owned();
    }
    if let Some(path) = cli.token_store {
        config.token_store_path = path;
    }

    let store = Arc::new(FileStore::new(config.token_store_path.clone()));
    let session = Session::new(&config, store)?;

    match cli.command {
        Command::Login { email, password } => {
            let user = session.login(&email, &password).await?;
            println!("signed in as {} <{}>", user.full_name(), user.email);
        }
        Command::Logout => {
            session.logout().await;
            println!("signed out");
        }
        Command::Whoami => {
            session.check_auth().await;
            match session.user() {
                Some(user) => {
                    print_json(&serde_json::to_value(&user).map_err(|e| SessionError::Decode(e.to_string()))?)?;
                    if !session.admin_orgs().is_empty() {
                        println!("admin of: {}", session.admin_orgs().join(", "));
                    }
                }
                None => print_navigation(&config.redirect.reauthenticate(&config.app_origin, None)),
            }
        }
        Command::Refresh => {
            session.refresh_token().await?;
            println!("token refreshed");
        }
        Command::Health => {
            let healthy = session.gateway().health_check().await;
            println!("{}", if healthy { "ok" } else { "unreachable" });
        }
        Command::Get { path } => match session.gateway().get::<Value>(&path).await {
            Ok(body) => print_json(&body)?,
            Err(e) => {
                if let Some(nav) = e.navigation() {
                    print_navigation(nav);
                }
                return Err(e);
            }
        },
        Command::Guard { path, public } => {
            let target = if public { RouteTarget::public(path) } else { RouteTarget::protected(path) };
            let guard = NavigationGuard::new(session, &config);
            print_navigation(&guard.before_each(&target).await);
        }
        Command::Adopt { url } => {
            let next = session.adopt_callback_token(&url).await?;
            print_navigation(&Navigation::External(next));
        }
    }
    Ok(())
}

fn print_navigation(nav: &Navigation) {
    println!("{nav}");
}

fn print_json(value: &Value) -> Result<(), SessionError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| SessionError::Decode(e.to_string()))?;
    println!("{text}");
    Ok(())
}
