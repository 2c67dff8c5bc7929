//! Signs in against a running campusfund backend and reports what the
//! session layer does.
//!
//! ```text
//! CAMPUSFUND_API_BASE_URL=http://localhost:8000 \
//! CAMPUSFUND_EMAIL=ada@uni.edu CAMPUSFUND_PASSWORD=... \
//! RUST_LOG=campusfund_session=debug cargo run -p session-probe
//! ```
//!
//! The session is kept in `CAMPUSFUND_SESSION_FILE` (default
//! `.campusfund-session.json`), so a second run resumes without signing
//! in. Pass `--logout` to sign out at the end.

use campusfund::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_SESSION_FILE: &str = ".campusfund-session.json";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let session_file = std::env::var("CAMPUSFUND_SESSION_FILE")
        .unwrap_or_else(|_| DEFAULT_SESSION_FILE.to_string());
    let config = ClientConfig::from_env();
    tracing::info!(base_url = %config.base_url, session_file = %session_file, "starting");

    let client = ApiClient::builder()
        .config(config)
        .build(FileStorage::open(&session_file)?)?;

    let mut notices = client.subscribe();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            eprintln!("session notice: {notice}");
        }
    });

    let auth = AuthService::new(client);
    let user = match auth.bootstrap().await {
        Ok(Some(user)) => {
            println!("resumed stored session");
            user
        }
        Ok(None) => auth.login(&credentials_from_env()?).await?,
        Err(e) if e.is_unauthorized() => {
            println!("stored session was rejected, signing in again");
            auth.login(&credentials_from_env()?).await?
        }
        Err(e) => return Err(e.into()),
    };

    println!("signed in as {} <{}>", user.display_name(), user.email);
    println!("  role:    {:?}", user.role);
    if let Some(balance) = &user.current_balance {
        println!("  balance: {balance}");
    }

    if std::env::args().any(|a| a == "--logout") {
        auth.logout()?;
        println!("signed out");
    }

    // Let the notice task print anything still queued.
    tokio::task::yield_now().await;
    Ok(())
}

fn credentials_from_env() -> Result<Credentials, Box<dyn std::error::Error>> {
    let email = std::env::var("CAMPUSFUND_EMAIL")
        .map_err(|_| "set CAMPUSFUND_EMAIL to sign in")?;
    let password = std::env::var("CAMPUSFUND_PASSWORD")
        .map_err(|_| "set CAMPUSFUND_PASSWORD to sign in")?;
    Ok(Credentials::new(email, password))
}
