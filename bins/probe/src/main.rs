#![forbid(unsafe_code)]

//! Connectivity probe: signs in with credentials from the environment and
//! logs the mirrored space list once the session settles.

use cota_sync_client::Session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = cota_sync_app::AppConfig::from_env()?;
    let app = cota_sync_app::build(&config);

    if let (Ok(email), Ok(password)) = (
        std::env::var("PROBE_EMAIL"),
        std::env::var("PROBE_PASSWORD"),
    ) {
        tracing::info!(%email, "signing in");
        app.client.sign_in(&email, &password).await?;
    }

    let mut sessions = app.client.watch();
    loop {
        let session = sessions.borrow_and_update().clone();
        match session {
            Session::Loading => {}
            Session::Unauthenticated => {
                tracing::info!("no active session");
                return Ok(());
            }
            Session::Authenticated(user) => {
                tracing::info!(user = %user.id, "session established");
                break;
            }
        }
        sessions.changed().await?;
    }

    for space in app.client.spaces().await {
        tracing::info!(
            id = %space.id,
            name = %space.name,
            measurements = space.measurements.len(),
            revision = space.revision,
            "space"
        );
    }

    Ok(())
}
