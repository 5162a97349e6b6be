//! `quillmail` - connect to an IMAP server, report what it offers and
//! optionally sign in.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use quillmail_imap::{AuthMechanism, Client, Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Probe an IMAP server
#[derive(Parser, Debug)]
#[command(about, version)]
struct Opt {
    /// Server hostname
    host: String,

    /// Server port; 993 uses implicit TLS, anything else starts plaintext
    #[arg(long, default_value_t = quillmail_imap::connection::IMPLICIT_TLS_PORT)]
    port: u16,

    /// Accept any server certificate (testing only)
    #[arg(long)]
    insecure: bool,

    /// Seconds to wait for the connection and greeting
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Upgrade a plaintext connection with STARTTLS
    #[arg(long)]
    starttls: bool,

    /// User to sign in as; without it the session only probes
    #[arg(long, requires = "password")]
    user: Option<String>,

    /// Password for --user
    #[arg(long, env = "QUILLMAIL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// SASL mechanism for AUTHENTICATE; the strongest supported one is
    /// picked when omitted
    #[arg(long, conflicts_with = "login")]
    mechanism: Option<AuthMechanism>,

    /// Sign in with LOGIN instead of AUTHENTICATE
    #[arg(long)]
    login: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quillmail=info,quillmail_imap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let opt = Opt::parse();
    let config = Config::builder(&opt.host)
        .port(opt.port)
        .allow_invalid_certs(opt.insecure)
        .connect_timeout(Duration::from_secs(opt.timeout))
        .build();
    let client = Client::new(config);

    client
        .connect()
        .await
        .with_context(|| format!("connecting to {}:{}", opt.host, opt.port))?;
    println!("capabilities: {}", client.capabilities());

    if opt.starttls {
        client.start_tls().await.context("STARTTLS")?;
        println!("capabilities after STARTTLS: {}", client.capabilities());
    }

    if let (Some(user), Some(password)) = (&opt.user, &opt.password) {
        if opt.login {
            client.login(user, password).await.context("LOGIN")?;
        } else {
            client
                .authenticate(user, password, opt.mechanism)
                .await
                .context("AUTHENTICATE")?;
        }
        info!(user = %user, "signed in");
        println!("capabilities after sign-in: {}", client.capabilities());
    }

    client.noop().await.context("NOOP")?;
    client.logout().await.context("LOGOUT")?;
    Ok(())
}
