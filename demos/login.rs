//! Login demo: fill a credentials form and wait for the landing page.
//!
//! Run with: cargo run --example login -- --username tomsmith --password 'SuperSecretPassword!'

use clap::Parser;
use eoka_drive::{until, By, LaunchOptions, Session};
use std::time::Duration;

#[derive(Parser)]
#[command(about = "Sign in and wait for the dashboard")]
struct Args {
    /// Login page to open
    #[arg(long, default_value = "https://the-internet.herokuapp.com/login")]
    url: String,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    #[arg(long, default_value = "testuser")]
    username: String,

    #[arg(long, default_value = "password123")]
    password: String,

    /// URL fragment that marks a successful login
    #[arg(long, default_value = "/dashboard")]
    landing: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let session = Session::launch(LaunchOptions::container().headless(!args.headed)).await?;

    let landed = Session::scoped(session, move |session| async move {
        session.goto(&args.url).await?;

        let username = session
            .wait(Duration::from_secs(10))
            .until(until::element_present(By::id("username")))
            .await?;
        username.clear().await?;
        username.send_keys(&args.username).await?;
        println!("✓ Username entered");

        let password = session.find_element(By::id("password")).await?;
        password.clear().await?;
        password.send_keys(&args.password).await?;
        println!("✓ Password entered");

        session
            .find_element(By::css("button[type='submit']"))
            .await?
            .click()
            .await?;
        println!("✓ Form submitted");

        session
            .wait(Duration::from_secs(10))
            .with_message(format!("landing page containing '{}'", args.landing))
            .until(until::url_contains(args.landing.as_str()))
            .await
    })
    .await;

    match landed {
        Ok(url) => println!("✓ Logged in: {}", url),
        Err(e) => {
            println!("✗ Login failed: {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}
