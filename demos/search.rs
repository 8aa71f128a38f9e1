//! Search demo: type a query, submit with Enter, list the result titles.
//!
//! Run with: cargo run --example search -- --headed

use clap::Parser;
use eoka_drive::{until, By, Key, LaunchOptions, Session};
use std::time::Duration;

#[derive(Parser)]
#[command(about = "Search and list the first five result titles")]
struct Args {
    /// Search page to open
    #[arg(long, default_value = "https://www.google.com")]
    url: String,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Query to type
    #[arg(long, default_value = "Selenium WebDriver")]
    query: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let options = LaunchOptions::container().headless(!args.headed);

    println!("Launching browser...");
    let session = Session::launch(options).await?;

    let titles = Session::scoped(session, move |session| async move {
        session.goto(&args.url).await?;

        let search = session
            .wait(Duration::from_secs(10))
            .until(until::element_present(By::name("q")))
            .await?;
        search.send_keys(&args.query).await?;
        search.send_key(Key::Enter).await?;

        let url = session
            .wait(Duration::from_secs(10))
            .until(until::url_contains("/search"))
            .await?;
        println!("✓ Results at {}", url);

        let mut titles = Vec::new();
        for h3 in session.find_elements(By::tag_name("h3")).await?.iter().take(5) {
            titles.push(h3.text().await?);
        }

        session.save_screenshot("search_results.png").await?;
        println!("✓ Saved search_results.png");
        Ok(titles)
    })
    .await?;

    println!("\n=== Top {} results ===", titles.len());
    for (i, t) in titles.iter().enumerate() {
        println!("  {}. {}", i + 1, t);
    }
    Ok(())
}
