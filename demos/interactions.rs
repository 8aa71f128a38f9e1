//! Interaction tour: every locator strategy plus the common element
//! operations, each run best-effort so one failure does not hide the rest.
//!
//! Run with: cargo run --example interactions -- --headed

use clap::Parser;
use eoka_drive::{ActionChain, Batch, By, Key, LaunchOptions, Select, Session};
use std::time::Duration;

#[derive(Parser)]
#[command(about = "Best-effort tour of locators and element operations")]
struct Args {
    /// Page with a form, a dropdown, a checkbox and links
    #[arg(long, default_value = "https://www.selenium.dev/selenium/web/web-form.html")]
    url: String,

    /// Show the browser window
    #[arg(long)]
    headed: bool,
}

async fn tour(session: &Session, batch: &mut Batch) {
    println!("=== Locators ===");
    let locators = [
        ("by id", By::id("my-text-id")),
        ("by name", By::name("my-password")),
        ("by class name", By::class_name("form-control")),
        ("by css", By::css("input[type='checkbox']")),
        ("by xpath", By::xpath("//button[@type='submit']")),
        ("by tag name", By::tag_name("h1")),
        ("by link text", By::link_text("Return to index")),
        ("by partial link text", By::partial_link_text("Return")),
    ];
    for (name, locator) in locators {
        batch
            .step_shown(name, async { session.find_element(locator).await })
            .await;
    }

    println!("=== Interactions ===");
    batch
        .step_shown("select from dropdown", async {
            let select = Select::new(session.find_element(By::name("my-select")).await?).await?;
            select.select_by_visible_text("Two").await?;
            select.first_selected_option().await?.text().await
        })
        .await;
    batch
        .step_shown("toggle checkbox", async {
            let check = session.find_element(By::id("my-check-2")).await?;
            check.click().await?;
            check.is_selected().await
        })
        .await;
    batch
        .step_shown("read heading", async {
            session.find_element(By::tag_name("h1")).await?.text().await
        })
        .await;
    batch
        .step_shown("read link href", async {
            let link = session.find_element(By::link_text("Return to index")).await?;
            Ok(link.attribute("href").await?.unwrap_or_default())
        })
        .await;
    batch
        .step_shown("list inputs", async {
            let inputs = session.find_elements(By::tag_name("input")).await?;
            let mut names = Vec::new();
            for input in inputs.iter().take(5) {
                names.push(input.attribute("name").await?.unwrap_or_default());
            }
            Ok(format!("{} inputs, first: {}", inputs.len(), names.join(", ")))
        })
        .await;
    batch
        .step("hover submit", async {
            let submit = session.find_element(By::css("button[type='submit']")).await?;
            ActionChain::new(session)
                .move_to(&submit)
                .pause(Duration::from_millis(200))
                .perform()
                .await
        })
        .await;
    batch
        .step("scroll", async { session.scroll_by(0, 500).await })
        .await;
    // Both of these submit the form, so they run last.
    batch
        .step_shown("click button", async {
            let button = session.find_element(By::css("button[type='submit']")).await?;
            button.click().await?;
            let landed = session.current_url().await?;
            session.back().await?;
            Ok(landed)
        })
        .await;
    batch
        .step_shown("type and press enter", async {
            let input = session.find_element(By::id("my-text-id")).await?;
            input.clear().await?;
            input.send_keys("Hello from eoka-drive").await?;
            input.send_key(Key::Enter).await?;
            session.current_url().await
        })
        .await;
    batch
        .step("screenshot", async {
            session.save_screenshot("interactions.png").await
        })
        .await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let session = Session::launch(LaunchOptions::container().headless(!args.headed)).await?;
    session.set_implicit_wait(Duration::from_secs(2));

    let records = Session::scoped(session, move |session| async move {
        session.goto(&args.url).await?;
        let mut batch = Batch::new();
        tour(&session, &mut batch).await;
        Ok(batch.into_records())
    })
    .await?;

    for record in &records {
        println!("{}", record);
    }
    let failed = records.iter().filter(|r| !r.succeeded()).count();
    println!("\n{} steps, {} failed", records.len(), failed);
    Ok(())
}
