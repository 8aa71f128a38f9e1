//! Scrape demo: read name, price and rating from each product card.
//!
//! Run with: cargo run --example scrape -- --url https://shop.example/products

use clap::Parser;
use eoka_drive::{until, By, Element, LaunchOptions, Session};
use regex::Regex;
use std::time::Duration;

#[derive(Parser)]
#[command(about = "Extract product cards with element-scoped lookups")]
struct Args {
    /// Listing page to open
    #[arg(long, default_value = "https://example.com/products")]
    url: String,

    /// Show the browser window
    #[arg(long)]
    headed: bool,
}

#[derive(Debug)]
struct Product {
    name: String,
    price: String,
    rating: Option<String>,
}

async fn read_product(card: &Element) -> eoka_drive::Result<Product> {
    let name = card.find_element(By::css(".name")).await?.text().await?;
    let price = card.find_element(By::css(".price")).await?.text().await?;
    let rating = card.attribute("data-rating").await?;
    Ok(Product {
        name,
        price,
        rating,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let session = Session::launch(LaunchOptions::container().headless(!args.headed)).await?;

    let products = Session::scoped(session, move |session| async move {
        session.goto(&args.url).await?;
        session
            .wait(Duration::from_secs(10))
            .until(until::element_present(By::class_name("product")))
            .await?;

        let mut products = Vec::new();
        for card in session.find_elements(By::class_name("product")).await? {
            match read_product(&card).await {
                Ok(p) => products.push(p),
                Err(e) => println!("✗ {}: {}", card, e),
            }
        }
        Ok(products)
    })
    .await?;

    let amount = Regex::new(r"[\d.,]+")?;
    let mut total = 0.0;
    println!("=== {} products ===", products.len());
    for p in &products {
        println!(
            "✓ {} | {} | rating {}",
            p.name,
            p.price,
            p.rating.as_deref().unwrap_or("n/a")
        );
        if let Some(m) = amount.find(&p.price) {
            total += m.as_str().replace(',', "").parse::<f64>().unwrap_or(0.0);
        }
    }
    if !products.is_empty() {
        println!("Average price: {:.2}", total / products.len() as f64);
    }
    Ok(())
}
