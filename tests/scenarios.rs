//! End-to-end flows against the in-memory driver.
//!
//! Time is paused, so waits and delayed page behaviour are exact.

use eoka_drive::testing::{FakeDriver, FakeElement, FakePage};
use eoka_drive::{until, Batch, By, Error, ErrorKind, Key, Select, Session};
use std::time::Duration;
use tokio::time::Instant;

fn search_site() -> FakeDriver {
    let home = FakePage::new("https://engine.test/", "Search").child(
        FakeElement::new("form")
            .attr("action", "/search")
            .submits_to("/search", Duration::from_millis(600))
            .child(
                FakeElement::new("input")
                    .attr("name", "q")
                    .appears_after(Duration::from_millis(300)),
            ),
    );
    let mut results = FakePage::new("https://engine.test/search", "Results");
    for i in 1..=7 {
        results = results.child(
            FakeElement::new("div")
                .attr("class", "g")
                .child(FakeElement::new("h3").text(format!("Result {i}"))),
        );
    }
    FakeDriver::new().page(home).page(results)
}

#[tokio::test(start_paused = true)]
async fn test_search_flow() {
    let driver = search_site();
    let session = Session::new(driver.clone());

    let titles = Session::scoped(session, |session| async move {
        session.goto("https://engine.test/").await?;
        let start = Instant::now();
        let q = session
            .wait(Duration::from_secs(10))
            .until(until::element_present(By::name("q")))
            .await?;
        assert!(start.elapsed() >= Duration::from_millis(300));

        q.send_keys("Selenium WebDriver").await?;
        assert!(!session.current_url().await?.contains("/search"));
        let submitted = Instant::now();
        q.send_key(Key::Enter).await?;

        let url = session
            .wait(Duration::from_secs(10))
            .until(until::url_contains("/search"))
            .await?;
        assert!(submitted.elapsed() >= Duration::from_millis(600));
        assert!(url.contains("q=Selenium+WebDriver"));
        assert!(matches!(q.text().await, Err(Error::StaleReference(_))));

        let mut titles = Vec::new();
        for h3 in session.find_elements(By::tag_name("h3")).await?.iter().take(5) {
            titles.push(h3.text().await?);
        }
        Ok(titles)
    })
    .await
    .expect("search flow failed");

    assert_eq!(
        titles,
        vec!["Result 1", "Result 2", "Result 3", "Result 4", "Result 5"]
    );
    assert_eq!(driver.quit_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_search_timeout_still_quits() {
    let driver = search_site();
    let session = Session::new(driver.clone());

    let err = Session::scoped(session, |session| async move {
        session.goto("https://engine.test/").await?;
        session
            .wait(Duration::from_secs(2))
            .until(until::url_contains("/search"))
            .await?;
        Ok(())
    })
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(driver.quit_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_login_flow() {
    let login = FakePage::new("https://app.test/login", "Sign in").child(
        FakeElement::new("form")
            .attr("action", "/dashboard")
            .child(FakeElement::new("input").attr("id", "username").attr("name", "username"))
            .child(
                FakeElement::new("input")
                    .attr("id", "password")
                    .attr("name", "password")
                    .attr("type", "password"),
            )
            .child(FakeElement::new("button").attr("type", "submit").text("Sign in")),
    );
    let dashboard = FakePage::new("https://app.test/dashboard", "Dashboard")
        .child(FakeElement::new("h1").text("Welcome back"));
    let session = Session::new(FakeDriver::new().page(login).page(dashboard));

    session.goto("https://app.test/login").await.unwrap();
    session
        .wait(Duration::from_secs(5))
        .until(until::element_present(By::id("username")))
        .await
        .unwrap()
        .send_keys("testuser")
        .await
        .unwrap();
    session
        .find_element(By::id("password"))
        .await
        .unwrap()
        .send_keys("password123")
        .await
        .unwrap();
    session
        .find_element(By::css("button[type='submit']"))
        .await
        .unwrap()
        .click()
        .await
        .unwrap();

    session
        .wait(Duration::from_secs(5))
        .until(until::url_contains("/dashboard"))
        .await
        .unwrap();
    let h1 = session
        .wait(Duration::from_secs(5))
        .until(until::text_present_in_element(By::tag_name("h1"), "Welcome"))
        .await
        .unwrap();
    assert_eq!(h1.text().await.unwrap(), "Welcome back");
}

#[tokio::test]
async fn test_scrape_products() {
    let mut shop = FakePage::new("https://shop.test/", "Shop");
    for (name, price, rating) in [("Lamp", "$20", "4.5"), ("Desk", "$150", "4.1"), ("Chair", "$80", "3.9")] {
        shop = shop.child(
            FakeElement::new("div")
                .attr("class", "product card")
                .attr("data-rating", rating)
                .child(FakeElement::new("h2").attr("class", "name").text(name))
                .child(FakeElement::new("span").attr("class", "price").text(price)),
        );
    }
    let session = Session::new(FakeDriver::new().page(shop));
    session.goto("https://shop.test/").await.unwrap();

    let products = session.find_elements(By::class_name("product")).await.unwrap();
    let mut rows = Vec::new();
    for product in &products {
        let name = product.find_element(By::css(".name")).await.unwrap().text().await.unwrap();
        let price = product
            .find_element(By::xpath(".//span[@class='price']"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        let rating = product.attribute("data-rating").await.unwrap().unwrap();
        rows.push((name, price, rating));
    }

    assert_eq!(
        rows,
        vec![
            ("Lamp".into(), "$20".into(), "4.5".into()),
            ("Desk".into(), "$150".into(), "4.1".into()),
            ("Chair".into(), "$80".into(), "3.9".into()),
        ]
    );
}

fn tour_page() -> FakePage {
    FakePage::new("https://tour.test/", "Tour")
        .child(FakeElement::new("h1").attr("id", "title").text("Interaction tour"))
        .child(FakeElement::new("input").attr("name", "email").attr("class", "field"))
        .child(
            FakeElement::new("select")
                .attr("id", "size")
                .child(FakeElement::new("option").attr("value", "s").text("Small"))
                .child(FakeElement::new("option").attr("value", "l").text("Large")),
        )
        .child(FakeElement::new("input").attr("id", "terms").attr("type", "checkbox"))
        .child(FakeElement::new("a").attr("href", "/help").text("Need help?"))
        .child(FakeElement::new("button").attr("id", "save").attr("type", "button").text("Save"))
}

#[tokio::test]
async fn test_best_effort_tour_keeps_going() {
    let session = Session::new(FakeDriver::new().page(tour_page()));
    session.goto("https://tour.test/").await.unwrap();
    let mut batch = Batch::new();

    batch
        .step("by id", async { session.find_element(By::id("title")).await })
        .await;
    batch
        .step("by missing id", async { session.find_element(By::id("nope")).await })
        .await;
    batch
        .step("by compound class", async {
            session.find_element(By::class_name("field wide")).await
        })
        .await;
    batch
        .step("by partial link text", async {
            session.find_element(By::partial_link_text("help")).await
        })
        .await;
    batch
        .step("select large", async {
            let size = session.find_element(By::id("size")).await?;
            Select::new(size).await?.select_by_visible_text("Large").await
        })
        .await;
    let checked = batch
        .step("check terms", async {
            let terms = session.find_element(By::id("terms")).await?;
            terms.click().await?;
            terms.is_selected().await
        })
        .await;
    let href = batch
        .step_shown("read href", async {
            let link = session.find_element(By::link_text("Need help?")).await?;
            Ok(link.attribute("href").await?.unwrap_or_default())
        })
        .await;
    batch
        .step("scroll", async { session.scroll_by(0, 300).await })
        .await;

    assert_eq!(checked, Some(true));
    assert_eq!(href.as_deref(), Some("https://tour.test/help"));

    let report = batch.report();
    assert_eq!(report.total, 8);
    assert_eq!(report.failed, 2);
    let kinds: Vec<_> = batch
        .records()
        .iter()
        .filter_map(|r| r.outcome.as_ref().err().map(|e| e.kind))
        .collect();
    assert_eq!(kinds, vec![ErrorKind::NotFound, ErrorKind::Interaction]);
}
