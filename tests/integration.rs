//! Integration tests against a real browser.
//!
//! These tests require Chrome to be installed and available.
//! Run with: cargo test --test integration -- --ignored

use eoka_drive::{until, By, Error, Key, LaunchOptions, Select, Session};
use std::time::Duration;

/// Check if Chrome is available
fn chrome_available() -> bool {
    eoka::stealth::patcher::find_chrome().is_ok()
}

async fn launch() -> Session {
    Session::launch(LaunchOptions::container())
        .await
        .expect("Failed to launch browser")
}

const FORM: &str = r##"data:text/html,
    <title>Form</title>
    <h1 id="title">Hello</h1>
    <input id="name" name="name" value="">
    <input id="ro" readonly value="fixed">
    <button id="off" disabled>Off</button>
    <div id="ghost" style="display:none">hidden</div>
    <select id="size"><option value="s">Small</option><option value="l">Large</option></select>
    <input id="terms" type="checkbox">
    <a id="docs" href="https://example.com/docs">Read the docs</a>
    <button id="ask" onclick="document.getElementById('answer').textContent = confirm('Sure?') ? 'yes' : 'no'">Ask</button>
    <p id="answer"></p>
"##;

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_locators_and_typing() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let session = launch().await;
    Session::scoped(session, |session| async move {
        session.goto(FORM).await?;

        let title = session.find_element(By::css("h1#title")).await?;
        assert_eq!(title.text().await?, "Hello");
        let same = session.find_element(By::xpath("//h1")).await?;
        assert_eq!(same.reference(), title.reference());

        let name = session.find_element(By::name("name")).await?;
        name.send_keys("Ada").await?;
        name.send_keys(" Lovelace").await?;
        assert_eq!(name.attribute("value").await?.as_deref(), Some("Ada Lovelace"));
        name.clear().await?;
        name.send_keys("Grace").await?;
        assert_eq!(name.attribute("value").await?.as_deref(), Some("Grace"));
        name.send_key(Key::Backspace).await?;
        assert_eq!(name.attribute("value").await?.as_deref(), Some("Grac"));

        for id in ["ro", "off", "ghost"] {
            let el = session.find_element(By::id(id)).await?;
            assert!(matches!(el.send_keys("x").await, Err(Error::NotInteractable(_))));
        }

        let link = session.find_element(By::link_text("Read the docs")).await?;
        assert_eq!(
            link.attribute("href").await?.as_deref(),
            Some("https://example.com/docs")
        );
        Ok(())
    })
    .await
    .expect("Scenario failed");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_select_checkbox_and_dialog() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let session = launch().await;
    Session::scoped(session, |session| async move {
        session.goto(FORM).await?;

        let select = Select::new(session.find_element(By::id("size")).await?).await?;
        select.select_by_value("l").await?;
        let chosen = select.first_selected_option().await?;
        assert_eq!(chosen.text().await?, "Large");

        let terms = session.find_element(By::id("terms")).await?;
        terms.click().await?;
        assert!(terms.is_selected().await?);

        session.find_element(By::id("ask")).await?.click().await?;
        let alert = session
            .wait(Duration::from_secs(2))
            .until(until::alert_present())
            .await?;
        assert_eq!(alert.text(), "Sure?");
        alert.accept().await?;
        assert!(matches!(session.switch_to().alert().await, Err(Error::NoSuchAlert)));
        let answer = session.find_element(By::id("answer")).await?;
        assert_eq!(answer.text().await?, "yes");

        let ask = session.find_element(By::id("ask")).await?;
        ask.click().await?;
        assert!(matches!(answer.text().await, Err(Error::NotInteractable(_))));
        session.switch_to().alert().await?.dismiss().await?;
        assert_eq!(answer.text().await?, "no");
        Ok(())
    })
    .await
    .expect("Scenario failed");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_navigation_makes_handles_stale() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let session = launch().await;
    Session::scoped(session, |session| async move {
        session.goto(FORM).await?;
        let title = session.find_element(By::id("title")).await?;
        session.refresh().await?;
        assert!(matches!(title.text().await, Err(Error::StaleReference(_))));
        Ok(())
    })
    .await
    .expect("Scenario failed");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_frames_round_trip() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let session = launch().await;
    Session::scoped(session, |session| async move {
        session
            .goto(r##"data:text/html,<h1>Outer</h1><iframe name="inner" srcdoc="<h1>Inner</h1>"></iframe>"##)
            .await?;
        session
            .wait(Duration::from_secs(5))
            .until(until::element_present(By::css("iframe")))
            .await?;

        session.switch_to().frame_name("inner").await?;
        let inner = session.find_element(By::tag_name("h1")).await?;
        assert_eq!(inner.text().await?, "Inner");

        session.switch_to().default_content().await?;
        let outer = session.find_element(By::tag_name("h1")).await?;
        assert_eq!(outer.text().await?, "Outer");
        assert!(matches!(inner.text().await, Err(Error::StaleReference(_))));
        Ok(())
    })
    .await
    .expect("Scenario failed");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_script_and_screenshot() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("page.png");

    let session = launch().await;
    let shot = path.clone();
    Session::scoped(session, |session| async move {
        session.goto(FORM).await?;
        let sum = session
            .execute_script("return arguments[0] + arguments[1];", vec![2.into(), 3.into()])
            .await?;
        assert_eq!(sum, serde_json::json!(5));
        let nothing = session.execute_script("void 0;", vec![]).await?;
        assert!(nothing.is_null());
        session.save_screenshot(&shot).await?;
        Ok(())
    })
    .await
    .expect("Scenario failed");

    let data = std::fs::read(&path).expect("Screenshot not written");
    assert!(data.starts_with(b"\x89PNG"));
}
