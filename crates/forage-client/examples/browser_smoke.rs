/// Smoke-test for the browser-backed extraction stack.
///
/// Launches a headless Chromium session, extracts <https://example.com>,
/// and verifies the page title and `h1` came through.
///
/// Run with:
///   cargo run --example browser_smoke
use forage_client::{BrowserFactory, FieldSpec, PageExtractor};
use forage_core::traits::{Extractor, Resource, ResourceFactory};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    println!("Launching headless browser…");
    let factory = BrowserFactory::new();
    let session = factory.create().await?;

    let extractor =
        PageExtractor::new().with_fields(vec![FieldSpec::new("heading", "h1")]);

    let url = "https://example.com";
    println!("Extracting {url} …");
    let payload = extractor.extract(&session, url).await?;

    // Basic sanity checks
    assert_eq!(
        payload["heading"].as_str(),
        Some("Example Domain"),
        "Expected <h1> not found in rendered page"
    );
    assert!(
        payload["title"].as_str().is_some(),
        "Page title missing from payload"
    );

    println!("OK — payload:\n{}", serde_json::to_string_pretty(&payload)?);
    session.close().await;
    Ok(())
}
