//! Basic example demonstrating first-touch attribution.
//!
//! This example captures three landing-page visits into a file-backed
//! engine and shows which campaign keeps the credit.

use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use utm_attribution::{
    capture_url, AttributionEngine, AttributionStrategy, CookieStore, FileBackend, UtmSnapshot,
};

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(LevelFilter::DEBUG))
        .init();

    let jar = std::env::temp_dir().join("utm-attribution-demo.jar");
    let _ = std::fs::remove_file(&jar);

    let engine = AttributionEngine::builder()
        .with_strategy(AttributionStrategy::FirstTouch)
        .with_ttl_days(90)
        .with_domain("shop.example.com")
        .build(CookieStore::open(FileBackend::new(&jar)))
        .expect("default policy is valid");

    engine.subscribe(Arc::new(|snapshot: &UtmSnapshot| {
        println!("  -> parameters updated: {:?}", snapshot);
    }));

    println!("=== First-Touch Attribution Example ===\n");
    println!("Persistence available: {}\n", engine.is_available());

    let visits = [
        "https://shop.example.com/?utm_source=newsletter&utm_medium=email&utm_campaign=spring",
        "https://shop.example.com/sale?utm_source=google&utm_medium=cpc&utm_term=running%20shoes",
        "https://shop.example.com/?utm_source=facebook&utm_id=123",
    ];

    for url in visits {
        println!("Visit: {}", url);
        match capture_url(&engine, url, None) {
            Ok(report) if !report.is_clean() => {
                for rejected in &report.rejected {
                    println!("  rejected {}: {}", rejected.key, rejected.error);
                }
            }
            Ok(_) => {}
            Err(e) => println!("  capture failed: {}", e),
        }
    }

    println!("\nCredited parameters:");
    for (key, value) in engine.get_all() {
        println!("  {} = {}", key, value);
    }

    println!("\nPersisted jar ({}):", jar.display());
    if let Ok(contents) = std::fs::read_to_string(&jar) {
        for line in contents.lines() {
            println!("  {}", line);
        }
    }

    println!("\nMetrics: {:?}", engine.metrics().snapshot());
    println!("\n=== Example Complete ===");
}
