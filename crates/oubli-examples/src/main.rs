//! A deliberately leaky pipeline, for watching oubli at work.
//!
//! One stage settles promptly; one waits forever on a reply whose sender got
//! parked in a forgotten collection. Run with `RUST_LOG=debug` to see the
//! full creation backtraces under the leak warnings.

use std::time::Duration;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    oubli::enable(oubli::DetectorConfig {
        timeout: Duration::from_millis(200),
        interval: Duration::from_millis(100),
        ..Default::default()
    });

    // Healthy stage: settles well inside the threshold and disappears from
    // the pending set on its own.
    let healthy = oubli::spawn_tracked(async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        "records fetched"
    });
    println!("healthy stage: {}", healthy.await.expect("healthy stage panicked"));

    // Leaky stage: the reply sender ends up parked in a collection nobody
    // drains, so the receiving future can never settle.
    let (reply_tx, reply_rx) = tokio::sync::oneshot::channel::<String>();
    let parked_senders = vec![reply_tx];
    let leaked = oubli::spawn_tracked(async move { reply_rx.await.ok() });
    println!(
        "leaky stage: waiting on a reply that will never arrive ({} sender parked)",
        parked_senders.len()
    );

    // A derived chain settles all the way through and leaves no residue.
    let total = oubli::tracked(std::future::ready(40)).map(|v| v + 2).await;
    println!("derived chain settled with {total}");

    // Let the scanner flag the stuck stage a few times.
    tokio::time::sleep(Duration::from_millis(600)).await;

    println!("pending futures: {}", oubli::pending_count());
    println!("dump: {}", oubli::dump_pending());

    leaked.abort();
    drop(parked_senders);
    oubli::disable();
    println!("detector disabled, pending futures: {}", oubli::pending_count());
}
