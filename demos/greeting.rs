//! Resolving a small provider graph in sync and async calls
//!
//! ```bash
//! cargo run --example greeting
//! ```

use booster::{AsyncResource, Context, DiError, Provider};
use std::sync::Arc;
use std::time::Duration;

struct Greeting(String);
struct Recipient(String);
struct Message(String);

/// Stands in for a connection that must be closed
struct Mailbox {
    owner: String,
}

fn main() -> Result<(), DiError> {
    #[cfg(feature = "logging")]
    booster::logging::init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| DiError::Internal(e.to_string()))?;

    let ctx = Context::new();

    // A sync provider may not require an async one
    let rejected = ctx.solve([
        Provider::asyncfunction(|(): ()| async { Recipient("World".into()) }),
        Provider::function(|r: Arc<Recipient>| Message(r.0.clone())),
    ]);
    if let Err(e) = rejected {
        println!("Rejected: {e}");
    }

    let _solved = ctx.solve([
        Provider::value(Greeting("Hello".into())),
        Provider::asyncfunction(|(): ()| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Recipient("World".into())
        }),
        Provider::asyncfunction(|(g, r): (Arc<Greeting>, Arc<Recipient>)| async move {
            Message(format!("{} {}", g.0, r.0))
        }),
        Provider::async_resource(|recipient: Arc<Recipient>| async move {
            println!("  [mailbox] opening for {}", recipient.0);
            Ok::<_, std::io::Error>(
                AsyncResource::new(Mailbox {
                    owner: recipient.0.clone(),
                })
                .on_async_release(|mailbox| async move {
                    println!("  [mailbox] closing for {}", mailbox.owner);
                    Ok::<_, std::io::Error>(())
                }),
            )
        }),
    ])?;

    match ctx.resolve::<Message>() {
        Ok(message) => println!("Sync call: {}", message.0),
        Err(e) => println!("Sync call: {e}"),
    }

    let message = runtime.block_on(ctx.resolve_async::<Message>())?;
    println!("Async call: {}", message.0);

    let text = runtime.block_on(
        ctx.invoke()
            .value(Recipient("Everyone".into()))
            .call_async(|m: Arc<Message>| async move { m.0.clone() }),
    )?;
    println!("With an explicit recipient: {text}");

    // The mailbox is closed when the call returns
    runtime.block_on(ctx.invoke().call_async(
        |(mailbox, greeting): (Arc<Mailbox>, Arc<Greeting>)| async move {
            println!("  {} from {}'s mailbox", greeting.0, mailbox.owner);
        },
    ))?;

    // Shared for the whole block: opened once, closed on exit
    runtime.block_on(async {
        let scope = ctx.shared().dependency::<Mailbox>().enter_async().await?;
        for _ in 0..3 {
            let mailbox = ctx.resolve_async::<Mailbox>().await?;
            println!("  reusing {}'s mailbox", mailbox.owner);
        }
        scope.aclose().await
    })?;

    Ok(())
}
