//! Example demonstrating logging capabilities
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-json
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```
//!
//! Per-dependency decisions are logged at `trace`:
//! ```bash
//! RUST_LOG=booster=trace cargo run --example logging --features logging-pretty
//! ```

use booster::{Context, Provider, Resource};
use std::sync::Arc;

struct Database {
    url: String,
}

struct UserService {
    db: Arc<Database>,
}

struct RequestId(String);

fn main() {
    booster::logging::builder()
        .pretty()
        .from_env()
        .booster_only()
        .init();

    println!("=== Booster Logging Demo ===\n");

    // logs: "Creating new root context"
    let ctx = Context::new();

    // logs: "Provider batch registered", "Activating provider solution"
    let _solved = ctx
        .solve([
            Provider::resource(|(): ()| {
                Ok::<_, std::io::Error>(
                    Resource::new(Database {
                        url: "postgres://localhost/mydb".into(),
                    })
                    .on_release(|db| {
                        println!("  [app] disconnecting from {}", db.url);
                        Ok::<_, std::io::Error>(())
                    }),
                )
            }),
            Provider::function(|db: Arc<Database>| UserService { db }),
        ])
        .unwrap();

    // logs: "Resolving dependencies", "Entering sync provider", "Closing cleanup stack"
    let users = ctx.resolve::<UserService>().unwrap();
    println!("Resolved user service on {}", users.db.url);

    // logs: "Entered shared scope", "Exited shared scope"
    let scope = ctx
        .shared()
        .value(RequestId("req-12345".into()))
        .dependency::<Database>()
        .enter()
        .unwrap();
    let request = ctx.get::<RequestId>().unwrap();
    println!("Handling {}", request.0);

    // trace: "Using current value"
    ctx.invoke()
        .call(|(db, id): (Arc<Database>, Arc<RequestId>)| {
            println!("  {} uses {}", id.0, db.url);
        })
        .unwrap();
    scope.close().unwrap();

    // logs: "Forking context"
    let worker = ctx.fork();
    println!("Forked context at depth {}", worker.depth());

    // Missing provider error
    let missing = ctx.resolve::<RequestId>();
    println!("Outside the scope: {}", missing.err().map(|e| e.to_string()).unwrap_or_default());

    println!("\n=== Demo Complete ===");
}
