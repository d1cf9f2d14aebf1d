//! A small echo service showing the typical wiring: logging, routes,
//! health checks, admin surface.
//!
//! Run with:
//!
//! ```text
//! cargo run --example echo
//! curl http://localhost:8080/users/42
//! curl http://localhost:8080/ping
//! ```

use palisade::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&LogConfig::development())?;

    let config = ServerConfig::builder()
        .port(8080)
        .max_connections(1_000)
        .soft_req_per_sec(100.0)
        .hard_req_per_sec(150.0)
        .burst(50.0)
        .serve_admin_routes(true)
        .service_name("echo")
        .build();

    let mut server = Server::new(config)?;

    server.add_health_check("self", || async { HealthResult::Healthy });

    server
        .routes_mut()
        .get("/users/{id}", |ctx: RequestContext| async move {
            let id = ctx.param("id").unwrap_or("unknown").to_string();
            Ok(reply::text(http::StatusCode::OK, format!("user {id}\n")))
        });

    server.routes_mut().post("/echo", |ctx: RequestContext| async move {
        let body = String::from_utf8_lossy(ctx.body()).into_owned();
        Ok(reply::text(http::StatusCode::OK, body))
    });

    server.listen_and_serve().await?;
    Ok(())
}
