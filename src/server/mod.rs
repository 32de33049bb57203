//! HTTP server module

mod routes;

use crate::app::App;
use crate::error::Result;
use routes::create_router;
use std::sync::Arc;

/// Run the HTTP server on an already-built composition root.
pub async fn run_server(app: App, port: u16) -> Result<()> {
    let router = create_router(Arc::new(app));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    println!("Server running on http://localhost:{}", port);
    println!("\nAPI Endpoints:");
    println!("  GET    /health            - Health check");
    println!("  POST   /api/ingest        - Submit a file or URL ingest (returns job id)");
    println!("  GET    /api/jobs          - List all jobs");
    println!("  GET    /api/jobs/:id      - Get job status");
    println!("  GET    /api/jobs/:id/ws   - Stream job updates (WebSocket)");
    println!("  POST   /api/search        - Search the vector store");

    axum::serve(listener, router).await?;
    Ok(())
}
