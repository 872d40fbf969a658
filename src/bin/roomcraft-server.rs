//! Roomcraft HTTP server
//!
//! Serves `/inpaint/`, `/inpaint_erasure/` and `/remove_bg/` over the
//! configured generative backends.

#[cfg(feature = "server")]
use roomcraft::server;

#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    server::main().await
}

#[cfg(not(feature = "server"))]
fn main() {
    panic!("Server feature not enabled. Please rebuild with --features server");
}
