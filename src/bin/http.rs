#[cfg(feature = "http_api")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::net::SocketAddr;

    use tracing_subscriber::EnvFilter;
    use transit_report::{ReportConfig, http_api, load_config_from_json};

    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let addr: SocketAddr = std::env::var("TRANSIT_REPORT_HTTP_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8001".to_string())
        .parse()?;

    let mut config = match std::env::var("TRANSIT_REPORT_CONFIG") {
        Ok(path) => load_config_from_json(&path)?,
        Err(_) => ReportConfig::default(),
    };
    if let Ok(template) = std::env::var("TRANSIT_REPORT_TEMPLATE") {
        config.template_path = template.into();
    }

    tracing::info!(template = %config.template_path.display(), "starting transit-report");
    http_api::serve(addr, config).await?;
    Ok(())
}

#[cfg(not(feature = "http_api"))]
fn main() {
    eprintln!("Rebuild with the `http_api` feature to enable the HTTP server.");
}
