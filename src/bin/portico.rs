use anyhow::Result;
use portico::cli::{actions, start};

// Main function
#[tokio::main]
async fn main() -> Result<()> {
    // Start the program
    let (action, globals) = start()?;

    // Handle the action, the outcome envelope is already printed
    let success = actions::admin::handle(action, &globals).await?;

    opentelemetry::global::shutdown_tracer_provider();

    if !success {
        std::process::exit(1);
    }

    Ok(())
}
