//! Start a service

use svcman::config::Settings;

pub async fn start(settings: &Settings, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let service = super::existing(settings, name).await?;

    service.start().await?;
    println!("● {} - started", service.unit_name());

    Ok(())
}
