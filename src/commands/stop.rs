//! Stop or remove a service

use svcman::config::Settings;

pub async fn stop(settings: &Settings, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let service = super::existing(settings, name).await?;

    service.stop().await?;
    println!("● {} - stopped", service.unit_name());

    Ok(())
}

pub async fn remove(settings: &Settings, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let service = super::existing(settings, name).await?;

    service.stop_and_remove().await?;
    println!("● {} - removed", service.unit_name());

    Ok(())
}
