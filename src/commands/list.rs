//! List installed services

use svcman::config::Settings;
use svcman::service;

pub async fn list(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let names = service::list_services(&super::connector(settings)).await?;

    for name in &names {
        println!("{}", name);
    }

    let scope = if settings.user { "user" } else { "system" };
    println!();
    println!("{} {} services listed", names.len(), scope);

    Ok(())
}

pub fn list_command() {
    println!("{}", service::list_command());
}
