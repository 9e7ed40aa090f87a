//! Show service status

use svcman::config::Settings;

pub async fn status(settings: &Settings, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let service = super::existing(settings, name).await?;
    let conf = service.conf();

    let Some(unit) = service.status().await? else {
        println!("○ {} - not loaded", service.unit_name());
        return Ok(());
    };

    let status_symbol = match unit.active_state.as_str() {
        "active" => "●",
        "inactive" => "○",
        "failed" => "×",
        _ => "◐",
    };

    println!(
        "{} {} - {}",
        status_symbol,
        service.unit_name(),
        conf.description.as_deref().unwrap_or("(no description)")
    );
    println!("     Loaded: {} ({})", unit.load_state, service.unit_path().display());
    println!("     Active: {} ({})", unit.active_state, unit.sub_state);
    println!("  ExecStart: {}", conf.exec_start);
    println!(
        "    Matches: {}",
        if service.exists().await? { "yes" } else { "no (reinstall to apply)" }
    );

    Ok(())
}
