//! Parse a unit file and show the configuration it describes

use std::path::Path;

pub async fn parse(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let conf = svcman::units::load_unit_file(path).await?;

    println!("Description: {}", conf.description.as_deref().unwrap_or("-"));
    println!("ExecStart:   {}", conf.exec_start);
    if let Some(cmd) = &conf.exec_stop_post {
        println!("ExecStopPost: {}", cmd);
    }
    println!("Restart:     {}", if conf.transient { "no" } else { "always" });
    if let Some(timeout) = conf.timeout {
        println!("TimeoutSec:  {}", timeout);
    }
    if let Some(output) = &conf.output {
        println!("Output:      {}", output);
    }
    for (key, value) in &conf.env {
        println!("Environment: {}={}", key, value);
    }
    for (key, value) in &conf.limit {
        println!("Limit:       {}={}", key, value);
    }

    Ok(())
}
