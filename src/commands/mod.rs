mod install;
mod list;
mod parse;
mod start;
mod status;
mod stop;

pub use install::{install, install_commands, ConfArgs};
pub use list::{list, list_command};
pub use parse::parse;
pub use start::start;
pub use status::status;
pub use stop::{remove, stop};

use std::io;

use svcman::backend::SystemdConnector;
use svcman::config::Settings;
use svcman::service::{Service, ServiceDescriptor, ServiceError};
use svcman::units;

pub fn connector(settings: &Settings) -> SystemdConnector {
    if settings.user {
        SystemdConnector::user()
    } else {
        SystemdConnector::system()
    }
}

/// Controller for a service, using the unit file svcman wrote for it
pub async fn existing(
    settings: &Settings,
    name: &str,
) -> Result<Service<SystemdConnector>, Box<dyn std::error::Error>> {
    let path = settings.service_dir(name).join(units::unit_name(name));
    let conf = match units::load_unit_file(&path).await {
        Ok(conf) => conf,
        Err(units::LoadError::Parse(units::ParseError::Io(e)))
            if e.kind() == io::ErrorKind::NotFound =>
        {
            return Err(ServiceError::NotFound(name.to_string()).into());
        }
        Err(e) => return Err(format!("{}: {}", path.display(), e).into()),
    };

    let descriptor = ServiceDescriptor::new(name, conf);
    Ok(Service::new(descriptor, settings, connector(settings))?)
}
