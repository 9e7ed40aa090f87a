//! Enumerate installed services

use std::collections::BTreeSet;

use crate::backend::{Backend, BackendError, Connect, UnitStatus};
use crate::units::SERVICE_SUFFIX;

/// Names of all service units the backend knows, without the suffix
pub async fn list_services<C: Connect>(connector: &C) -> Result<BTreeSet<String>, BackendError> {
    let conn = connector.connect().await?;
    let units = conn.list_units().await?;
    Ok(service_names(&units))
}

/// Keep service units and strip their suffix
pub fn service_names(units: &[UnitStatus]) -> BTreeSet<String> {
    units
        .iter()
        .filter(|unit| is_service(unit))
        .map(|unit| {
            unit.name
                .strip_suffix(SERVICE_SUFFIX)
                .unwrap_or(&unit.name)
                .to_string()
        })
        .collect()
}

/// Trust the unit kind when the backend reports one, else the name suffix
fn is_service(unit: &UnitStatus) -> bool {
    match &unit.kind {
        Some(kind) => kind == "service",
        None => unit.name.ends_with(SERVICE_SUFFIX),
    }
}

/// Shell pipeline printing the same names on a host without API access
pub fn list_command() -> String {
    r"systemctl list-units --no-legend --no-pager --plain -t service -a | grep -o -P '^\w[-\w]*(?=\.service)'"
        .to_string()
}
