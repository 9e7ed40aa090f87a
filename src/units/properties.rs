//! Live unit properties to unit options
//!
//! The backend reports a unit's state as typed properties, not as unit file
//! text. Only the properties that correspond to directives the serializer
//! writes are mapped; everything else the backend reports is dropped.

use crate::backend::{Properties, PropertyValue};

use super::parser::UnitOption;
use super::serialize::quote_env;

const USEC_PER_SEC: u64 = 1_000_000;

/// Options for a unit from its generic and type-specific properties
pub fn unit_options(unit: &Properties, typed: &Properties, unit_type: &str) -> Vec<UnitOption> {
    let mut options = Vec::new();

    if let Some(PropertyValue::Str(desc)) = unit.get("Description") {
        if !desc.is_empty() {
            options.push(UnitOption::new("Unit", "Description", desc.as_str()));
        }
    }

    // Sorted so the result does not depend on map iteration order
    let mut names: Vec<&String> = typed.keys().collect();
    names.sort();

    for name in names {
        let value = &typed[name];
        match (name.as_str(), value) {
            ("ExecStart" | "ExecStopPost", PropertyValue::Commands(commands)) => {
                for argv in commands {
                    if let Ok(line) = shlex::try_join(argv.iter().map(String::as_str)) {
                        options.push(UnitOption::new(unit_type, name.as_str(), line));
                    }
                }
            }
            ("Environment", PropertyValue::Strs(entries)) => {
                for entry in entries {
                    let (key, val) = entry.split_once('=').unwrap_or((entry.as_str(), ""));
                    options.push(UnitOption::new(unit_type, "Environment", quote_env(key, val)));
                }
            }
            // TimeoutSec=0 disables the timeout, reported as infinity
            ("TimeoutStartUSec", PropertyValue::U64(usec)) => {
                let secs = match *usec {
                    u64::MAX => 0,
                    usec => usec / USEC_PER_SEC,
                };
                options.push(UnitOption::new(unit_type, "TimeoutSec", secs.to_string()));
            }
            ("Restart" | "StandardOutput", PropertyValue::Str(s)) => {
                options.push(UnitOption::new(unit_type, name.as_str(), s.as_str()));
            }
            (limit, PropertyValue::U64(n)) if is_limit(limit) => {
                let value = if *n == u64::MAX {
                    "infinity".to_string()
                } else {
                    n.to_string()
                };
                options.push(UnitOption::new(unit_type, limit, value));
            }
            _ => {}
        }
    }

    options
}

/// `LimitNOFILE` and friends, but not their `...Soft` twins
fn is_limit(name: &str) -> bool {
    name.strip_prefix("Limit")
        .is_some_and(|rest| !rest.is_empty() && !rest.ends_with("Soft"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::conf::{equivalent, Configuration};
    use crate::units::serialize::deserialize;

    fn props(entries: Vec<(&str, PropertyValue)>) -> Properties {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_unit_options_maps_known_properties() {
        let unit = props(vec![
            ("Description", PropertyValue::Str("Foo service".into())),
            ("ActiveState", PropertyValue::Str("active".into())),
        ]);
        let service = props(vec![
            (
                "ExecStart",
                PropertyValue::Commands(vec![vec!["/usr/bin/foo".into(), "two words".into()]]),
            ),
            ("Environment", PropertyValue::Strs(vec!["A=1 2".into()])),
            ("LimitNOFILE", PropertyValue::U64(4096)),
            ("LimitNOFILESoft", PropertyValue::U64(1024)),
            ("LimitCORE", PropertyValue::U64(u64::MAX)),
            ("TimeoutStartUSec", PropertyValue::U64(90 * USEC_PER_SEC)),
            ("Restart", PropertyValue::Str("always".into())),
            ("MainPID", PropertyValue::U64(1234)),
            ("Slice", PropertyValue::Str("system.slice".into())),
        ]);

        let mut options = unit_options(&unit, &service, "Service");
        let exec = options.remove(2);
        assert_eq!(exec.name, "ExecStart");
        assert_eq!(
            shlex::split(&exec.value).unwrap(),
            vec!["/usr/bin/foo", "two words"]
        );
        assert_eq!(
            options,
            vec![
                UnitOption::new("Unit", "Description", "Foo service"),
                UnitOption::new("Service", "Environment", "\"A=1 2\""),
                UnitOption::new("Service", "LimitCORE", "infinity"),
                UnitOption::new("Service", "LimitNOFILE", "4096"),
                UnitOption::new("Service", "Restart", "always"),
                UnitOption::new("Service", "TimeoutSec", "90"),
            ]
        );
    }

    #[test]
    fn test_live_properties_compare_equal_to_desired() {
        let unit = props(vec![("Description", PropertyValue::Str("Foo service".into()))]);
        let service = props(vec![
            (
                "ExecStart",
                PropertyValue::Commands(vec![vec!["/usr/bin/foo".into()]]),
            ),
            ("ExecStopPost", PropertyValue::Strs(vec![])),
            ("Environment", PropertyValue::Strs(vec![])),
            ("LimitCPU", PropertyValue::U64(u64::MAX)),
            ("TimeoutStartUSec", PropertyValue::U64(90 * USEC_PER_SEC)),
            ("StandardOutput", PropertyValue::Str("journal".into())),
            ("Restart", PropertyValue::Str("always".into())),
        ]);

        let live = deserialize(&unit_options(&unit, &service, "Service")).unwrap();
        let desired = Configuration::new("/usr/bin/foo").with_description("Foo service");
        assert!(equivalent(&desired, &live));
    }

    #[test]
    fn test_live_values_systemd_rewrites() {
        let unit = props(vec![("Description", PropertyValue::Str("Foo".into()))]);
        let service = props(vec![
            // The argv drops the `-` flag; it is reported separately
            (
                "ExecStart",
                PropertyValue::Commands(vec![vec!["/usr/bin/foo".into()]]),
            ),
            ("TimeoutStartUSec", PropertyValue::U64(u64::MAX)),
            ("StandardOutput", PropertyValue::Str("journal".into())),
            ("Restart", PropertyValue::Str("always".into())),
        ]);

        let live = deserialize(&unit_options(&unit, &service, "Service")).unwrap();
        assert_eq!(live.timeout, Some(0));

        let desired = Configuration {
            timeout: Some(0),
            output: Some("syslog".into()),
            ..Configuration::new("-/usr/bin/foo").with_description("Foo")
        };
        assert!(equivalent(&desired, &live));
    }

    #[test]
    fn test_is_limit() {
        assert!(is_limit("LimitNOFILE"));
        assert!(!is_limit("LimitNOFILESoft"));
        assert!(!is_limit("Limit"));
        assert!(!is_limit("MemoryLimit"));
    }
}
