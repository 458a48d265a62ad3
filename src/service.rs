//! The local service description a caller registers (spec §3, §6.2).

use std::net::{Ipv4Addr, Ipv6Addr};

use lazy_static::lazy_static;
use regex::Regex;

use crate::attributes::Attributes;
use crate::errors::DecodeError;
use crate::name::Name;

lazy_static! {
    /// Matches an optional trailing `" (N)"` disambiguator (spec §6.2).
    static ref RENAME_RE: Regex = Regex::new(r"^(.*?)(?: \((\d+)\))?$").unwrap();
}

/// A service this node registers and/or announces. `hostname`, `ipv4`/
/// `ipv6` and `attributes` are optional because a [`Service`] can exist in
/// an under-specified state before probing (spec §9's
/// [`crate::errors::Error::UnknownAddressing`]).
#[derive(Clone, Debug, PartialEq)]
pub struct Service {
    pub instance_name: String,
    pub registration_type: String,
    pub hostname: Option<Name>,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub attributes: Option<Attributes>,
}

impl Service {
    pub fn new(instance_name: impl Into<String>, registration_type: impl Into<String>, port: u16) -> Service {
        Service {
            instance_name: instance_name.into(),
            registration_type: registration_type.into(),
            hostname: None,
            port,
            priority: 0,
            weight: 0,
            ipv4: None,
            ipv6: None,
            attributes: None,
        }
    }

    pub fn with_hostname(mut self, hostname: Name) -> Service {
        self.hostname = Some(hostname);
        self
    }

    pub fn with_priority(mut self, priority: u16) -> Service {
        self.priority = priority;
        self
    }

    pub fn with_weight(mut self, weight: u16) -> Service {
        self.weight = weight;
        self
    }

    pub fn with_ipv4(mut self, ipv4: Ipv4Addr) -> Service {
        self.ipv4 = Some(ipv4);
        self
    }

    pub fn with_ipv6(mut self, ipv6: Ipv6Addr) -> Service {
        self.ipv6 = Some(ipv6);
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Service {
        self.attributes = Some(attributes);
        self
    }

    /// `<registration_type>.local.` — the PTR name browsers query (spec §3).
    pub fn registration_pointer_name(&self) -> Result<Name, DecodeError> {
        Name::new(format!("{}.local", self.registration_type))
    }

    /// `<instance_name>.<registration_type>.local.` — this service's own
    /// name (spec §3).
    pub fn service_name(&self) -> Result<Name, DecodeError> {
        self.registration_pointer_name()?.prepend(&self.instance_name)
    }

    /// A copy with `instance_name` disambiguated per the spec §6.2 rule:
    /// `Foo` -> `Foo (2)`, `Foo (N)` -> `Foo (N+1)`.
    pub fn renamed(&self) -> Service {
        let caps = RENAME_RE
            .captures(&self.instance_name)
            .expect("the rename regex always matches");
        let base = &caps[1];
        let next = match caps.get(2) {
            Some(n) => n.as_str().parse::<u64>().unwrap_or(1) + 1,
            None => 2,
        };

        Service {
            instance_name: format!("{} ({})", base, next),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str) -> Service {
        Service::new(name, "_music._tcp", 9009)
    }

    #[test]
    fn names_are_assembled_from_instance_and_registration_type() {
        let s = service("Living Room Speaker");
        assert_eq!(
            s.registration_pointer_name().unwrap().as_str(),
            "_music._tcp.local."
        );
        assert_eq!(
            s.service_name().unwrap().as_str(),
            "Living Room Speaker._music._tcp.local."
        );
    }

    #[test]
    fn renaming_an_unqualified_name_appends_the_first_disambiguator() {
        let s = service("Foo").renamed();
        assert_eq!(s.instance_name, "Foo (2)");
    }

    #[test]
    fn renaming_twice_increments_rather_than_doubling_up() {
        let once = service("Foo").renamed();
        let twice = once.renamed();
        assert_eq!(twice.instance_name, "Foo (3)");
    }

    #[test]
    fn renaming_preserves_every_other_field() {
        let s = service("Foo").with_priority(5).with_weight(7);
        let renamed = s.renamed();
        assert_eq!(renamed.priority, 5);
        assert_eq!(renamed.weight, 7);
        assert_eq!(renamed.registration_type, s.registration_type);
    }
}
