//! Port-binding topology and its reduction to bootstrap routing arguments.

use serde::Deserialize;

/// Sentinel rendered for a role that has no binding ("not configured").
pub const NOT_CONFIGURED: &str = "none";

/// Role a bound port plays in the deployed repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    Frontend,
    Backend,
    Other,
}

impl ServiceRole {
    /// Map the Config Service's `port_type` string. Unknown values fold
    /// into `Other`, which routing ignores.
    #[must_use]
    pub fn from_wire(s: &str) -> Self {
        match s {
            "frontend" => Self::Frontend,
            "backend" => Self::Backend,
            _ => Self::Other,
        }
    }
}

/// One port binding from the resolved configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PortBinding {
    #[serde(rename = "port_no")]
    pub port: u16,
    #[serde(rename = "port_proxy")]
    pub route: String,
    #[serde(rename = "port_type", with = "role_wire")]
    pub role: ServiceRole,
}

mod role_wire {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<super::ServiceRole, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(super::ServiceRole::from_wire(&s))
    }
}

/// A configured route for one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub route: String,
    pub port: u16,
}

/// Routing parameters handed to the bootstrap chain.
///
/// The routing logic assumes at most one binding per role; when the
/// configuration carries duplicates the last one wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingParams {
    pub frontend: Option<RouteTarget>,
    pub backend: Option<RouteTarget>,
}

impl RoutingParams {
    /// Reduce a binding topology to per-role routes. `Other` bindings are
    /// ignored; an empty route path defaults to `/`.
    #[must_use]
    pub fn derive(bindings: &[PortBinding]) -> Self {
        let mut params = Self::default();
        for binding in bindings {
            let target = RouteTarget {
                route: if binding.route.is_empty() {
                    "/".to_string()
                } else {
                    binding.route.clone()
                },
                port: binding.port,
            };
            match binding.role {
                ServiceRole::Frontend => params.frontend = Some(target),
                ServiceRole::Backend => params.backend = Some(target),
                ServiceRole::Other => {}
            }
        }
        params
    }

    /// Render the six positional routing arguments:
    /// `(present, route, port)` for frontend then backend.
    #[must_use]
    pub fn as_args(&self) -> [String; 6] {
        let render = |target: &Option<RouteTarget>| match target {
            Some(t) => ("yes".to_string(), t.route.clone(), t.port.to_string()),
            None => (
                "no".to_string(),
                NOT_CONFIGURED.to_string(),
                NOT_CONFIGURED.to_string(),
            ),
        };
        let (fe_present, fe_route, fe_port) = render(&self.frontend);
        let (be_present, be_route, be_port) = render(&self.backend);
        [fe_present, fe_route, fe_port, be_present, be_route, be_port]
    }
}
