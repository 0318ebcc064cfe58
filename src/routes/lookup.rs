// Route lookup engine with longest prefix matching

use super::RouteEntry;
use crate::address::Cidr;
use std::net::IpAddr;

/// Result of a successful lookup.
#[derive(Debug, Clone, Copy)]
pub struct RouteMatch<'a> {
    pub entry: &'a RouteEntry,
    /// Position of the entry in the device's declaration order
    pub index: usize,
}

impl RouteMatch<'_> {
    pub fn matched_cidr(&self) -> Cidr {
        self.entry.destination
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteEngine {
    routes: Vec<RouteEntry>,
}

impl RouteEngine {
    pub fn new(routes: Vec<RouteEntry>) -> Self {
        RouteEngine { routes }
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    /// Find the best matching route for a destination IP using longest prefix matching.
    ///
    /// Among entries with the same prefix length the lower administrative
    /// distance wins, then the earlier declaration.
    pub fn lookup(&self, dest: IpAddr) -> Option<RouteMatch<'_>> {
        let mut best_match: Option<RouteMatch<'_>> = None;

        for (index, route) in self.routes.iter().enumerate() {
            if !route.destination.contains(dest) {
                continue;
            }
            let prefix_len = route.destination.prefix_len();

            match best_match {
                None => best_match = Some(RouteMatch { entry: route, index }),
                Some(current) => {
                    let current_len = current.entry.destination.prefix_len();
                    let better = prefix_len > current_len
                        || (prefix_len == current_len && route.distance < current.entry.distance);
                    if better {
                        best_match = Some(RouteMatch { entry: route, index });
                    }
                }
            }
        }

        best_match
    }
}
