use serde::{Deserialize, Serialize};

/// Route codes in report order.
pub const DEFAULT_ROUTES: [&str; 32] = [
    "C6-001", "C6-002", "C6-002A", "C6-003", "C6-004", "C6-005", "C6-005A", "C6-006C", "C6-007",
    "C6-008", "C6-009", "C6-010C", "C6-010B", "C6-011", "C6-012", "C6-012A", "C6-013", "C6-014",
    "C6-015A", "C6-016", "C6-016A", "C6-018", "C6-019", "C6-019A", "C6-020", "C6-021", "C6-022",
    "C6-022A", "C6-023", "C6-024", "C6-025", "C6-025B",
];

/// Spreadsheet row (1-based) receiving the first route.
pub const FIRST_ROUTE_ROW: u32 = 4;

/// Ordered, fixed list of recognized routes. Position decides the output row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteCatalog {
    routes: Vec<String>,
}

impl Default for RouteCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_ROUTES)
    }
}

impl RouteCatalog {
    pub fn new<I, S>(routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = std::collections::HashSet::new();
        let routes = routes
            .into_iter()
            .map(Into::into)
            .filter(|route: &String| seen.insert(route.clone()))
            .collect();
        Self { routes }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// 1-based spreadsheet row for the route at `position` (0-based).
    pub fn row_for(position: usize) -> u32 {
        FIRST_ROUTE_ROW + position as u32
    }
}
