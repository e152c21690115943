use crate::models::MockRoute;

/// Prefixes a `/` when the path does not already start with one.
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

pub fn matches(method: &str, path: &str, route: &MockRoute) -> bool {
    if !route.method.eq_ignore_ascii_case(method) {
        tracing::trace!("Method mismatch: expected {}, got {}", route.method, method);
        return false;
    }

    if normalize_path(&route.path) != normalize_path(path) {
        tracing::trace!("Path mismatch: expected {}, got {}", route.path, path);
        return false;
    }

    tracing::trace!("Match success!");
    true
}

/// First route in insertion order matching `method` and `path`.
pub fn find_route<'a>(routes: &'a [MockRoute], method: &str, path: &str) -> Option<&'a MockRoute> {
    routes.iter().find(|route| matches(method, path, route))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_is_case_insensitive_and_slash_optional() {
        let routes = vec![MockRoute::new("get", "users")];
        assert!(find_route(&routes, "GET", "/users").is_some());
        assert!(find_route(&routes, "GET", "users").is_some());
        assert!(find_route(&routes, "POST", "/users").is_none());
    }

    #[test]
    fn first_match_wins() {
        let routes = vec![
            MockRoute::new("GET", "/dup").with_status(201),
            MockRoute::new("get", "dup").with_status(202),
        ];
        assert_eq!(find_route(&routes, "GET", "/dup").unwrap().status, 201);
    }

    #[test]
    fn paths_compare_exactly_after_normalization() {
        let routes = vec![MockRoute::new("GET", "/api/users")];
        assert!(find_route(&routes, "GET", "/api/users/").is_none());
        assert!(find_route(&routes, "GET", "/api").is_none());
    }
}
