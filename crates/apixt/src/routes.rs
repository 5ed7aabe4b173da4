//! Registry of the routes an API exposes, listed in the viewer.

use serde::Serialize;

/// One registered route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub path: String,
    /// Upper-case HTTP methods.
    pub methods: Vec<String>,
}

/// Routes in registration order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct RouteRegistry {
    routes: Vec<Route>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` for the given methods.
    pub fn register<I, M>(&mut self, path: impl Into<String>, methods: I)
    where
        I: IntoIterator<Item = M>,
        M: AsRef<str>,
    {
        let methods = methods
            .into_iter()
            .map(|m| m.as_ref().trim().to_ascii_uppercase())
            .filter(|m| !m.is_empty())
            .collect();
        self.routes.push(Route {
            path: path.into(),
            methods,
        });
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
