//! Authorization header injection.

use std::{fmt, sync::Arc};

use crate::plugin::{HookResult, Plugin, PluginContext, PluginHooks};

/// Where the token comes from.
#[derive(Clone)]
pub enum TokenSource {
    /// Fixed token.
    Static(String),
    /// Evaluated before every attempt, so rotated tokens are picked up.
    Dynamic(Arc<dyn Fn() -> String + Send + Sync>),
}

impl TokenSource {
    /// Wrap a token provider.
    pub fn dynamic<F>(provider: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(provider))
    }

    /// Current token value.
    pub fn resolve(&self) -> String {
        match self {
            Self::Static(token) => token.clone(),
            Self::Dynamic(provider) => provider(),
        }
    }
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the token itself.
        match self {
            Self::Static(_) => f.write_str("TokenSource::Static(..)"),
            Self::Dynamic(_) => f.write_str("TokenSource::Dynamic(..)"),
        }
    }
}

impl From<&str> for TokenSource {
    fn from(token: &str) -> Self {
        Self::Static(token.to_string())
    }
}

impl From<String> for TokenSource {
    fn from(token: String) -> Self {
        Self::Static(token)
    }
}

/// Sets `<header_name>: <prefix> <token>` on every attempt.
#[derive(Debug, Clone)]
pub struct AuthPlugin {
    token: TokenSource,
    header_name: String,
    prefix: String,
}

impl AuthPlugin {
    /// Bearer auth in the `Authorization` header.
    pub fn new(token: impl Into<TokenSource>) -> Self {
        Self {
            token: token.into(),
            header_name: "Authorization".to_string(),
            prefix: "Bearer".to_string(),
        }
    }

    /// Use a different header.
    #[must_use]
    pub fn header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    /// Use a different scheme prefix. An empty prefix sends the bare token.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn header_value(&self) -> String {
        let token = self.token.resolve();
        if self.prefix.is_empty() {
            token
        } else {
            format!("{} {}", self.prefix, token)
        }
    }
}

impl PluginHooks for AuthPlugin {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn before_connect(&self, ctx: &PluginContext) -> HookResult {
        ctx.set_header(&self.header_name, &self.header_value())?;
        Ok(())
    }
}

impl Plugin for AuthPlugin {
    fn install(self: Box<Self>, _ctx: &PluginContext) -> Box<dyn PluginHooks> {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_bearer_header_value() {
        let auth = AuthPlugin::new("abc");
        assert_eq!(auth.header_value(), "Bearer abc");
        assert_eq!(auth.header_name, "Authorization");
    }

    #[test]
    fn test_custom_header_and_prefix() {
        let auth = AuthPlugin::new("k-1").header_name("X-Api-Key").prefix("");
        assert_eq!(auth.header_name, "X-Api-Key");
        assert_eq!(auth.header_value(), "k-1");

        let auth = AuthPlugin::new("t").prefix("Token");
        assert_eq!(auth.header_value(), "Token t");
    }

    #[test]
    fn test_dynamic_token_is_evaluated_each_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let auth = AuthPlugin::new(TokenSource::dynamic(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            format!("tok-{n}")
        }));

        assert_eq!(auth.header_value(), "Bearer tok-1");
        assert_eq!(auth.header_value(), "Bearer tok-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_debug_hides_token() {
        let rendered = format!("{:?}", AuthPlugin::new("secret"));
        assert!(!rendered.contains("secret"));
    }
}
