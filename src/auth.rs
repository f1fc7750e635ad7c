//! Credential source for the connection handshake
//!
//! The session never stores credentials itself; it asks a `TokenProvider`
//! each time a transport opens. `Ok(None)` aborts the connection attempt.

use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;

/// Supplies the token sent in the `auth` frame
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current token, or `None` when the user is not signed in
    async fn token(&self) -> Result<Option<String>>;
}

/// Fixed token, mostly for tests and service accounts
#[derive(Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// Provider that never has a token
    pub fn none() -> Self {
        Self(None)
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StaticToken")
            .field(&self.0.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Adapts an async closure into a `TokenProvider`
pub struct FnTokenProvider<F> {
    f: F,
}

impl<F, Fut> FnTokenProvider<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<String>>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> TokenProvider for FnTokenProvider<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<String>>> + Send + 'static,
{
    async fn token(&self) -> Result<Option<String>> {
        (self.f)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_static_token() {
        assert_eq!(
            StaticToken::new("jwt").token().await.unwrap().as_deref(),
            Some("jwt")
        );
        assert!(StaticToken::none().token().await.unwrap().is_none());
    }

    #[test]
    fn test_static_token_without_runtime() {
        let token = tokio_test::block_on(StaticToken::new("jwt").token());
        assert_eq!(tokio_test::assert_ok!(token).as_deref(), Some("jwt"));
    }

    #[test]
    fn test_static_token_debug_redacts() {
        let debug = format!("{:?}", StaticToken::new("secret-jwt"));
        assert!(!debug.contains("secret-jwt"));
    }

    #[tokio::test]
    async fn test_fn_provider_called_each_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let provider = FnTokenProvider::new(move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(format!("token-{}", n)))
            }
        });

        assert_eq!(provider.token().await.unwrap().as_deref(), Some("token-0"));
        assert_eq!(provider.token().await.unwrap().as_deref(), Some("token-1"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fn_provider_error() {
        let provider =
            FnTokenProvider::new(|| async { Err(SessionError::Auth("refresh expired".to_string())) });
        assert!(provider.token().await.is_err());
    }
}
