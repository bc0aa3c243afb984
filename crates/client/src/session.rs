//! Session: the transport handle plus the session auth key.

use std::fmt;

use aime_core::error::{ApiError, ApiResult};

use crate::transport::TransportError;

type Connector<T> = Box<dyn Fn() -> Result<T, TransportError> + Send + Sync>;

/// Owns one transport and the auth key obtained through it.
///
/// The transport is closed at most once. After [`close`](Self::close) a
/// session built with a connector reopens on next use when `reopen` is set;
/// otherwise every further call fails with [`ApiError::SessionClosed`].
pub struct Session<T> {
    transport: Option<T>,
    connector: Option<Connector<T>>,
    reopen: bool,
    auth_key: Option<String>,
}

impl<T> Session<T> {
    /// Wrap an already open transport. Such a session cannot reopen.
    pub fn new(transport: T) -> Self {
        Self {
            transport: Some(transport),
            connector: None,
            reopen: false,
            auth_key: None,
        }
    }

    /// Open a session through `connector`, which is kept for reopening.
    pub fn with_connector<F>(connector: F, reopen: bool) -> ApiResult<Self>
    where
        F: Fn() -> Result<T, TransportError> + Send + Sync + 'static,
    {
        let transport = connector().map_err(|e| ApiError::TransportSetup(e.to_string()))?;
        Ok(Self {
            transport: Some(transport),
            connector: Some(Box::new(connector)),
            reopen,
            auth_key: None,
        })
    }

    /// Key from the most recent successful login.
    pub fn auth_key(&self) -> Option<&str> {
        self.auth_key.as_deref()
    }

    /// Replace the stored auth key. Jobs already submitted are unaffected.
    pub fn set_auth_key(&mut self, key: Option<String>) {
        self.auth_key = key;
    }

    /// Whether the transport is currently dropped.
    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    /// Drop the transport. Returns `false` if it was already closed.
    pub fn close(&mut self) -> bool {
        match self.transport.take() {
            Some(_) => {
                tracing::debug!("Session closed");
                true
            }
            None => false,
        }
    }

    /// The open transport, reopening it first if allowed.
    pub fn transport(&mut self) -> ApiResult<&T> {
        if self.transport.is_none() {
            let connector = match &self.connector {
                Some(connector) if self.reopen => connector,
                _ => return Err(ApiError::SessionClosed),
            };
            let transport = connector().map_err(|e| ApiError::TransportSetup(e.to_string()))?;
            tracing::info!("Reopened closed session");
            self.transport = Some(transport);
        }
        self.transport.as_ref().ok_or(ApiError::SessionClosed)
    }
}

impl<T> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.transport.is_some())
            .field("reopen", &(self.reopen && self.connector.is_some()))
            .field("authenticated", &self.auth_key.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn close_happens_exactly_once() {
        let mut session = Session::new(());
        assert!(!session.is_closed());
        assert!(session.close());
        assert!(!session.close());
        assert!(session.is_closed());
    }

    #[test]
    fn plain_session_does_not_reopen() {
        let mut session = Session::new(());
        session.close();
        assert_matches!(session.transport(), Err(ApiError::SessionClosed));
    }

    #[test]
    fn connector_session_reopens_when_allowed() {
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opened);
        let mut session = Session::with_connector(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            true,
        )
        .unwrap();

        session.close();
        assert!(session.transport().is_ok());
        assert!(!session.is_closed());
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn opt_out_keeps_session_closed() {
        let mut session = Session::with_connector(|| Ok(()), false).unwrap();
        session.close();
        assert_matches!(session.transport(), Err(ApiError::SessionClosed));
    }

    #[test]
    fn failing_connector_is_a_setup_error() {
        let result = Session::<()>::with_connector(|| Err(TransportError::Connection("no tls".into())), true);
        assert_matches!(result, Err(ApiError::TransportSetup(_)));
    }

    #[test]
    fn auth_key_is_replaced() {
        let mut session = Session::new(());
        session.set_auth_key(Some("A".into()));
        session.set_auth_key(Some("B".into()));
        assert_eq!(session.auth_key(), Some("B"));
    }
}
