//! Connection handle: session establishment and transaction mode.
//!
//! ```text
//!  Unconnected ──connect──▶ Connected ──disable_autocommit──▶ Manual
//!       ▲                     │   ▲                             │
//!       └─────disconnect──────┘   └─────enable_autocommit───────┘
//!       ▲                                                       │
//!       └──────────────────────disconnect───────────────────────┘
//! ```
//!
//! Transitions consume the wrapper, so a connection that was handed to
//! `connect` cannot be used again:
//!
//! ```compile_fail
//! use odbc_typestate::{Connection, Unconnected};
//!
//! fn connect_twice(conn: Connection<'_, Unconnected>) {
//!     let _first = conn.connect("DSN", "user", "password");
//!     let _second = conn.connect("DSN", "user", "password");
//! }
//! ```
//!
//! Connections exist only under a declared ODBC version:
//!
//! ```compile_fail
//! use odbc_typestate::{Environment, Uninitialized};
//!
//! fn too_early(env: &Environment<'_, Uninitialized>) {
//!     let _ = env.connection();
//! }
//! ```

use std::fmt;
use std::marker::PhantomData;

use crate::diagnostics::Diagnostics;
use crate::environment::{Environment, OdbcVersion};
use crate::error::{Error, Result};
use crate::ffi::{CompletionType, HandleKind};
use crate::handle::{Checked, Lifecycle, OwnedHandle};
use crate::outcome::{Completion, Rejected, Transition};
use crate::sealed::private::Sealed;
use crate::statement::{NoResult, Statement, Unprepared};

/// Allocated, no session.
#[derive(Debug)]
pub enum Unconnected {}

/// Open session, every statement commits on its own.
#[derive(Debug)]
pub enum Connected {}

/// Open session with autocommit off; work is ended by `commit`/`rollback`.
#[derive(Debug)]
pub enum Manual {}

/// State marker of a connection.
pub trait ConnectionState: Sealed {}

/// States with an open session.
pub trait IsConnected: ConnectionState {
    const AUTOCOMMIT: bool;
}

impl Sealed for Unconnected {}
impl Sealed for Connected {}
impl Sealed for Manual {}
impl ConnectionState for Unconnected {}
impl ConnectionState for Connected {}
impl ConnectionState for Manual {}

impl IsConnected for Connected {
    const AUTOCOMMIT: bool = true;
}

impl IsConnected for Manual {
    const AUTOCOMMIT: bool = false;
}

/// Connection handle borrowed from its environment.
pub struct Connection<'env, S: ConnectionState> {
    handle: OwnedHandle<'env>,
    state: PhantomData<S>,
}

impl<'env, S: ConnectionState> Connection<'env, S> {
    fn retype<T: ConnectionState>(self) -> Connection<'env, T> {
        Connection {
            handle: self.handle,
            state: PhantomData,
        }
    }

    pub(crate) const fn handle(&self) -> &OwnedHandle<'env> {
        &self.handle
    }

    /// Records attached by the most recent call on this connection.
    pub fn diagnostics(&self) -> Diagnostics<'env> {
        self.handle.diagnostics()
    }
}

impl<'env> Connection<'env, Unconnected> {
    /// Allocates a connection handle under a declared environment.
    pub fn new<V: OdbcVersion>(env: &'env Environment<'_, V>) -> Result<Self> {
        let handle = OwnedHandle::allocate(
            env.handle().context(),
            HandleKind::Connection,
            Some(env.handle()),
        )?;
        Ok(Self {
            handle,
            state: PhantomData,
        })
    }

    /// Opens a session on a configured data source.
    pub fn connect(
        self,
        dsn: &str,
        user: &str,
        password: &str,
    ) -> Transition<Connection<'env, Connected>, Self> {
        const FUNCTION: &str = "SQLConnect";

        let lengths = [("data source name", dsn), ("user name", user), ("password", password)]
            .into_iter()
            .try_for_each(|(what, text)| check_length(what, text));
        if let Err(error) = lengths {
            return Err(Rejected::new(self, error));
        }

        let result = self
            .handle
            .call(FUNCTION, |api, raw| {
                api.connect(raw, dsn.as_bytes(), user.as_bytes(), password.as_bytes())
            })
            .and_then(|checked| checked.complete(()));
        match result {
            Ok(done) => {
                tracing::debug!(dsn, user, "connected");
                Ok(done.map(|()| self.into_connected()))
            }
            Err(error) => Err(Rejected::new(self, error)),
        }
    }

    /// Opens a session described by a connection string. The driver is
    /// never allowed to prompt.
    pub fn connect_with_string(
        self,
        connection_string: &str,
    ) -> Transition<Connection<'env, Connected>, Self> {
        const FUNCTION: &str = "SQLDriverConnect";

        if let Err(error) = check_length("connection string", connection_string) {
            return Err(Rejected::new(self, error));
        }

        let result = self
            .handle
            .call(FUNCTION, |api, raw| {
                api.driver_connect(raw, connection_string.as_bytes())
            })
            .and_then(|checked| checked.complete(()));
        match result {
            Ok(done) => {
                tracing::debug!("connected with connection string");
                Ok(done.map(|()| self.into_connected()))
            }
            Err(error) => Err(Rejected::new(self, error)),
        }
    }

    fn into_connected(mut self) -> Connection<'env, Connected> {
        self.handle.set_lifecycle(Lifecycle::Connected);
        self.retype()
    }
}

impl<'env, S: IsConnected> Connection<'env, S> {
    /// Closes the session, keeping the handle for another `connect`.
    ///
    /// With autocommit off the driver refuses while work is pending
    /// (state `25000`); the connection then comes back unchanged. After a
    /// manual-mode session autocommit is switched back on, so the next
    /// `connect` starts in [`Connected`].
    pub fn disconnect(mut self) -> Transition<Connection<'env, Unconnected>, Self> {
        const FUNCTION: &str = "SQLDisconnect";

        let result = self
            .handle
            .call(FUNCTION, |api, raw| api.disconnect(raw))
            .and_then(|checked| checked.complete(()));
        match result {
            Ok(done) => {
                self.handle.set_lifecycle(Lifecycle::Allocated);
                if !S::AUTOCOMMIT {
                    self.restore_autocommit();
                }
                tracing::debug!(autocommit = S::AUTOCOMMIT, "disconnected");
                Ok(done.map(|()| self.retype()))
            }
            Err(error) => Err(Rejected::new(self, error)),
        }
    }

    fn restore_autocommit(&self) {
        let restored = self
            .handle
            .call("SQLSetConnectAttr", |api, raw| api.set_autocommit(raw, true))
            .and_then(Checked::success);
        if let Err(error) = restored {
            tracing::warn!(%error, "autocommit not restored after disconnect");
        }
    }

    /// Allocates a statement; shorthand for [`Statement::new`].
    pub fn statement(&self) -> Result<Statement<'_, Unprepared, NoResult>> {
        Statement::new(self)
    }

    fn set_autocommit<T: IsConnected>(mut self) -> Transition<Connection<'env, T>, Self> {
        const FUNCTION: &str = "SQLSetConnectAttr";

        let result = self
            .handle
            .call(FUNCTION, |api, raw| api.set_autocommit(raw, T::AUTOCOMMIT))
            .and_then(|checked| checked.complete(()));
        match result {
            Ok(done) => {
                self.handle.set_lifecycle(if T::AUTOCOMMIT {
                    Lifecycle::Connected
                } else {
                    Lifecycle::Transaction
                });
                tracing::debug!(autocommit = T::AUTOCOMMIT, "switched transaction mode");
                Ok(done.map(|()| self.retype()))
            }
            Err(error) => Err(Rejected::new(self, error)),
        }
    }
}

impl<'env> Connection<'env, Connected> {
    /// Turns autocommit off; statements then run inside a transaction.
    pub fn disable_autocommit(self) -> Transition<Connection<'env, Manual>, Self> {
        self.set_autocommit()
    }
}

impl<'env> Connection<'env, Manual> {
    /// Turns autocommit back on. Drivers commit pending work when this
    /// happens.
    pub fn enable_autocommit(self) -> Transition<Connection<'env, Connected>, Self> {
        self.set_autocommit()
    }

    /// Commits the current transaction.
    pub fn commit(&self) -> Result<Completion<()>> {
        self.end_transaction(CompletionType::Commit)
    }

    /// Rolls back the current transaction.
    pub fn rollback(&self) -> Result<Completion<()>> {
        self.end_transaction(CompletionType::Rollback)
    }

    fn end_transaction(&self, completion: CompletionType) -> Result<Completion<()>> {
        let done = self
            .handle
            .call("SQLEndTran", |api, raw| api.end_tran(raw, completion))?
            .complete(())?;
        tracing::debug!(?completion, "transaction ended");
        Ok(done)
    }
}

impl<S: ConnectionState> fmt::Debug for Connection<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &std::any::type_name::<S>())
            .field("handle", &self.handle)
            .finish()
    }
}

/// Native string arguments carry an `i16` length.
pub(crate) fn check_length(what: &'static str, text: &str) -> Result<()> {
    let max = usize::from(i16::MAX.unsigned_abs());
    if text.len() > max {
        return Err(Error::out_of_range(what, text.len(), max));
    }
    Ok(())
}
