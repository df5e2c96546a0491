//! Operation error taxonomy.
//!
//! # Invariants
//! - Every recoverable operation error wraps the `StoreError` that caused it.
//! - Failures are logged with operation name and cause before they are
//!   returned; no CRUD path swallows an error.
//! - `OpenError` is never returned to callers of `Coordinator::open`: a store
//!   that cannot be opened terminates the process.

use crate::db::DbError;
use crate::repo::object_repo::StoreError;
use log::error;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

/// Failure to resolve or open the durable store.
#[derive(Debug)]
pub enum OpenError {
    Location(io::Error),
    Db(DbError),
}

impl Display for OpenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Location(err) => write!(f, "failed to resolve store location: {err}"),
            Self::Db(err) => write!(f, "failed to open store: {err}"),
        }
    }
}

impl Error for OpenError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Location(err) => Some(err),
            Self::Db(err) => Some(err),
        }
    }
}

impl From<io::Error> for OpenError {
    fn from(value: io::Error) -> Self {
        Self::Location(value)
    }
}

impl From<DbError> for OpenError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

macro_rules! operation_error {
    ($(#[$meta:meta])* $name:ident, $operation:literal) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name {
            source: StoreError,
        }

        impl $name {
            pub fn store_error(&self) -> &StoreError {
                &self.source
            }

            pub fn into_store_error(self) -> StoreError {
                self.source
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($operation, " failed: {}"), self.source)
            }
        }

        impl Error for $name {
            fn source(&self) -> Option<&(dyn Error + 'static)> {
                Some(&self.source)
            }
        }

        impl From<StoreError> for $name {
            fn from(source: StoreError) -> Self {
                Self { source }
            }
        }
    };
}

operation_error!(
    /// Fetch or count failure.
    FetchError,
    "fetch"
);
operation_error!(
    /// Insert failure; the background context is discarded with its changes.
    InsertError,
    "insert"
);
operation_error!(
    /// Object-level delete failure.
    DeleteError,
    "delete"
);
operation_error!(
    /// Batch delete failure.
    BatchDeleteError,
    "batch delete"
);
operation_error!(
    /// Context save failure.
    SaveError,
    "save"
);

/// Logs `err` under `event` and converts it into the operation error.
pub(crate) fn log_failure<E: From<StoreError>>(event: &str, module: &str, err: StoreError) -> E {
    error!("event={event} module={module} status=error error={err}");
    E::from(err)
}

#[cfg(test)]
mod tests {
    use super::{FetchError, SaveError};
    use crate::repo::object_repo::StoreError;
    use std::error::Error;

    #[test]
    fn operation_errors_name_the_operation_and_keep_the_cause() {
        let err = FetchError::from(StoreError::UnknownEntity("Ghost".to_string()));
        assert_eq!(
            err.to_string(),
            "fetch failed: entity `Ghost` is not in the object model"
        );
        assert!(err.source().is_some());
        assert!(matches!(err.store_error(), StoreError::UnknownEntity(name) if name == "Ghost"));

        let save = SaveError::from(StoreError::InvalidData("x".to_string()));
        assert!(matches!(save.into_store_error(), StoreError::InvalidData(_)));
    }
}
