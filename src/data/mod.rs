//! Persistence: connection pool, analysis repository and audit sink.

pub mod db {
    pub use crate::db::*;
}

pub mod db_storage {
    pub use crate::db_storage::*;
}

pub mod audit {
    pub use crate::audit::*;
}
