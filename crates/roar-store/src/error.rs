use roar_error::{ErrorCode, RoarError};

pub(crate) fn db_error(context: &str, err: rusqlite::Error) -> RoarError {
    RoarError::new(ErrorCode::DbConnectionFailed, format!("{context}: {err}")).with_source(err)
}
