use inbox_types::AppError;

/// Postgres unique-violation SQLSTATE, used to tell "someone already
/// inserted this row" apart from a genuine database failure.
const UNIQUE_VIOLATION: &str = "23505";

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err.as_database_error().and_then(|e| e.code()), Some(code) if code == UNIQUE_VIOLATION)
}

pub fn map_sqlx_err(err: sqlx::Error) -> AppError {
    match err {
        sqlx::Error::RowNotFound => AppError::not_found("row not found"),
        other if is_unique_violation(&other) => AppError::conflict(other.to_string()),
        other => AppError::Transient(other.into()),
    }
}
