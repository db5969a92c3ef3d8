//! Usage: Run blocking filesystem/KDF work off the async executor with a stable label.

use crate::shared::error::{AppError, AppResult};

pub(crate) async fn run<T, E>(
    label: &'static str,
    f: impl FnOnce() -> Result<T, E> + Send + 'static,
) -> AppResult<T>
where
    T: Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(Into::into),
        Err(err) if err.is_panic() => {
            // Panic payloads can carry secret material (e.g. decrypted JSON), never forward them.
            tracing::error!(label, "blocking task panicked");
            Err(AppError::new("TASK_JOIN", format!("{label}: task panicked")))
        }
        Err(_) => {
            tracing::warn!(label, "blocking task cancelled");
            Err(AppError::new("TASK_JOIN", format!("{label}: task cancelled")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_closure_result() {
        let value = run("answer", || Ok::<_, AppError>(42)).await.expect("run");
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn maps_string_errors_through_app_error() {
        let err = run("fails", || Err::<(), _>("SYSTEM_ERROR: disk full".to_string()))
            .await
            .expect_err("should fail");
        assert_eq!(err.code(), "SYSTEM_ERROR");
    }

    #[tokio::test]
    async fn panics_do_not_leak_payload() {
        let err = run("boom", || -> Result<(), AppError> { panic!("secret-payload") })
            .await
            .expect_err("should fail");
        assert_eq!(err.code(), "TASK_JOIN");
        assert!(!err.to_string().contains("secret-payload"));
    }
}
