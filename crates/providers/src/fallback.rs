//! Model fallback: ordered retry chain with a per-attempt timeout.
//!
//! An adapter's `invoke` tries each model in [`InvokeOptions::models`] in
//! order: the first success wins, otherwise the last error is returned.
//! This is the only retrying in the system; the turn loop never retries.

use std::future::Future;

use bareagent_core::error::ProviderError;
use bareagent_core::provider::{InvokeOptions, RawResponse};
use tracing::{debug, info, warn};

/// Run `attempt` against each configured model until one succeeds.
pub async fn try_models<F, Fut>(
    provider: &str,
    options: &InvokeOptions,
    mut attempt: F,
) -> Result<RawResponse, ProviderError>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<RawResponse, ProviderError>>,
{
    let mut last_error =
        ProviderError::NotConfigured(format!("No model configured for provider '{provider}'"));
    let total = options.models.len();

    for (i, model) in options.models.iter().enumerate() {
        if i == 0 {
            debug!(provider, model = %model, "Sending completion request");
        } else {
            info!(
                provider,
                model = %model,
                attempt = i + 1,
                total,
                "Fallback: trying model"
            );
        }

        match tokio::time::timeout(options.timeout, attempt(model)).await {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(e)) => {
                warn!(provider, model = %model, error = %e, "Model request failed");
                last_error = e;
            }
            Err(_) => {
                warn!(
                    provider,
                    model = %model,
                    timeout_secs = options.timeout.as_secs(),
                    "Model request timed out"
                );
                last_error = ProviderError::Timeout(format!(
                    "Model '{}' timed out after {}s",
                    model,
                    options.timeout.as_secs()
                ));
            }
        }
    }

    Err(last_error)
}
