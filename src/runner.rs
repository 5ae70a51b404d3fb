use anyhow::{Context, Result};
use kubekit::{Executor, Kubectl};

/// Get the kubectl client version, failing if kubectl cannot be run
pub fn kubectl_client_version<E: Executor>(executor: &E, kubectl: &Kubectl) -> Result<String> {
    let invocation = kubectl.client_version();
    let output = executor
        .run_checked(&invocation)
        .with_context(|| format!("{} is not usable", invocation.program()))?;
    Ok(output.trim().to_string())
}
