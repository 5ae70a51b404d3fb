//! Builders for the kubectl invocations a rollout issues.

use crate::types::CommandInvocation;
use std::path::Path;

/// Go template that prints one name per line, skipping pods that are being
/// deleted.
pub const POD_NAME_TEMPLATE: &str = r#"{{range .items}}{{if not .metadata.deletionTimestamp}}{{.metadata.name}}{{"\n"}}{{end}}{{end}}"#;

/// kubectl binary plus the global flags prepended to every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kubectl {
    program: String,
    global_args: Vec<String>,
}

impl Default for Kubectl {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl Kubectl {
    /// Use the given kubectl binary.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            global_args: Vec::new(),
        }
    }

    /// Talk to a specific API server.
    pub fn with_server(self, server: impl AsRef<str>) -> Self {
        self.with_global_arg(format!("--server={}", server.as_ref()))
    }

    /// Operate in a namespace.
    pub fn with_namespace(self, namespace: impl AsRef<str>) -> Self {
        self.with_global_arg(format!("--namespace={}", namespace.as_ref()))
    }

    /// Use a kubeconfig file.
    pub fn with_kubeconfig(self, path: &Path) -> Self {
        self.with_global_arg(format!("--kubeconfig={}", path.display()))
    }

    fn with_global_arg(mut self, arg: String) -> Self {
        self.global_args.push(arg);
        self
    }

    fn command<I, S>(&self, args: I) -> CommandInvocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args = self
            .global_args
            .iter()
            .cloned()
            .chain(args.into_iter().map(Into::into));
        CommandInvocation::new(self.program.clone(), args.collect::<Vec<_>>())
    }

    /// `kubectl get nodes`, the control-plane probe.
    pub fn get_nodes(&self) -> CommandInvocation {
        self.command(["get", "nodes"])
    }

    /// `kubectl delete -f <manifest>`.
    pub fn delete(&self, manifest: &Path) -> CommandInvocation {
        self.command(["delete".to_string(), "-f".to_string(), manifest.display().to_string()])
    }

    /// `kubectl create -f <manifest>`.
    pub fn create(&self, manifest: &Path) -> CommandInvocation {
        self.command(["create".to_string(), "-f".to_string(), manifest.display().to_string()])
    }

    /// Look up pod names by label selector, oldest first, printed with
    /// [`POD_NAME_TEMPLATE`].
    pub fn pod_names(&self, selector: &str) -> CommandInvocation {
        self.command([
            "get".to_string(),
            "pods".to_string(),
            "-l".to_string(),
            selector.to_string(),
            "--sort-by=.metadata.creationTimestamp".to_string(),
            "-o".to_string(),
            "template".to_string(),
            format!("--template={POD_NAME_TEMPLATE}"),
        ])
    }

    /// `kubectl version --client`, used to check kubectl can be run at all.
    pub fn client_version(&self) -> CommandInvocation {
        self.command(["version", "--client"])
    }

    /// `kubectl exec <pod> -- <command...>`.
    pub fn exec(&self, pod: &str, command: &[String]) -> CommandInvocation {
        let args = ["exec".to_string(), pod.to_string(), "--".to_string()]
            .into_iter()
            .chain(command.iter().cloned());
        self.command(args)
    }
}
