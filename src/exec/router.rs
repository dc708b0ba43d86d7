// src/exec/router.rs

use std::sync::Arc;

use tracing::{debug, warn};

use crate::exec::backend::{ExecutionContext, ExecutionResult, ScriptExecutor};
use crate::metadata::ScriptMetadata;
use crate::types::{BoxFuture, ScriptKind};

/// Sends `.sql` scripts to the database executor and everything else to the
/// shell executor.
pub struct ExecutorRouter {
    shell: Arc<dyn ScriptExecutor>,
    database: Arc<dyn ScriptExecutor>,
}

impl ExecutorRouter {
    pub fn new(shell: Arc<dyn ScriptExecutor>, database: Arc<dyn ScriptExecutor>) -> Self {
        Self { shell, database }
    }
}

impl ScriptExecutor for ExecutorRouter {
    fn execute<'a>(
        &'a self,
        metadata: &'a ScriptMetadata,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, ExecutionResult> {
        Box::pin(async move {
            if ctx.script_path.as_os_str().is_empty() {
                warn!(script = %metadata.id, "no materialised script path");
                return ExecutionResult::error("script path missing");
            }

            let kind = metadata.kind();
            debug!(script = %metadata.id, %kind, "routing execution");
            match kind {
                ScriptKind::Database => self.database.execute(metadata, ctx).await,
                ScriptKind::Shell => self.shell.execute(metadata, ctx).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParameterBag;

    struct Label(&'static str);

    impl ScriptExecutor for Label {
        fn execute<'a>(
            &'a self,
            _metadata: &'a ScriptMetadata,
            _ctx: &'a ExecutionContext,
        ) -> BoxFuture<'a, ExecutionResult> {
            Box::pin(async move { ExecutionResult::succeeded(self.0.to_string()) })
        }
    }

    fn router() -> ExecutorRouter {
        ExecutorRouter::new(Arc::new(Label("shell")), Arc::new(Label("database")))
    }

    fn meta(path: &str) -> ScriptMetadata {
        ScriptMetadata {
            id: "x".into(),
            name: "X".into(),
            category: "Test".into(),
            ..Default::default()
        }
        .with_source_path(path)
    }

    #[tokio::test]
    async fn routes_by_source_extension() {
        let ctx = ExecutionContext::new("/tmp/x/script.sql", ParameterBag::new());
        assert_eq!(router().execute(&meta("a/b.SQL"), &ctx).await.stdout, "database");
        assert_eq!(router().execute(&meta("a/b.ps1"), &ctx).await.stdout, "shell");
    }

    #[tokio::test]
    async fn connection_string_routes_to_database_regardless_of_extension() {
        let ctx = ExecutionContext::new("/tmp/x/script.sql", ParameterBag::new());
        let meta = ScriptMetadata {
            connection_string: Some("Data Source=x.db".into()),
            ..meta("scripts/a.ps1")
        };
        assert_eq!(router().execute(&meta, &ctx).await.stdout, "database");
    }

    #[tokio::test]
    async fn empty_path_fails_fast() {
        let ctx = ExecutionContext::new("", ParameterBag::new());
        let result = router().execute(&meta("a.ps1"), &ctx).await;
        assert_eq!(result, ExecutionResult::error("script path missing"));
    }
}
