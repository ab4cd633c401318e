use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{FunctionId, SpindleError, TaskSpec};

/// Executes tasks for one function id.
///
/// The handler sees the received `TaskSpec`; the task's object references
/// stay pinned for as long as the handler holds it.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &TaskSpec) -> Result<(), SpindleError>;
}

/// Registry of handlers (function_id -> handler).
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during runtime (immutable).
#[derive(Default)]
pub struct FunctionRegistry {
    handlers: HashMap<FunctionId, Arc<dyn TaskHandler>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        function_id: FunctionId,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), SpindleError> {
        if self.handlers.contains_key(&function_id) {
            return Err(SpindleError::DuplicateHandler(function_id));
        }
        self.handlers.insert(function_id, handler);
        Ok(())
    }

    pub fn get(&self, function_id: &FunctionId) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(function_id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Runtime executes a `TaskSpec` by dispatching on its function id.
pub struct Runtime {
    registry: Arc<FunctionRegistry>,
}

impl Runtime {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub async fn execute(&self, task: &TaskSpec) -> Result<(), SpindleError> {
        let function_id = task.function_id();
        let handler = self
            .registry
            .get(&function_id)
            .ok_or(SpindleError::HandlerNotFound(function_id))?;

        handler.handle(task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskArg;
    use crate::testing::unpinned_task;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler(AtomicUsize);

    #[async_trait]
    impl TaskHandler for CountingHandler {
        async fn handle(&self, task: &TaskSpec) -> Result<(), SpindleError> {
            self.0.fetch_add(task.num_args(), Ordering::SeqCst);
            Ok(())
        }
    }

    fn f(b: u8) -> FunctionId {
        FunctionId::from_bytes([b; 20])
    }

    #[tokio::test]
    async fn runtime_executes_registered_handler() {
        let handler = Arc::new(CountingHandler(AtomicUsize::new(0)));
        let mut reg = FunctionRegistry::new();
        reg.register(f(1), handler.clone()).unwrap();

        let rt = Runtime::new(Arc::new(reg));
        let task = unpinned_task(f(1), vec![TaskArg::from("a"), TaskArg::from("b")], 1);
        rt.execute(&task).await.unwrap();
        assert_eq!(handler.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn runtime_errors_when_handler_missing() {
        let rt = Runtime::new(Arc::new(FunctionRegistry::new()));
        let task = unpinned_task(f(9), vec![], 0);
        let err = rt.execute(&task).await.unwrap_err();
        assert!(matches!(err, SpindleError::HandlerNotFound(id) if id == f(9)));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut reg = FunctionRegistry::new();
        reg.register(f(1), Arc::new(CountingHandler(AtomicUsize::new(0))))
            .unwrap();
        let err = reg
            .register(f(1), Arc::new(CountingHandler(AtomicUsize::new(0))))
            .unwrap_err();
        assert!(matches!(err, SpindleError::DuplicateHandler(_)));
        assert_eq!(reg.len(), 1);
    }
}
