//! Fail-soft delivery of lifecycle stages to registered page modules.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::lifecycle::Stage;
use crate::registry::ModuleRegistry;
use crate::request_context::RequestContext;

#[derive(Debug)]
pub struct ModuleFailure {
    pub module: &'static str,
    pub stage: Stage,
    pub error: String,
    pub panicked: bool,
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Modules whose hook ran, in order.
    pub invoked: Vec<&'static str>,
    /// Modules whose page filter excluded the current page.
    pub skipped: Vec<&'static str>,
    pub failures: Vec<ModuleFailure>,
}

/// Runs module hooks for one stage at a time.
///
/// Stage membership and the page filter are checked here, so modules never
/// see a stage or page they did not declare. One module failing or
/// panicking does not stop the others.
#[derive(Debug, Clone)]
pub struct ModuleDispatcher {
    registry: Arc<ModuleRegistry>,
}

impl ModuleDispatcher {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn dispatch(&self, stage: Stage, ctx: &mut RequestContext) -> DispatchReport {
        let mut report = DispatchReport::default();
        let page = ctx.current_page();

        for entry in self.registry.modules() {
            if !entry.handles(stage) {
                continue;
            }
            if !entry.pages.matches(page) {
                report.skipped.push(entry.name);
                continue;
            }

            report.invoked.push(entry.name);
            let outcome = catch_unwind(AssertUnwindSafe(|| entry.module.on_stage(stage, ctx)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => ModuleFailure {
                    module: entry.name,
                    stage,
                    error: format!("{err:#}"),
                    panicked: false,
                },
                Err(payload) => ModuleFailure {
                    module: entry.name,
                    stage,
                    error: panic_message(payload.as_ref()),
                    panicked: true,
                },
            };
            tracing::warn!(
                module = failure.module,
                %stage,
                %page,
                panicked = failure.panicked,
                error = %failure.error,
                "module hook failed; continuing"
            );
            report.failures.push(failure);
        }

        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
