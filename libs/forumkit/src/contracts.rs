use crate::lifecycle::Stage;
use crate::module_ctx::ModuleCtx;
use crate::request_context::RequestContext;

/// An independently authored extension that reacts to request lifecycle stages.
///
/// Modules are registered once per process and shared by every request, so
/// per-request state belongs in the [`RequestContext`], not in the module.
pub trait PageModule: Send + Sync + 'static {
    /// Stages this module wants to see. The dispatcher never calls
    /// [`on_stage`](Self::on_stage) for any other stage.
    fn stages(&self) -> &'static [Stage];

    /// One-time startup wiring. Errors abort startup.
    fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_stage(&self, stage: Stage, ctx: &mut RequestContext) -> anyhow::Result<()>;

    fn as_any(&self) -> &dyn std::any::Any;
}
