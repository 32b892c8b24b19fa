use crate::error::RenderError;
use crate::template::TemplateConfig;
use serde_json::Value;

/// The host platform's template controller for one car session.
///
/// Every method is invoked on the session's UI-affinity thread, never
/// concurrently. Implementations wrap the native screen manager or
/// interface controller; the session keeps its own navigation stack in step
/// with the calls it makes here.
pub trait CarHost: Send + 'static {
    type Template: Send + 'static;

    fn render(
        &mut self,
        screen: &str,
        template: &TemplateConfig,
        params: &Value,
    ) -> Result<Self::Template, RenderError>;

    /// Message screen used when nothing is registered or rendering failed.
    fn placeholder(&mut self, message: &str) -> Self::Template;

    fn set_root(&mut self, template: Self::Template);

    fn push(&mut self, template: Self::Template);

    fn pop(&mut self);

    /// Re-renders the top of the host stack without changing its depth.
    fn replace_top(&mut self, template: Self::Template);

    /// Asks the host to close the car UI. Disconnect follows separately.
    fn finish(&mut self);
}
