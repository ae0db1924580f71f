use proc_macro::TokenStream;

mod error_handler;

/// Attribute macro generating the matching methods of an `ErrorHandler` impl
///
/// - `name`: the value returned by `identify()` (defaults to the type name)
/// - `status`: status levels handled, `0` being the catch-all level
/// - `exceptions`: failure types handled, as type paths or verbatim type names
///
/// Methods already present in the impl block are kept as written.
///
/// # Example
/// ```rust,ignore
/// use recourse::prelude::*;
///
/// struct MaintenancePage;
///
/// #[error_handler(name = "maintenance", status = [502, 503], exceptions = [std::io::Error])]
/// #[async_trait]
/// impl ErrorHandler for MaintenancePage {
///     async fn handle(
///         &self,
///         _request: &ErrorRequest,
///         response: &mut dyn HttpResponse,
///     ) -> anyhow::Result<()> {
///         response.set_status(StatusCode::SERVICE_UNAVAILABLE);
///         response.write(b"back soon")?;
///         Ok(())
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn error_handler(attr: TokenStream, item: TokenStream) -> TokenStream {
    error_handler::error_handler_attribute(attr, item)
}
