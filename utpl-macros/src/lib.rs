mod assets;

use proc_macro::TokenStream;

/// Embeds every file matching a glob pattern (relative to the crate root)
/// and registers it in `utpl`'s global template cache before `main` runs.
///
/// ```ignore
/// utpl::template_assets!("templates/**/*.html");
/// ```
#[proc_macro]
pub fn template_assets(input: TokenStream) -> TokenStream {
    assets::template_assets_impl(input)
}
