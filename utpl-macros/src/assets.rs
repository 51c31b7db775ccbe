use glob::glob;
use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use std::collections::hash_map::DefaultHasher;
use std::env;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use syn::{Ident, LitStr, parse_macro_input};

/// One embedded template file.
struct Asset {
    /// Path relative to the crate root, with `/` separators.
    identity: String,
    /// Absolute path handed to `include_str!`.
    absolute: String,
}

impl Asset {
    fn new(root: &Path, path: &Path) -> Self {
        let identity = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        Self {
            identity,
            absolute: path.to_string_lossy().into_owned(),
        }
    }
}

pub fn template_assets_impl(input: TokenStream) -> TokenStream {
    let pattern = parse_macro_input!(input as LitStr);
    match expand(&pattern) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(pattern: &LitStr) -> syn::Result<proc_macro2::TokenStream> {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR")
        .map_err(|_| syn::Error::new(pattern.span(), "CARGO_MANIFEST_DIR is not set"))?;
    let root = PathBuf::from(manifest_dir);
    let assets = collect(&root, &pattern.value())
        .map_err(|msg| syn::Error::new(pattern.span(), msg))?;

    let entries = assets.iter().map(|Asset { identity, absolute }| {
        quote! { (#identity, include_str!(#absolute)) }
    });
    let fn_name = registration_fn(&pattern.value());

    // Runs before `main`, where no logger is installed yet; the cache logs
    // each failing asset and keeps registering the rest.
    Ok(quote! {
        #[utpl::ctor::ctor]
        fn #fn_name() {
            let assets = vec![#(#entries),*];
            if let Err(e) = utpl::template_loader::load_assets(assets) {
                ::std::eprintln!("utpl: {}", e);
            }
        }
    })
}

/// Files under `root` matching `pattern`, sorted so the expansion is stable.
fn collect(root: &Path, pattern: &str) -> Result<Vec<Asset>, String> {
    let full = root.join(pattern);
    let paths = glob(&full.to_string_lossy()).map_err(|e| format!("Invalid glob pattern: {}", e))?;

    let mut files: Vec<PathBuf> = paths
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files.iter().map(|path| Asset::new(root, path)).collect())
}

/// `__utpl_auto_register_templates_<hash>`, unique per pattern so the macro
/// can be invoked more than once in a scope.
fn registration_fn(pattern: &str) -> Ident {
    let mut hasher = DefaultHasher::new();
    pattern.hash(&mut hasher);
    format_ident!(
        "__utpl_auto_register_templates_{}",
        hasher.finish(),
        span = Span::call_site()
    )
}
