pub mod config;
pub mod error;
pub mod source;
pub mod template_loader;
pub mod tpl;

#[doc(hidden)]
pub use ctor;
pub use error::{Result, TplError};
pub use source::Source;
pub use utpl_macros::template_assets;
