pub mod categories;
pub mod config;
pub mod extract;
pub mod hook;
pub mod links;
pub mod lists;
pub mod pipeline;
pub mod references;
pub mod rules;
pub mod sections;
pub mod spacing;
pub mod store;
pub mod tables;
pub mod templates;
pub mod text;
pub mod title;
pub mod vault;

pub use lists::RedirectGuard;
pub use pipeline::{Module, NormalizeOptions, Normalizer, normalize};
pub use title::{NamespaceTitleResolver, ResolvedTitle, TitleResolver};
