//! File runners and the utilities they share

pub mod get_url;
pub mod line;
pub mod prefix;
pub mod tree;
pub mod utils;

pub use get_url::GetUrlRunner;
pub use line::{ensure_line_in_file, AuthorizedKeyRunner, LineInFileRunner};
pub use prefix::{PathMeta, PrefixMetaMap};
pub use tree::{is_text, resolve_dst, TreeRunner};
