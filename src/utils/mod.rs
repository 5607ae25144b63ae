pub mod string_ext;

pub use string_ext::{StringExt, clean_optional_string};
