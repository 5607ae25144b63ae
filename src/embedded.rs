use rust_embed::RustEmbed;

/// Embedded curated dictionary data.
/// The CSV files under data/dictionaries are compiled into the binary so
/// the classifier works without any runtime data directory.
#[derive(RustEmbed)]
#[folder = "data/dictionaries"]
pub struct DictionaryAssets;

impl DictionaryAssets {
    /// Fetch an embedded file as UTF-8 text.
    pub fn text(path: &str) -> Option<String> {
        Self::get(path).map(|f| String::from_utf8_lossy(f.data.as_ref()).into_owned())
    }
}
