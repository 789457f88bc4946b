//! Shallow markup stripping.
//!
//! Not an HTML parser: tags and entities are blanked out so they do not
//! inflate character or word counts.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// Anything that looks like a tag: `<` up to the next `>`.
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));

/// Named or numeric entities such as `&amp;` or `&#39;`.
static ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&[^;]+;").expect("valid entity pattern"));

/// Replace every tag and entity with a single space.
///
/// Tags are removed first so that an entity-looking run spanning a tag
/// boundary is not matched across it.
pub fn strip_markup(text: &str) -> Cow<'_, str> {
    match TAG.replace_all(text, " ") {
        Cow::Borrowed(untagged) => ENTITY.replace_all(untagged, " "),
        Cow::Owned(untagged) => Cow::Owned(ENTITY.replace_all(&untagged, " ").into_owned()),
    }
}
