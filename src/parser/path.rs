use percent_encoding::percent_decode_str;
use std::borrow::Cow;

/// Splits `target` into its path and optional query at the first literal
/// `?`. An encoded `%3F` stays part of the path.
pub fn split_query(target: &str) -> (&str, Option<&str>) {
    match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    }
}

/// Strips the query string and percent-decodes what is left.
///
/// The query is cut before decoding so a decoded `?` can never be mistaken
/// for a separator. Octets that do not form UTF-8 after decoding are
/// replaced with U+FFFD.
pub fn normalize_path(target: &str) -> Cow<'_, str> {
    let (path, _) = split_query(target);
    percent_decode_str(path).decode_utf8_lossy()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_query() {
        assert_eq!(normalize_path("/product/catalog?item=fe23acd"), "/product/catalog");
        assert_eq!(normalize_path("/search?"), "/search");
        assert_eq!(normalize_path("/a?b?c"), "/a");
    }

    #[test]
    fn decodes_utf8_octets() {
        assert_eq!(normalize_path("/caf%C3%A9"), "/café");
        assert_eq!(normalize_path("/caf%c3%a9"), "/café");
    }

    #[test]
    fn decoded_separators_stay_in_path() {
        assert_eq!(normalize_path("/a%3Fb?x=1"), "/a?b");
        assert_eq!(normalize_path("/a%2Fb"), "/a/b");
        assert_eq!(normalize_path("/100%25"), "/100%");
    }

    #[test]
    fn plain_path_is_borrowed() {
        assert!(matches!(normalize_path("/admin.php"), Cow::Borrowed("/admin.php")));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        assert_eq!(normalize_path("/x%FF"), "/x\u{FFFD}");
    }
}
