//! Image reference parsing.
//!
//! Memory records store image references either as bare public ids or as full
//! delivery URLs of the form
//! `https://res.cloudinary.com/<cloud>/image/upload/[<transforms>/][v<version>/]<public_id>.<ext>`.
//! Destroy calls need the public id, so URLs are reduced to it here.

/// Delivery types that may precede the public id in a URL path.
const DELIVERY_TYPES: &[&str] = &["upload", "private", "authenticated"];

/// Transformation parameter keys recognised when no version segment is present.
const TRANSFORM_KEYS: &[&str] = &[
    "a", "ar", "b", "bo", "c", "co", "d", "dpr", "e", "f", "fl", "g", "h", "l", "o", "q", "r",
    "t", "u", "w", "x", "y", "z",
];

/// Extract the public id from an image reference.
///
/// Returns `None` for empty references and for URLs without a delivery
/// segment or public id.
pub fn public_id_from_reference(reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    if !(reference.starts_with("http://") || reference.starts_with("https://")) {
        return Some(reference.to_string());
    }

    let without_scheme = reference.split_once("://").map(|(_, rest)| rest)?;
    let path = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or(without_scheme);

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let delivery = segments
        .iter()
        .position(|s| DELIVERY_TYPES.contains(s))?;
    let rest = &segments[delivery + 1..];

    let start = match rest.iter().position(|s| is_version(s)) {
        Some(version) => version + 1,
        None => rest.iter().take_while(|s| is_transformation(s)).count(),
    };
    let id_segments = &rest[start..];
    if id_segments.is_empty() {
        return None;
    }

    let mut joined = id_segments.join("/");
    if let Some(dot) = joined.rfind('.') {
        if dot > joined.rfind('/').map_or(0, |slash| slash + 1) {
            joined.truncate(dot);
        }
    }

    let decoded = urlencoding::decode(&joined)
        .map(|s| s.into_owned())
        .unwrap_or(joined);
    if decoded.is_empty() {
        None
    } else {
        Some(decoded)
    }
}

/// Folder prefix under which a user's images are stored.
pub fn user_folder(root: &str, uid: &str) -> String {
    format!("{}/{}/", root.trim_end_matches('/'), uid)
}

/// Whether `public_id` lives under the user's folder.
pub fn belongs_to_user(public_id: &str, root: &str, uid: &str) -> bool {
    !uid.is_empty() && public_id.starts_with(&user_folder(root, uid))
}

fn is_version(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with('v')
        && segment[1..].chars().all(|c| c.is_ascii_digit())
}

fn is_transformation(segment: &str) -> bool {
    segment.split(',').all(|part| {
        part.split_once('_')
            .is_some_and(|(key, value)| !value.is_empty() && TRANSFORM_KEYS.contains(&key))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_public_id_passes_through() {
        assert_eq!(
            public_id_from_reference("love-journal/u1/beach").as_deref(),
            Some("love-journal/u1/beach")
        );
    }

    #[test]
    fn test_empty_reference_is_none() {
        assert_eq!(public_id_from_reference(""), None);
        assert_eq!(public_id_from_reference("   "), None);
    }

    #[test]
    fn test_url_with_version() {
        let url = "https://res.cloudinary.com/demo/image/upload/v1712345678/love-journal/u1/beach.jpg";
        assert_eq!(
            public_id_from_reference(url).as_deref(),
            Some("love-journal/u1/beach")
        );
    }

    #[test]
    fn test_url_with_transformations_and_version() {
        let url =
            "https://res.cloudinary.com/demo/image/upload/c_fill,w_400,h_300/q_auto/v17/love-journal/u1/cake.png";
        assert_eq!(
            public_id_from_reference(url).as_deref(),
            Some("love-journal/u1/cake")
        );
    }

    #[test]
    fn test_url_with_transformations_without_version() {
        let url = "https://res.cloudinary.com/demo/image/upload/w_200/f_auto/love-journal/u1/dinner.webp";
        assert_eq!(
            public_id_from_reference(url).as_deref(),
            Some("love-journal/u1/dinner")
        );
    }

    #[test]
    fn test_url_without_version_or_transformations() {
        let url = "https://res.cloudinary.com/demo/image/upload/sample.jpg";
        assert_eq!(public_id_from_reference(url).as_deref(), Some("sample"));
    }

    #[test]
    fn test_url_query_string_is_ignored() {
        let url = "https://res.cloudinary.com/demo/image/upload/v1/love-journal/u1/a.jpg?_a=BAMAK";
        assert_eq!(
            public_id_from_reference(url).as_deref(),
            Some("love-journal/u1/a")
        );
    }

    #[test]
    fn test_url_percent_escapes_are_decoded() {
        let url = "https://res.cloudinary.com/demo/image/upload/v1/love-journal/u1/first%20date.jpg";
        assert_eq!(
            public_id_from_reference(url).as_deref(),
            Some("love-journal/u1/first date")
        );
    }

    #[test]
    fn test_dot_in_folder_is_kept_without_extension() {
        let url = "https://res.cloudinary.com/demo/image/upload/v1/love.journal/u1/photo";
        assert_eq!(
            public_id_from_reference(url).as_deref(),
            Some("love.journal/u1/photo")
        );
    }

    #[test]
    fn test_url_without_delivery_type_is_none() {
        assert_eq!(
            public_id_from_reference("https://example.com/images/a.jpg"),
            None
        );
    }

    #[test]
    fn test_url_ending_at_version_is_none() {
        assert_eq!(
            public_id_from_reference("https://res.cloudinary.com/demo/image/upload/v12/"),
            None
        );
    }

    #[test]
    fn test_user_folder_and_ownership() {
        assert_eq!(user_folder("love-journal", "u1"), "love-journal/u1/");
        assert_eq!(user_folder("love-journal/", "u1"), "love-journal/u1/");
        assert!(belongs_to_user("love-journal/u1/a", "love-journal", "u1"));
        assert!(!belongs_to_user("love-journal/u10/a", "love-journal", "u1"));
        assert!(!belongs_to_user("love-journal//a", "love-journal", ""));
    }
}
