/// Resolves the `Content-Type` for an object key from its extension.
pub fn content_type_for(key: &str) -> Option<&'static str> {
    mime_guess::from_path(key).first_raw()
}
