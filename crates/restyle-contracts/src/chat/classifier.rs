/// Verbs that mark a chat message as an image-edit instruction when the
/// message begins with one of them.
pub const EDIT_KEYWORDS: &[&str] = &[
    "make", "add", "change", "remove", "put", "replace", "give", "turn", "filter", "apply",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Edit,
    Chat,
}

/// Routes a chat message to either the image-edit path or the
/// conversational path. The whole message is lower-cased and each
/// keyword is tested as a prefix, never as a substring: "add a rug" is
/// an edit, "I'd like to add a rug" is conversation. Deliberately kept
/// prefix-only.
pub fn classify<'a, I>(text: &str, keywords: I) -> Route
where
    I: IntoIterator<Item = &'a str>,
{
    let lowered = text.to_lowercase();
    if keywords
        .into_iter()
        .any(|keyword| lowered.starts_with(keyword))
    {
        Route::Edit
    } else {
        Route::Chat
    }
}
