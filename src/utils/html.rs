use ammonia;

/// Sanitizes user-authored quiz text before it is stored.
///
/// Quiz titles, descriptions, question and answer texts are written by one
/// user and rendered to others, so they pass through ammonia's
/// whitelist-based cleaner. Safe inline tags survive; script/iframe tags and
/// event-handler attributes are stripped.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
