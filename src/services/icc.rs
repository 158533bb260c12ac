//! Profile description lookup on top of `moxcms`.

use moxcms::{CmsError, ColorProfile, LocalizableString, ProfileText};

/// Returns the profile's human-readable description, `Ok(None)` when the
/// profile has no `desc` tag or the tag holds only whitespace.
pub fn profile_description(raw: &[u8]) -> Result<Option<String>, CmsError> {
    let profile = ColorProfile::new_from_slice(raw)?;
    Ok(profile.description.and_then(describe))
}

fn describe(text: ProfileText) -> Option<String> {
    match text {
        ProfileText::PlainString(s) => clean(&s),
        // v2 textDescriptionType: the ASCII part is the invariant one
        ProfileText::Description(d) => clean(&d.ascii_string).or_else(|| clean(&d.unicode_string)),
        ProfileText::Localizable(records) => pick_record(&records).and_then(|r| clean(&r.value)),
    }
}

/// en-US wins, then any English record, then the first one
fn pick_record(records: &[LocalizableString]) -> Option<&LocalizableString> {
    records
        .iter()
        .find(|r| r.language == "en" && r.country == "US")
        .or_else(|| records.iter().find(|r| r.language == "en"))
        .or_else(|| records.first())
}

fn clean(text: &str) -> Option<String> {
    let trimmed = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
